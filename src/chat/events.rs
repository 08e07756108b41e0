//! Normalized wire events for the conversation stream.
//!
//! Every event crosses the push transport as one SSE line:
//! `data: <JSON>\n\n`, with `type` as the discriminator.

use serde::{Deserialize, Serialize};

/// A typed event in the conversation stream.
///
/// A well-formed sequence begins with exactly one `ThreadId` and ends with
/// exactly one of `Done` or `Error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    ThreadId {
        thread_id: String,
    },
    Text {
        content: String,
    },
    ToolCall {
        tool_name: String,
        tool_args: serde_json::Value,
    },
    ToolResult {
        tool_name: String,
        result: serde_json::Value,
    },
    Done,
    Error {
        error: String,
    },
}

impl StreamEvent {
    /// True for the events that terminate a stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error { .. })
    }

    /// The JSON payload carried on the `data:` line.
    pub fn to_json(&self) -> String {
        // Serialization of this enum cannot fail; fall back to a generic
        // error payload just in case.
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"type":"error","error":"serialization failed"}"#.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_shapes() {
        assert_eq!(
            StreamEvent::ThreadId {
                thread_id: "th-1".into()
            }
            .to_json(),
            r#"{"type":"thread_id","thread_id":"th-1"}"#
        );
        assert_eq!(
            StreamEvent::Text {
                content: "hello".into()
            }
            .to_json(),
            r#"{"type":"text","content":"hello"}"#
        );
        assert_eq!(StreamEvent::Done.to_json(), r#"{"type":"done"}"#);
        assert_eq!(
            StreamEvent::Error {
                error: "boom".into()
            }
            .to_json(),
            r#"{"type":"error","error":"boom"}"#
        );
    }

    #[test]
    fn tool_events_carry_structured_payloads() {
        let event = StreamEvent::ToolCall {
            tool_name: "web_search".into(),
            tool_args: serde_json::json!({"query": "rust sse"}),
        };
        let json = event.to_json();
        assert!(json.contains(r#""type":"tool_call""#));
        assert!(json.contains(r#""tool_name":"web_search""#));

        let parsed: StreamEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn terminal_classification() {
        assert!(StreamEvent::Done.is_terminal());
        assert!(StreamEvent::Error { error: "e".into() }.is_terminal());
        assert!(
            !StreamEvent::ThreadId {
                thread_id: "t".into()
            }
            .is_terminal()
        );
        assert!(!StreamEvent::Text { content: "c".into() }.is_terminal());
    }
}
