//! The fixed set of journey helpers.

use serde::{Deserialize, Serialize};

/// One of the six specialized conversational roles guiding a journey step.
///
/// The set is closed: helpers beyond this catalog are out of scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Helper {
    /// Ideation — shapes the problem and the audience.
    Muse,
    /// Technical design — picks the stack and the architecture.
    Architect,
    /// Execution — scopes and ships the MVP.
    Builder,
    /// Launch — channels, messaging, timing.
    Herald,
    /// Growth — metrics and experiments after launch.
    Mentor,
    /// Strategy — risks, reflection, course corrections.
    Sage,
}

/// All helpers in journey order.
pub const ALL_HELPERS: [Helper; 6] = [
    Helper::Muse,
    Helper::Architect,
    Helper::Builder,
    Helper::Herald,
    Helper::Mentor,
    Helper::Sage,
];

impl Helper {
    /// Capitalized display name used in prompts and listings.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Muse => "Muse",
            Self::Architect => "Architect",
            Self::Builder => "Builder",
            Self::Herald => "Herald",
            Self::Mentor => "Mentor",
            Self::Sage => "Sage",
        }
    }

    /// Which other helpers' insights this helper is allowed to read.
    ///
    /// The journey's first helper reads nothing; later helpers read a
    /// curated subset, not everything.
    pub fn relevance(&self) -> &'static [Helper] {
        match self {
            Self::Muse => &[],
            Self::Architect => &[Helper::Muse],
            Self::Builder => &[Helper::Muse, Helper::Architect],
            Self::Herald => &[Helper::Muse, Helper::Builder],
            Self::Mentor => &[Helper::Builder, Helper::Herald],
            Self::Sage => &[Helper::Architect, Helper::Herald, Helper::Mentor],
        }
    }

    /// The single clarifying question asked when opening a journey step.
    pub fn clarifying_question(&self) -> &'static str {
        match self {
            Self::Muse => "What problem keeps pulling your attention back?",
            Self::Architect => "What must your product do on day one?",
            Self::Builder => "What is the smallest version you would be proud to ship?",
            Self::Herald => "Where do the people you want to reach already spend time?",
            Self::Mentor => "Which single number would tell you this is working?",
            Self::Sage => "What would make you change course?",
        }
    }

    pub fn parse(s: &str) -> Option<Helper> {
        match s {
            "muse" => Some(Self::Muse),
            "architect" => Some(Self::Architect),
            "builder" => Some(Self::Builder),
            "herald" => Some(Self::Herald),
            "mentor" => Some(Self::Mentor),
            "sage" => Some(Self::Sage),
            _ => None,
        }
    }
}

impl std::fmt::Display for Helper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Muse => "muse",
            Self::Architect => "architect",
            Self::Builder => "builder",
            Self::Herald => "herald",
            Self::Mentor => "mentor",
            Self::Sage => "sage",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_serde() {
        for helper in ALL_HELPERS {
            let display = format!("{helper}");
            let json = serde_json::to_string(&helper).unwrap();
            assert_eq!(
                format!("\"{display}\""),
                json,
                "Display and serde should match for {helper:?}"
            );
        }
    }

    #[test]
    fn parse_round_trips() {
        for helper in ALL_HELPERS {
            assert_eq!(Helper::parse(&helper.to_string()), Some(helper));
        }
        assert_eq!(Helper::parse("wizard"), None);
    }

    #[test]
    fn first_helper_reads_nothing() {
        assert!(Helper::Muse.relevance().is_empty());
    }

    #[test]
    fn relevance_never_includes_self() {
        for helper in ALL_HELPERS {
            assert!(
                !helper.relevance().contains(&helper),
                "{helper} should not be in its own relevance list"
            );
        }
    }
}
