//! Identity resolution for API requests.
//!
//! Authentication proper (cookies, tokens) lives upstream; requests reach
//! this service with the resolved user in the `x-user-id` header. A
//! fallback identity is an explicit configuration choice, not an
//! environment branch.

use axum::http::HeaderMap;

use crate::error::Error;

pub const USER_HEADER: &str = "x-user-id";

/// Resolve the caller's identity from headers, falling back to the
/// configured identity when permitted.
pub fn resolve_user(headers: &HeaderMap, fallback: Option<&str>) -> Result<String, Error> {
    if let Some(value) = headers.get(USER_HEADER) {
        if let Ok(user) = value.to_str() {
            if !user.is_empty() {
                return Ok(user.to_string());
            }
        }
    }
    match fallback {
        Some(user) => Ok(user.to_string()),
        None => Err(Error::Unauthorized),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_wins_over_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_HEADER, "u-real".parse().unwrap());
        assert_eq!(
            resolve_user(&headers, Some("u-dev")).unwrap(),
            "u-real"
        );
    }

    #[test]
    fn fallback_when_header_missing() {
        let headers = HeaderMap::new();
        assert_eq!(resolve_user(&headers, Some("u-dev")).unwrap(), "u-dev");
    }

    #[test]
    fn unauthorized_without_header_or_fallback() {
        let headers = HeaderMap::new();
        assert!(matches!(
            resolve_user(&headers, None),
            Err(Error::Unauthorized)
        ));
    }

    #[test]
    fn empty_header_is_treated_as_missing() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_HEADER, "".parse().unwrap());
        assert!(matches!(
            resolve_user(&headers, None),
            Err(Error::Unauthorized)
        ));
    }
}
