//! Gateway authentication: optional bearer token on the HTTP API

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use tracing::warn;

/// Result of checking a request against the configured token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    /// No token configured
    Disabled,
    Accepted,
    Missing,
    Rejected,
}

impl AuthOutcome {
    pub fn is_allowed(self) -> bool {
        matches!(self, Self::Disabled | Self::Accepted)
    }
}

/// Check the `Authorization: Bearer <token>` header of a request
pub fn authorize(configured_token: &str, headers: &HeaderMap) -> AuthOutcome {
    if configured_token.is_empty() {
        return AuthOutcome::Disabled;
    }

    let provided = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(extract_bearer_token);

    match provided {
        None => {
            warn!("Gateway auth: no bearer token provided");
            AuthOutcome::Missing
        }
        Some(token) if constant_time_eq(configured_token.as_bytes(), token.as_bytes()) => {
            AuthOutcome::Accepted
        }
        Some(_) => {
            warn!("Gateway auth: invalid bearer token");
            AuthOutcome::Rejected
        }
    }
}

/// Extract bearer token from an Authorization header value.
///
/// Expects format: `Bearer <token>`
pub fn extract_bearer_token(header_value: &str) -> Option<&str> {
    let token = header_value.trim().strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |diff, (x, y)| diff | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, value.parse().unwrap());
        headers
    }

    #[test]
    fn test_no_token_configured() {
        assert_eq!(authorize("", &HeaderMap::new()), AuthOutcome::Disabled);
        assert!(authorize("", &headers("Bearer anything")).is_allowed());
    }

    #[test]
    fn test_valid_token() {
        assert_eq!(authorize("secret123", &headers("Bearer secret123")), AuthOutcome::Accepted);
    }

    #[test]
    fn test_invalid_token() {
        let outcome = authorize("secret123", &headers("Bearer wrong"));
        assert_eq!(outcome, AuthOutcome::Rejected);
        assert!(!outcome.is_allowed());
    }

    #[test]
    fn test_missing_header() {
        assert_eq!(authorize("secret123", &HeaderMap::new()), AuthOutcome::Missing);
        assert_eq!(authorize("secret123", &headers("Basic abc")), AuthOutcome::Missing);
    }

    #[test]
    fn test_extract_bearer_token() {
        assert_eq!(extract_bearer_token("Bearer abc123"), Some("abc123"));
        assert_eq!(extract_bearer_token("Bearer  spaced "), Some("spaced"));
        assert_eq!(extract_bearer_token("Bearer "), None);
        assert_eq!(extract_bearer_token("Basic abc123"), None);
        assert_eq!(extract_bearer_token(""), None);
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"hello", b"hello"));
        assert!(!constant_time_eq(b"hello", b"world"));
        assert!(!constant_time_eq(b"short", b"longer"));
    }
}
