//! Token endpoint response handling

use chrono::{Duration, Utc};
use conductor_core::StoredToken;
use serde::Deserialize;

/// Raw token endpoint response (RFC 6749 §5.1)
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    /// Lifetime in seconds
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl From<TokenResponse> for StoredToken {
    fn from(response: TokenResponse) -> Self {
        StoredToken {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_at: response
                .expires_in
                .map(|secs| Utc::now() + Duration::seconds(secs as i64)),
            token_type: response.token_type.unwrap_or_else(|| "Bearer".to_string()),
            scope: response.scope,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_response_conversion() {
        let response: TokenResponse = serde_json::from_str(
            r#"{"access_token": "abc", "token_type": "bearer", "expires_in": 3600, "refresh_token": "def"}"#,
        )
        .unwrap();

        let stored: StoredToken = response.into();
        assert_eq!(stored.access_token, "abc");
        assert_eq!(stored.refresh_token.as_deref(), Some("def"));
        assert!(stored.expires_at.is_some());
        assert!(!stored.is_expired());
    }

    #[test]
    fn test_minimal_response() {
        let response: TokenResponse =
            serde_json::from_str(r#"{"access_token": "abc"}"#).unwrap();
        let stored: StoredToken = response.into();
        assert_eq!(stored.token_type, "Bearer");
        assert!(stored.expires_at.is_none());
    }
}
