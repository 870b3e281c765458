//! Token entries held inside an identity cache.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Tokens closer than this to expiry are treated as expired.
const EXPIRY_SKEW_SECS: i64 = 60;

/// An acquired OAuth token as kept by the identity library's cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthToken {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_on: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

impl OAuthToken {
    /// Create a new `Bearer` token with no expiry.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_on: None,
            token_type: Some("Bearer".to_string()),
        }
    }

    /// Set the expiry to `expires_in_secs` seconds from now.
    #[must_use]
    pub fn with_expiry(mut self, expires_in_secs: i64) -> Self {
        self.expires_on = Some(Utc::now() + Duration::seconds(expires_in_secs));
        self
    }

    /// Attach a refresh token.
    #[must_use]
    pub fn with_refresh(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// Return `true` if the token expires within the skew window of `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_on
            .is_some_and(|exp| now + Duration::seconds(EXPIRY_SKEW_SECS) >= exp)
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Usability of the token right now.
    #[must_use]
    pub fn state(&self) -> TokenState {
        match (self.is_expired(), &self.refresh_token) {
            (false, _) => TokenState::Valid,
            (true, Some(_)) => TokenState::Expired,
            (true, None) => TokenState::Invalid,
        }
    }
}

/// Describes the usability state of an [`OAuthToken`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    Valid,
    /// Expired but renewable with the refresh token.
    Expired,
    /// Expired with no refresh token.
    Invalid,
}

impl std::fmt::Display for TokenState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Valid => write!(f, "valid"),
            Self::Expired => write!(f, "expired"),
            Self::Invalid => write!(f, "invalid"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_expiry_is_valid() {
        let t = OAuthToken::new("tok");
        assert!(!t.is_expired());
        assert_eq!(t.state(), TokenState::Valid);
    }

    #[test]
    fn test_future_expiry_is_valid() {
        let t = OAuthToken::new("tok").with_expiry(3600);
        assert_eq!(t.state(), TokenState::Valid);
    }

    #[test]
    fn test_expired_with_refresh() {
        let t = OAuthToken::new("old").with_expiry(-100).with_refresh("ref");
        assert_eq!(t.state(), TokenState::Expired);
    }

    #[test]
    fn test_expired_without_refresh() {
        let t = OAuthToken::new("old").with_expiry(-100);
        assert_eq!(t.state(), TokenState::Invalid);
    }

    #[test]
    fn test_skew_window() {
        let now = Utc::now();
        let t = OAuthToken {
            expires_on: Some(now + Duration::seconds(30)),
            ..OAuthToken::new("tok")
        };
        assert!(t.is_expired_at(now));
        assert!(!t.is_expired_at(now - Duration::seconds(120)));
    }

    #[test]
    fn test_serde_skips_none() {
        let json = serde_json::to_string(&OAuthToken::new("tok")).unwrap();
        assert!(!json.contains("refresh_token"));
        assert!(!json.contains("expires_on"));
    }
}
