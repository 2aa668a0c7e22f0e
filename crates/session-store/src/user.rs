use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Profile claims of the authenticated user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    /// Full display name
    pub name: String,

    /// Given name claim
    #[serde(default)]
    pub given_name: Option<String>,

    /// Family name claim
    #[serde(default)]
    pub family_name: Option<String>,

    /// Email claim
    #[serde(default)]
    pub email: Option<String>,

    /// Session state from the authority
    #[serde(default)]
    pub session_state: Option<String>,

    /// Authentication methods references
    #[serde(default)]
    pub amr: Option<Vec<String>>,
}

impl UserProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            given_name: None,
            family_name: None,
            email: None,
            session_state: None,
            amr: None,
        }
    }
}

/// The authenticated user record persisted by the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredUser {
    /// Profile claims
    pub profile: UserProfile,

    /// Access token issued by the authority
    pub access_token: String,

    /// Id token, when the response type includes one
    #[serde(default)]
    pub id_token: Option<String>,

    /// Refresh token, when the grant supports it
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Token expiry time
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl StoredUser {
    pub fn new(profile: UserProfile, access_token: impl Into<String>) -> Self {
        Self {
            profile,
            access_token: access_token.into(),
            id_token: None,
            refresh_token: None,
            expires_at: None,
        }
    }

    /// Check if the access token is expired or about to expire.
    ///
    /// Uses a 60 second margin so tokens are refreshed before a
    /// downstream call can observe an expired one. An unknown expiry
    /// is treated as not expired.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => {
                let margin = chrono::Duration::seconds(60);
                Utc::now() + margin >= expires_at
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn test_user() -> StoredUser {
        StoredUser::new(UserProfile::new("Test User"), "access-token")
    }

    #[test]
    fn test_user_without_expiry_is_not_expired() {
        assert!(!test_user().is_expired());
    }

    #[test]
    fn test_user_expiring_far_in_future_is_not_expired() {
        let mut user = test_user();
        user.expires_at = Some(Utc::now() + Duration::hours(1));
        assert!(!user.is_expired());
    }

    #[test]
    fn test_user_within_margin_is_expired() {
        let mut user = test_user();
        user.expires_at = Some(Utc::now() + Duration::seconds(30));
        assert!(user.is_expired());
    }

    #[test]
    fn test_user_past_expiry_is_expired() {
        let mut user = test_user();
        user.expires_at = Some(Utc::now() - Duration::minutes(5));
        assert!(user.is_expired());
    }

    #[test]
    fn test_user_serde_roundtrip() {
        let mut user = test_user();
        user.profile.email = Some("test@example.com".to_string());
        user.profile.amr = Some(vec!["pwd".to_string()]);
        user.id_token = Some("id-token".to_string());

        let json = serde_json::to_string(&user).unwrap();
        let parsed: StoredUser = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, user);
    }

    #[test]
    fn test_user_deserializes_without_optional_fields() {
        let json = r#"{"profile":{"name":"Minimal"},"access_token":"token"}"#;
        let user: StoredUser = serde_json::from_str(json).unwrap();

        assert_eq!(user.profile.name, "Minimal");
        assert_eq!(user.access_token, "token");
        assert!(user.id_token.is_none());
        assert!(user.expires_at.is_none());
    }
}
