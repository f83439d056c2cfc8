use serde::{Deserialize, Serialize};

use super::User;

/// Response from the login, register and OAuth callback endpoints.
///
/// Login and OAuth always carry the full credential set. Register may
/// answer with only a `message`, which is why every field is optional
/// here; completeness is checked when the response is turned into
/// session credentials.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Epoch millis
    #[serde(default)]
    pub access_token_expires_at: Option<i64>,
    /// Epoch millis
    #[serde(default)]
    pub refresh_token_expires_at: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

impl AuthResponse {
    /// True when the response carries a user and both tokens
    pub fn has_credentials(&self) -> bool {
        self.user.is_some()
            && self.access_token.as_deref().is_some_and(|t| !t.is_empty())
            && self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// Response from the refresh-token endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Epoch millis
    pub access_token_expires_at: i64,
    #[serde(default)]
    pub refresh_token_expires_at: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUrlResponse {
    pub url: String,
}

/// Plain acknowledgement, e.g. from logout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub message: Option<String>,
}

/// Some endpoints wrap their payload in a `data` field, others don't.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Envelope<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> Envelope<T> {
    pub fn into_inner(self) -> T {
        match self {
            Envelope::Wrapped { data } => data,
            Envelope::Bare(inner) => inner,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_login_response() {
        let json = r#"{
            "user": {"id": "1", "username": "ada", "email": "ada@example.com", "role": "user"},
            "accessToken": "access-1",
            "refreshToken": "refresh-1",
            "accessTokenExpiresAt": 1700000000000,
            "message": "登录成功"
        }"#;

        let resp: AuthResponse = serde_json::from_str(json).expect("Failed to parse login JSON");
        assert!(resp.has_credentials());
        assert_eq!(resp.access_token_expires_at, Some(1_700_000_000_000));
        assert_eq!(resp.refresh_token_expires_at, None);
        assert_eq!(resp.user.map(|u| u.username), Some("ada".to_string()));
    }

    #[test]
    fn test_parse_register_message_only() {
        let resp: AuthResponse =
            serde_json::from_str(r#"{"message": "registered"}"#).expect("Failed to parse register JSON");
        assert!(!resp.has_credentials());
        assert_eq!(resp.message.as_deref(), Some("registered"));
    }

    #[test]
    fn test_empty_token_is_not_a_credential() {
        let resp = AuthResponse {
            user: Some(User {
                id: "1".to_string(),
                username: "ada".to_string(),
                email: "ada@example.com".to_string(),
                role: "user".to_string(),
            }),
            access_token: Some(String::new()),
            refresh_token: Some("refresh".to_string()),
            ..Default::default()
        };
        assert!(!resp.has_credentials());
    }

    #[test]
    fn test_envelope_accepts_both_shapes() {
        let wrapped: Envelope<AuthUrlResponse> =
            serde_json::from_str(r#"{"data": {"url": "https://accounts.example.com/o"}}"#)
                .expect("Failed to parse wrapped JSON");
        assert_eq!(wrapped.into_inner().url, "https://accounts.example.com/o");

        let bare: Envelope<AuthUrlResponse> =
            serde_json::from_str(r#"{"url": "https://accounts.example.com/o"}"#)
                .expect("Failed to parse bare JSON");
        assert_eq!(bare.into_inner().url, "https://accounts.example.com/o");
    }
}
