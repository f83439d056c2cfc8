use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Unauthorized - token may be expired")]
    Unauthorized,

    #[error("Invalid or expired token: {0}")]
    InvalidToken(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Message fragments the backend uses when a token is no longer accepted.
/// Matched case-insensitively against the `message` field of error bodies.
const INVALID_TOKEN_MARKERS: &[&str] = &[
    "invalid token",
    "expired token",
    "invalid refresh token",
    "token expired",
    "无效或过期的令牌",
];

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Pull the `message` field out of a JSON error body, if there is one
    fn body_message(body: &str) -> Option<String> {
        serde_json::from_str::<ErrorBody>(body)
            .ok()
            .and_then(|b| b.message)
            .filter(|m| !m.is_empty())
    }

    fn is_invalid_token_message(message: &str) -> bool {
        let lower = message.to_lowercase();
        INVALID_TOKEN_MARKERS.iter().any(|marker| lower.contains(marker))
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let message = Self::body_message(body);
        if let Some(ref m) = message {
            if Self::is_invalid_token_message(m) {
                return ApiError::InvalidToken(Self::truncate_body(m));
            }
        }

        let detail = Self::truncate_body(message.as_deref().unwrap_or(body));
        match status.as_u16() {
            401 => ApiError::Unauthorized,
            403 => ApiError::AccessDenied(detail),
            404 => ApiError::NotFound(detail),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(detail),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, detail)),
        }
    }

    /// True when the backend rejected the credential itself, as opposed to
    /// a transient or unrelated failure.
    pub fn is_invalid_token(&self) -> bool {
        matches!(self, ApiError::Unauthorized | ApiError::InvalidToken(_))
    }
}
