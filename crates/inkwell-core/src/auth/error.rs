use thiserror::Error;

use crate::api::ApiError;
use crate::store::StoreError;

/// Broad classes of session failure, for callers that only need to decide
/// how to react (retry later, send the user to the login screen, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network or backend failure. Session state was not touched.
    Backend,
    /// The refresh token was rejected; the session has been cleared.
    InvalidCredentials,
    /// Local storage failed
    Storage,
    /// The operation needs a session and there is none
    NotAuthenticated,
    /// A newer login or a logout won the race; this result was discarded
    Superseded,
    /// The backend answered without a usable credential set
    InvalidResponse,
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Auth backend request failed: {0}")]
    Backend(#[from] ApiError),

    #[error("Refresh token rejected: {0}")]
    RefreshRejected(ApiError),

    #[error("Session storage failed: {0}")]
    Storage(#[from] StoreError),

    #[error("No active session")]
    NotAuthenticated,

    #[error("Session changed while the request was in flight")]
    Superseded,

    #[error("Incomplete auth response: {0}")]
    IncompleteResponse(String),
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::Backend(_) => ErrorKind::Backend,
            SessionError::RefreshRejected(_) => ErrorKind::InvalidCredentials,
            SessionError::Storage(_) => ErrorKind::Storage,
            SessionError::NotAuthenticated => ErrorKind::NotAuthenticated,
            SessionError::Superseded => ErrorKind::Superseded,
            SessionError::IncompleteResponse(_) => ErrorKind::InvalidResponse,
        }
    }

    /// Worth trying again later without user involvement
    pub fn is_retryable(&self) -> bool {
        match self {
            SessionError::Backend(e) => !e.is_invalid_token(),
            SessionError::Storage(_) => true,
            _ => false,
        }
    }
}
