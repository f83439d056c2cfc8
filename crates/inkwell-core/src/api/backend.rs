use async_trait::async_trait;

use crate::models::{AuthResponse, MessageResponse, RefreshResponse};

use super::ApiError;

/// The auth endpoints the session manager depends on.
///
/// `ApiClient` is the HTTP implementation; tests substitute scripted
/// backends. Implementations must report a rejected refresh token in a way
/// that makes [`ApiError::is_invalid_token`] return true.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ApiError>;

    async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthResponse, ApiError>;

    async fn refresh_token(&self, refresh_token: &str) -> Result<RefreshResponse, ApiError>;

    async fn logout(&self, refresh_token: &str) -> Result<MessageResponse, ApiError>;

    /// OAuth authorization URL the user should be sent to
    async fn auth_url(&self) -> Result<String, ApiError>;

    /// Exchange an OAuth authorization code for a session
    async fn google_callback(&self, code: &str) -> Result<AuthResponse, ApiError>;
}
