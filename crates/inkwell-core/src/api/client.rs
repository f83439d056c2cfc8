//! HTTP client for the Inkwell auth endpoints.
//!
//! This module provides the `ApiClient` struct, the production
//! implementation of [`AuthBackend`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::models::{AuthResponse, AuthUrlResponse, Envelope, MessageResponse, RefreshResponse};

use super::{ApiError, AuthBackend};

// ============================================================================
// Constants
// ============================================================================

/// Default backend location, matching the development server
pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";

/// HTTP request timeout in seconds.
/// The session manager imposes no timeout of its own, so this is the only one.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

const LOGIN_PATH: &str = "/api/auth/login";
const REGISTER_PATH: &str = "/api/auth/register";
const LOGOUT_PATH: &str = "/api/auth/logout";
const REFRESH_TOKEN_PATH: &str = "/api/auth/refresh-token";
const GOOGLE_PATH: &str = "/api/auth/google";
const GOOGLE_CALLBACK_PATH: &str = "/api/auth/google/callback";

/// API client for the Inkwell backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a new API client for the given base URL
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: Self::normalize_base_url(base_url.into()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn normalize_base_url(mut base_url: String) -> String {
        while base_url.ends_with('/') {
            base_url.pop();
        }
        base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Check if response is successful, returning an error with body if not.
    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit (should retry),
    /// or Err for other errors.
    async fn check_response_for_retry(
        response: reqwest::Response,
    ) -> Result<Option<reqwest::Response>, ApiError> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status().as_u16() == 429 {
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn parse_json<T: DeserializeOwned>(
        response: reqwest::Response,
        url: &str,
    ) -> Result<T, ApiError> {
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse JSON response from {}: {}", url, e))
        })
    }

    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
        self.send_with_retry(url, || {
            self.client
                .get(url)
                .header(header::ACCEPT, "application/json")
        })
        .await
    }

    async fn post<T: DeserializeOwned, B: Serialize>(&self, url: &str, body: &B) -> Result<T, ApiError> {
        self.send_with_retry(url, || {
            self.client
                .post(url)
                .header(header::ACCEPT, "application/json")
                .json(body)
        })
        .await
    }

    async fn send_with_retry<T, F>(&self, url: &str, build: F) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = build().send().await?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => return Self::parse_json(response, url).await,
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited);
                    }
                    warn!(url = url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2; // Exponential backoff
                }
            }
        }
    }
}

#[async_trait]
impl AuthBackend for ApiClient {
    async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ApiError> {
        debug!(email = email, "POST login");
        self.post(&self.url(LOGIN_PATH), &json!({ "email": email, "password": password }))
            .await
    }

    async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthResponse, ApiError> {
        debug!(username = username, email = email, "POST register");
        self.post(
            &self.url(REGISTER_PATH),
            &json!({ "username": username, "email": email, "password": password }),
        )
        .await
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<RefreshResponse, ApiError> {
        debug!("POST refresh-token");
        self.post(&self.url(REFRESH_TOKEN_PATH), &json!({ "refreshToken": refresh_token }))
            .await
    }

    async fn logout(&self, refresh_token: &str) -> Result<MessageResponse, ApiError> {
        debug!("POST logout");
        self.post(&self.url(LOGOUT_PATH), &json!({ "refreshToken": refresh_token }))
            .await
    }

    async fn auth_url(&self) -> Result<String, ApiError> {
        let resp: Envelope<AuthUrlResponse> = self.get(&self.url(GOOGLE_PATH)).await?;
        Ok(resp.into_inner().url)
    }

    async fn google_callback(&self, code: &str) -> Result<AuthResponse, ApiError> {
        debug!("POST google callback");
        let resp: Envelope<AuthResponse> = self
            .post(&self.url(GOOGLE_CALLBACK_PATH), &json!({ "code": code }))
            .await?;
        Ok(resp.into_inner())
    }
}
