//! Data models exchanged with the Inkwell auth backend.
//!
//! This module contains:
//!
//! - `User`: The identity record attached to an authenticated session
//! - `AuthResponse`: Payload of login, register and OAuth callback calls
//! - `RefreshResponse`: Payload of the refresh-token endpoint
//! - `AuthUrlResponse`: OAuth authorization URL

pub mod auth;
pub mod user;

pub use auth::{AuthResponse, AuthUrlResponse, Envelope, MessageResponse, RefreshResponse};
pub use user::User;
