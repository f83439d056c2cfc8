//! Auth backend client module.
//!
//! This module provides the `AuthBackend` trait the session manager talks
//! to, and `ApiClient`, its HTTP implementation against the Inkwell REST
//! API (`/api/auth/*`).
//!
//! Errors are classified by `ApiError`, which distinguishes a rejected
//! token from transient failures.

pub mod backend;
pub mod client;
pub mod error;

pub use backend::AuthBackend;
pub use client::ApiClient;
pub use error::ApiError;
