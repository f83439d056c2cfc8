//! Inkwell core - session lifecycle for the Inkwell article-sharing client.
//!
//! The `SessionManager` keeps the signed-in user's credentials in memory
//! and in durable storage, and refreshes the access token ahead of expiry.
//! It talks to the backend through the `AuthBackend` trait and persists
//! through the `KeyValueStore` trait, so both can be swapped out.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod store;

pub use api::{ApiClient, ApiError, AuthBackend};
pub use auth::{Credentials, ErrorKind, ManagerConfig, Session, SessionError, SessionManager};
pub use config::{Config, StoreKind};
pub use models::User;
pub use store::{FileStore, KeyValueStore, KeyringStore, MemoryStore, StoreError};
