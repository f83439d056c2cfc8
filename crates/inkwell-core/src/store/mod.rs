//! Persistent key-value storage for session fields.
//!
//! This module provides:
//! - `KeyValueStore`: The async string-keyed storage seam the session
//!   manager persists through
//! - `FileStore`: A JSON file in the cache directory
//! - `KeyringStore`: One OS keychain entry per key
//! - `MemoryStore`: In-process map for tests and ephemeral sessions
//!
//! Absence of a key is distinct from an empty string value.

pub mod file;
pub mod keychain;
pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

pub use keychain::KeyringStore;
pub use file::FileStore;
pub use memory::MemoryStore;

/// Keys the session manager persists under
pub mod keys {
    pub const USER: &str = "user";
    pub const ACCESS_TOKEN: &str = "accessToken";
    pub const REFRESH_TOKEN: &str = "refreshToken";
    pub const ACCESS_TOKEN_EXPIRES_AT: &str = "accessTokenExpiresAt";
    pub const REFRESH_TOKEN_EXPIRES_AT: &str = "refreshTokenExpiresAt";

    /// Every key, in the order they are written
    pub const ALL: [&str; 5] = [
        USER,
        ACCESS_TOKEN,
        REFRESH_TOKEN,
        ACCESS_TOKEN_EXPIRES_AT,
        REFRESH_TOKEN_EXPIRES_AT,
    ];
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt store contents: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Keychain error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Removing a missing key is not an error
    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}
