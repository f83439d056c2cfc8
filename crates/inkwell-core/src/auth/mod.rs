//! Session lifecycle management.
//!
//! This module provides:
//! - `Session` / `Credentials`: The client's authentication state
//! - `SessionManager`: Login, registration, logout and token refresh,
//!   with persistence and reactive observation
//! - `RefreshScheduler`: The single cancellable proactive-refresh timer
//! - `SessionError` / `ErrorKind`: Typed failure taxonomy
//!
//! Access tokens are refreshed one hour before they expire.

pub mod error;
pub mod manager;
pub mod scheduler;
pub mod session;

pub use error::{ErrorKind, SessionError};
pub use manager::{ManagerConfig, SessionManager, DEFAULT_MIN_REFRESH_INTERVAL, DEFAULT_REFRESH_LEAD};
pub use scheduler::{ArmPolicy, Arming, RefreshScheduler};
pub use session::{now_millis, Credentials, Session};
