use serde::{Deserialize, Serialize};

/// Identity of the signed-in account, as returned by the auth backend.
///
/// Persisted as JSON under the `user` key, so the field names must stay
/// stable across releases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub role: String,
}

impl User {
    /// Name to show in status output, falling back to the email address
    pub fn display_name(&self) -> &str {
        if self.username.trim().is_empty() {
            &self.email
        } else {
            &self.username
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role.eq_ignore_ascii_case("admin")
    }
}
