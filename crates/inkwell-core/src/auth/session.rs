use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::{AuthResponse, RefreshResponse, User};
use crate::store::{keys, KeyValueStore, StoreError};

/// Lifetime assumed for a refresh token when the backend doesn't say.
const REFRESH_TOKEN_DEFAULT_DAYS: i64 = 30;

/// Current wall-clock time in epoch millis
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Default refresh-token expiry relative to `now` (epoch millis)
pub fn default_refresh_expiry(now: i64) -> i64 {
    now + Duration::days(REFRESH_TOKEN_DEFAULT_DAYS).num_milliseconds()
}

/// The identity and credential pair of an authenticated session.
///
/// User and both tokens only ever exist together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Credentials {
    pub user: User,
    pub access_token: String,
    pub refresh_token: String,
    /// Epoch millis, `None` when unknown
    pub access_token_expires_at: Option<i64>,
    /// Epoch millis
    pub refresh_token_expires_at: Option<i64>,
}

impl Credentials {
    /// Build credentials from a login/register/OAuth response.
    /// Returns `None` unless the user and both tokens are present.
    pub fn from_auth_response(resp: AuthResponse, now: i64) -> Option<Self> {
        if !resp.has_credentials() {
            return None;
        }
        Some(Self {
            user: resp.user?,
            access_token: resp.access_token?,
            refresh_token: resp.refresh_token?,
            access_token_expires_at: resp.access_token_expires_at,
            refresh_token_expires_at: Some(
                resp.refresh_token_expires_at
                    .unwrap_or_else(|| default_refresh_expiry(now)),
            ),
        })
    }

    /// Replace tokens and expiries with a refresh result, keeping the user.
    ///
    /// Expiries belong to the newly issued tokens, so they are taken as
    /// given. One that doesn't move forward is logged.
    pub fn apply_refresh(&mut self, resp: RefreshResponse, now: i64) {
        self.access_token = resp.access_token;
        self.refresh_token = resp.refresh_token;
        advance_expiry(
            &mut self.access_token_expires_at,
            resp.access_token_expires_at,
            keys::ACCESS_TOKEN_EXPIRES_AT,
        );
        advance_expiry(
            &mut self.refresh_token_expires_at,
            resp.refresh_token_expires_at
                .unwrap_or_else(|| default_refresh_expiry(now)),
            keys::REFRESH_TOKEN_EXPIRES_AT,
        );
    }

    /// Instant (epoch millis) at which a proactive refresh should happen.
    /// Unknown expiry means "now".
    pub fn refresh_due_at(&self, lead: Duration, now: i64) -> i64 {
        self.access_token_expires_at
            .map(|exp| exp - lead.num_milliseconds())
            .unwrap_or(now)
    }

    /// Load credentials from a store.
    ///
    /// Returns `Ok(None)` when any required key is missing or the stored
    /// user can't be parsed. Unparseable expiries are treated as unknown.
    pub async fn load(store: &dyn KeyValueStore) -> Result<Option<Self>, StoreError> {
        let user = store.get(keys::USER).await?;
        let access_token = store.get(keys::ACCESS_TOKEN).await?;
        let refresh_token = store.get(keys::REFRESH_TOKEN).await?;

        let (Some(user), Some(access_token), Some(refresh_token)) = (user, access_token, refresh_token)
        else {
            return Ok(None);
        };

        let user: User = match serde_json::from_str(&user) {
            Ok(user) => user,
            Err(e) => {
                warn!(error = %e, "Stored user record is not valid JSON");
                return Ok(None);
            }
        };

        let access_token_expires_at = parse_millis(
            keys::ACCESS_TOKEN_EXPIRES_AT,
            store.get(keys::ACCESS_TOKEN_EXPIRES_AT).await?,
        );
        let refresh_token_expires_at = parse_millis(
            keys::REFRESH_TOKEN_EXPIRES_AT,
            store.get(keys::REFRESH_TOKEN_EXPIRES_AT).await?,
        );

        Ok(Some(Self {
            user,
            access_token,
            refresh_token,
            access_token_expires_at,
            refresh_token_expires_at,
        }))
    }

    /// Write every field to the store. All keys are attempted even if one
    /// fails; the first error is returned.
    pub async fn save(&self, store: &dyn KeyValueStore) -> Result<(), StoreError> {
        let user = serde_json::to_string(&self.user)?;
        let mut first_err = None;

        let writes: [(&str, Option<String>); 5] = [
            (keys::USER, Some(user)),
            (keys::ACCESS_TOKEN, Some(self.access_token.clone())),
            (keys::REFRESH_TOKEN, Some(self.refresh_token.clone())),
            (keys::ACCESS_TOKEN_EXPIRES_AT, self.access_token_expires_at.map(|v| v.to_string())),
            (keys::REFRESH_TOKEN_EXPIRES_AT, self.refresh_token_expires_at.map(|v| v.to_string())),
        ];

        for (key, value) in writes {
            let result = match value {
                Some(ref v) => store.set(key, v).await,
                None => store.remove(key).await,
            };
            if let Err(e) = result {
                first_err.get_or_insert(e);
            }
        }

        first_err.map_or(Ok(()), Err)
    }

    /// Remove every session key from the store
    pub async fn clear(store: &dyn KeyValueStore) -> Result<(), StoreError> {
        let mut first_err = None;
        for key in keys::ALL {
            if let Err(e) = store.remove(key).await {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

fn advance_expiry(current: &mut Option<i64>, incoming: i64, key: &str) -> bool {
    let newer = current.map_or(true, |held| incoming > held);
    if !newer {
        warn!(key, held = ?current, incoming, "Refreshed expiry is not newer than the one held");
    }
    *current = Some(incoming);
    newer
}

fn parse_millis(key: &str, raw: Option<String>) -> Option<i64> {
    let raw = raw?;
    match raw.trim().parse::<i64>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key = key, "Stored timestamp is not a number, ignoring");
            None
        }
    }
}

/// The client's session: anonymous, or authenticated with credentials.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Session {
    pub credentials: Option<Credentials>,
    /// True only while the initial load from storage is running
    pub is_loading: bool,
}

impl Session {
    /// The state before `initialize` has run
    pub fn loading() -> Self {
        Self {
            credentials: None,
            is_loading: true,
        }
    }

    pub fn authenticated(credentials: Credentials) -> Self {
        Self {
            credentials: Some(credentials),
            is_loading: false,
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn is_authenticated(&self) -> bool {
        self.credentials.is_some()
    }

    pub fn user(&self) -> Option<&User> {
        self.credentials.as_ref().map(|c| &c.user)
    }

    pub fn access_token(&self) -> Option<&str> {
        self.credentials.as_ref().map(|c| c.access_token.as_str())
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.credentials.as_ref().map(|c| c.refresh_token.as_str())
    }

    pub fn access_token_expires_at(&self) -> Option<i64> {
        self.credentials.as_ref().and_then(|c| c.access_token_expires_at)
    }

    pub fn refresh_token_expires_at(&self) -> Option<i64> {
        self.credentials.as_ref().and_then(|c| c.refresh_token_expires_at)
    }

    /// Access token is past its expiry. Unknown expiry counts as expired.
    pub fn access_token_expired(&self, now: i64) -> bool {
        match self.credentials {
            Some(ref c) => c.access_token_expires_at.map_or(true, |exp| now >= exp),
            None => false,
        }
    }

    pub fn refresh_token_expired(&self, now: i64) -> bool {
        self.refresh_token_expires_at().is_some_and(|exp| now >= exp)
    }

    /// Whether the access token has entered the lead window before expiry
    pub fn needs_refresh(&self, now: i64, lead: Duration) -> bool {
        self.credentials
            .as_ref()
            .is_some_and(|c| now >= c.refresh_due_at(lead, now))
    }

    /// Whole minutes left on the access token, for display
    pub fn minutes_until_expiry(&self, now: i64) -> Option<i64> {
        self.access_token_expires_at()
            .map(|exp| ((exp - now) / 60_000).max(0))
    }
}
