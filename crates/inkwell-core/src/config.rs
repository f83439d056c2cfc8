//! Application configuration management.
//!
//! This module handles loading and saving the application configuration:
//! backend location, where the session is stored, refresh timing and the
//! last email used to sign in.
//!
//! Configuration is stored at `~/.config/inkwell/config.json`.
//! `INKWELL_API_URL` and `INKWELL_STORE` override the file.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::client::DEFAULT_BASE_URL;
use crate::auth::ManagerConfig;
use crate::store::{keychain::DEFAULT_SERVICE_NAME, FileStore, KeyValueStore, KeyringStore};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "inkwell";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const DEFAULT_REFRESH_LEAD_MINUTES: u64 = 60;
const DEFAULT_MIN_REFRESH_INTERVAL_SECS: u64 = 60;

/// Where session fields are persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    File,
    Keyring,
}

impl std::str::FromStr for StoreKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(StoreKind::File),
            "keyring" | "keychain" => Ok(StoreKind::Keyring),
            other => Err(anyhow::anyhow!("Unknown store kind: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub store: StoreKind,
    pub refresh_lead_minutes: u64,
    pub min_refresh_interval_secs: u64,
    pub last_email: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_BASE_URL.to_string(),
            store: StoreKind::default(),
            refresh_lead_minutes: DEFAULT_REFRESH_LEAD_MINUTES,
            min_refresh_interval_secs: DEFAULT_MIN_REFRESH_INTERVAL_SECS,
            last_email: None,
        }
    }
}

impl Config {
    /// Load the config file (defaults if missing), then apply environment
    /// overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = Self::load_from(&path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn apply_env_overrides<F>(&mut self, var: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = var("INKWELL_API_URL").filter(|u| !u.trim().is_empty()) {
            self.api_base_url = url;
        }
        if let Some(store) = var("INKWELL_STORE").filter(|s| !s.trim().is_empty()) {
            self.store = store.parse().context("Invalid INKWELL_STORE")?;
        }
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            refresh_lead: Duration::from_secs(self.refresh_lead_minutes.saturating_mul(60)),
            min_refresh_interval: Duration::from_secs(self.min_refresh_interval_secs),
        }
    }

    /// Open the configured session store
    pub fn open_store(&self) -> Result<Arc<dyn KeyValueStore>> {
        Ok(match self.store {
            StoreKind::File => Arc::new(FileStore::new(self.cache_dir()?)),
            StoreKind::Keyring => Arc::new(KeyringStore::new(DEFAULT_SERVICE_NAME)),
        })
    }
}
