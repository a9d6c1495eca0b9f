//! Application configuration management.
//!
//! This module handles loading and saving the application configuration:
//! the backend base URL, the token check interval, where the session is
//! persisted, and the last used username.
//!
//! Configuration is stored at `~/.config/scraplook/config.json`. The
//! environment variables `SCRAPLOOK_BACKEND_URL` and
//! `SCRAPLOOK_TOKEN_CHECK_INTERVAL_MS` override the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::auth::{DurableStorage, FileStorage, KeyringStorage, MemoryStorage};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "scraplook";

/// Config file name
const CONFIG_FILE: &str = "config.json";

pub const BACKEND_URL_ENV: &str = "SCRAPLOOK_BACKEND_URL";
pub const TOKEN_CHECK_INTERVAL_ENV: &str = "SCRAPLOOK_TOKEN_CHECK_INTERVAL_MS";

const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";

/// One minute between token checks.
const DEFAULT_TOKEN_CHECK_INTERVAL_MS: u64 = 60_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// `session.json` in the cache directory
    #[default]
    File,
    /// OS keychain
    Keyring,
    /// Nothing persisted
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend_url: String,
    pub token_check_interval_ms: u64,
    pub storage: StorageKind,
    pub last_username: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            token_check_interval_ms: DEFAULT_TOKEN_CHECK_INTERVAL_MS,
            storage: StorageKind::default(),
            last_username: None,
        }
    }
}

impl Config {
    /// Load the config file (or defaults) and apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_file(&Self::config_path()?)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn load_file(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    /// Apply overrides from `lookup`, which maps an environment variable name
    /// to its value.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(BACKEND_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.backend_url = url.trim().to_string();
        }
        if let Some(raw) = lookup(TOKEN_CHECK_INTERVAL_ENV) {
            self.token_check_interval_ms = raw
                .trim()
                .parse()
                .with_context(|| format!("{} must be a number of milliseconds, got {:?}", TOKEN_CHECK_INTERVAL_ENV, raw))?;
        }
        if self.token_check_interval_ms == 0 {
            anyhow::bail!("token check interval must be greater than zero");
        }
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn token_check_interval(&self) -> Duration {
        Duration::from_millis(self.token_check_interval_ms)
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

    /// Open the storage backend the session is persisted in.
    pub fn open_storage(&self) -> Result<Box<dyn DurableStorage>> {
        Ok(match self.storage {
            StorageKind::File => Box::new(FileStorage::new(self.cache_dir()?)),
            StorageKind::Keyring => Box::new(KeyringStorage::new()),
            StorageKind::Memory => Box::new(MemoryStorage::new()),
        })
    }
}
