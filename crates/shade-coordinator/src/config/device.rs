//! Persisted per-device configuration.
//!
//! Stored as JSON, by default at `~/.shade/device.json`. The file is
//! created on first use with a freshly generated device id.

use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to access device config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to encode device config: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Device config is locked, {0} cannot be changed")]
    Locked(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Base URL of the collector.
    #[serde(default)]
    pub api: String,
    #[serde(default)]
    pub id: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub token: String,
    /// Provisioned by an administrator; `api` and `token` are read-only.
    #[serde(default)]
    pub locked: bool,
    /// Username substrings to report. Empty reports every account.
    #[serde(default)]
    pub filters: Vec<String>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            api: String::new(),
            id: String::new(),
            enabled: default_enabled(),
            token: String::new(),
            locked: false,
            filters: Vec::new(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

impl DeviceConfig {
    /// Case-sensitive substring match against the configured filters.
    pub fn accepts_username(&self, username: &str) -> bool {
        self.filters.is_empty()
            || self
                .filters
                .iter()
                .any(|filter| username.contains(filter.as_str()))
    }
}

/// On-disk shape, which may still carry the old `endpoint` key.
#[derive(Deserialize)]
struct StoredConfig {
    #[serde(default)]
    api: Option<String>,
    #[serde(default)]
    endpoint: Option<String>,
    #[serde(default)]
    id: String,
    #[serde(default = "default_enabled")]
    enabled: bool,
    #[serde(default)]
    token: String,
    #[serde(default)]
    locked: bool,
    #[serde(default)]
    filters: Vec<String>,
}

impl StoredConfig {
    /// Returns the config and whether a legacy key was migrated.
    fn into_config(self) -> (DeviceConfig, bool) {
        let migrated = self.api.is_none() && self.endpoint.is_some();
        let api = self.api.or(self.endpoint).unwrap_or_default();
        let config = DeviceConfig {
            api,
            id: self.id,
            enabled: self.enabled,
            token: self.token,
            locked: self.locked,
            filters: self.filters,
        };
        (config, migrated)
    }
}

/// Changes requested through `shade config set`.
#[derive(Debug, Clone, Default)]
pub struct DeviceUpdate {
    pub api: Option<String>,
    pub token: Option<String>,
    pub enabled: Option<bool>,
    pub add_filters: Vec<String>,
    pub clear_filters: bool,
}

impl DeviceUpdate {
    pub fn apply(&self, config: &mut DeviceConfig) -> Result<(), ConfigError> {
        if config.locked {
            if self.api.is_some() {
                return Err(ConfigError::Locked("api"));
            }
            if self.token.is_some() {
                return Err(ConfigError::Locked("token"));
            }
        }

        if let Some(api) = &self.api {
            config.api = api.trim_end_matches('/').to_string();
        }
        if let Some(token) = &self.token {
            config.token = token.clone();
        }
        if let Some(enabled) = self.enabled {
            config.enabled = enabled;
        }
        if self.clear_filters {
            config.filters.clear();
        }
        for filter in &self.add_filters {
            if !filter.is_empty() && !config.filters.contains(filter) {
                config.filters.push(filter.clone());
            }
        }
        Ok(())
    }
}

/// Serialises every read-modify-write of the device config file. Concurrent
/// first-run loads must agree on a single generated id.
///
/// While the file cannot be parsed, the id generated for it is held here so
/// it stays the same for the life of the store.
#[derive(Debug)]
pub struct DeviceStore {
    path: PathBuf,
    fallback_id: Mutex<Option<String>>,
}

impl DeviceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            fallback_id: Mutex::new(None),
        }
    }

    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".shade")
            .join("device.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<DeviceConfig, ConfigError> {
        let mut fallback_id = self.fallback_id.lock().await;
        self.load_locked(&mut fallback_id).await
    }

    pub async fn device_id(&self) -> Result<String, ConfigError> {
        Ok(self.load().await?.id)
    }

    pub async fn save(&self, config: &DeviceConfig) -> Result<(), ConfigError> {
        let _guard = self.fallback_id.lock().await;
        self.save_locked(config).await
    }

    /// Applies `update` to the current config and persists the result.
    pub async fn update(&self, update: &DeviceUpdate) -> Result<DeviceConfig, ConfigError> {
        let mut fallback_id = self.fallback_id.lock().await;
        let mut config = self.load_locked(&mut fallback_id).await?;
        update.apply(&mut config)?;
        self.save_locked(&config).await?;
        Ok(config)
    }

    async fn load_locked(
        &self,
        fallback_id: &mut Option<String>,
    ) -> Result<DeviceConfig, ConfigError> {
        let (mut config, mut dirty) = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => match serde_json::from_str::<StoredConfig>(&content) {
                Ok(stored) => {
                    let (config, migrated) = stored.into_config();
                    if migrated {
                        info!(path = %self.path.display(), "migrating legacy endpoint key");
                    }
                    (config, migrated)
                }
                Err(e) => {
                    // Not rewritten.
                    warn!(
                        path = %self.path.display(),
                        error = %e,
                        "malformed device config, using defaults"
                    );
                    let id = fallback_id.get_or_insert_with(new_device_id).clone();
                    return Ok(DeviceConfig {
                        id,
                        ..DeviceConfig::default()
                    });
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %self.path.display(), "creating device config");
                (DeviceConfig::default(), true)
            }
            Err(e) => return Err(e.into()),
        };

        if config.id.is_empty() {
            config.id = fallback_id.take().unwrap_or_else(new_device_id);
            debug!(device_id = %config.id, "generated device id");
            dirty = true;
        }

        if dirty {
            self.save_locked(&config).await?;
        }
        Ok(config)
    }

    async fn save_locked(&self, config: &DeviceConfig) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(config)?;
        tokio::fs::write(&self.path, content).await?;
        Ok(())
    }
}

fn new_device_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
