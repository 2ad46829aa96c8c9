use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse settings file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Service settings for the coordinator process. Per-device state such as
/// the collector address and token lives in [`super::DeviceConfig`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorSettings {
    /// Listen port for agent connections. Always bound on loopback.
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub collector: CollectorSettings,
    #[serde(default)]
    pub breach: BreachSettings,
    /// Defaults to `~/.shade/device.json`.
    #[serde(default)]
    pub device_config: Option<PathBuf>,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            port: default_port(),
            collector: CollectorSettings::default(),
            breach: BreachSettings::default(),
            device_config: None,
        }
    }
}

impl CoordinatorSettings {
    pub fn device_config_path(&self) -> PathBuf {
        self.device_config
            .clone()
            .unwrap_or_else(super::DeviceStore::default_path)
    }
}

fn default_port() -> u16 {
    17845
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorSettings {
    #[serde(default = "default_register_path")]
    pub register_path: String,
    #[serde(default = "default_health_path")]
    pub health_path: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            register_path: default_register_path(),
            health_path: default_health_path(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl CollectorSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_register_path() -> String {
    "/api/creds/register".into()
}

fn default_health_path() -> String {
    "/api/health".into()
}

fn default_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreachSettings {
    #[serde(default = "default_breach_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for BreachSettings {
    fn default() -> Self {
        Self {
            base_url: default_breach_base_url(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
            cache_ttl_secs: default_cache_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl BreachSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

fn default_breach_base_url() -> String {
    "https://api.pwnedpasswords.com".into()
}

fn default_user_agent() -> String {
    "shade-password-monitor".into()
}

fn default_cache_ttl_secs() -> u64 {
    3600
}

fn default_sweep_interval_secs() -> u64 {
    1800
}

/// Settings plus the file they came from, if any.
#[derive(Debug, Clone)]
pub struct LoadedSettings {
    pub settings: CoordinatorSettings,
    pub source: Option<PathBuf>,
}

/// Looks for a settings file along an ordered list of candidates. The first
/// one present wins; none present means built-in defaults.
#[derive(Debug, Clone)]
pub struct SettingsLoader {
    candidates: Vec<PathBuf>,
}

impl Default for SettingsLoader {
    fn default() -> Self {
        Self::new(Self::default_candidates())
    }
}

impl SettingsLoader {
    pub fn new(candidates: Vec<PathBuf>) -> Self {
        Self { candidates }
    }

    /// `./shade.yaml`, then `~/.shade/config.yaml`.
    pub fn default_candidates() -> Vec<PathBuf> {
        let mut candidates = vec![PathBuf::from("./shade.yaml")];
        if let Some(home) = dirs::home_dir() {
            candidates.push(home.join(".shade").join("config.yaml"));
        }
        candidates
    }

    pub fn candidates(&self) -> &[PathBuf] {
        &self.candidates
    }

    pub async fn load(&self) -> Result<LoadedSettings, SettingsError> {
        for path in &self.candidates {
            if path.exists() {
                let settings = Self::load_from(path).await?;
                info!(path = %path.display(), "loaded coordinator settings");
                return Ok(LoadedSettings {
                    settings,
                    source: Some(path.clone()),
                });
            }
        }

        debug!(searched = self.candidates.len(), "no settings file, using defaults");
        Ok(LoadedSettings {
            settings: CoordinatorSettings::default(),
            source: None,
        })
    }

    pub async fn load_from(path: &Path) -> Result<CoordinatorSettings, SettingsError> {
        let content = tokio::fs::read_to_string(path).await?;
        let settings: CoordinatorSettings = serde_yaml::from_str(&content)?;
        Ok(settings)
    }
}
