use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// How long to wait for a second factor after submit.
    #[serde(default = "default_mfa_wait_ms")]
    pub mfa_wait_ms: u64,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default)]
    pub outcome: OutcomeConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            mfa_wait_ms: default_mfa_wait_ms(),
            debounce_ms: default_debounce_ms(),
            outcome: OutcomeConfig::default(),
        }
    }
}

impl AgentConfig {
    pub fn mfa_wait(&self) -> Duration {
        Duration::from_millis(self.mfa_wait_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

fn default_mfa_wait_ms() -> u64 {
    8000
}

fn default_debounce_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeConfig {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_ceiling_ms")]
    pub ceiling_ms: u64,
}

impl Default for OutcomeConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            ceiling_ms: default_ceiling_ms(),
        }
    }
}

impl OutcomeConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn ceiling(&self) -> Duration {
        Duration::from_millis(self.ceiling_ms)
    }
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_ceiling_ms() -> u64 {
    5000
}
