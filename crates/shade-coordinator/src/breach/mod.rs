//! Breached-password lookups against a k-anonymity range service, with a
//! TTL cache in front.

pub mod cache;
pub mod client;

pub use cache::{BreachCache, CacheStats, Clock, ManualClock, SystemClock, spawn_sweeper};
pub use client::RangeClient;

use crate::config::BreachSettings;
use crate::hashing::{breach_digest, log_prefix};
use reqwest::StatusCode;
use secrecy::SecretString;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Error)]
pub enum BreachError {
    #[error("breach service request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("breach service returned {0}")]
    Status(StatusCode),
    #[error("invalid SHA-1 hash: {0}")]
    InvalidHash(String),
    #[error("malformed breach count in {0:?}")]
    MalformedCount(String),
}

/// Result of one lookup, noting whether the service was contacted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreachCheck {
    pub count: u64,
    pub from_cache: bool,
}

impl BreachCheck {
    pub fn is_breached(&self) -> bool {
        self.count > 0
    }
}

pub struct BreachChecker {
    client: RangeClient,
    cache: Arc<BreachCache>,
    sweep_interval: std::time::Duration,
}

impl BreachChecker {
    pub fn new(settings: &BreachSettings) -> Result<Self, BreachError> {
        Self::with_clock(settings, Arc::new(SystemClock))
    }

    pub fn with_clock(settings: &BreachSettings, clock: Arc<dyn Clock>) -> Result<Self, BreachError> {
        Ok(Self {
            client: RangeClient::new(settings)?,
            cache: Arc::new(BreachCache::with_clock(settings.cache_ttl(), clock)),
            sweep_interval: settings.sweep_interval(),
        })
    }

    /// Breach count for a 40-character SHA-1 hex digest, either case.
    /// Lookup failures are returned and never cached.
    pub async fn check_hash(&self, hash: &str) -> Result<u64, BreachError> {
        Ok(self.check_hash_detailed(hash).await?.count)
    }

    pub async fn check_hash_detailed(&self, hash: &str) -> Result<BreachCheck, BreachError> {
        let hash = normalize_hash(hash)?;

        if let Some(count) = self.cache.get(&hash) {
            return Ok(BreachCheck {
                count,
                from_cache: true,
            });
        }

        let count = self.client.breach_count(&hash).await?;
        self.cache.insert(&hash, count);
        Ok(BreachCheck {
            count,
            from_cache: false,
        })
    }

    /// Looks up each hash in turn. One failure does not stop the rest.
    pub async fn check_hashes(&self, hashes: &[String]) -> Vec<Result<BreachCheck, BreachError>> {
        let mut results = Vec::with_capacity(hashes.len());
        for hash in hashes {
            let result = self.check_hash_detailed(hash).await;
            if let Err(e) = &result {
                debug!(prefix = log_prefix(hash), error = %e, "breach lookup failed in batch");
            }
            results.push(result);
        }
        results
    }

    pub async fn check_password(&self, password: &SecretString) -> Result<u64, BreachError> {
        self.check_hash(&breach_digest(password)).await
    }

    pub fn cache(&self) -> &Arc<BreachCache> {
        &self.cache
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    pub fn spawn_sweeper(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        spawn_sweeper(self.cache.clone(), self.sweep_interval, shutdown)
    }
}

fn normalize_hash(hash: &str) -> Result<String, BreachError> {
    let hash = hash.trim();
    if hash.len() != 40 || !hash.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(BreachError::InvalidHash(hash.to_string()));
    }
    Ok(hash.to_ascii_uppercase())
}
