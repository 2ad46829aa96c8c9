use crate::page::lock;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Last dispatch time for one (origin, account) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebounceRecord {
    pub origin: String,
    pub username: String,
    pub last_sent_at: Instant,
}

/// Suppresses a second dispatch for the same (origin, account) inside the
/// window. Records expire passively by age. Clones share the same records.
#[derive(Debug, Clone)]
pub struct DebounceGuard {
    window: Duration,
    records: Arc<Mutex<HashMap<(String, String), Instant>>>,
}

impl DebounceGuard {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            records: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn is_suppressed(&self, origin: &str, username: &str) -> bool {
        let now = Instant::now();
        let mut records = lock(&self.records);
        records.retain(|_, sent| now.duration_since(*sent) < self.window);
        records.contains_key(&(origin.to_string(), username.to_string()))
    }

    /// Records a dispatch unless one is already inside the window. The check
    /// and the insert happen under one lock, so only one caller wins.
    pub fn try_claim(&self, origin: &str, username: &str) -> bool {
        let now = Instant::now();
        let mut records = lock(&self.records);
        records.retain(|_, sent| now.duration_since(*sent) < self.window);
        let key = (origin.to_string(), username.to_string());
        if records.contains_key(&key) {
            return false;
        }
        records.insert(key, now);
        true
    }

    pub fn record(&self, origin: &str, username: &str) -> DebounceRecord {
        let now = Instant::now();
        lock(&self.records).insert((origin.to_string(), username.to_string()), now);
        DebounceRecord {
            origin: origin.to_string(),
            username: username.to_string(),
            last_sent_at: now,
        }
    }

    pub fn get(&self, origin: &str, username: &str) -> Option<DebounceRecord> {
        let records = lock(&self.records);
        let sent = records.get(&(origin.to_string(), username.to_string()))?;
        Some(DebounceRecord {
            origin: origin.to_string(),
            username: username.to_string(),
            last_sent_at: *sent,
        })
    }
}
