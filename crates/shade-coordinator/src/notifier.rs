use tracing::warn;

/// Local, user-facing alerts raised by the coordinator.
pub trait Notifier: Send + Sync {
    /// The password just used on `origin` appears in known breaches.
    fn breached_password(&self, origin: &str, username: &str, breach_count: u64);
}

/// Writes alerts to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn breached_password(&self, origin: &str, username: &str, breach_count: u64) {
        warn!(
            origin,
            username,
            breach_count,
            "the password used on {} has appeared in {} known data breaches, change it",
            origin,
            breach_count
        );
    }
}
