//! Local coordinator process: receives logins from page agents over a
//! loopback WebSocket, hashes the credential, forwards it to the backend
//! collector and checks it against a breached-password corpus.

pub mod breach;
pub mod collector;
pub mod config;
pub mod coordinator;
pub mod hashing;
pub mod notifier;
pub mod server;
pub mod transport;

pub use breach::{BreachCheck, BreachChecker, BreachError};
pub use collector::{CollectorClient, CollectorError};
pub use config::{ConfigError, CoordinatorSettings, DeviceConfig, DeviceStore, SettingsLoader};
pub use coordinator::{Coordinator, CoordinatorError, Delivery};
pub use notifier::{LogNotifier, Notifier};
pub use server::{CoordinatorServer, ServerError, ServerHandle};
pub use transport::TransportError;
