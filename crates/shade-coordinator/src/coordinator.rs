//! Turns agent reports into collector submissions.
//!
//! The plaintext password arrives with [`LoginDetected`] and is reduced to
//! digests before anything else happens to it.

use crate::breach::{BreachChecker, BreachError};
use crate::collector::{CollectorClient, CollectorError, RegisterRequest};
use crate::config::{ConfigError, CoordinatorSettings, DeviceStore};
use crate::hashing::{breach_digest, log_prefix, password_digest};
use crate::notifier::{LogNotifier, Notifier};
use crate::transport::check_endpoint;
use shade_common::{AgentRequest, AgentResponse, LoginDetected, VerifiedEvent};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Collector(#[from] CollectorError),
    #[error(transparent)]
    Breach(#[from] BreachError),
}

/// What happened to one reported login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// Reporting is switched off for this device.
    Disabled,
    /// The username matched none of the configured filters.
    Filtered,
    /// No collector address configured.
    NotConfigured,
    /// The collector address failed the transport policy.
    Refused,
    Failed(String),
}

pub struct Coordinator {
    store: Arc<DeviceStore>,
    collector: CollectorClient,
    breach: Arc<BreachChecker>,
    notifier: Arc<dyn Notifier>,
}

impl Coordinator {
    pub fn new(
        store: Arc<DeviceStore>,
        collector: CollectorClient,
        breach: Arc<BreachChecker>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            collector,
            breach,
            notifier,
        }
    }

    pub fn from_settings(settings: &CoordinatorSettings) -> Result<Self, CoordinatorError> {
        Ok(Self::new(
            Arc::new(DeviceStore::new(settings.device_config_path())),
            CollectorClient::new(&settings.collector)?,
            Arc::new(BreachChecker::new(&settings.breach)?),
            Arc::new(LogNotifier),
        ))
    }

    pub fn store(&self) -> &DeviceStore {
        &self.store
    }

    pub fn breach(&self) -> &Arc<BreachChecker> {
        &self.breach
    }

    pub async fn handle(&self, request: AgentRequest) -> AgentResponse {
        match request {
            AgentRequest::LoginDetected(login) => match self.report_login(login).await {
                Delivery::Refused => {
                    AgentResponse::failed("collector endpoint refused by transport policy")
                }
                Delivery::Failed(error) => AgentResponse::failed(error),
                _ => AgentResponse::ok(),
            },
            AgentRequest::GetDeviceId => match self.store.device_id().await {
                Ok(device_id) => AgentResponse::DeviceId { device_id },
                Err(e) => {
                    warn!(error = %e, "failed to read device id");
                    AgentResponse::failed(e.to_string())
                }
            },
        }
    }

    pub async fn report_login(&self, login: LoginDetected) -> Delivery {
        let config = match self.store.load().await {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "failed to load device config, dropping login");
                return Delivery::Failed(e.to_string());
            }
        };

        if !config.enabled {
            debug!("reporting disabled, dropping login");
            return Delivery::Disabled;
        }
        if !config.accepts_username(&login.username) {
            debug!("username outside configured filters, dropping login");
            return Delivery::Filtered;
        }

        let LoginDetected {
            origin,
            username,
            password,
            mfa_present,
            mfa_type,
            captured_at,
        } = login;
        let event = VerifiedEvent {
            origin: normalize_origin(&origin),
            username,
            password_hash: password_digest(&password),
            mfa_present,
            mfa_type,
            captured_at,
        };
        let breach_hash = breach_digest(&password);
        drop(password);

        self.spawn_breach_check(&event, breach_hash);

        if config.api.is_empty() {
            warn!(origin = %event.origin, "no collector configured, dropping login");
            return Delivery::NotConfigured;
        }
        let api = match check_endpoint(&config.api) {
            Ok(api) => api,
            Err(e) => {
                warn!(origin = %event.origin, error = %e, "not sending login");
                return Delivery::Refused;
            }
        };

        self.send(&api, &config.token, &config.id, &event).await
    }

    async fn send(&self, api: &Url, token: &str, device_id: &str, event: &VerifiedEvent) -> Delivery {
        let request = RegisterRequest {
            domain: event.origin.clone(),
            username: event.username.clone(),
            hash: event.password_hash.clone(),
            device_id: device_id.to_string(),
            captured_time: event.captured_at,
            has_mfa: event.mfa_present,
            mfa_type: event
                .mfa_type
                .map(|kind| kind.as_str().to_string())
                .unwrap_or_default(),
        };

        match self.collector.register(api, token, &request).await {
            Ok(_) => {
                info!(
                    origin = %event.origin,
                    hash = log_prefix(&event.password_hash),
                    mfa_present = event.mfa_present,
                    "login registered with collector"
                );
                Delivery::Sent
            }
            Err(e) => {
                warn!(origin = %event.origin, error = %e, "collector rejected login");
                Delivery::Failed(e.to_string())
            }
        }
    }

    fn spawn_breach_check(&self, event: &VerifiedEvent, hash: String) {
        let breach = self.breach.clone();
        let notifier = self.notifier.clone();
        let origin = event.origin.clone();
        let username = event.username.clone();
        tokio::spawn(async move {
            check_breach(&breach, notifier.as_ref(), &origin, &username, &hash).await;
        });
    }
}

/// Looks `hash` up and alerts on a hit. Failures are logged and dropped.
pub async fn check_breach(
    breach: &BreachChecker,
    notifier: &dyn Notifier,
    origin: &str,
    username: &str,
    hash: &str,
) {
    match breach.check_hash_detailed(hash).await {
        Ok(check) if check.is_breached() => {
            notifier.breached_password(origin, username, check.count)
        }
        Ok(check) => debug!(
            origin,
            from_cache = check.from_cache,
            "password not found in breach corpus"
        ),
        Err(e) => debug!(origin, error = %e, "breach check failed"),
    }
}

/// Lowercase host of `origin`, or the lowercased input when it is not a URL.
pub fn normalize_origin(origin: &str) -> String {
    Url::parse(origin)
        .ok()
        .and_then(|url| url.host_str().map(str::to_ascii_lowercase))
        .unwrap_or_else(|| origin.trim().to_ascii_lowercase())
}
