//! HTTP client for the backend collector.

use crate::config::CollectorSettings;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("collector request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("collector returned {0}")]
    Status(StatusCode),
}

/// Body of the register call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisterRequest {
    pub domain: String,
    pub username: String,
    pub hash: String,
    pub device_id: String,
    pub captured_time: DateTime<Utc>,
    #[serde(rename = "hasMFA")]
    pub has_mfa: bool,
    /// Empty when no second factor was seen.
    #[serde(rename = "mfaType")]
    pub mfa_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RegisterResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub hibp: Option<BreachSummary>,
}

/// The collector's own breach lookup for the submitted hash.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BreachSummary {
    #[serde(default)]
    pub checked: bool,
    #[serde(default)]
    pub breached: bool,
    #[serde(default)]
    pub breach_count: u64,
}

pub struct CollectorClient {
    http: reqwest::Client,
    register_path: String,
    health_path: String,
}

impl CollectorClient {
    pub fn new(settings: &CollectorSettings) -> Result<Self, CollectorError> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout())
            .build()?;
        Ok(Self {
            http,
            register_path: settings.register_path.clone(),
            health_path: settings.health_path.clone(),
        })
    }

    /// Submits one login. Any 2xx counts as accepted; the response body is
    /// informational and may be missing.
    pub async fn register(
        &self,
        api: &Url,
        token: &str,
        request: &RegisterRequest,
    ) -> Result<Option<RegisterResponse>, CollectorError> {
        let builder = self
            .http
            .post(endpoint(api, &self.register_path))
            .json(request);
        let response = with_token(builder, token).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CollectorError::Status(status));
        }

        let body = response.json::<RegisterResponse>().await.ok();
        debug!(%status, ?body, "collector accepted login");
        Ok(body)
    }

    /// `Ok(false)` when the collector rejects the token outright.
    pub async fn verify_token(&self, api: &Url, token: &str) -> Result<bool, CollectorError> {
        let builder = self.http.get(endpoint(api, &self.health_path));
        let response = with_token(builder, token).send().await?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::UNAUTHORIZED => Ok(false),
            status => Err(CollectorError::Status(status)),
        }
    }
}

fn with_token(builder: reqwest::RequestBuilder, token: &str) -> reqwest::RequestBuilder {
    if token.is_empty() {
        builder
    } else {
        builder.bearer_auth(token)
    }
}

/// Appends `path` to the base URL, keeping any base path.
fn endpoint(api: &Url, path: &str) -> String {
    format!(
        "{}/{}",
        api.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
