//! Messages exchanged between the page agent and the local coordinator.
//!
//! Every request is a JSON object tagged by `type`, with the payload (if
//! any) under `data`. Responses are untagged and distinguished by shape.

use crate::event::MfaKind;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentRequest {
    LoginDetected(LoginDetected),
    GetDeviceId,
}

/// A successful login as seen by the agent. The password travels only over
/// the loopback hop to the coordinator, which hashes it on arrival.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginDetected {
    pub origin: String,
    pub username: String,
    #[serde(
        serialize_with = "serialize_secret",
        deserialize_with = "deserialize_secret"
    )]
    pub password: SecretString,
    #[serde(default)]
    pub mfa_present: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mfa_type: Option<MfaKind>,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AgentResponse {
    DeviceId {
        #[serde(rename = "deviceId")]
        device_id: String,
    },
    Ack {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl AgentResponse {
    pub fn ok() -> Self {
        AgentResponse::Ack {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        AgentResponse::Ack {
            success: false,
            error: Some(error.into()),
        }
    }
}

fn serialize_secret<S>(secret: &SecretString, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(secret.expose_secret())
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}
