use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of second factor seen during a login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MfaKind {
    #[serde(rename = "TOTP")]
    Totp,
}

impl MfaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MfaKind::Totp => "TOTP",
        }
    }
}

impl fmt::Display for MfaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A login that was judged successful, with the credential already reduced
/// to its digest. Nothing downstream of this type ever sees the plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedEvent {
    pub origin: String,
    pub username: String,
    pub password_hash: String,
    pub mfa_present: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mfa_type: Option<MfaKind>,
    pub captured_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mfa_kind_uses_upper_case_wire_name() {
        assert_eq!(serde_json::to_string(&MfaKind::Totp).unwrap(), "\"TOTP\"");
        assert_eq!(MfaKind::Totp.to_string(), "TOTP");
    }

    #[test]
    fn verified_event_omits_missing_mfa_type() {
        let event = VerifiedEvent {
            origin: "example.com".into(),
            username: "alice".into(),
            password_hash: "00".into(),
            mfa_present: false,
            mfa_type: None,
            captured_at: Utc::now(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["passwordHash"], "00");
        assert_eq!(value["mfaPresent"], false);
        assert!(value.get("mfaType").is_none());
    }
}
