use crate::classifier::InputRole;
use secrecy::{ExposeSecret, SecretString};

/// Latest value seen per role within one page context.
#[derive(Debug, Default)]
pub struct CaptureBuffer {
    username: Option<String>,
    password: Option<SecretString>,
    mfa_code: Option<SecretString>,
}

impl CaptureBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` for `role`. An empty value clears the slot.
    pub fn record(&mut self, role: InputRole, value: String) {
        let value = Some(value).filter(|v| !v.is_empty());
        match role {
            InputRole::Username => self.username = value,
            InputRole::Password => self.password = value.map(SecretString::from),
            InputRole::MfaCode => self.mfa_code = value.map(SecretString::from),
            InputRole::Unclassified => {}
        }
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }

    pub fn has_mfa_code(&self) -> bool {
        self.mfa_code.is_some()
    }

    /// Username and password, when both have been captured.
    pub fn credentials(&self) -> Option<(String, SecretString)> {
        let username = self.username.clone()?;
        let password = self.password.as_ref()?;
        Some((username, copy_secret(password)))
    }

    pub fn clear(&mut self) {
        self.username = None;
        self.password = None;
        self.mfa_code = None;
    }
}

fn copy_secret(secret: &SecretString) -> SecretString {
    SecretString::from(secret.expose_secret().to_owned())
}
