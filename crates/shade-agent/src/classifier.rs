//! Field-role heuristics.
//!
//! [`classify`] is a pure function over a [`FieldDescriptor`] snapshot, so
//! it can be exercised without a live page.

use shade_common::MfaKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputRole {
    Username,
    Password,
    MfaCode,
    Unclassified,
}

impl InputRole {
    /// MFA category recorded for this role, if any. Every code field is
    /// treated as TOTP.
    pub fn mfa_kind(&self) -> Option<MfaKind> {
        match self {
            InputRole::MfaCode => Some(MfaKind::Totp),
            _ => None,
        }
    }
}

/// Attributes of a form control, captured once and never mutated.
/// Absent attributes are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub control_type: String,
    pub name: String,
    pub id: String,
    pub placeholder: String,
    pub class_name: String,
    pub max_length: Option<u32>,
    pub autocomplete: String,
    pub input_mode: String,
}

const USERNAME_KEYWORDS: &[&str] = &[
    "user",
    "username",
    "email",
    "login",
    "account",
    "id",
    "identifier",
];

const MFA_KEYWORDS: &[&str] = &[
    "totp",
    "mfa",
    "otp",
    "code",
    "token",
    "verification",
    "verify",
    "authenticator",
    "auth",
    "2fa",
    "twofactor",
    "security",
    "sms",
    "multifactor",
];

pub fn classify(field: &FieldDescriptor) -> InputRole {
    let control = field.control_type.to_ascii_lowercase();

    match control.as_str() {
        "password" => return InputRole::Password,
        "email" => return InputRole::Username,
        _ => {}
    }

    let identity = [&field.name, &field.id, &field.placeholder];

    if is_textual(&control)
        && identity
            .iter()
            .any(|attr| matches_keyword(attr, USERNAME_KEYWORDS))
    {
        return InputRole::Username;
    }

    if accepts_code(&control) {
        let by_keyword = identity
            .iter()
            .chain(std::iter::once(&&field.class_name))
            .any(|attr| matches_keyword(attr, MFA_KEYWORDS));
        if by_keyword || has_code_shape(field) {
            return InputRole::MfaCode;
        }
    }

    InputRole::Unclassified
}

/// A missing `type` attribute behaves as `text`.
fn is_textual(control: &str) -> bool {
    matches!(control, "" | "text" | "search")
}

fn accepts_code(control: &str) -> bool {
    matches!(control, "" | "text" | "number" | "tel")
}

fn has_code_shape(field: &FieldDescriptor) -> bool {
    matches!(field.max_length, Some(4..=8))
        || field.autocomplete.eq_ignore_ascii_case("one-time-code")
        || field.input_mode.eq_ignore_ascii_case("numeric")
}

/// Case-insensitive substring match. The two-letter keyword `id` only
/// matches as a whole token, otherwise it would hit "hidden", "valid", ...
fn matches_keyword(attr: &str, keywords: &[&str]) -> bool {
    if attr.is_empty() {
        return false;
    }
    let attr = attr.to_lowercase();
    keywords.iter().any(|kw| {
        if *kw == "id" {
            attr.split(|c: char| !c.is_alphanumeric()).any(|t| t == "id")
        } else {
            attr.contains(kw)
        }
    })
}
