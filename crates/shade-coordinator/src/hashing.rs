//! Password digests. The collector gets SHA-512, the breach range query
//! gets a SHA-1 prefix.

use secrecy::{ExposeSecret, SecretString};
use sha1::Sha1;
use sha2::{Digest, Sha512};

/// Lowercase hex SHA-512 of the password, as stored by the collector.
pub fn password_digest(password: &SecretString) -> String {
    format!("{:x}", Sha512::digest(password.expose_secret().as_bytes()))
}

/// Uppercase hex SHA-1 of the password, as indexed by the breach corpus.
pub fn breach_digest(password: &SecretString) -> String {
    format!("{:X}", Sha1::digest(password.expose_secret().as_bytes()))
}

/// Leading characters of a digest, safe to log.
pub fn log_prefix(hash: &str) -> &str {
    hash.get(..5).unwrap_or(hash)
}
