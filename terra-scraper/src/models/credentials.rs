//! Portal credentials
//!
//! The password never appears in `Debug` output or log fields.

use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::fmt;

/// Username/password pair for the portal login form
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    pub username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// Both fields present after trimming
    pub fn is_complete(&self) -> bool {
        !self.username.trim().is_empty() && !self.password.is_empty()
    }

    /// Stable cache key for the session cache
    pub fn fingerprint(&self) -> CredentialFingerprint {
        let mut hasher = Sha256::new();
        hasher.update(self.username.trim().as_bytes());
        hasher.update([0u8]);
        hasher.update(self.password.as_bytes());
        CredentialFingerprint(hex::encode(hasher.finalize()))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Hex SHA-256 of a credential pair
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CredentialFingerprint(String);

impl CredentialFingerprint {
    /// Short prefix for log fields
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CredentialFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short())
    }
}
