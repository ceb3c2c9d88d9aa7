//! Portal sessions
//!
//! A [`Session`] is the cookie set from one successful login plus its
//! validity window. Sessions are owned by the [`SessionManager`] and handed to
//! jobs as an exclusive [`SessionLease`].

pub mod manager;
pub mod tokens;

pub use manager::{SessionLease, SessionManager};
pub use tokens::SessionTokens;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::CredentialFingerprint;

/// One authenticated portal session
#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: Uuid,
    pub fingerprint: CredentialFingerprint,
    pub username: String,
    pub tokens: SessionTokens,
    pub established_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn new(
        fingerprint: CredentialFingerprint,
        username: impl Into<String>,
        tokens: SessionTokens,
        ttl: chrono::Duration,
    ) -> Self {
        let established_at = Utc::now();
        Self {
            session_id: Uuid::new_v4(),
            fingerprint,
            username: username.into(),
            tokens,
            established_at,
            expires_at: established_at + ttl,
        }
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }
}
