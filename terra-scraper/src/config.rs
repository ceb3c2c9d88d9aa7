//! Credential resolution for terra-scraper
//!
//! Provides multi-tier resolution with Form → ENV → Database priority.

use sqlx::{Pool, Sqlite};
use std::fmt;
use terra_common::{Error, Result};
use tracing::{info, warn};

use crate::models::Credentials;

pub const USERNAME_ENV: &str = "NARRPR_USERNAME";
pub const PASSWORD_ENV: &str = "NARRPR_PASSWORD";

/// Where the credentials for a job came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Form,
    Environment,
    Database,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CredentialSource::Form => "form",
            CredentialSource::Environment => "environment",
            CredentialSource::Database => "database",
        })
    }
}

/// Credentials from `NARRPR_USERNAME` / `NARRPR_PASSWORD`, if both are set
pub fn credentials_from_env() -> Option<Credentials> {
    let username = std::env::var(USERNAME_ENV).ok()?;
    let password = std::env::var(PASSWORD_ENV).ok()?;
    let creds = Credentials::new(username.trim(), password);
    creds.is_complete().then_some(creds)
}

/// Resolve portal credentials for a job
///
/// **Priority:** Form → ENV → Database (saved credentials)
///
/// Logs a warning when more than one source is present.
pub async fn resolve_credentials(
    db: Option<&Pool<Sqlite>>,
    form: Option<Credentials>,
) -> Result<(Credentials, CredentialSource)> {
    let env = credentials_from_env();
    let saved = match db {
        Some(db) => crate::db::settings::get_saved_credentials(db).await?,
        None => None,
    };

    let candidates = [
        (form, CredentialSource::Form),
        (env, CredentialSource::Environment),
        (saved, CredentialSource::Database),
    ];

    let sources: Vec<String> = candidates
        .iter()
        .filter(|(c, _)| c.is_some())
        .map(|(_, s)| s.to_string())
        .collect();
    if sources.len() > 1 {
        warn!(
            "Portal credentials found in multiple sources: {}. Using {} (highest priority).",
            sources.join(", "),
            sources[0]
        );
    }

    match candidates.into_iter().find_map(|(c, s)| c.map(|c| (c, s))) {
        Some((creds, source)) => {
            info!(username = %creds.username, source = %source, "Portal credentials resolved");
            Ok((creds, source))
        }
        None => Err(Error::InvalidInput(format!(
            "Portal credentials not configured. Enter them in the form, set {} and {}, \
             or submit once with save_credentials enabled.",
            USERNAME_ENV, PASSWORD_ENV
        ))),
    }
}
