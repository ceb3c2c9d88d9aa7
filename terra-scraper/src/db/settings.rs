//! Settings database operations
//!
//! Key/value accessors over the `settings` table, including the saved portal
//! credentials written when a form is submitted with "save credentials".

use sqlx::{Pool, Sqlite};
use terra_common::{Error, Result};

use crate::models::Credentials;

const USERNAME_KEY: &str = "portal_username";
const PASSWORD_KEY: &str = "portal_password";
const MAX_LOCK_WAIT_KEY: &str = "database_max_lock_wait_ms";

/// Saved portal credentials, if both halves are stored
pub async fn get_saved_credentials(db: &Pool<Sqlite>) -> Result<Option<Credentials>> {
    let username = get_setting::<String>(db, USERNAME_KEY).await?;
    let password = get_setting::<String>(db, PASSWORD_KEY).await?;

    Ok(match (username, password) {
        (Some(user), Some(pass)) => {
            let creds = Credentials::new(user, pass);
            creds.is_complete().then_some(creds)
        }
        _ => None,
    })
}

/// Store portal credentials in one transaction
pub async fn save_credentials(db: &Pool<Sqlite>, credentials: &Credentials) -> Result<()> {
    let mut tx = db.begin().await?;
    for (key, value) in [
        (USERNAME_KEY, credentials.username.trim()),
        (PASSWORD_KEY, credentials.password()),
    ] {
        sqlx::query(
            "INSERT INTO settings (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    tracing::info!(username = %credentials.username.trim(), "Saved portal credentials");
    Ok(())
}

/// How long writers wait on a locked database
///
/// **Default:** 5000 ms
pub async fn get_max_lock_wait_ms(db: &Pool<Sqlite>) -> Result<u64> {
    get_setting(db, MAX_LOCK_WAIT_KEY).await.map(|opt| opt.unwrap_or(5000))
}

/// Generic setting getter
pub async fn get_setting<T>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let row: Option<(Option<String>,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await
        .map_err(Error::Database)?;

    match row.and_then(|(value,)| value) {
        Some(value) => {
            let parsed = value
                .parse::<T>()
                .map_err(|e| Error::Config(format!("Parse setting {} failed: {}", key, e)))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

/// Generic setting setter
pub async fn set_setting<T>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()>
where
    T: std::fmt::Display,
{
    sqlx::query(
        "INSERT INTO settings (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await
    .map_err(Error::Database)?;

    Ok(())
}
