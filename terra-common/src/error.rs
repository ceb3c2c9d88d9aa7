//! Error type shared by the TerraMiner crates
//!
//! Covers storage, files and configuration. Scrape pipeline failures have
//! their own taxonomy in the scraper crate.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[cfg(feature = "sqlx")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// SQLite stayed locked longer than the configured wait
    #[error("database locked: {operation} gave up after {attempts} attempts ({waited_ms}ms)")]
    LockTimeout {
        operation: String,
        attempts: u32,
        waited_ms: u64,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON column encode/decode failure
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored row that no longer decodes into its model
    #[error("corrupt {table} row: {message}")]
    CorruptRow { table: &'static str, message: String },

    #[error("configuration error: {0}")]
    Config(String),

    /// Rejected request input; surfaces as HTTP 400
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    pub fn corrupt(table: &'static str, message: impl Into<String>) -> Self {
        Error::CorruptRow {
            table,
            message: message.into(),
        }
    }
}
