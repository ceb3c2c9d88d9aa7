//! Database access for terra-scraper
//!
//! Schema creation lives in `terra_common::db`; this module holds the
//! scraper's queries against it.

pub mod jobs;
pub mod records;
pub mod settings;

use sqlx::SqlitePool;
use std::path::Path;
use terra_common::Result;

/// Open (creating if needed) the scraper database and its tables
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    tracing::debug!(path = %db_path.display(), "Opening scraper database");
    terra_common::db::init_database(db_path).await
}
