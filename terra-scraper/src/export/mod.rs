//! Export sinks
//!
//! Each enabled target receives the whole record set of a job and either
//! stores all of it or none of it:
//! - CSV: one file per record kind, written to temp files then renamed
//! - Database: one transaction over `scraped_records`
//!
//! A target failure is reported back to the caller, which decides whether
//! it is a warning (another target succeeded) or a job error.

pub mod csv;
pub mod database;

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::error::ScrapeError;
use crate::models::ExtractionRecord;

/// Export target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    Csv,
    Database,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Database => "database",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something an export wrote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportArtifact {
    pub format: ExportFormat,
    /// File path for CSV, table name for the database
    pub location: String,
    pub rows: usize,
}

/// Outcome of exporting one job to every enabled target
#[derive(Debug, Default)]
pub struct ExportHandle {
    pub artifacts: Vec<ExportArtifact>,
    pub failures: Vec<ScrapeError>,
    /// Targets attempted
    pub attempted: usize,
}

impl ExportHandle {
    /// Every attempted target failed
    pub fn all_failed(&self) -> bool {
        self.attempted > 0 && self.failures.len() == self.attempted
    }
}

/// Writes job records to the configured targets
#[derive(Clone)]
pub struct Exporter {
    export_dir: PathBuf,
    db: Option<SqlitePool>,
    formats: Vec<ExportFormat>,
}

impl Exporter {
    /// CSV into `export_dir`, plus the database when a pool is given
    pub fn new(export_dir: impl Into<PathBuf>, db: Option<SqlitePool>) -> Self {
        let mut formats = vec![ExportFormat::Csv];
        if db.is_some() {
            formats.push(ExportFormat::Database);
        }
        Self {
            export_dir: export_dir.into(),
            db,
            formats,
        }
    }

    /// Restrict to the given targets
    pub fn with_formats(mut self, formats: impl IntoIterator<Item = ExportFormat>) -> Self {
        self.formats = formats.into_iter().collect();
        self
    }

    pub fn formats(&self) -> &[ExportFormat] {
        &self.formats
    }

    pub fn export_dir(&self) -> &std::path::Path {
        &self.export_dir
    }

    /// Export to a single target
    pub async fn export(
        &self,
        job_id: Uuid,
        records: &[ExtractionRecord],
        format: ExportFormat,
    ) -> Result<Vec<ExportArtifact>, ScrapeError> {
        match format {
            ExportFormat::Csv => csv::write_job_csv(&self.export_dir, job_id, records).await,
            ExportFormat::Database => match &self.db {
                Some(pool) => database::persist_records(pool, job_id, records).await,
                None => Err(ScrapeError::Export {
                    target: format.to_string(),
                    message: "no database configured".to_string(),
                }),
            },
        }
    }

    /// Export to every enabled target; one failing target does not stop the others
    pub async fn export_all(&self, job_id: Uuid, records: &[ExtractionRecord]) -> ExportHandle {
        let mut handle = ExportHandle::default();
        for format in &self.formats {
            handle.attempted += 1;
            match self.export(job_id, records, *format).await {
                Ok(mut artifacts) => {
                    tracing::info!(
                        job_id = %job_id,
                        target = %format,
                        artifacts = artifacts.len(),
                        "Export complete"
                    );
                    handle.artifacts.append(&mut artifacts);
                }
                Err(e) => {
                    tracing::warn!(job_id = %job_id, target = %format, error = %e, "Export failed");
                    handle.failures.push(e);
                }
            }
        }
        handle
    }
}
