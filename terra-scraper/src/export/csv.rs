//! CSV export
//!
//! Files are named `<job_id>_<section>.csv`. Columns are `source_id`,
//! `extracted_at`, then every field name seen for that kind, sorted.
//! `Unknown` values are empty cells.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use uuid::Uuid;

use super::{ExportArtifact, ExportFormat};
use crate::error::ScrapeError;
use crate::models::{ExtractionRecord, RecordKind};

/// Write one CSV per record kind present in `records`
///
/// All files are written to temp files in `export_dir` first and only renamed
/// into place once every file was written. If a rename fails, files already
/// renamed by this call are removed again.
pub async fn write_job_csv(
    export_dir: &Path,
    job_id: Uuid,
    records: &[ExtractionRecord],
) -> Result<Vec<ExportArtifact>, ScrapeError> {
    if records.is_empty() {
        return Ok(Vec::new());
    }

    let export_dir = export_dir.to_path_buf();
    let records = records.to_vec();
    tokio::task::spawn_blocking(move || write_blocking(&export_dir, job_id, &records))
        .await
        .map_err(|e| export_error(format!("CSV writer task failed: {}", e)))?
}

/// Path a kind's file is written to
pub fn csv_path(export_dir: &Path, job_id: Uuid, kind: RecordKind) -> PathBuf {
    export_dir.join(format!("{}_{}.csv", job_id, kind.section().as_str()))
}

fn write_blocking(
    export_dir: &Path,
    job_id: Uuid,
    records: &[ExtractionRecord],
) -> Result<Vec<ExportArtifact>, ScrapeError> {
    std::fs::create_dir_all(export_dir)
        .map_err(|e| export_error(format!("create {}: {}", export_dir.display(), e)))?;

    let mut by_kind: BTreeMap<RecordKind, Vec<&ExtractionRecord>> = BTreeMap::new();
    for record in records {
        by_kind.entry(record.kind).or_default().push(record);
    }

    let mut staged = Vec::with_capacity(by_kind.len());
    for (kind, rows) in &by_kind {
        let tmp = write_temp(export_dir, rows)?;
        staged.push((tmp, csv_path(export_dir, job_id, *kind), rows.len()));
    }

    let mut artifacts: Vec<ExportArtifact> = Vec::with_capacity(staged.len());
    for (tmp, path, rows) in staged {
        if let Err(e) = tmp.persist(&path) {
            // Remaining temp files are dropped (and deleted) with `staged`
            for landed in &artifacts {
                if let Err(remove_err) = std::fs::remove_file(&landed.location) {
                    tracing::warn!(
                        path = %landed.location,
                        error = %remove_err,
                        "Failed to roll back CSV file"
                    );
                }
            }
            return Err(export_error(format!(
                "rename to {}: {}",
                path.display(),
                e.error
            )));
        }
        artifacts.push(ExportArtifact {
            format: ExportFormat::Csv,
            location: path.display().to_string(),
            rows,
        });
    }
    Ok(artifacts)
}

fn write_temp(export_dir: &Path, rows: &[&ExtractionRecord]) -> Result<NamedTempFile, ScrapeError> {
    let columns: BTreeSet<&str> = rows
        .iter()
        .flat_map(|r| r.fields.keys().map(String::as_str))
        .collect();

    let mut tmp = NamedTempFile::new_in(export_dir)
        .map_err(|e| export_error(format!("create temp file: {}", e)))?;
    {
        let mut writer = ::csv::Writer::from_writer(tmp.as_file_mut());

        let mut header = vec!["source_id", "extracted_at"];
        header.extend(columns.iter().copied());
        writer
            .write_record(&header)
            .map_err(|e| export_error(e.to_string()))?;

        for record in rows {
            let mut line = vec![record.source_id.clone(), record.extracted_at.to_rfc3339()];
            line.extend(
                columns
                    .iter()
                    .map(|c| record.field(c).map(|v| v.to_cell()).unwrap_or_default()),
            );
            writer
                .write_record(&line)
                .map_err(|e| export_error(e.to_string()))?;
        }
        writer.flush().map_err(|e| export_error(e.to_string()))?;
    }
    tmp.as_file_mut()
        .sync_all()
        .map_err(|e| export_error(e.to_string()))?;
    Ok(tmp)
}

fn export_error(message: String) -> ScrapeError {
    ScrapeError::Export {
        target: ExportFormat::Csv.to_string(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FieldValue;

    fn records() -> Vec<ExtractionRecord> {
        vec![
            ExtractionRecord::new(RecordKind::Property, "123456")
                .with_field("beds", FieldValue::Integer(3))
                .with_field("address", FieldValue::Text("1 Main St, Apt 2".into()))
                .with_field("year_built", FieldValue::Unknown),
            ExtractionRecord::new(RecordKind::Valuation, "123456")
                .with_field("estimated_value", FieldValue::Integer(410_000)),
        ]
    }

    #[tokio::test]
    async fn test_one_file_per_kind() {
        let dir = tempfile::tempdir().unwrap();
        let job_id = Uuid::new_v4();

        let artifacts = write_job_csv(dir.path(), job_id, &records()).await.unwrap();
        assert_eq!(artifacts.len(), 2);

        let property_csv =
            std::fs::read_to_string(csv_path(dir.path(), job_id, RecordKind::Property)).unwrap();
        let mut lines = property_csv.lines();
        assert_eq!(lines.next(), Some("source_id,extracted_at,address,beds,year_built"));
        let row = lines.next().unwrap();
        assert!(row.starts_with("123456,"));
        assert!(row.ends_with(",\"1 Main St, Apt 2\",3,"));

        assert!(csv_path(dir.path(), job_id, RecordKind::Valuation).exists());
    }

    #[tokio::test]
    async fn test_no_temp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        write_job_csv(dir.path(), Uuid::new_v4(), &records()).await.unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 2);
        assert!(names.iter().all(|n| n.ends_with(".csv")));
    }

    #[tokio::test]
    async fn test_failed_rename_removes_files_already_written() {
        let dir = tempfile::tempdir().unwrap();
        let job_id = Uuid::new_v4();

        // Property sorts before Valuation, so its file lands first
        let blocked = csv_path(dir.path(), job_id, RecordKind::Valuation);
        std::fs::create_dir(&blocked).unwrap();
        std::fs::write(blocked.join("occupied"), "x").unwrap();

        let err = write_job_csv(dir.path(), job_id, &records()).await.unwrap_err();
        assert!(matches!(err, ScrapeError::Export { .. }));
        assert!(!csv_path(dir.path(), job_id, RecordKind::Property).exists());

        let leftovers: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(leftovers, vec![format!("{}_valuation.csv", job_id)]);
    }

    #[tokio::test]
    async fn test_unwritable_directory_is_export_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "x").unwrap();

        let err = write_job_csv(&blocker, Uuid::new_v4(), &records()).await.unwrap_err();
        assert!(matches!(err, ScrapeError::Export { .. }));
    }
}
