//! Database export

use sqlx::SqlitePool;
use uuid::Uuid;

use super::{ExportArtifact, ExportFormat};
use crate::db::records::insert_records;
use crate::error::ScrapeError;
use crate::models::ExtractionRecord;

/// Insert every record of the job in one transaction
pub async fn persist_records(
    pool: &SqlitePool,
    job_id: Uuid,
    records: &[ExtractionRecord],
) -> Result<Vec<ExportArtifact>, ScrapeError> {
    let rows = insert_records(pool, job_id, records)
        .await
        .map_err(|e| ScrapeError::Export {
            target: ExportFormat::Database.to_string(),
            message: e.to_string(),
        })?;

    Ok(vec![ExportArtifact {
        format: ExportFormat::Database,
        location: "scraped_records".to_string(),
        rows,
    }])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::records::records_for_job;
    use crate::models::RecordKind;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_db() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        terra_common::db::init_schema(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_missing_table_is_export_error() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();

        let records = vec![ExtractionRecord::new(RecordKind::Report, "R-1")];
        let err = persist_records(&pool, Uuid::new_v4(), &records).await.unwrap_err();
        assert!(matches!(err, ScrapeError::Export { ref target, .. } if target == "database"));
    }

    #[tokio::test]
    async fn test_failing_row_rolls_back_whole_batch() {
        let pool = setup_test_db().await;
        sqlx::query(
            r#"
            CREATE TRIGGER reject_r3 BEFORE INSERT ON scraped_records
            WHEN NEW.source_id = 'R-3'
            BEGIN
                SELECT RAISE(ABORT, 'rejected');
            END
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();

        let job_id = Uuid::new_v4();
        let records = vec![
            ExtractionRecord::new(RecordKind::Report, "R-1"),
            ExtractionRecord::new(RecordKind::Report, "R-2"),
            ExtractionRecord::new(RecordKind::Report, "R-3"),
        ];
        let err = persist_records(&pool, job_id, &records).await.unwrap_err();
        assert!(matches!(err, ScrapeError::Export { ref message, .. } if message.contains("rejected")));

        assert!(records_for_job(&pool, job_id, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rows_reported() {
        let pool = setup_test_db().await;

        let records = vec![
            ExtractionRecord::new(RecordKind::Report, "R-1"),
            ExtractionRecord::new(RecordKind::Report, "R-2"),
        ];
        let artifacts = persist_records(&pool, Uuid::new_v4(), &records).await.unwrap();
        assert_eq!(artifacts[0].rows, 2);
    }
}
