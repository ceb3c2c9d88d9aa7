//! Extracted record persistence
//!
//! Records are stored with their fields as JSON so every record kind shares
//! one table. Reporting views query by kind.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use terra_common::{Error, Result};
use uuid::Uuid;

use crate::models::{ExtractionRecord, FieldValue, RecordKind};

/// A persisted record with its row metadata
#[derive(Debug, Clone, Serialize)]
pub struct StoredRecord {
    pub id: i64,
    pub job_id: Uuid,
    #[serde(flatten)]
    pub record: ExtractionRecord,
}

/// Insert all records of a job in a single transaction
///
/// Either every record is stored or none is.
pub async fn insert_records(
    pool: &SqlitePool,
    job_id: Uuid,
    records: &[ExtractionRecord],
) -> Result<usize> {
    let job_id = job_id.to_string();
    let mut rows = Vec::with_capacity(records.len());
    for record in records {
        let fields = serde_json::to_string(&record.fields)?;
        rows.push((
            record.kind.as_str(),
            record.source_id.as_str(),
            fields,
            record.extracted_at.to_rfc3339(),
        ));
    }

    let mut tx = pool.begin().await?;
    for (kind, source_id, fields, extracted_at) in &rows {
        sqlx::query(
            r#"
            INSERT INTO scraped_records (job_id, record_kind, source_id, fields, extracted_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job_id)
        .bind(*kind)
        .bind(*source_id)
        .bind(fields.as_str())
        .bind(extracted_at.as_str())
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    Ok(rows.len())
}

/// Newest records first, optionally filtered by kind
pub async fn list_records(
    pool: &SqlitePool,
    kind: Option<RecordKind>,
    limit: i64,
) -> Result<Vec<StoredRecord>> {
    let rows = match kind {
        Some(kind) => {
            sqlx::query(
                r#"
                SELECT id, job_id, record_kind, source_id, fields, extracted_at
                FROM scraped_records
                WHERE record_kind = ?
                ORDER BY id DESC
                LIMIT ?
                "#,
            )
            .bind(kind.as_str())
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query(
                r#"
                SELECT id, job_id, record_kind, source_id, fields, extracted_at
                FROM scraped_records
                ORDER BY id DESC
                LIMIT ?
                "#,
            )
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
    };

    rows.iter().map(row_to_record).collect()
}

/// Records written by one job, in insertion order, optionally filtered by kind
pub async fn records_for_job(
    pool: &SqlitePool,
    job_id: Uuid,
    kind: Option<RecordKind>,
) -> Result<Vec<StoredRecord>> {
    let kind = kind.map(|k| k.as_str());
    let rows = sqlx::query(
        r#"
        SELECT id, job_id, record_kind, source_id, fields, extracted_at
        FROM scraped_records
        WHERE job_id = ? AND (? IS NULL OR record_kind = ?)
        ORDER BY id ASC
        "#,
    )
    .bind(job_id.to_string())
    .bind(kind)
    .bind(kind)
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_record).collect()
}

/// Stored record count per kind; kinds with no rows report zero
pub async fn record_counts(pool: &SqlitePool) -> Result<BTreeMap<RecordKind, i64>> {
    let rows: Vec<(String, i64)> =
        sqlx::query_as("SELECT record_kind, COUNT(*) FROM scraped_records GROUP BY record_kind")
            .fetch_all(pool)
            .await?;

    let mut counts: BTreeMap<RecordKind, i64> = RecordKind::ALL.iter().map(|k| (*k, 0)).collect();
    for (kind, count) in rows {
        match RecordKind::parse(&kind) {
            Some(kind) => {
                counts.insert(kind, count);
            }
            None => tracing::warn!(record_kind = %kind, "Ignoring rows with unknown record kind"),
        }
    }
    Ok(counts)
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<StoredRecord> {
    let kind_raw: String = row.get("record_kind");
    let kind = RecordKind::parse(&kind_raw)
        .ok_or_else(|| Error::corrupt("scraped_records", format!("unknown kind {}", kind_raw)))?;

    let job_id_raw: String = row.get("job_id");
    let job_id = Uuid::parse_str(&job_id_raw)
        .map_err(|e| Error::corrupt("scraped_records", format!("job_id {}: {}", job_id_raw, e)))?;

    let fields: BTreeMap<String, FieldValue> = serde_json::from_str(&row.get::<String, _>("fields"))?;

    let extracted_at: String = row.get("extracted_at");
    let extracted_at = DateTime::parse_from_rfc3339(&extracted_at)
        .map_err(|e| Error::corrupt("scraped_records", format!("extracted_at: {}", e)))?
        .with_timezone(&Utc);

    Ok(StoredRecord {
        id: row.get("id"),
        job_id,
        record: ExtractionRecord {
            kind,
            source_id: row.get("source_id"),
            fields,
            extracted_at,
        },
    })
}
