//! Scrape job persistence
//!
//! One `scrape_jobs` row per job, upserted on every state change so a job's
//! status survives a restart of the service.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use terra_common::{Error, Result};
use uuid::Uuid;

use crate::models::{JobError, JobProgress, JobSnapshot, JobState, JobStatus, ScrapeJob, ScrapeRequest};
use crate::utils::retry_on_lock;

use super::settings::get_max_lock_wait_ms;

/// Upsert a job row
pub async fn save_job(pool: &SqlitePool, job: &ScrapeJob) -> Result<()> {
    // Serialize before touching the database
    let job_id = job.job_id.to_string();
    let state = serde_json::to_string(&job.state)?;
    let request = serde_json::to_string(&job.request)?;
    let status = job.is_terminal().then(|| job.status().as_str().to_string());
    let errors = serde_json::to_string(&job.errors)?;
    let warnings = serde_json::to_string(&job.warnings)?;
    let progress_current = job.progress.current as i64;
    let progress_total = job.progress.total as i64;
    let record_count = job.records.len() as i64;
    let started_at = job.started_at.to_rfc3339();
    let ended_at = job.ended_at.map(|dt| dt.to_rfc3339());

    let max_wait_ms = get_max_lock_wait_ms(pool).await?;

    retry_on_lock("save_job", max_wait_ms, || async {
        sqlx::query(
            r#"
            INSERT INTO scrape_jobs (
                job_id, state, request, status,
                progress_current, progress_total, record_count,
                errors, warnings, started_at, ended_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(job_id) DO UPDATE SET
                state = excluded.state,
                status = excluded.status,
                progress_current = excluded.progress_current,
                progress_total = excluded.progress_total,
                record_count = excluded.record_count,
                errors = excluded.errors,
                warnings = excluded.warnings,
                ended_at = excluded.ended_at
            "#,
        )
        .bind(&job_id)
        .bind(&state)
        .bind(&request)
        .bind(&status)
        .bind(progress_current)
        .bind(progress_total)
        .bind(record_count)
        .bind(&errors)
        .bind(&warnings)
        .bind(&started_at)
        .bind(&ended_at)
        .execute(pool)
        .await
        .map_err(Error::Database)?;

        Ok(())
    })
    .await
}

/// Load a job snapshot by ID
pub async fn load_job(pool: &SqlitePool, job_id: Uuid) -> Result<Option<JobSnapshot>> {
    let row = sqlx::query(
        r#"
        SELECT job_id, state, request, status,
               progress_current, progress_total, record_count,
               errors, warnings, started_at, ended_at
        FROM scrape_jobs
        WHERE job_id = ?
        "#,
    )
    .bind(job_id.to_string())
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let state: JobState = serde_json::from_str(&row.get::<String, _>("state"))?;
    let request: ScrapeRequest = serde_json::from_str(&row.get::<String, _>("request"))?;
    let errors: Vec<JobError> = serde_json::from_str(&row.get::<String, _>("errors"))?;
    let warnings: Vec<String> = serde_json::from_str(&row.get::<String, _>("warnings"))?;
    let status = row
        .get::<Option<String>, _>("status")
        .map(|s| parse_status(&s))
        .transpose()?;

    let started_at = parse_timestamp(&row.get::<String, _>("started_at"))?;
    let ended_at = row
        .get::<Option<String>, _>("ended_at")
        .map(|s| parse_timestamp(&s))
        .transpose()?;

    let current = row.get::<i64, _>("progress_current").max(0) as usize;
    let total = row.get::<i64, _>("progress_total").max(0) as usize;
    let end = ended_at.unwrap_or_else(Utc::now);
    let progress = JobProgress {
        current,
        total,
        percentage: if total > 0 {
            current as f64 / total as f64 * 100.0
        } else {
            100.0
        },
        current_operation: state.name().to_string(),
        elapsed_seconds: (end - started_at).num_seconds().max(0) as u64,
    };

    Ok(Some(JobSnapshot {
        job_id,
        state,
        status,
        sections: request.sections().to_vec(),
        progress,
        record_count: row.get::<i64, _>("record_count").max(0) as usize,
        errors,
        warnings,
        started_at,
        ended_at,
    }))
}

/// Most recent jobs first
pub async fn list_recent_job_ids(pool: &SqlitePool, limit: i64) -> Result<Vec<Uuid>> {
    let ids: Vec<String> =
        sqlx::query_scalar("SELECT job_id FROM scrape_jobs ORDER BY started_at DESC LIMIT ?")
            .bind(limit)
            .fetch_all(pool)
            .await?;

    ids.iter()
        .map(|id| {
            Uuid::parse_str(id).map_err(|e| Error::corrupt("scrape_jobs", format!("job_id {}: {}", id, e)))
        })
        .collect()
}

fn parse_status(raw: &str) -> Result<JobStatus> {
    [JobStatus::Success, JobStatus::Partial, JobStatus::Failed]
        .into_iter()
        .find(|status| status.as_str() == raw)
        .ok_or_else(|| Error::corrupt("scrape_jobs", format!("unknown status {}", raw)))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::corrupt("scrape_jobs", format!("timestamp {}: {}", raw, e)))
}
