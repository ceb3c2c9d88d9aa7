//! Stored record queries for the reporting views
//!
//! GET /records?kind=&job_id=&limit=, GET /records/stats

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::db::records::{list_records, record_counts, records_for_job, StoredRecord};
use crate::error::{ApiError, ApiResult};
use crate::models::RecordKind;
use crate::AppState;

const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 1000;

#[derive(Debug, Default, Deserialize)]
pub struct RecordQuery {
    pub kind: Option<String>,
    /// Only records exported by this job, oldest first
    pub job_id: Option<Uuid>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct RecordListResponse {
    pub kind: Option<RecordKind>,
    pub count: usize,
    pub records: Vec<StoredRecord>,
}

#[derive(Debug, Serialize)]
pub struct RecordStatsResponse {
    pub total: i64,
    pub by_kind: BTreeMap<RecordKind, i64>,
}

/// GET /records
pub async fn get_records(
    State(state): State<AppState>,
    Query(query): Query<RecordQuery>,
) -> ApiResult<Json<RecordListResponse>> {
    let kind = match query.kind.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
        Some(raw) => Some(
            RecordKind::parse(raw)
                .ok_or_else(|| ApiError::BadRequest(format!("Unknown record kind: {}", raw)))?,
        ),
        None => None,
    };
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    let records = match query.job_id {
        Some(job_id) => {
            let mut records = records_for_job(&state.db, job_id, kind).await?;
            records.truncate(limit as usize);
            records
        }
        None => list_records(&state.db, kind, limit).await?,
    };
    Ok(Json(RecordListResponse {
        kind,
        count: records.len(),
        records,
    }))
}

/// GET /records/stats
pub async fn get_record_stats(State(state): State<AppState>) -> ApiResult<Json<RecordStatsResponse>> {
    let by_kind = record_counts(&state.db).await?;
    Ok(Json(RecordStatsResponse {
        total: by_kind.values().sum(),
        by_kind,
    }))
}

/// Build record routes
pub fn record_routes() -> Router<AppState> {
    Router::new()
        .route("/records", get(get_records))
        .route("/records/stats", get(get_record_stats))
}
