//! Scrape job API handlers
//!
//! POST /scrape, GET /scrape/:job_id, POST /scrape/:job_id/cancel

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{resolve_credentials, CredentialSource};
use crate::error::{ApiError, ApiResult};
use crate::models::{JobResult, JobSnapshot, JobState, ScrapeForm, ScrapeRequest, SectionKind};
use crate::services::CancelOutcome;
use crate::AppState;

/// POST /scrape response
#[derive(Debug, Serialize)]
pub struct StartScrapeResponse {
    pub job_id: Uuid,
    pub state: JobState,
    pub sections: Vec<SectionKind>,
    pub total_items: usize,
}

/// GET /scrape/:job_id response
#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    #[serde(flatten)]
    pub snapshot: JobSnapshot,
    /// Present once the job is terminal and still held in memory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
}

/// POST /scrape/:job_id/cancel response
#[derive(Debug, Serialize)]
pub struct CancelScrapeResponse {
    pub job_id: Uuid,
    pub cancelled: bool,
    pub message: String,
}

/// POST /scrape
///
/// Validates the form, resolves credentials and starts the job in the
/// background. Returns 202 with the job ID.
pub async fn start_scrape(
    State(state): State<AppState>,
    Json(form): Json<ScrapeForm>,
) -> ApiResult<(StatusCode, Json<StartScrapeResponse>)> {
    let request = ScrapeRequest::from_form(&form)?;
    let (credentials, source) = resolve_credentials(Some(&state.db), form.credentials()).await?;

    if form.save_credentials && source == CredentialSource::Form {
        if let Err(e) = crate::db::settings::save_credentials(&state.db, &credentials).await {
            warn!(error = %e, "Failed to save portal credentials");
            *state.last_error.write().await = Some(format!("save credentials: {}", e));
        }
    }

    let sections = request.sections().to_vec();
    let total_items = request.work_items().len();
    let job_id = state.orchestrator.submit(request, credentials).await;

    info!(job_id = %job_id, sections = ?sections, total_items, "Scrape job submitted");

    Ok((
        StatusCode::ACCEPTED,
        Json(StartScrapeResponse {
            job_id,
            state: JobState::Pending,
            sections,
            total_items,
        }),
    ))
}

/// GET /scrape/:job_id
///
/// Live jobs come from the in-memory registry; older jobs from the database.
pub async fn get_scrape_status(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<JobStatusResponse>> {
    let registry = state.orchestrator.registry();

    if let Some(snapshot) = registry.snapshot(job_id).await {
        let result = registry.result(job_id).await;
        return Ok(Json(JobStatusResponse { snapshot, result }));
    }

    match crate::db::jobs::load_job(&state.db, job_id).await? {
        Some(snapshot) => Ok(Json(JobStatusResponse {
            snapshot,
            result: None,
        })),
        None => Err(ApiError::NotFound(format!("Scrape job {} not found", job_id))),
    }
}

/// POST /scrape/:job_id/cancel
pub async fn cancel_scrape(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<CancelScrapeResponse>> {
    match state.orchestrator.registry().cancel(job_id).await {
        CancelOutcome::Requested => {
            info!(job_id = %job_id, "Cancellation requested");
            Ok(Json(CancelScrapeResponse {
                job_id,
                cancelled: true,
                message: "Job will stop before its next item".to_string(),
            }))
        }
        CancelOutcome::AlreadyFinished => Err(ApiError::Conflict(format!(
            "Scrape job {} already finished",
            job_id
        ))),
        // Evicted or from a previous run: known only to the database
        CancelOutcome::NotFound => match crate::db::jobs::load_job(&state.db, job_id).await? {
            Some(_) => Err(ApiError::Conflict(format!(
                "Scrape job {} is not running",
                job_id
            ))),
            None => Err(ApiError::NotFound(format!(
                "Scrape job {} not found",
                job_id
            ))),
        },
    }
}

/// Build scrape job routes
pub fn scrape_routes() -> Router<AppState> {
    Router::new()
        .route("/scrape", post(start_scrape))
        .route("/scrape/:job_id", get(get_scrape_status))
        .route("/scrape/:job_id/cancel", post(cancel_scrape))
}
