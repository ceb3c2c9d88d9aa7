//! Liveness and readiness
//!
//! `GET /health` answers 200 while the process runs; `database` reports
//! whether the SQLite pool still answers a trivial query.

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use tracing::warn;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub module: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
    /// "ok" or "unavailable"
    pub database: &'static str,
    /// Submitted jobs not yet terminal
    pub active_jobs: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime_seconds = (Utc::now() - state.startup_time).num_seconds().max(0) as u64;

    let database = match sqlx::query("SELECT 1").execute(&state.db).await {
        Ok(_) => "ok",
        Err(e) => {
            warn!(error = %e, "Health check: database unavailable");
            "unavailable"
        }
    };

    Json(HealthResponse {
        status: "ok",
        module: "terra-scraper",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds,
        database,
        active_jobs: state.orchestrator.registry().active_count().await,
        last_error: state.last_error.read().await.clone(),
    })
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
