//! terra-scraper library interface
//!
//! Exposes the scrape pipeline and HTTP API for the binary and for
//! integration tests.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod extractors;
pub mod models;
pub mod navigator;
pub mod portal;
pub mod services;
pub mod session;
pub mod utils;

pub use crate::error::{ApiError, ApiResult, ScrapeError};

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use terra_common::events::EventBus;
use tokio::sync::RwLock;

use crate::services::JobOrchestrator;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Runs submitted scrape jobs and tracks their state
    pub orchestrator: JobOrchestrator,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(db: SqlitePool, event_bus: EventBus, orchestrator: JobOrchestrator) -> Self {
        Self {
            db,
            event_bus,
            orchestrator,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        // SSE must be registered ahead of /scrape/:job_id
        .route("/scrape/events", get(api::scrape_event_stream))
        .merge(api::scrape_routes())
        .merge(api::record_routes())
        .merge(api::health_routes())
        .with_state(state)
}
