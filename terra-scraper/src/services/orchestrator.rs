//! Job orchestration
//!
//! Runs one [`ScrapeJob`] to a terminal state:
//!
//! ```text
//! Pending → Authenticating → Running(section, index)* → Completed
//!                 │                    │
//!                 └──────→ Failed ←────┘ (re-login after expiry failed)
//! ```
//!
//! Items run sequentially: sections in request order, IDs in submission
//! order. Transient failures are retried per item; an item that still fails
//! is recorded and the job moves on. Cancellation is checked before each item.

use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Instant;
use terra_common::events::{EventBus, ScrapeEvent};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::job_registry::{JobRegistry, JobRetention};
use crate::db::jobs::save_job;
use crate::error::ScrapeError;
use crate::export::{ExportArtifact, Exporter};
use crate::extractors::ExtractorRegistry;
use crate::models::{
    Credentials, ExtractionRecord, JobError, JobResult, JobState, ScrapeJob, ScrapeRequest,
    WorkItem,
};
use crate::navigator::SectionNavigator;
use crate::session::{SessionLease, SessionManager, SessionTokens};
use crate::utils::{retry_with_backoff, RetryPolicy};

/// How an item failed
enum ItemFailure {
    /// Recorded against the item; the job continues
    Item(ScrapeError),
    /// Ends the job
    Fatal(ScrapeError),
}

/// Drives scrape jobs from submission to result
#[derive(Clone)]
pub struct JobOrchestrator {
    sessions: SessionManager,
    navigator: SectionNavigator,
    extractors: Arc<ExtractorRegistry>,
    exporter: Exporter,
    retry: RetryPolicy,
    event_bus: EventBus,
    registry: JobRegistry,
    db: Option<SqlitePool>,
}

impl JobOrchestrator {
    pub fn new(
        sessions: SessionManager,
        navigator: SectionNavigator,
        extractors: ExtractorRegistry,
        exporter: Exporter,
        retry: RetryPolicy,
        event_bus: EventBus,
    ) -> Self {
        Self {
            sessions,
            navigator,
            extractors: Arc::new(extractors),
            exporter,
            retry,
            event_bus,
            registry: JobRegistry::new(),
            db: None,
        }
    }

    /// Persist job snapshots to `scrape_jobs`
    pub fn with_database(mut self, db: SqlitePool) -> Self {
        self.db = Some(db);
        self
    }

    /// Evict finished jobs from the status table per `retention`
    pub fn with_retention(mut self, retention: JobRetention) -> Self {
        self.registry = JobRegistry::with_retention(retention);
        self
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Register a job and run it on its own task
    pub async fn submit(&self, request: ScrapeRequest, credentials: Credentials) -> Uuid {
        let job = ScrapeJob::new(request);
        let job_id = job.job_id;
        let cancel = self.registry.register(&job).await;

        let orchestrator = self.clone();
        tokio::spawn(async move {
            orchestrator.run(job, credentials, cancel).await;
        });

        job_id
    }

    /// Run a job to completion on the current task
    pub async fn run(
        &self,
        mut job: ScrapeJob,
        credentials: Credentials,
        cancel: CancellationToken,
    ) -> JobResult {
        let started = Instant::now();
        info!(
            job_id = %job.job_id,
            sections = ?job.request.sections(),
            total_items = job.progress.total,
            "Starting scrape job"
        );
        self.event_bus.emit_lossy(ScrapeEvent::JobStarted {
            job_id: job.job_id,
            sections: job.request.sections().iter().map(|s| s.to_string()).collect(),
            total_items: job.progress.total,
            timestamp: chrono::Utc::now(),
        });

        job.transition_to(JobState::Authenticating);
        job.update_progress(0, "Authenticating".to_string());
        self.persist(&job).await;

        if cancel.is_cancelled() {
            return self.finish_cancelled(job, 0).await;
        }

        let mut lease = match self.sessions.ensure_session(&credentials).await {
            Ok(lease) => lease,
            Err(e) => {
                warn!(job_id = %job.job_id, error = %e, "Portal login failed");
                let section = job.request.sections().first().copied();
                return self
                    .fail(job, JobError::new(section, None, e.user_message()))
                    .await;
            }
        };

        let mut processed = 0usize;
        let sections = job.request.sections().to_vec();

        for section in sections {
            let items = job.request.section_items(section);
            if items.is_empty() {
                debug!(job_id = %job.job_id, section = %section, "Section has no items");
                job.mark_section_completed(section);
                continue;
            }

            for (index, item) in items.iter().enumerate() {
                if cancel.is_cancelled() {
                    drop(lease);
                    return self.finish_cancelled(job, processed).await;
                }

                job.transition_to(JobState::Running { section, index });
                job.update_progress(processed, describe(item));
                self.registry.update(&job).await;

                let outcome = self.process_item(&mut lease, item).await;
                processed += 1;

                match outcome {
                    Ok(records) => {
                        let (kept, stray): (Vec<_>, Vec<_>) = records
                            .into_iter()
                            .partition(|r| job.request.permits_source(section, &r.source_id));
                        if !stray.is_empty() {
                            warn!(
                                job_id = %job.job_id,
                                section = %section,
                                dropped = stray.len(),
                                "Dropping records whose source ID is not in the request"
                            );
                        }

                        debug!(
                            job_id = %job.job_id,
                            section = %section,
                            source_id = ?item.source_id(),
                            records = kept.len(),
                            "Item extracted"
                        );
                        self.event_bus.emit_lossy(ScrapeEvent::ItemCompleted {
                            job_id: job.job_id,
                            section: section.to_string(),
                            source_id: item.source_id().map(str::to_string),
                            records: kept.len(),
                            current: processed,
                            total: job.progress.total,
                            timestamp: chrono::Utc::now(),
                        });
                        job.records.extend(kept);
                        job.mark_section_completed(section);
                    }
                    Err(ItemFailure::Item(e)) => {
                        warn!(
                            job_id = %job.job_id,
                            section = %section,
                            source_id = ?item.source_id(),
                            error = %e,
                            "Item failed"
                        );
                        let message = e.user_message();
                        self.event_bus.emit_lossy(ScrapeEvent::ItemFailed {
                            job_id: job.job_id,
                            section: section.to_string(),
                            source_id: item.source_id().map(str::to_string),
                            message: message.clone(),
                            current: processed,
                            total: job.progress.total,
                            timestamp: chrono::Utc::now(),
                        });
                        job.add_error(JobError::new(
                            Some(section),
                            item.source_id().map(str::to_string),
                            message,
                        ));
                    }
                    Err(ItemFailure::Fatal(e)) => {
                        drop(lease);
                        let error = JobError::new(
                            Some(section),
                            item.source_id().map(str::to_string),
                            e.user_message(),
                        );
                        return self.fail(job, error).await;
                    }
                }

                job.update_progress(processed, describe(item));
                self.persist(&job).await;
            }
        }
        drop(lease);

        let exports = self.export(&mut job).await;
        job.transition_to(JobState::Completed);
        job.update_progress(processed, "Completed".to_string());

        let status = job.status();
        info!(
            job_id = %job.job_id,
            status = status.as_str(),
            records = job.records.len(),
            errors = job.errors.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Scrape job completed"
        );
        self.event_bus.emit_lossy(ScrapeEvent::JobCompleted {
            job_id: job.job_id,
            status: status.as_str().to_string(),
            records: job.records.len(),
            errors: job.errors.len(),
            duration_ms: started.elapsed().as_millis() as u64,
            timestamp: chrono::Utc::now(),
        });

        self.finish(job, exports).await
    }

    /// Fetch and extract one item, retrying transient failures
    ///
    /// A session that expires mid-item is re-established once; if that
    /// login fails the job cannot continue.
    async fn process_item(
        &self,
        lease: &mut SessionLease,
        item: &WorkItem,
    ) -> Result<Vec<ExtractionRecord>, ItemFailure> {
        lease.ensure_valid().await.map_err(ItemFailure::Fatal)?;

        let mut reauthenticated = false;
        loop {
            let tokens = lease.tokens().clone();
            let outcome = retry_with_backoff(
                "fetch_section",
                &self.retry,
                ScrapeError::is_transient,
                || self.fetch_and_extract(&tokens, item),
            )
            .await;

            match outcome {
                Err(ScrapeError::SessionExpired) if !reauthenticated => {
                    warn!(
                        section = %item.section,
                        source_id = ?item.source_id(),
                        "Portal session expired, re-authenticating"
                    );
                    lease.reauthenticate().await.map_err(ItemFailure::Fatal)?;
                    reauthenticated = true;
                }
                other => return other.map_err(ItemFailure::Item),
            }
        }
    }

    async fn fetch_and_extract(
        &self,
        tokens: &SessionTokens,
        item: &WorkItem,
    ) -> Result<Vec<ExtractionRecord>, ScrapeError> {
        let raw = self
            .navigator
            .fetch_section(tokens, item.section, item.target.as_ref())
            .await?;
        self.extractors.extract(&raw)
    }

    /// Write collected records to every export target
    ///
    /// One target failing is a warning; all failing is a job error.
    async fn export(&self, job: &mut ScrapeJob) -> Vec<ExportArtifact> {
        if job.records.is_empty() || self.exporter.formats().is_empty() {
            return Vec::new();
        }

        let handle = self.exporter.export_all(job.job_id, &job.records).await;
        if handle.all_failed() {
            let reasons: Vec<String> = handle.failures.iter().map(|e| e.to_string()).collect();
            job.add_error(JobError::new(
                None,
                None,
                format!("export failed: {}", reasons.join("; ")),
            ));
        } else {
            job.warnings
                .extend(handle.failures.iter().map(|e| e.to_string()));
        }
        handle.artifacts
    }

    async fn finish_cancelled(&self, mut job: ScrapeJob, processed: usize) -> JobResult {
        let remaining = job.progress.total.saturating_sub(processed);
        info!(job_id = %job.job_id, processed, remaining, "Scrape job cancelled");

        job.add_error(JobError::new(
            None,
            None,
            format!("cancelled; {} items not processed", remaining),
        ));
        let exports = self.export(&mut job).await;
        job.transition_to(JobState::Cancelled);
        job.update_progress(processed, "Cancelled".to_string());

        self.event_bus.emit_lossy(ScrapeEvent::JobCancelled {
            job_id: job.job_id,
            current: processed,
            total: job.progress.total,
            timestamp: chrono::Utc::now(),
        });

        self.finish(job, exports).await
    }

    async fn fail(&self, mut job: ScrapeJob, error: JobError) -> JobResult {
        error!(
            job_id = %job.job_id,
            section = ?error.section,
            message = %error.message,
            "Scrape job failed"
        );

        self.event_bus.emit_lossy(ScrapeEvent::JobFailed {
            job_id: job.job_id,
            message: error.message.clone(),
            timestamp: chrono::Utc::now(),
        });
        job.add_error(error);
        job.transition_to(JobState::Failed);

        self.finish(job, Vec::new()).await
    }

    async fn finish(&self, job: ScrapeJob, exports: Vec<ExportArtifact>) -> JobResult {
        self.persist(&job).await;
        let snapshot = job.snapshot();
        let result = job.into_result(exports);
        for (source_id, reason) in result.failed_ids() {
            info!(job_id = %snapshot.job_id, source_id, reason, "Failed ID");
        }
        self.registry.finish(snapshot, result.clone()).await;
        result
    }

    /// Publish the job's snapshot; database errors are logged, not fatal
    async fn persist(&self, job: &ScrapeJob) {
        self.registry.update(job).await;
        if let Some(db) = &self.db {
            if let Err(e) = save_job(db, job).await {
                warn!(job_id = %job.job_id, error = %e, "Failed to persist job state");
            }
        }
    }
}

fn describe(item: &WorkItem) -> String {
    match item.source_id() {
        Some(id) => format!("{} {}", item.section, id),
        None => item.section.to_string(),
    }
}
