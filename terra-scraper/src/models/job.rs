//! Scrape job state machine and results
//!
//! # State Progression
//! PENDING → AUTHENTICATING → RUNNING(section, index) → COMPLETED | FAILED
//!
//! `Cancelled` is reachable from any non-terminal state when a stop is
//! requested; it is checked before each (section, id) pair.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::record::ExtractionRecord;
use super::request::ScrapeRequest;
use super::section::SectionKind;
use crate::export::ExportArtifact;

/// Job lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    /// Accepted, not started
    Pending,
    /// Checking out or establishing a portal session
    Authenticating,
    /// Processing the `index`-th item of `section`
    Running { section: SectionKind, index: usize },
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }

    /// Short name for logs and the status table
    pub fn name(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Authenticating => "authenticating",
            JobState::Running { .. } => "running",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        }
    }

    /// Whether `next` is a legal successor of this state
    pub fn can_transition_to(&self, next: &JobState) -> bool {
        use JobState::*;
        match (self, next) {
            (Pending, Authenticating) => true,
            (Authenticating, Running { .. }) => true,
            (Authenticating, Completed) => true,
            (Authenticating, Failed) => true,
            (Running { .. }, Running { .. }) => true,
            (Running { .. }, Completed) => true,
            (Running { .. }, Failed) => true,
            (from, Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }
}

/// Terminal outcome of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Success,
    Partial,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Success => "success",
            JobStatus::Partial => "partial",
            JobStatus::Failed => "failed",
        }
    }

    /// `Failed` iff no section completed, `Success` iff additionally no errors
    pub fn derive(completed_sections: &[SectionKind], errors: &[JobError]) -> Self {
        if completed_sections.is_empty() {
            JobStatus::Failed
        } else if errors.is_empty() {
            JobStatus::Success
        } else {
            JobStatus::Partial
        }
    }
}

/// A per-item or job-level failure, as shown to the dashboard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub section: Option<SectionKind>,
    pub id: Option<String>,
    pub message: String,
}

impl JobError {
    pub fn new(section: Option<SectionKind>, id: Option<String>, message: impl Into<String>) -> Self {
        Self {
            section,
            id,
            message: message.into(),
        }
    }
}

/// State transition record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub job_id: Uuid,
    pub old_state: JobState,
    pub new_state: JobState,
    pub transitioned_at: DateTime<Utc>,
}

/// Progress counters for polling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobProgress {
    /// Work items processed so far
    pub current: usize,
    /// Total work items in the request
    pub total: usize,
    /// Percentage complete (0.0 - 100.0)
    pub percentage: f64,
    pub current_operation: String,
    pub elapsed_seconds: u64,
}

impl Default for JobProgress {
    fn default() -> Self {
        Self {
            current: 0,
            total: 0,
            percentage: 0.0,
            current_operation: String::from("Waiting to start"),
            elapsed_seconds: 0,
        }
    }
}

/// Terminal, immutable outcome of one [`ScrapeRequest`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub records: Vec<ExtractionRecord>,
    pub errors: Vec<JobError>,
    /// Export targets that failed while another succeeded
    pub warnings: Vec<String>,
    pub exports: Vec<ExportArtifact>,
}

impl JobResult {
    pub fn record_count(&self, kind: super::record::RecordKind) -> usize {
        self.records.iter().filter(|r| r.kind == kind).count()
    }

    /// IDs that failed, with reasons, for the activity log
    pub fn failed_ids(&self) -> Vec<(&str, &str)> {
        self.errors
            .iter()
            .filter_map(|e| e.id.as_deref().map(|id| (id, e.message.as_str())))
            .collect()
    }
}

/// Point-in-time view of a job for status polling and persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub job_id: Uuid,
    pub state: JobState,
    /// Set once the job is terminal
    pub status: Option<JobStatus>,
    pub sections: Vec<SectionKind>,
    pub progress: JobProgress,
    pub record_count: usize,
    pub errors: Vec<JobError>,
    pub warnings: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl JobSnapshot {
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// In-flight job
#[derive(Debug, Clone)]
pub struct ScrapeJob {
    pub job_id: Uuid,
    pub request: ScrapeRequest,
    pub state: JobState,
    pub progress: JobProgress,
    pub records: Vec<ExtractionRecord>,
    pub errors: Vec<JobError>,
    pub warnings: Vec<String>,
    /// Sections with at least one successful item, or with no items at all
    pub completed_sections: Vec<SectionKind>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl ScrapeJob {
    pub fn new(request: ScrapeRequest) -> Self {
        Self::with_id(Uuid::new_v4(), request)
    }

    pub fn with_id(job_id: Uuid, request: ScrapeRequest) -> Self {
        let total = request.work_items().len();
        Self {
            job_id,
            request,
            state: JobState::Pending,
            progress: JobProgress {
                total,
                ..Default::default()
            },
            records: Vec::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            completed_sections: Vec::new(),
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Move to `new_state`; illegal transitions are logged and ignored
    pub fn transition_to(&mut self, new_state: JobState) -> Option<StateTransition> {
        if !self.state.can_transition_to(&new_state) {
            tracing::warn!(
                job_id = %self.job_id,
                from = self.state.name(),
                to = new_state.name(),
                "Ignoring illegal job state transition"
            );
            return None;
        }

        let transition = StateTransition {
            job_id: self.job_id,
            old_state: self.state,
            new_state,
            transitioned_at: Utc::now(),
        };
        self.state = new_state;

        if new_state.is_terminal() {
            self.ended_at = Some(Utc::now());
        }

        Some(transition)
    }

    pub fn update_progress(&mut self, current: usize, operation: String) {
        self.progress.current = current;
        self.progress.percentage = if self.progress.total > 0 {
            (current as f64 / self.progress.total as f64) * 100.0
        } else {
            100.0
        };
        self.progress.current_operation = operation;
        self.progress.elapsed_seconds = (Utc::now() - self.started_at).num_seconds().max(0) as u64;
    }

    pub fn add_error(&mut self, error: JobError) {
        self.errors.push(error);
    }

    pub fn mark_section_completed(&mut self, section: SectionKind) {
        if !self.completed_sections.contains(&section) {
            self.completed_sections.push(section);
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// A job that reached `Failed` reports `failed` whatever it extracted
    pub fn status(&self) -> JobStatus {
        if self.state == JobState::Failed {
            return JobStatus::Failed;
        }
        JobStatus::derive(&self.completed_sections, &self.errors)
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            job_id: self.job_id,
            state: self.state,
            status: self.is_terminal().then(|| self.status()),
            sections: self.request.sections().to_vec(),
            progress: self.progress.clone(),
            record_count: self.records.len(),
            errors: self.errors.clone(),
            warnings: self.warnings.clone(),
            started_at: self.started_at,
            ended_at: self.ended_at,
        }
    }

    pub fn into_result(self, exports: Vec<ExportArtifact>) -> JobResult {
        let status = self.status();
        JobResult {
            job_id: self.job_id,
            status,
            records: self.records,
            errors: self.errors,
            warnings: self.warnings,
            exports,
        }
    }
}
