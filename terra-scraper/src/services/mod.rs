//! Scrape services
//!
//! - [`JobRegistry`]: status table of submitted jobs
//! - [`JobOrchestrator`]: runs one job through the session, navigator,
//!   extractor and export stages

pub mod job_registry;
pub mod orchestrator;

pub use job_registry::{CancelOutcome, JobRegistry, JobRetention};
pub use orchestrator::JobOrchestrator;
