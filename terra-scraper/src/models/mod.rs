//! Data models for the scraper
//!
//! - Scrape requests and their (section, id) work items
//! - Extraction records
//! - Job state machine and terminal results

pub mod credentials;
pub mod job;
pub mod record;
pub mod request;
pub mod section;

pub use credentials::{CredentialFingerprint, Credentials};
pub use job::{JobError, JobProgress, JobResult, JobSnapshot, JobState, JobStatus, ScrapeJob, StateTransition};
pub use record::{ExtractionRecord, FieldValue, RecordKind};
pub use request::{split_id_list, ScrapeForm, ScrapeRequest, WorkItem};
pub use section::{IdKind, ResourceId, SectionKind};
