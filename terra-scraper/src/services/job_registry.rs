//! In-memory job status table
//!
//! Keyed by job ID. Holds the latest snapshot of each job, its cancellation
//! token, and the result once it is terminal. Finished jobs are evicted per
//! [`JobRetention`]; their snapshots remain in `scrape_jobs`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use terra_common::config::JobsConfig;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::models::{JobResult, JobSnapshot, ScrapeJob};

struct JobEntry {
    snapshot: JobSnapshot,
    result: Option<JobResult>,
    cancel: CancellationToken,
    /// Finish time and order
    finished: Option<(Instant, u64)>,
}

/// How long finished jobs stay in memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobRetention {
    pub max_age: Duration,
    /// Finished jobs kept at most; oldest are evicted first
    pub max_finished: usize,
}

impl Default for JobRetention {
    fn default() -> Self {
        Self::from(&JobsConfig::default())
    }
}

impl From<&JobsConfig> for JobRetention {
    fn from(config: &JobsConfig) -> Self {
        Self {
            max_age: Duration::from_secs(config.retention_secs),
            max_finished: config.max_finished,
        }
    }
}

/// Result of a cancellation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Token fired; the job stops before its next item
    Requested,
    AlreadyFinished,
    NotFound,
}

#[derive(Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<RwLock<HashMap<Uuid, JobEntry>>>,
    finish_seq: Arc<AtomicU64>,
    retention: JobRetention,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(retention: JobRetention) -> Self {
        Self {
            jobs: Arc::default(),
            finish_seq: Arc::default(),
            retention,
        }
    }

    /// Add a job; returns the token the job's worker must observe
    pub async fn register(&self, job: &ScrapeJob) -> CancellationToken {
        let cancel = CancellationToken::new();
        self.jobs.write().await.insert(
            job.job_id,
            JobEntry {
                snapshot: job.snapshot(),
                result: None,
                cancel: cancel.clone(),
                finished: None,
            },
        );
        cancel
    }

    /// Replace a job's snapshot
    pub async fn update(&self, job: &ScrapeJob) {
        if let Some(entry) = self.jobs.write().await.get_mut(&job.job_id) {
            entry.snapshot = job.snapshot();
        }
    }

    /// Store the terminal result alongside the final snapshot, then evict
    /// finished jobs past retention
    pub async fn finish(&self, snapshot: JobSnapshot, result: JobResult) {
        let mut jobs = self.jobs.write().await;
        let finished = Some((Instant::now(), self.finish_seq.fetch_add(1, Ordering::Relaxed)));
        match jobs.get_mut(&snapshot.job_id) {
            Some(entry) => {
                entry.snapshot = snapshot;
                entry.result = Some(result);
                entry.finished = finished;
            }
            None => {
                jobs.insert(
                    snapshot.job_id,
                    JobEntry {
                        snapshot,
                        result: Some(result),
                        cancel: CancellationToken::new(),
                        finished,
                    },
                );
            }
        }
        evict_finished(&mut jobs, self.retention);
    }

    /// Drop finished jobs older than `max_age`, then the oldest beyond
    /// `max_finished`. Returns the number evicted.
    pub async fn evict(&self) -> usize {
        evict_finished(&mut *self.jobs.write().await, self.retention)
    }

    pub async fn snapshot(&self, job_id: Uuid) -> Option<JobSnapshot> {
        self.jobs.read().await.get(&job_id).map(|e| e.snapshot.clone())
    }

    pub async fn result(&self, job_id: Uuid) -> Option<JobResult> {
        self.jobs.read().await.get(&job_id).and_then(|e| e.result.clone())
    }

    pub async fn cancel(&self, job_id: Uuid) -> CancelOutcome {
        let jobs = self.jobs.read().await;
        match jobs.get(&job_id) {
            None => CancelOutcome::NotFound,
            Some(entry) if entry.snapshot.is_terminal() => CancelOutcome::AlreadyFinished,
            Some(entry) => {
                entry.cancel.cancel();
                CancelOutcome::Requested
            }
        }
    }

    /// Jobs not yet terminal
    pub async fn active_count(&self) -> usize {
        self.jobs
            .read()
            .await
            .values()
            .filter(|e| !e.snapshot.is_terminal())
            .count()
    }

    /// Fire every outstanding cancellation token
    pub async fn cancel_all(&self) {
        for entry in self.jobs.read().await.values() {
            if !entry.snapshot.is_terminal() {
                entry.cancel.cancel();
            }
        }
    }
}

fn evict_finished(jobs: &mut HashMap<Uuid, JobEntry>, retention: JobRetention) -> usize {
    let before = jobs.len();
    jobs.retain(|_, e| {
        e.finished
            .map_or(true, |(at, _)| at.elapsed() < retention.max_age)
    });

    let mut finished: Vec<(u64, Uuid)> = jobs
        .iter()
        .filter_map(|(id, e)| e.finished.map(|(_, seq)| (seq, *id)))
        .collect();
    if finished.len() > retention.max_finished {
        finished.sort();
        let excess = finished.len() - retention.max_finished;
        for (_, id) in finished.into_iter().take(excess) {
            jobs.remove(&id);
        }
    }

    let evicted = before - jobs.len();
    if evicted > 0 {
        tracing::debug!(evicted, remaining = jobs.len(), "Evicted finished jobs");
    }
    evicted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{JobState, ScrapeRequest, SectionKind};

    fn job() -> ScrapeJob {
        ScrapeJob::new(ScrapeRequest::new([SectionKind::Reports]))
    }

    async fn finish(registry: &JobRegistry, mut job: ScrapeJob) {
        job.transition_to(JobState::Authenticating);
        job.transition_to(JobState::Failed);
        let snapshot = job.snapshot();
        registry.finish(snapshot, job.into_result(Vec::new())).await;
    }

    #[tokio::test]
    async fn test_cancel_fires_token() {
        let registry = JobRegistry::new();
        let job = job();
        let token = registry.register(&job).await;

        assert_eq!(registry.active_count().await, 1);
        assert_eq!(registry.cancel(job.job_id).await, CancelOutcome::Requested);
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_finished_and_unknown() {
        let registry = JobRegistry::new();
        let job = job();
        let job_id = job.job_id;
        registry.register(&job).await;
        finish(&registry, job).await;

        assert_eq!(registry.cancel(job_id).await, CancelOutcome::AlreadyFinished);
        assert!(registry.result(job_id).await.is_some());
        assert_eq!(registry.cancel(Uuid::new_v4()).await, CancelOutcome::NotFound);
        assert_eq!(registry.active_count().await, 0);
    }

    #[tokio::test]
    async fn test_oldest_finished_jobs_evicted_beyond_limit() {
        let registry = JobRegistry::with_retention(JobRetention {
            max_age: Duration::from_secs(3600),
            max_finished: 2,
        });

        let running = job();
        registry.register(&running).await;

        let finished: Vec<ScrapeJob> = (0..3).map(|_| job()).collect();
        let ids: Vec<Uuid> = finished.iter().map(|j| j.job_id).collect();
        for done in finished {
            registry.register(&done).await;
            finish(&registry, done).await;
        }

        assert!(registry.snapshot(ids[0]).await.is_none());
        assert!(registry.result(ids[1]).await.is_some());
        assert!(registry.result(ids[2]).await.is_some());
        assert!(registry.snapshot(running.job_id).await.is_some());
        assert_eq!(registry.active_count().await, 1);
    }

    #[tokio::test]
    async fn test_finished_jobs_evicted_after_max_age() {
        let registry = JobRegistry::with_retention(JobRetention {
            max_age: Duration::from_millis(20),
            max_finished: 100,
        });
        let running = job();
        registry.register(&running).await;
        let done = job();
        let done_id = done.job_id;
        registry.register(&done).await;
        finish(&registry, done).await;

        assert!(registry.result(done_id).await.is_some());
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(registry.evict().await, 1);
        assert!(registry.snapshot(done_id).await.is_none());
        assert_eq!(registry.cancel(done_id).await, CancelOutcome::NotFound);
        assert!(registry.snapshot(running.job_id).await.is_some());
    }
}
