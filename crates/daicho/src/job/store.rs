//! In-memory job registry shared between the API surface, the collector
//! and the sweepers.
//!
//! All access goes through short closures under one `RwLock`. A poisoned
//! lock is recovered rather than propagated: the records are plain
//! bookkeeping and stay usable even if a holder panicked.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::document::DocType;
use crate::error::JobError;
use crate::job::task::{ChunkTask, FailureKind, JobStage, TaskStatus};
use crate::pipeline::LedgerResult;
use crate::plan::PlannedChunk;

/// Terminal failure detail attached to a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobFailure {
    pub kind: FailureKind,
    pub message: String,
}

/// Point-in-time view a status poller reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusReport {
    pub stage: JobStage,
    pub percent: u8,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Counts across the whole store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCounts {
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

/// Everything tracked for one analysis job.
pub struct JobRecord {
    pub id: Uuid,
    pub doc_type: DocType,
    pub stage: JobStage,
    pub tasks: Vec<ChunkTask>,
    pub failure: Option<JobFailure>,
    pub result: Option<LedgerResult>,
    /// Submission wall-clock time; the reference date for era inference.
    pub submitted_at: DateTime<Utc>,
    started: Instant,
    finished: Option<Instant>,
    cancelled: Arc<AtomicBool>,
}

impl JobRecord {
    pub fn new(id: Uuid, doc_type: DocType, chunks: &[PlannedChunk]) -> Self {
        Self {
            id,
            doc_type,
            stage: JobStage::Queued,
            tasks: chunks.iter().map(ChunkTask::from_plan).collect(),
            failure: None,
            result: None,
            submitted_at: Utc::now(),
            started: Instant::now(),
            finished: None,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag shared with this job's in-flight chunk calls.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn completed_chunks(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Succeeded)
            .count()
    }

    pub fn all_chunks_succeeded(&self) -> bool {
        self.completed_chunks() == self.tasks.len()
    }

    pub fn over_budget(&self, budget: Duration) -> bool {
        !self.stage.is_terminal() && self.started.elapsed() > budget
    }

    fn expired(&self, retention: Duration) -> bool {
        self.finished
            .is_some_and(|finished| finished.elapsed() > retention)
    }

    /// Marks the job failed; the first terminal transition wins.
    pub fn fail(&mut self, kind: FailureKind, message: impl Into<String>) {
        if self.stage.is_terminal() {
            return;
        }
        self.stage = JobStage::Failed;
        self.failure = Some(JobFailure {
            kind,
            message: message.into(),
        });
        // Stops queued and backing-off calls for this job.
        self.cancelled.store(true, Ordering::Relaxed);
        self.finished = Some(Instant::now());
    }

    pub fn finish_cancelled(&mut self) {
        if self.stage.is_terminal() {
            return;
        }
        self.stage = JobStage::Cancelled;
        self.cancelled.store(true, Ordering::Relaxed);
        self.finished = Some(Instant::now());
    }

    pub fn complete(&mut self, result: LedgerResult) {
        if self.stage.is_terminal() {
            return;
        }
        self.stage = JobStage::Completed;
        self.result = Some(result);
        self.finished = Some(Instant::now());
    }

    pub fn status(&self) -> JobStatusReport {
        JobStatusReport {
            stage: self.stage,
            percent: self.percent(),
            detail: self.detail(),
            error: self
                .failure
                .as_ref()
                .map(|f| format!("{}: {}", f.kind, f.message)),
        }
    }

    /// Chunk analysis advances 0 to 90; reconciliation covers the rest.
    fn percent(&self) -> u8 {
        let total = self.tasks.len().max(1);
        let chunk_part = (self.completed_chunks() * 90 / total) as u8;
        match self.stage {
            JobStage::Queued => 0,
            JobStage::Dispatching => chunk_part,
            JobStage::Merging => 92,
            JobStage::Correcting => 95,
            JobStage::Exporting => 98,
            JobStage::Completed => 100,
            JobStage::Failed | JobStage::Cancelled => chunk_part,
        }
    }

    fn detail(&self) -> String {
        match self.stage {
            JobStage::Queued => "queued".to_string(),
            JobStage::Dispatching => format!(
                "{}/{} chunks analyzed",
                self.completed_chunks(),
                self.tasks.len()
            ),
            JobStage::Merging => "merging chunk results".to_string(),
            JobStage::Correcting => "verifying balance continuity".to_string(),
            JobStage::Exporting => "finalizing ledger".to_string(),
            JobStage::Completed => {
                let count = self
                    .result
                    .as_ref()
                    .map_or(0, |r| r.transactions.len());
                format!("{count} transactions")
            }
            JobStage::Failed => "job failed".to_string(),
            JobStage::Cancelled => "cancelled".to_string(),
        }
    }
}

#[derive(Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<Uuid, JobRecord>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_jobs(&self) -> RwLockReadGuard<'_, HashMap<Uuid, JobRecord>> {
        match self.jobs.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Job store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write_jobs(&self) -> RwLockWriteGuard<'_, HashMap<Uuid, JobRecord>> {
        match self.jobs.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Job store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    pub fn insert(&self, record: JobRecord) {
        self.write_jobs().insert(record.id, record);
    }

    /// Runs `f` on the record under the write lock. `f` must not call back
    /// into the store.
    pub fn with_job_mut<R>(&self, id: Uuid, f: impl FnOnce(&mut JobRecord) -> R) -> Option<R> {
        self.write_jobs().get_mut(&id).map(f)
    }

    pub fn status(&self, id: Uuid) -> Result<JobStatusReport, JobError> {
        self.read_jobs()
            .get(&id)
            .map(JobRecord::status)
            .ok_or(JobError::UnknownJob(id))
    }

    pub fn result(&self, id: Uuid) -> Result<LedgerResult, JobError> {
        let jobs = self.read_jobs();
        let record = jobs.get(&id).ok_or(JobError::UnknownJob(id))?;
        record.result.clone().ok_or(JobError::NotCompleted {
            id,
            stage: record.stage,
        })
    }

    /// Removes a job. A still-running job has its cancel flag set first so
    /// in-flight calls stop.
    pub fn remove(&self, id: Uuid) -> Result<(), JobError> {
        let mut jobs = self.write_jobs();
        let record = jobs.get_mut(&id).ok_or(JobError::UnknownJob(id))?;
        if !record.stage.is_terminal() {
            record.finish_cancelled();
        }
        jobs.remove(&id);
        Ok(())
    }

    pub fn counts(&self) -> JobCounts {
        let jobs = self.read_jobs();
        let mut counts = JobCounts::default();
        for record in jobs.values() {
            match record.stage {
                JobStage::Completed => counts.completed += 1,
                JobStage::Failed => counts.failed += 1,
                JobStage::Cancelled => counts.cancelled += 1,
                _ => counts.active += 1,
            }
        }
        counts
    }

    /// Fails every running job that has outlived `budget`; returns their ids.
    pub fn expire_over_budget(&self, budget: Duration) -> Vec<Uuid> {
        let mut jobs = self.write_jobs();
        let mut expired = Vec::new();
        for (id, record) in jobs.iter_mut() {
            if record.over_budget(budget) {
                record.fail(FailureKind::Budget, "Job wall-clock budget exceeded");
                expired.push(*id);
            }
        }
        expired
    }

    /// Evicts terminal jobs older than `retention`; returns their ids.
    pub fn sweep_expired(&self, retention: Duration) -> Vec<Uuid> {
        let mut jobs = self.write_jobs();
        let expired: Vec<Uuid> = jobs
            .iter()
            .filter(|(_, record)| record.expired(retention))
            .map(|(id, _)| *id)
            .collect();
        for id in &expired {
            jobs.remove(id);
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::LedgerSummary;

    fn chunks(n: usize) -> Vec<PlannedChunk> {
        (0..n)
            .map(|index| PlannedChunk {
                index,
                page_start: index + 1,
                page_end: index + 1,
                byte_size: 100,
            })
            .collect()
    }

    fn record(n_chunks: usize) -> JobRecord {
        JobRecord::new(Uuid::new_v4(), DocType::Passbook, &chunks(n_chunks))
    }

    fn empty_result() -> LedgerResult {
        LedgerResult {
            transactions: Vec::new(),
            summary: LedgerSummary::default(),
        }
    }

    #[test]
    fn unknown_job_reports_an_error() {
        let store = JobStore::new();
        let id = Uuid::new_v4();
        assert!(matches!(store.status(id), Err(JobError::UnknownJob(_))));
        assert!(matches!(store.result(id), Err(JobError::UnknownJob(_))));
        assert!(store.remove(id).is_err());
    }

    #[test]
    fn percent_tracks_chunk_completion_then_stages() {
        let store = JobStore::new();
        let rec = record(4);
        let id = rec.id;
        store.insert(rec);

        assert_eq!(store.status(id).unwrap().percent, 0);

        store.with_job_mut(id, |job| {
            job.stage = JobStage::Dispatching;
            job.tasks[0].status = TaskStatus::Succeeded;
            job.tasks[1].status = TaskStatus::Succeeded;
        });
        let report = store.status(id).unwrap();
        assert_eq!(report.percent, 45);
        assert_eq!(report.detail, "2/4 chunks analyzed");

        store.with_job_mut(id, |job| job.stage = JobStage::Correcting);
        assert_eq!(store.status(id).unwrap().percent, 95);

        store.with_job_mut(id, |job| job.complete(empty_result()));
        assert_eq!(store.status(id).unwrap().percent, 100);
    }

    #[test]
    fn result_before_completion_reports_the_stage() {
        let store = JobStore::new();
        let rec = record(1);
        let id = rec.id;
        store.insert(rec);
        store.with_job_mut(id, |job| job.stage = JobStage::Dispatching);

        match store.result(id) {
            Err(JobError::NotCompleted { stage, .. }) => {
                assert_eq!(stage, JobStage::Dispatching);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn first_terminal_transition_wins() {
        let mut rec = record(1);
        rec.fail(FailureKind::Provider, "chunk rejected");
        rec.complete(empty_result());
        rec.finish_cancelled();
        assert_eq!(rec.stage, JobStage::Failed);
        assert!(rec.result.is_none());
        assert_eq!(rec.failure.as_ref().unwrap().kind, FailureKind::Provider);
    }

    #[test]
    fn failing_sets_the_shared_cancel_flag() {
        let mut rec = record(2);
        let flag = rec.cancel_flag();
        assert!(!flag.load(Ordering::Relaxed));
        rec.fail(FailureKind::Budget, "over budget");
        assert!(flag.load(Ordering::Relaxed));
    }

    #[test]
    fn failed_status_carries_kind_and_message() {
        let mut rec = record(1);
        rec.fail(FailureKind::Provider, "chunk 0 rejected");
        let report = rec.status();
        assert_eq!(report.stage, JobStage::Failed);
        assert_eq!(report.error.as_deref(), Some("provider: chunk 0 rejected"));
    }

    #[test]
    fn removing_a_running_job_cancels_it_first() {
        let store = JobStore::new();
        let rec = record(1);
        let id = rec.id;
        let flag = rec.cancel_flag();
        store.insert(rec);
        store.with_job_mut(id, |job| job.stage = JobStage::Dispatching);

        store.remove(id).unwrap();
        assert!(flag.load(Ordering::Relaxed));
        assert!(store.status(id).is_err());
    }

    #[test]
    fn budget_expiry_only_touches_running_jobs() {
        let store = JobStore::new();
        let running = record(1);
        let running_id = running.id;
        let mut done = record(1);
        done.complete(empty_result());
        let done_id = done.id;
        store.insert(running);
        store.insert(done);

        let expired = store.expire_over_budget(Duration::ZERO);
        assert_eq!(expired, vec![running_id]);
        assert_eq!(store.status(running_id).unwrap().stage, JobStage::Failed);
        assert_eq!(store.status(done_id).unwrap().stage, JobStage::Completed);
    }

    #[test]
    fn retention_sweep_evicts_only_finished_jobs() {
        let store = JobStore::new();
        let running = record(1);
        let running_id = running.id;
        let mut done = record(1);
        done.complete(empty_result());
        let done_id = done.id;
        store.insert(running);
        store.insert(done);

        let swept = store.sweep_expired(Duration::ZERO);
        assert_eq!(swept, vec![done_id]);
        assert!(store.status(done_id).is_err());
        assert!(store.status(running_id).is_ok());

        let counts = store.counts();
        assert_eq!(counts.active, 1);
        assert_eq!(counts.completed, 0);
    }

    #[test]
    fn counts_partition_by_stage() {
        let store = JobStore::new();
        store.insert(record(1));
        let mut failed = record(1);
        failed.fail(FailureKind::Internal, "boom");
        store.insert(failed);
        let mut cancelled = record(1);
        cancelled.finish_cancelled();
        store.insert(cancelled);

        let counts = store.counts();
        assert_eq!(counts.active, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.cancelled, 1);
    }
}
