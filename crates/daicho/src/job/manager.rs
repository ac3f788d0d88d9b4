//! Job lifecycle orchestration: submit, dispatch, collect, reconcile.
//!
//! `submit` plans chunks and hands them to the worker pool, then returns.
//! A collector thread drains chunk outcomes, runs the reconciliation
//! pipeline once a job's last chunk lands, and does the periodic budget
//! and retention sweeps. Outcomes arriving for jobs that already reached
//! a terminal stage are dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use log::{debug, error, info, warn};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::config::Config;
use crate::document::SourceDocument;
use crate::error::{JobError, Result};
use crate::job::events::{JobEventBroadcaster, JobProgressEvent};
use crate::job::store::{JobCounts, JobRecord, JobStatusReport, JobStore};
use crate::job::task::{FailureKind, JobStage, TaskStatus};
use crate::pipeline::{LedgerPipeline, LedgerResult, ProgressEvent, ProgressReporter};
use crate::plan::plan_chunks;
use crate::provider::{ChunkPayload, OcrProvider};
use crate::sanitize;
use crate::worker::{ChunkCall, ChunkDisposition, ChunkOutcome, RetryPolicy, WorkerPool};

/// How often the collector wakes for budget and retention sweeps.
const COLLECT_TICK: Duration = Duration::from_millis(200);

/// Operational knobs, usually extracted from [`Config`].
#[derive(Debug, Clone, Copy)]
pub struct ManagerSettings {
    pub max_chunk_bytes: usize,
    pub max_pages_per_chunk: usize,
    pub worker_count: usize,
    pub retry: RetryPolicy,
    /// Wall-clock budget per job, submission to completion.
    pub job_budget: Duration,
    /// How long finished jobs stay queryable.
    pub retention: Duration,
    pub balance_tolerance: i64,
}

impl ManagerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_chunk_bytes: config.chunking.max_chunk_bytes,
            max_pages_per_chunk: config.chunking.max_pages_per_chunk,
            worker_count: config.workers.count,
            retry: RetryPolicy {
                max_retries: config.workers.retry_count,
                base_delay: Duration::from_millis(config.workers.retry_backoff_ms),
            },
            job_budget: Duration::from_secs(config.jobs.budget_secs),
            retention: Duration::from_secs(config.jobs.retention_secs),
            balance_tolerance: config.reconcile.balance_tolerance,
        }
    }
}

pub struct JobManager {
    store: Arc<JobStore>,
    pool: WorkerPool,
    broadcaster: JobEventBroadcaster,
    settings: ManagerSettings,
    shutdown: Arc<AtomicBool>,
    collector: Option<JoinHandle<()>>,
}

impl JobManager {
    pub fn new(config: &Config, provider: Arc<dyn OcrProvider>) -> Self {
        Self::with_settings(ManagerSettings::from_config(config), provider)
    }

    pub fn with_settings(settings: ManagerSettings, provider: Arc<dyn OcrProvider>) -> Self {
        let store = Arc::new(JobStore::new());
        let broadcaster = JobEventBroadcaster::default();
        let pool = WorkerPool::new(provider, settings.worker_count, settings.retry);
        let shutdown = Arc::new(AtomicBool::new(false));

        let collector = {
            let store = Arc::clone(&store);
            let broadcaster = broadcaster.clone();
            let outcomes = pool.outcomes();
            let shutdown = Arc::clone(&shutdown);
            thread::spawn(move || run_collector(store, broadcaster, outcomes, shutdown, settings))
        };

        Self {
            store,
            pool,
            broadcaster,
            settings,
            shutdown,
            collector: Some(collector),
        }
    }

    /// Plans the document into chunks and dispatches them. Returns the job
    /// id immediately; progress arrives via [`subscribe`](Self::subscribe)
    /// or [`status`](Self::status).
    pub fn submit(&self, document: SourceDocument) -> Result<Uuid> {
        let chunks = plan_chunks(
            &document.page_sizes(),
            self.settings.max_chunk_bytes,
            self.settings.max_pages_per_chunk,
        )?;

        let id = Uuid::new_v4();
        let record = JobRecord::new(id, document.doc_type(), &chunks);
        let cancel_flag = record.cancel_flag();
        let deadline = Instant::now() + self.settings.job_budget;
        self.store.insert(record);

        info!(
            "Job {} submitted: {} {} pages in {} chunks",
            sanitize::short_id(&id),
            document.page_count(),
            document.doc_type(),
            chunks.len()
        );

        let document = Arc::new(document);
        for chunk in &chunks {
            let call = ChunkCall {
                job_id: id,
                chunk_index: chunk.index,
                document: Arc::clone(&document),
                page_start: chunk.page_start,
                page_end: chunk.page_end,
                cancelled: Arc::clone(&cancel_flag),
                deadline,
            };
            if let Err(e) = self.pool.submit(call) {
                self.store.with_job_mut(id, |job| {
                    job.fail(FailureKind::Internal, format!("Dispatch failed: {e}"))
                });
                self.broadcast(id);
                return Err(e.into());
            }
        }

        self.store.with_job_mut(id, |job| {
            job.stage = JobStage::Dispatching;
            for task in &mut job.tasks {
                task.status = TaskStatus::Running;
            }
        });
        self.broadcast(id);
        Ok(id)
    }

    pub fn status(&self, id: Uuid) -> Result<JobStatusReport> {
        Ok(self.store.status(id)?)
    }

    pub fn result(&self, id: Uuid) -> Result<LedgerResult> {
        Ok(self.store.result(id)?)
    }

    /// Requests cancellation. In-flight provider calls are not interrupted;
    /// their outcomes are dropped when they land.
    pub fn cancel(&self, id: Uuid) -> Result<()> {
        let cancelled = self
            .store
            .with_job_mut(id, |job| {
                if job.stage.is_terminal() {
                    false
                } else {
                    job.finish_cancelled();
                    true
                }
            })
            .ok_or(JobError::UnknownJob(id))?;
        if cancelled {
            info!("Job {} cancelled", sanitize::short_id(&id));
            self.broadcast(id);
        }
        Ok(())
    }

    pub fn delete(&self, id: Uuid) -> Result<()> {
        Ok(self.store.remove(id)?)
    }

    pub fn counts(&self) -> JobCounts {
        self.store.counts()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobProgressEvent> {
        self.broadcaster.subscribe()
    }

    fn broadcast(&self, id: Uuid) {
        broadcast_status(&self.store, &self.broadcaster, id);
    }

    /// Stops the collector and the worker pool, waiting for both.
    pub fn shutdown(mut self) {
        info!("Shutting down job manager...");
        self.shutdown.store(true, Ordering::Relaxed);
        self.pool.shutdown();
        if let Some(collector) = self.collector.take() {
            if collector.join().is_err() {
                error!("Collector thread panicked");
            }
        }
        self.pool.wait();
    }
}

fn broadcast_status(store: &JobStore, broadcaster: &JobEventBroadcaster, id: Uuid) {
    if let Ok(report) = store.status(id) {
        broadcaster.send(JobProgressEvent::from_report(id, &report));
    }
}

fn run_collector(
    store: Arc<JobStore>,
    broadcaster: JobEventBroadcaster,
    outcomes: Receiver<ChunkOutcome>,
    shutdown: Arc<AtomicBool>,
    settings: ManagerSettings,
) {
    debug!("Collector started");
    loop {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }
        match outcomes.recv_timeout(COLLECT_TICK) {
            Ok(outcome) => handle_outcome(&store, &broadcaster, settings, outcome),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        for id in store.expire_over_budget(settings.job_budget) {
            warn!("Job {} exceeded its wall-clock budget", sanitize::short_id(&id));
            broadcast_status(&store, &broadcaster, id);
        }
        for id in store.sweep_expired(settings.retention) {
            debug!("Evicted job {} after retention window", sanitize::short_id(&id));
        }
    }
    debug!("Collector stopped");
}

fn handle_outcome(
    store: &Arc<JobStore>,
    broadcaster: &JobEventBroadcaster,
    settings: ManagerSettings,
    outcome: ChunkOutcome,
) {
    let ChunkOutcome {
        job_id,
        chunk_index,
        attempts,
        disposition,
    } = outcome;

    let ready = store
        .with_job_mut(job_id, |job| {
            if job.stage.is_terminal() {
                debug!(
                    "Dropping late outcome for terminal job {} chunk {}",
                    sanitize::short_id(&job_id),
                    chunk_index
                );
                return None;
            }
            let task = &mut job.tasks[chunk_index];
            task.attempts = attempts;
            match disposition {
                ChunkDisposition::Succeeded(payload) => {
                    task.status = TaskStatus::Succeeded;
                    task.payload = Some(payload);
                    if job.all_chunks_succeeded() {
                        job.stage = JobStage::Merging;
                        // Payloads move out; the merge step owns them now.
                        Some(
                            job.tasks
                                .iter_mut()
                                .map(|t| (t.index, t.payload.take().unwrap_or_default()))
                                .collect::<Vec<(usize, ChunkPayload)>>(),
                        )
                    } else {
                        None
                    }
                }
                ChunkDisposition::Failed(err) => {
                    task.status = TaskStatus::Failed;
                    job.fail(
                        FailureKind::Provider,
                        format!("Chunk {chunk_index} failed after {attempts} attempts: {err}"),
                    );
                    None
                }
                ChunkDisposition::Cancelled => {
                    // The cancel flag was set first, so the job is already
                    // terminal or about to be; nothing to record.
                    None
                }
                ChunkDisposition::DeadlineExceeded => {
                    task.status = TaskStatus::Failed;
                    job.fail(FailureKind::Budget, "Job wall-clock budget exceeded");
                    None
                }
            }
        })
        .flatten();

    broadcast_status(store, broadcaster, job_id);

    if let Some(chunks) = ready {
        run_reconciliation(store, broadcaster, settings, job_id, chunks);
    }
}

/// Runs the pipeline outside the store lock and writes the result back,
/// unless the job went terminal in the meantime.
fn run_reconciliation(
    store: &Arc<JobStore>,
    broadcaster: &JobEventBroadcaster,
    settings: ManagerSettings,
    job_id: Uuid,
    chunks: Vec<(usize, ChunkPayload)>,
) {
    let Some(reference) = store.with_job_mut(job_id, |job| job.submitted_at.date_naive()) else {
        return;
    };

    let pipeline = LedgerPipeline::new(reference, settings.balance_tolerance);
    let progress = CollectorProgress {
        store,
        broadcaster,
        job_id,
    };
    let (result, _ctx) = pipeline.run(job_id, chunks, &progress);

    let stored = store
        .with_job_mut(job_id, |job| {
            if job.stage.is_terminal() {
                false
            } else {
                job.complete(result);
                true
            }
        })
        .unwrap_or(false);
    if stored {
        info!("Job {} completed", sanitize::short_id(&job_id));
    }
    broadcast_status(store, broadcaster, job_id);
}

/// Bridges pipeline stage transitions into the store and the event stream.
struct CollectorProgress<'a> {
    store: &'a Arc<JobStore>,
    broadcaster: &'a JobEventBroadcaster,
    job_id: Uuid,
}

impl ProgressReporter for CollectorProgress<'_> {
    fn report(&self, event: ProgressEvent) {
        let ProgressEvent::Stage { stage, .. } = event;
        self.store.with_job_mut(self.job_id, |job| {
            if !job.stage.is_terminal() {
                job.stage = stage;
            }
        });
        broadcast_status(self.store, self.broadcaster, self.job_id);
    }
}
