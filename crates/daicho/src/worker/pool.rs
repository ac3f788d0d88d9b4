//! Pool of OS threads driving OCR calls against the provider.
//!
//! Workers pull [`ChunkCall`]s off a shared channel, run the provider call
//! with retry and backoff, and push a [`ChunkOutcome`] for the collector.
//! Shutdown is cooperative: a flag plus a receive timeout, so a worker
//! stuck waiting for work notices within ~100ms.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info, warn};

use crate::error::WorkerError;
use crate::provider::{AnalyzeRequest, OcrProvider};
use crate::worker::call::{ChunkCall, ChunkDisposition, ChunkOutcome, RetryPolicy};

/// Sleep slice while backing off, so cancellation stays responsive.
const BACKOFF_SLICE: Duration = Duration::from_millis(50);

pub struct WorkerPool {
    call_sender: Sender<ChunkCall>,
    outcome_receiver: Receiver<ChunkOutcome>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    /// Spawns `worker_count` threads sharing one provider.
    ///
    /// # Panics
    ///
    /// Panics if `worker_count` is 0.
    pub fn new(provider: Arc<dyn OcrProvider>, worker_count: usize, retry: RetryPolicy) -> Self {
        assert!(worker_count > 0, "worker_count must be greater than 0");

        // Calls queue without blocking submission; a job submits at most a
        // handful of chunks at once.
        let (call_sender, call_receiver) = unbounded::<ChunkCall>();
        let (outcome_sender, outcome_receiver) = unbounded::<ChunkOutcome>();
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let call_rx = call_receiver.clone();
            let outcome_tx = outcome_sender.clone();
            let shutdown_flag = Arc::clone(&shutdown);
            let worker_provider = Arc::clone(&provider);
            let handle = thread::spawn(move || {
                run_worker(
                    worker_id,
                    call_rx,
                    outcome_tx,
                    shutdown_flag,
                    worker_provider,
                    retry,
                );
            });
            workers.push(handle);
        }

        info!("Started {} OCR workers", worker_count);
        Self {
            call_sender,
            outcome_receiver,
            workers,
            shutdown,
        }
    }

    pub fn submit(&self, call: ChunkCall) -> Result<(), WorkerError> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(WorkerError::PoolShutdown);
        }
        self.call_sender
            .send(call)
            .map_err(|_| WorkerError::ChannelClosed)
    }

    /// Receiver half of the outcome channel, for a collector thread.
    pub fn outcomes(&self) -> Receiver<ChunkOutcome> {
        self.outcome_receiver.clone()
    }

    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Blocks until all workers have exited. Call [`shutdown`](Self::shutdown)
    /// first, or this waits for the call channel to disconnect.
    pub fn wait(self) {
        drop(self.call_sender);
        for (worker_id, worker) in self.workers.into_iter().enumerate() {
            if worker.join().is_err() {
                error!("Worker {} panicked", worker_id);
            } else {
                debug!("Worker {} finished", worker_id);
            }
        }
        info!("All OCR workers have stopped");
    }
}

fn run_worker(
    worker_id: usize,
    call_receiver: Receiver<ChunkCall>,
    outcome_sender: Sender<ChunkOutcome>,
    shutdown: Arc<AtomicBool>,
    provider: Arc<dyn OcrProvider>,
    retry: RetryPolicy,
) {
    debug!("Worker {} started", worker_id);
    loop {
        if shutdown.load(Ordering::Relaxed) {
            debug!("Worker {} observed shutdown", worker_id);
            break;
        }
        match call_receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(call) => {
                let outcome = process_call(provider.as_ref(), &call, retry, &shutdown);
                if outcome_sender.send(outcome).is_err() {
                    error!("Worker {}: outcome channel closed, stopping", worker_id);
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                debug!("Worker {}: call channel disconnected", worker_id);
                break;
            }
        }
    }
    debug!("Worker {} stopped", worker_id);
}

fn process_call(
    provider: &dyn OcrProvider,
    call: &ChunkCall,
    retry: RetryPolicy,
    shutdown: &AtomicBool,
) -> ChunkOutcome {
    let mut attempts = 0u32;
    loop {
        if call.cancelled.load(Ordering::Relaxed) || shutdown.load(Ordering::Relaxed) {
            return outcome(call, attempts, ChunkDisposition::Cancelled);
        }
        if Instant::now() >= call.deadline {
            return outcome(call, attempts, ChunkDisposition::DeadlineExceeded);
        }

        attempts += 1;
        let request = AnalyzeRequest {
            doc_type: call.document.doc_type(),
            pages: call.document.pages_in(call.page_start, call.page_end),
            page_start: call.page_start,
            page_end: call.page_end,
        };
        match provider.analyze(request) {
            Ok(payload) => {
                debug!(
                    "Chunk {} of job {} analyzed: {} rows (attempt {})",
                    call.chunk_index,
                    call.job_id,
                    payload.rows.len(),
                    attempts
                );
                return outcome(call, attempts, ChunkDisposition::Succeeded(payload));
            }
            Err(err) if err.is_transient() && attempts <= retry.max_retries => {
                let delay = retry
                    .backoff(attempts)
                    .max(err.retry_after().unwrap_or_default());
                warn!(
                    "Chunk {} of job {} failed transiently on attempt {}, retrying in {:?}: {}",
                    call.chunk_index, call.job_id, attempts, delay, err
                );
                // An interrupted backoff re-enters the loop, which reports
                // the interruption reason from the flag checks at the top.
                backoff(delay, call, shutdown);
            }
            Err(err) => {
                return outcome(call, attempts, ChunkDisposition::Failed(err));
            }
        }
    }
}

/// Sleeps `delay` in short slices, cutting out early on cancellation,
/// shutdown, or an expired deadline.
fn backoff(delay: Duration, call: &ChunkCall, shutdown: &AtomicBool) {
    let until = Instant::now() + delay;
    loop {
        let remaining = until.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return;
        }
        if call.cancelled.load(Ordering::Relaxed)
            || shutdown.load(Ordering::Relaxed)
            || Instant::now() >= call.deadline
        {
            return;
        }
        thread::sleep(remaining.min(BACKOFF_SLICE));
    }
}

fn outcome(call: &ChunkCall, attempts: u32, disposition: ChunkDisposition) -> ChunkOutcome {
    ChunkOutcome {
        job_id: call.job_id,
        chunk_index: call.chunk_index,
        attempts,
        disposition,
    }
}
