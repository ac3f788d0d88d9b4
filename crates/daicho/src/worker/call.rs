//! The unit of work the pool executes: one OCR call for one chunk.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::document::SourceDocument;
use crate::provider::{ChunkPayload, ProviderError};

/// One chunk dispatch: everything a worker needs to call the provider.
#[derive(Clone)]
pub struct ChunkCall {
    pub job_id: Uuid,
    pub chunk_index: usize,
    pub document: Arc<SourceDocument>,
    /// 1-based inclusive page range within the document.
    pub page_start: usize,
    pub page_end: usize,
    /// Cooperative cancellation, checked before every attempt and during
    /// backoff. Shared with all calls of the same job.
    pub cancelled: Arc<AtomicBool>,
    /// Job-level wall-clock cutoff; no attempt starts past it.
    pub deadline: Instant,
}

/// Retry behavior for transient provider errors.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Backoff before retrying after failed attempt `attempt` (1-based):
    /// base, 2x base, 4x base and so on.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay * (1u32 << exponent)
    }
}

/// What became of one chunk dispatch, reported back to the collector.
#[derive(Debug)]
pub struct ChunkOutcome {
    pub job_id: Uuid,
    pub chunk_index: usize,
    /// Provider calls actually made, including the successful one.
    pub attempts: u32,
    pub disposition: ChunkDisposition,
}

#[derive(Debug)]
pub enum ChunkDisposition {
    Succeeded(ChunkPayload),
    Failed(ProviderError),
    /// The job's cancel flag was set before an attempt could start.
    Cancelled,
    /// The job budget ran out before an attempt could start.
    DeadlineExceeded,
}
