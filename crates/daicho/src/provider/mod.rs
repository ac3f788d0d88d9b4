//! OCR provider abstraction: one call analyzes one chunk of whole pages.

pub mod rest;

pub use rest::RestOcrProvider;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::document::DocType;

/// One chunk analysis request. Pages are always whole; a chunk never carries
/// partial-page content.
#[derive(Debug)]
pub struct AnalyzeRequest<'a> {
    pub doc_type: DocType,
    /// Encoded page buffers for this chunk, in page order.
    pub pages: &'a [Vec<u8>],
    /// 1-based inclusive range within the source document.
    pub page_start: usize,
    pub page_end: usize,
}

/// One transaction row as recognized by the provider, all fields verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRow {
    pub date_text: String,
    pub description: String,
    pub withdrawal_text: String,
    pub deposit_text: String,
    #[serde(default)]
    pub balance_text: Option<String>,
    #[serde(default)]
    pub low_confidence: bool,
}

/// Decoded rows for one chunk. `degraded` is set when some row elements were
/// undecodable and had to be dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkPayload {
    pub rows: Vec<RawRow>,
    pub degraded: bool,
}

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("OCR call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Provider rate limited the call")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Provider returned a malformed payload: {0}")]
    Malformed(String),

    #[error("Provider rejected the chunk: {0}")]
    Rejected(String),

    #[error("Transport failure: {0}")]
    Transport(String),
}

impl ProviderError {
    /// Transient failures are retried with backoff; the rest fail the chunk
    /// on first sight.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::Timeout(_)
                | ProviderError::RateLimited { .. }
                | ProviderError::Transport(_)
        )
    }

    /// Provider-requested minimum delay before the next attempt, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ProviderError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// A synchronous OCR client. Implementations are shared across worker
/// threads and must tolerate concurrent calls.
pub trait OcrProvider: Send + Sync {
    fn analyze(&self, request: AnalyzeRequest<'_>) -> Result<ChunkPayload, ProviderError>;
}
