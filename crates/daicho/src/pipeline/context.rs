//! Mutable state threaded through the reconciliation steps.

use crate::provider::ChunkPayload;
use crate::statement::{DatedRow, RawTransactionRow, Transaction};

/// Carries each step's output so later steps, and tests, can inspect the
/// intermediate stages of a run.
pub struct LedgerContext {
    /// Input: per-chunk payloads keyed by chunk index, in completion order.
    pub chunks: Vec<(usize, ChunkPayload)>,
    /// Set by the merge step: rows in document order.
    pub raw_rows: Option<Vec<RawTransactionRow>>,
    /// Set by the date step: rows with resolved Gregorian dates.
    pub dated: Option<Vec<DatedRow>>,
    /// Set by the correction step: direction-verified transactions.
    pub corrected: Option<Vec<Transaction>>,
}

impl LedgerContext {
    pub fn new(chunks: Vec<(usize, ChunkPayload)>) -> Self {
        Self {
            chunks,
            raw_rows: None,
            dated: None,
            corrected: None,
        }
    }
}
