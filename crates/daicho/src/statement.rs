//! Core data model for reconstructed passbook and statement ledgers.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Position of a row within the chunked source document.
///
/// Sorting by `(chunk_index, line_index)` restores the reading order of the
/// original document no matter in which order chunks finished.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct SourceRef {
    pub chunk_index: usize,
    pub line_index: usize,
}

impl SourceRef {
    pub fn new(chunk_index: usize, line_index: usize) -> Self {
        Self {
            chunk_index,
            line_index,
        }
    }
}

/// One row exactly as the OCR provider returned it, before any interpretation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTransactionRow {
    pub source: SourceRef,
    pub date_text: String,
    pub description: String,
    pub withdrawal_text: String,
    pub deposit_text: String,
    pub balance_text: Option<String>,
    #[serde(default)]
    pub low_confidence: bool,
}

/// A raw row with its date resolved to the Gregorian calendar, when possible.
#[derive(Debug, Clone, PartialEq)]
pub struct DatedRow {
    pub row: RawTransactionRow,
    pub date: Option<NaiveDate>,
}

/// How a transaction's direction was established.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verification {
    /// The reported balance matched the running balance computation.
    Balance,
    /// A keyword heuristic decided the direction; carries the rule name.
    Heuristic(String),
    /// No balance context and no heuristic match; kept as reported.
    Unverified,
    /// First row after a chunk boundary with no usable predecessor balance.
    BoundaryUnverified,
}

impl fmt::Display for Verification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verification::Balance => write!(f, "balance"),
            Verification::Heuristic(rule) => write!(f, "heuristic:{rule}"),
            Verification::Unverified => write!(f, "unverified"),
            Verification::BoundaryUnverified => write!(f, "boundary_unverified"),
        }
    }
}

/// A reconstructed ledger entry.
///
/// Amounts are yen in signed integer form. After finalization exactly one of
/// `withdrawal` and `deposit` is non-zero for every retained row unless the
/// row carries an explicit ambiguity note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Resolved Gregorian date. `None` when the date text never resolved;
    /// such rows are excluded from continuity checks but retained.
    pub date: Option<NaiveDate>,
    pub description: String,
    pub withdrawal: i64,
    pub deposit: i64,
    /// Balance as reported on the row itself, when it parsed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<i64>,
    pub verification: Verification,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correction_note: Option<String>,
    #[serde(default)]
    pub low_confidence: bool,
    pub source: SourceRef,
}

impl Transaction {
    /// Net effect of the row on the account: deposits add, withdrawals subtract.
    pub fn signed_amount(&self) -> i64 {
        self.deposit - self.withdrawal
    }
}
