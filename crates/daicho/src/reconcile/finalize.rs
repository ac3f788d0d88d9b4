//! Final ledger pass: every retained row carries exactly one amount.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::reconcile::within_tolerance;
use crate::statement::{Transaction, Verification};

/// Note for two-sided rows that continuity resolved to a single side.
pub const RESOLVE_NOTE: &str = "balance-continuity resolve";

/// Note for two-sided rows nothing could resolve; kept as reported.
pub const AMBIGUOUS_NOTE: &str = "ambiguous-direction";

/// Outcome counts for a finalized ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSummary {
    /// Retained transactions.
    pub total: usize,
    /// Continuity confirmed the reported direction.
    pub balance_verified: usize,
    /// Continuity swapped or resolved the amount fields.
    pub balance_corrected: usize,
    /// Direction established by a keyword rule.
    pub heuristic_corrected: usize,
    /// Rows kept without verification, including undated and boundary rows.
    pub unverified: usize,
    /// Zero-amount rows dropped as print artifacts.
    pub dropped: usize,
}

/// Enforces the single-sided amount invariant and tallies the summary.
///
/// Rows with both amounts zero are print artifacts (carryover lines, stamps,
/// headers read as rows) and are dropped. Rows with both amounts non-zero
/// are tested against the running balance: when exactly one single-sided
/// reading restores continuity it is applied, otherwise the row is kept as
/// reported and flagged. Row order is preserved throughout.
pub fn finalize(rows: Vec<Transaction>, tolerance: i64) -> (Vec<Transaction>, LedgerSummary) {
    let mut summary = LedgerSummary::default();
    let mut out = Vec::with_capacity(rows.len());
    let mut running: Option<i64> = None;

    for mut tx in rows {
        if tx.withdrawal == 0 && tx.deposit == 0 {
            debug!(
                "Dropping zero-amount row at chunk {} line {}",
                tx.source.chunk_index, tx.source.line_index
            );
            summary.dropped += 1;
            // Its reported balance still re-anchors the chain.
            if tx.balance.is_some() {
                running = tx.balance;
            }
            continue;
        }

        if tx.withdrawal != 0 && tx.deposit != 0 {
            resolve_two_sided(&mut tx, running, tolerance);
        }

        // Advance the chain the same way correction does: reported balances
        // win, a dated row's net effect rolls forward, anything else breaks.
        running = match (tx.balance, running, tx.date) {
            (Some(reported), _, _) => Some(reported),
            (None, Some(rb), Some(_)) => Some(rb + tx.signed_amount()),
            _ => None,
        };

        tally(&mut summary, &tx);
        out.push(tx);
    }

    summary.total = out.len();
    (out, summary)
}

fn resolve_two_sided(tx: &mut Transaction, running: Option<i64>, tolerance: i64) {
    let (rb, reported) = match (tx.date.and(running), tx.balance) {
        (Some(rb), Some(reported)) => (rb, reported),
        _ => {
            mark_ambiguous(tx);
            return;
        }
    };

    let withdrawal_only = within_tolerance(rb - tx.withdrawal, reported, tolerance);
    let deposit_only = within_tolerance(rb + tx.deposit, reported, tolerance);

    match (withdrawal_only, deposit_only) {
        (true, false) => {
            tx.deposit = 0;
            tx.verification = Verification::Balance;
            tx.correction_note = Some(RESOLVE_NOTE.to_string());
        }
        (false, true) => {
            tx.withdrawal = 0;
            tx.verification = Verification::Balance;
            tx.correction_note = Some(RESOLVE_NOTE.to_string());
        }
        _ => mark_ambiguous(tx),
    }
}

fn mark_ambiguous(tx: &mut Transaction) {
    tx.verification = Verification::Unverified;
    tx.correction_note = Some(AMBIGUOUS_NOTE.to_string());
}

fn tally(summary: &mut LedgerSummary, tx: &Transaction) {
    match &tx.verification {
        Verification::Balance => {
            if tx.correction_note.is_some() {
                summary.balance_corrected += 1;
            } else {
                summary.balance_verified += 1;
            }
        }
        Verification::Heuristic(_) => summary.heuristic_corrected += 1,
        Verification::Unverified | Verification::BoundaryUnverified => summary.unverified += 1,
    }
}
