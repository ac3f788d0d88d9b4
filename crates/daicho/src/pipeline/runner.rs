//! The sequential reconciliation pipeline a job runs once all of its chunks
//! have come back from the provider.
//!
//! Steps: merge chunk payloads into document order, resolve dates, verify
//! and correct directions against the running balance, finalize. The
//! pipeline itself cannot fail; unresolvable rows are flagged data, not
//! errors.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info_span};
use uuid::Uuid;

use crate::dates::DateResolver;
use crate::job::JobStage;
use crate::pipeline::context::LedgerContext;
use crate::pipeline::progress::{ProgressEvent, ProgressReporter};
use crate::provider::ChunkPayload;
use crate::reconcile::{assemble, correct, finalize, LedgerSummary};
use crate::sanitize;
use crate::statement::{DatedRow, RawTransactionRow, SourceRef, Transaction, Verification};

/// The finalized ledger for one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerResult {
    pub transactions: Vec<Transaction>,
    pub summary: LedgerSummary,
}

pub struct LedgerPipeline {
    /// Upper bound for date inference; dates never resolve past it.
    reference: NaiveDate,
    /// Slack allowed in balance continuity comparisons, in yen.
    tolerance: i64,
}

impl LedgerPipeline {
    pub fn new(reference: NaiveDate, tolerance: i64) -> Self {
        Self {
            reference,
            tolerance,
        }
    }

    pub fn run(
        &self,
        job_id: Uuid,
        chunks: Vec<(usize, ChunkPayload)>,
        progress: &dyn ProgressReporter,
    ) -> (LedgerResult, LedgerContext) {
        let _pipeline_span = info_span!("ledger_pipeline", job_id = %job_id).entered();
        let mut ctx = LedgerContext::new(chunks);

        {
            let _step_span = info_span!("merge_chunks").entered();
            progress.report(ProgressEvent::Stage {
                stage: JobStage::Merging,
                detail: "Merging chunk results".to_string(),
            });
            self.step_merge(&mut ctx);
        }

        {
            let _step_span = info_span!("resolve_dates").entered();
            self.step_resolve_dates(&mut ctx);
        }

        {
            let _step_span = info_span!("correct_directions").entered();
            progress.report(ProgressEvent::Stage {
                stage: JobStage::Correcting,
                detail: "Verifying balance continuity".to_string(),
            });
            self.step_correct(&mut ctx);
        }

        let (transactions, summary) = {
            let _step_span = info_span!("finalize_ledger").entered();
            progress.report(ProgressEvent::Stage {
                stage: JobStage::Exporting,
                detail: "Finalizing ledger".to_string(),
            });
            finalize(
                ctx.corrected.clone().expect("correction step ran"),
                self.tolerance,
            )
        };

        for tx in transactions.iter().filter(|tx| {
            matches!(
                tx.verification,
                Verification::Unverified | Verification::BoundaryUnverified
            )
        }) {
            debug!(
                "Row {}:{} left {} ({})",
                tx.source.chunk_index,
                tx.source.line_index,
                tx.verification,
                sanitize::redact_description(&tx.description)
            );
        }

        (
            LedgerResult {
                transactions,
                summary,
            },
            ctx,
        )
    }

    /// Orders chunks by index and flattens their rows, stamping each with a
    /// source reference. A degraded chunk marks all of its rows.
    fn step_merge(&self, ctx: &mut LedgerContext) {
        ctx.chunks.sort_by_key(|(index, _)| *index);
        let mut rows = Vec::new();
        for (chunk_index, payload) in &ctx.chunks {
            for (line_index, raw) in payload.rows.iter().enumerate() {
                rows.push(RawTransactionRow {
                    source: SourceRef::new(*chunk_index, line_index),
                    date_text: raw.date_text.clone(),
                    description: raw.description.clone(),
                    withdrawal_text: raw.withdrawal_text.clone(),
                    deposit_text: raw.deposit_text.clone(),
                    balance_text: raw.balance_text.clone(),
                    low_confidence: raw.low_confidence || payload.degraded,
                });
            }
        }
        debug!(
            "Merged {} rows from {} chunks",
            rows.len(),
            ctx.chunks.len()
        );
        ctx.raw_rows = Some(rows);
    }

    /// Runs the stateful date resolver over the merged rows in order.
    fn step_resolve_dates(&self, ctx: &mut LedgerContext) {
        let rows = ctx.raw_rows.as_ref().expect("merge step ran");
        let mut resolver = DateResolver::new(self.reference);
        let dated: Vec<DatedRow> = rows
            .iter()
            .map(|row| DatedRow {
                date: resolver.resolve(&row.date_text),
                row: row.clone(),
            })
            .collect();
        let unresolved = dated.iter().filter(|d| d.date.is_none()).count();
        if unresolved > 0 {
            debug!("{} of {} rows have unresolved dates", unresolved, dated.len());
        }
        ctx.dated = Some(dated);
    }

    fn step_correct(&self, ctx: &mut LedgerContext) {
        let dated = ctx.dated.as_ref().expect("date step ran");
        ctx.corrected = Some(correct(assemble(dated), self.tolerance));
    }
}
