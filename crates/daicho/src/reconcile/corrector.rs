//! Balance-continuity verification and swapped-field correction.
//!
//! OCR routinely lands an amount in the wrong column. The reported balances
//! are far more reliable: they are machine printed in a dedicated column on
//! every row. Walking rows in document order, each row's direction is tested
//! against the running balance; when only the swapped reading restores
//! continuity, the two amount fields are exchanged.

use log::debug;

use crate::reconcile::amount::parse_amount;
use crate::reconcile::heuristics::{self, Direction};
use crate::reconcile::within_tolerance;
use crate::statement::{DatedRow, Transaction, Verification};

/// Note recorded on rows whose amount fields were swapped to restore
/// balance continuity.
pub const SWAP_NOTE: &str = "balance-continuity swap";

/// Builds transactions from dated rows, parsing the amount cells.
///
/// Directions are taken exactly as reported; [`correct`] establishes or
/// fixes them afterwards. Unparseable amount cells read as zero, an
/// unparseable balance cell reads as no balance.
pub fn assemble(rows: &[DatedRow]) -> Vec<Transaction> {
    rows.iter()
        .map(|dated| Transaction {
            date: dated.date,
            description: dated.row.description.clone(),
            withdrawal: parse_amount(&dated.row.withdrawal_text).map_or(0, i64::abs),
            deposit: parse_amount(&dated.row.deposit_text).map_or(0, i64::abs),
            balance: dated.row.balance_text.as_deref().and_then(parse_amount),
            verification: Verification::Unverified,
            correction_note: None,
            low_confidence: dated.row.low_confidence,
            source: dated.row.source,
        })
        .collect()
}

/// Verifies and corrects transaction directions in document order.
///
/// The running balance seeds from the first reported balance and advances
/// row by row: a reported balance is authoritative, otherwise the row's net
/// effect rolls it forward so one missing balance does not halt checking.
/// Rows without a resolved date are excluded from continuity entirely.
///
/// The pass is a fixpoint: running it over its own output re-verifies every
/// row and changes nothing, so a second invocation makes zero corrections.
pub fn correct(rows: Vec<Transaction>, tolerance: i64) -> Vec<Transaction> {
    let mut out = Vec::with_capacity(rows.len());

    // Balance after the previous row, possibly computed.
    let mut running: Option<i64> = None;
    // The previous row's own reported balance; only this may carry trust
    // across a chunk boundary.
    let mut prev_reported: Option<i64> = None;
    let mut prev_chunk: Option<usize> = None;

    for mut tx in rows {
        if tx.date.is_none() {
            // Undated rows still move money, so a stale running balance
            // would produce false anomalies later. Their reported balance
            // re-anchors the chain; otherwise the chain breaks here.
            tx.verification = Verification::Unverified;
            if tx.balance.is_some() {
                running = tx.balance;
            } else if tx.withdrawal != 0 || tx.deposit != 0 {
                running = None;
            }
            prev_reported = tx.balance;
            prev_chunk = Some(tx.source.chunk_index);
            out.push(tx);
            continue;
        }

        let crossed_boundary = prev_chunk.is_some_and(|pc| pc != tx.source.chunk_index);

        if crossed_boundary && prev_reported.is_none() {
            // The previous chunk ended without a parseable balance. Chunks
            // were recognized independently, so a computed balance is not
            // trusted across the boundary: the row is flagged rather than
            // checked, and never reads as an anomaly.
            tx.verification = Verification::BoundaryUnverified;
            running = None;
        } else {
            match (running, tx.balance) {
                (Some(rb), Some(reported)) => {
                    let as_reported = rb + tx.deposit - tx.withdrawal;
                    let swapped = rb + tx.withdrawal - tx.deposit;

                    if within_tolerance(as_reported, reported, tolerance) {
                        tx.verification = Verification::Balance;
                    } else if within_tolerance(swapped, reported, tolerance)
                        && tx.withdrawal != tx.deposit
                    {
                        std::mem::swap(&mut tx.withdrawal, &mut tx.deposit);
                        tx.verification = Verification::Balance;
                        tx.correction_note = Some(SWAP_NOTE.to_string());
                        debug!(
                            "Swapped amount fields at chunk {} line {}",
                            tx.source.chunk_index, tx.source.line_index
                        );
                    } else {
                        apply_heuristic(&mut tx);
                    }
                }
                _ => apply_heuristic(&mut tx),
            }
        }

        // Advance the chain: reported balances win, otherwise roll forward
        // from the row's net effect.
        running = match (tx.balance, running) {
            (Some(reported), _) => Some(reported),
            (None, Some(rb)) => Some(rb + tx.signed_amount()),
            (None, None) => None,
        };

        prev_reported = tx.balance;
        prev_chunk = Some(tx.source.chunk_index);
        out.push(tx);
    }

    out
}

/// Establishes a direction by keyword when continuity cannot decide.
///
/// A confident match moves a single-sided amount to the matched side and
/// records the rule name. Rows with both sides set are left for
/// finalization, which can consult the running balance.
fn apply_heuristic(tx: &mut Transaction) {
    let single_sided = (tx.withdrawal == 0) != (tx.deposit == 0);

    match heuristics::infer_direction(&tx.description) {
        Some(matched) if single_sided => {
            let moved = match matched.direction {
                Direction::Withdrawal if tx.withdrawal == 0 => {
                    tx.withdrawal = tx.deposit;
                    tx.deposit = 0;
                    true
                }
                Direction::Deposit if tx.deposit == 0 => {
                    tx.deposit = tx.withdrawal;
                    tx.withdrawal = 0;
                    true
                }
                _ => false,
            };
            tx.verification = Verification::Heuristic(matched.rule.to_string());
            if moved {
                tx.correction_note = Some(matched.rule.to_string());
            }
        }
        _ => tx.verification = Verification::Unverified,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::{RawTransactionRow, SourceRef};
    use chrono::NaiveDate;

    fn dated(
        chunk: usize,
        line: usize,
        desc: &str,
        withdrawal: &str,
        deposit: &str,
        balance: Option<&str>,
    ) -> DatedRow {
        DatedRow {
            row: RawTransactionRow {
                source: SourceRef::new(chunk, line),
                date_text: format!("R1-6-{}", line + 1),
                description: desc.to_string(),
                withdrawal_text: withdrawal.to_string(),
                deposit_text: deposit.to_string(),
                balance_text: balance.map(str::to_string),
                low_confidence: false,
            },
            date: NaiveDate::from_ymd_opt(2019, 6, (line + 1) as u32),
        }
    }

    fn undated(chunk: usize, line: usize, withdrawal: &str, balance: Option<&str>) -> DatedRow {
        let mut row = dated(chunk, line, "お取引", withdrawal, "", balance);
        row.date = None;
        row
    }

    fn run(rows: &[DatedRow]) -> Vec<Transaction> {
        correct(assemble(rows), 0)
    }

    #[test]
    fn swapped_fields_are_restored_by_continuity() {
        // Second row reports a deposit of 20,000 in the withdrawal column.
        let rows = vec![
            dated(0, 0, "繰越", "", "100,000", Some("100,000")),
            dated(0, 1, "お取引", "20,000", "", Some("120,000")),
            dated(0, 2, "お取引", "30,000", "", Some("90,000")),
        ];
        let out = run(&rows);

        assert_eq!(out[1].withdrawal, 0);
        assert_eq!(out[1].deposit, 20000);
        assert_eq!(out[1].verification, Verification::Balance);
        assert_eq!(out[1].correction_note.as_deref(), Some(SWAP_NOTE));

        // Third row was consistent as reported and is untouched.
        assert_eq!(out[2].withdrawal, 30000);
        assert_eq!(out[2].verification, Verification::Balance);
        assert!(out[2].correction_note.is_none());
    }

    #[test]
    fn seed_row_cannot_be_continuity_checked() {
        let rows = vec![
            dated(0, 0, "お取引", "5,000", "", Some("95,000")),
            dated(0, 1, "お取引", "5,000", "", Some("90,000")),
        ];
        let out = run(&rows);
        assert_eq!(out[0].verification, Verification::Unverified);
        assert_eq!(out[1].verification, Verification::Balance);
    }

    #[test]
    fn missing_balance_rolls_running_forward() {
        let rows = vec![
            dated(0, 0, "繰越", "", "100,000", Some("100,000")),
            dated(0, 1, "お取引", "10,000", "", None),
            dated(0, 2, "お取引", "20,000", "", Some("70,000")),
        ];
        let out = run(&rows);
        // Row 2 is checked against 100,000 - 10,000 = 90,000.
        assert_eq!(out[2].verification, Verification::Balance);
    }

    #[test]
    fn heuristic_moves_single_sided_amount() {
        let rows = vec![dated(0, 0, "振込手数料", "", "440", None)];
        let out = run(&rows);
        assert_eq!(out[0].withdrawal, 440);
        assert_eq!(out[0].deposit, 0);
        assert_eq!(
            out[0].verification,
            Verification::Heuristic("fee-keyword".to_string())
        );
        assert_eq!(out[0].correction_note.as_deref(), Some("fee-keyword"));
    }

    #[test]
    fn heuristic_confirms_without_note_when_side_already_right() {
        let rows = vec![dated(0, 0, "給与振込", "", "250,000", None)];
        let out = run(&rows);
        assert_eq!(out[0].deposit, 250000);
        assert_eq!(
            out[0].verification,
            Verification::Heuristic("income-keyword".to_string())
        );
        assert!(out[0].correction_note.is_none());
    }

    #[test]
    fn neutral_row_without_balance_context_is_unverified() {
        let rows = vec![dated(0, 0, "お取引", "1,000", "", None)];
        let out = run(&rows);
        assert_eq!(out[0].verification, Verification::Unverified);
        assert_eq!(out[0].withdrawal, 1000);
    }

    #[test]
    fn boundary_row_without_predecessor_balance_is_flagged() {
        let rows = vec![
            dated(0, 0, "繰越", "", "100,000", Some("100,000")),
            dated(0, 1, "お取引", "10,000", "", None),
            dated(1, 0, "お取引", "5,000", "", Some("85,000")),
        ];
        let out = run(&rows);
        assert_eq!(out[2].verification, Verification::BoundaryUnverified);
        // Kept exactly as reported.
        assert_eq!(out[2].withdrawal, 5000);
        assert!(out[2].correction_note.is_none());
    }

    #[test]
    fn boundary_row_with_predecessor_balance_is_checked_normally() {
        let rows = vec![
            dated(0, 0, "繰越", "", "100,000", Some("100,000")),
            dated(1, 0, "お取引", "10,000", "", Some("110,000")),
        ];
        let out = run(&rows);
        // Swapped reading restores continuity across the boundary.
        assert_eq!(out[1].deposit, 10000);
        assert_eq!(out[1].correction_note.as_deref(), Some(SWAP_NOTE));
    }

    #[test]
    fn boundary_row_reanchors_the_chain() {
        let rows = vec![
            dated(0, 0, "お取引", "10,000", "", None),
            dated(1, 0, "お取引", "5,000", "", Some("85,000")),
            dated(1, 1, "お取引", "5,000", "", Some("80,000")),
        ];
        let out = run(&rows);
        assert_eq!(out[1].verification, Verification::BoundaryUnverified);
        // Its reported balance anchors checking for the next row.
        assert_eq!(out[2].verification, Verification::Balance);
    }

    #[test]
    fn undated_row_breaks_the_chain() {
        let rows = vec![
            dated(0, 0, "繰越", "", "100,000", Some("100,000")),
            undated(0, 1, "10,000", None),
            dated(0, 2, "お取引", "5,000", "", Some("85,000")),
        ];
        let out = run(&rows);
        assert_eq!(out[1].verification, Verification::Unverified);
        // Row 2 must not be checked against the stale 100,000.
        assert_eq!(out[2].verification, Verification::Unverified);
        assert_eq!(out[2].withdrawal, 5000);
    }

    #[test]
    fn undated_row_with_balance_reanchors() {
        let rows = vec![
            dated(0, 0, "繰越", "", "100,000", Some("100,000")),
            undated(0, 1, "10,000", Some("90,000")),
            dated(0, 2, "お取引", "5,000", "", Some("85,000")),
        ];
        let out = run(&rows);
        assert_eq!(out[2].verification, Verification::Balance);
    }

    #[test]
    fn tolerance_admits_off_by_rounding() {
        let rows = vec![
            dated(0, 0, "繰越", "", "100,000", Some("100,000")),
            dated(0, 1, "お取引", "9,999", "", Some("90,000")),
        ];
        let strict = correct(assemble(&rows), 0);
        assert_eq!(strict[1].verification, Verification::Unverified);

        let lenient = correct(assemble(&rows), 1);
        assert_eq!(lenient[1].verification, Verification::Balance);
    }

    #[test]
    fn correction_is_idempotent() {
        let rows = vec![
            dated(0, 0, "繰越", "", "100,000", Some("100,000")),
            dated(0, 1, "お取引", "20,000", "", Some("120,000")),
            dated(0, 2, "振込手数料", "", "440", None),
            dated(1, 0, "お取引", "5,000", "", Some("114,560")),
            undated(1, 1, "999", None),
        ];
        let once = correct(assemble(&rows), 0);
        let twice = correct(once.clone(), 0);
        assert_eq!(once, twice);
    }

    #[test]
    fn equal_amounts_never_swap() {
        let rows = vec![
            dated(0, 0, "繰越", "", "100,000", Some("100,000")),
            dated(0, 1, "お取引", "0", "0", Some("99,000")),
        ];
        let out = run(&rows);
        // Neither reading restores continuity; falls through to unverified.
        assert_eq!(out[1].verification, Verification::Unverified);
        assert!(out[1].correction_note.is_none());
    }
}
