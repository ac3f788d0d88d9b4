//! Amount parsing, direction correction, and ledger finalization.

pub mod amount;
pub mod corrector;
pub mod finalize;
pub mod heuristics;

pub use corrector::{assemble, correct, SWAP_NOTE};
pub use finalize::{finalize, LedgerSummary, AMBIGUOUS_NOTE, RESOLVE_NOTE};

/// Absolute-difference check used by every continuity comparison.
pub(crate) fn within_tolerance(computed: i64, reported: i64, tolerance: i64) -> bool {
    (computed - reported).abs() <= tolerance
}

/// Folds full-width ASCII characters to their half-width forms.
pub(crate) fn fold_width(text: &str) -> String {
    text.chars()
        .map(|ch| {
            if ('\u{FF01}'..='\u{FF5E}').contains(&ch) {
                char::from_u32(ch as u32 - 0xFEE0).unwrap_or(ch)
            } else {
                ch
            }
        })
        .collect()
}
