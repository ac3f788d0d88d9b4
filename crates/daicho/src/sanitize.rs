//! Helpers that keep customer data out of logs.
//!
//! Ledger descriptions carry counterparty names and account memos. Log
//! lines keep only enough shape for debugging.

use uuid::Uuid;

/// Redacts a row description down to its first character and length.
pub fn redact_description(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => format!("{}***({} chars)", first, text.chars().count()),
        None => "<empty>".to_string(),
    }
}

/// Short id prefix for correlating log lines without full UUID noise.
pub fn short_id(id: &Uuid) -> String {
    id.simple().to_string()[..8].to_string()
}
