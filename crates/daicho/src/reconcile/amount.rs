//! Parsing of printed amount cells into integer yen.

use crate::reconcile::fold_width;

/// Parses an OCR amount cell into signed integer yen.
///
/// Accepts full-width digits, currency marks, thousands separators, fill
/// asterisks, and the triangle negative marks passbooks print for
/// overdrafts. Returns `None` for blank or unparseable cells; the caller
/// decides whether that means zero or unknown.
pub fn parse_amount(text: &str) -> Option<i64> {
    let folded = fold_width(text);

    let mut negative = false;
    let mut digits = String::new();

    for ch in folded.chars() {
        match ch {
            '0'..='9' => digits.push(ch),
            '△' | '▲' => negative = true,
            '-' if digits.is_empty() => negative = true,
            // Trailing dash marks some credit prints; not a sign.
            '-' => {}
            ',' | '、' | '.' => {}
            '¥' | '￥' | '円' | '*' | ' ' | '\t' | '\u{3000}' => {}
            _ => return None,
        }
    }

    if digits.is_empty() {
        return None;
    }

    let value: i64 = digits.parse().ok()?;
    Some(if negative { -value } else { value })
}
