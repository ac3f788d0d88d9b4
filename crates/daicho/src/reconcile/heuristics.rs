//! Keyword fallback for rows the running balance cannot verify.

use crate::reconcile::fold_width;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Withdrawal,
    Deposit,
}

/// A matched rule: the direction it implies and the rule name recorded on
/// the corrected row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeuristicMatch {
    pub direction: Direction,
    pub rule: &'static str,
}

/// Descriptions that are charges: fees, card and utility debits.
/// Checked first so 振込手数料 (transfer fee) never reads as a transfer-in.
const WITHDRAWAL_KEYWORDS: &[&str] = &[
    "手数料",
    "ﾃｽｳﾘｮｳ",
    "引落",
    "引き落とし",
    "ｶｰﾄﾞ",
    "カード",
    "ATM",
    "電気",
    "ｶﾞｽ",
    "ガス",
    "水道",
    "保険料",
    "FEE",
    "CHARGE",
];

/// Descriptions that are income: payroll, pensions, interest, transfers-in.
const DEPOSIT_KEYWORDS: &[&str] = &[
    "給与",
    "給料",
    "ｷｭｳﾖ",
    "賞与",
    "ﾎﾞｰﾅｽ",
    "年金",
    "ﾈﾝｷﾝ",
    "利息",
    "ﾘｿｸ",
    "配当",
    "振込",
    "ﾌﾘｺﾐ",
    "入金",
    "SALARY",
    "PENSION",
    "INTEREST",
];

/// Infers a direction from the row description, if any rule is confident.
pub fn infer_direction(description: &str) -> Option<HeuristicMatch> {
    let folded = fold_width(description);
    let upper = folded.to_uppercase();

    for keyword in WITHDRAWAL_KEYWORDS {
        if upper.contains(keyword) {
            return Some(HeuristicMatch {
                direction: Direction::Withdrawal,
                rule: "fee-keyword",
            });
        }
    }

    for keyword in DEPOSIT_KEYWORDS {
        if upper.contains(keyword) {
            return Some(HeuristicMatch {
                direction: Direction::Deposit,
                rule: "income-keyword",
            });
        }
    }

    // A bare katakana name is the sender of an incoming transfer.
    if is_katakana_name(folded.trim()) {
        return Some(HeuristicMatch {
            direction: Direction::Deposit,
            rule: "payee-name",
        });
    }

    None
}

/// True for short all-katakana strings (full- or half-width), the way
/// passbooks print transfer counterparty names.
fn is_katakana_name(s: &str) -> bool {
    let mut kana = 0usize;
    for ch in s.chars() {
        match ch {
            '\u{30A0}'..='\u{30FF}' | '\u{FF65}'..='\u{FF9F}' => kana += 1,
            ' ' | '\u{3000}' => {}
            _ => return false,
        }
    }
    (2..=20).contains(&kana)
}
