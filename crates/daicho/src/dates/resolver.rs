//! Order-dependent resolution of printed date strings.
//!
//! Passbook rows rarely repeat the era and year; most rows print only a
//! month and day and inherit the rest from the last row that spelled it
//! out. The resolver walks rows in document order and carries that context
//! forward, including across month rollovers and era transitions.

use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;

use crate::dates::Era;

static RE_FULL_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<y>\d{1,4})-(?P<m>\d{1,2})-(?P<d>\d{1,2})$").unwrap());
static RE_MONTH_DAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<m>\d{1,2})-(?P<d>\d{1,2})$").unwrap());

/// A month this far below the previous row's month starts a new year.
/// Smaller backward steps are treated as scan disorder within the year.
const MONTH_ROLLOVER_GAP: u32 = 6;

#[derive(Debug, Clone, Copy)]
struct EraContext {
    era: Era,
    year: i32,
}

/// Resolves row date texts to Gregorian dates, one row at a time.
///
/// `reference` disambiguates bare two-digit years seen before any era
/// context exists: the latest era that keeps the date on or before the
/// reference wins. Using the job's submission date keeps resolution
/// deterministic for a given job.
pub struct DateResolver {
    reference: NaiveDate,
    context: Option<EraContext>,
    last_month: Option<u32>,
}

impl DateResolver {
    pub fn new(reference: NaiveDate) -> Self {
        Self {
            reference,
            context: None,
            last_month: None,
        }
    }

    /// Resolves one date text in row order, updating context on success.
    /// Unresolvable text returns `None` and leaves the context untouched.
    pub fn resolve(&mut self, text: &str) -> Option<NaiveDate> {
        let normalized = normalize_date_text(text);
        if normalized.is_empty() {
            return None;
        }

        let (marker, rest) = split_era_marker(&normalized);

        if let Some(caps) = RE_FULL_DATE.captures(rest) {
            let year: i32 = caps["y"].parse().ok()?;
            let month: u32 = caps["m"].parse().ok()?;
            let day: u32 = caps["d"].parse().ok()?;

            return match marker {
                Some(era) => self.resolve_era_date(era, year, month, day),
                None if year >= 1000 => self.resolve_gregorian(year, month, day),
                None if (1..=99).contains(&year) => self.resolve_bare_era_year(year, month, day),
                None => None,
            };
        }

        if marker.is_none() {
            if let Some(caps) = RE_MONTH_DAY.captures(rest) {
                let month: u32 = caps["m"].parse().ok()?;
                let day: u32 = caps["d"].parse().ok()?;
                return self.resolve_continuation(month, day);
            }
        }

        None
    }

    fn resolve_era_date(&mut self, era: Era, year: i32, month: u32, day: u32) -> Option<NaiveDate> {
        if year < 1 {
            return None;
        }
        let date = NaiveDate::from_ymd_opt(era.gregorian_year(year), month, day)?;
        let (era, year) = normalize_boundary(era, date);
        self.context = Some(EraContext { era, year });
        self.last_month = Some(month);
        Some(date)
    }

    fn resolve_gregorian(&mut self, year: i32, month: u32, day: u32) -> Option<NaiveDate> {
        let date = NaiveDate::from_ymd_opt(year, month, day)?;
        if let Some(era) = Era::containing(date) {
            self.context = Some(EraContext {
                era,
                year: era.era_year(year),
            });
            self.last_month = Some(month);
        }
        Some(date)
    }

    fn resolve_bare_era_year(&mut self, year: i32, month: u32, day: u32) -> Option<NaiveDate> {
        if let Some(ctx) = self.context {
            return self.resolve_era_date(ctx.era, year, month, day);
        }

        // No context yet: latest era that keeps the date within the reference.
        for era in Era::all().into_iter().rev() {
            if let Some(date) = NaiveDate::from_ymd_opt(era.gregorian_year(year), month, day) {
                if date <= self.reference {
                    return self.resolve_era_date(era, year, month, day);
                }
            }
        }
        None
    }

    fn resolve_continuation(&mut self, month: u32, day: u32) -> Option<NaiveDate> {
        let ctx = self.context?;

        let mut year = ctx.year;
        if let Some(last) = self.last_month {
            if month < last && last - month >= MONTH_ROLLOVER_GAP {
                year += 1;
            }
        }

        let date = NaiveDate::from_ymd_opt(ctx.era.gregorian_year(year), month, day)?;
        let (era, year) = normalize_boundary(ctx.era, date);
        self.context = Some(EraContext { era, year });
        self.last_month = Some(month);
        Some(date)
    }
}

/// Relabels a date into the era actually in effect on it.
///
/// Passbooks keep printing the old era for a while after a transition, and
/// continuation rows can walk past an era's end. The Gregorian date is
/// unaffected because successive eras share their transition year; only the
/// carried context changes.
fn normalize_boundary(era: Era, date: NaiveDate) -> (Era, i32) {
    let mut era = era;
    while let Some(next) = era.next() {
        if date >= next.start() {
            era = next;
        } else {
            break;
        }
    }
    while date < era.start() {
        match era.prev() {
            Some(prev) => era = prev,
            None => break,
        }
    }
    (era, era.era_year(date.year()))
}

/// Folds OCR date text into `marker?-y-m-d` shape: full-width characters to
/// ASCII, kanji calendar units and slashes to dashes, whitespace dropped.
fn normalize_date_text(text: &str) -> String {
    // 元年 is how year 1 of an era is printed formally.
    let text = text.replace("元年", "1年");

    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            // Full-width ASCII block.
            '\u{FF01}'..='\u{FF5E}' => {
                out.push(char::from_u32(ch as u32 - 0xFEE0).unwrap_or(ch));
            }
            '/' | '.' | '年' | '月' | '日' => out.push('-'),
            // Dash look-alikes OCR produces for the separator.
            'ー' | '―' | '‐' | '−' => out.push('-'),
            ' ' | '\t' | '\u{3000}' => {}
            _ => out.push(ch),
        }
    }

    let mut collapsed = String::with_capacity(out.len());
    let mut prev_dash = false;
    for ch in out.chars() {
        if ch == '-' {
            if !prev_dash {
                collapsed.push('-');
            }
            prev_dash = true;
        } else {
            collapsed.push(ch);
            prev_dash = false;
        }
    }

    collapsed.trim_matches('-').to_string()
}

/// Strips a leading era marker, if any, returning it and the remainder.
fn split_era_marker(s: &str) -> (Option<Era>, &str) {
    for prefix in ["昭和", "平成", "令和"] {
        if let Some(rest) = s.strip_prefix(prefix) {
            return (Era::from_marker(prefix), rest.trim_start_matches('-'));
        }
    }

    if let Some(first) = s.chars().next() {
        let rest = s[first.len_utf8()..].trim_start_matches('-');
        let digit_follows = rest.chars().next().is_some_and(|c| c.is_ascii_digit());
        if digit_follows {
            if let Some(era) = Era::from_marker_char(first) {
                return (Some(era), rest);
            }
        }
    }

    (None, s)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn resolver() -> DateResolver {
        DateResolver::new(ymd(2019, 6, 1))
    }

    #[test]
    fn explicit_latin_era_date() {
        let mut r = resolver();
        assert_eq!(r.resolve("H31-4-30"), Some(ymd(2019, 4, 30)));
    }

    #[test]
    fn kanji_date_with_calendar_units() {
        let mut r = resolver();
        assert_eq!(r.resolve("平成31年4月30日"), Some(ymd(2019, 4, 30)));
    }

    #[test]
    fn gannen_is_year_one() {
        let mut r = resolver();
        assert_eq!(r.resolve("令和元年5月1日"), Some(ymd(2019, 5, 1)));
    }

    #[test]
    fn full_width_text_normalizes() {
        let mut r = resolver();
        assert_eq!(r.resolve("Ｈ３１－４－３０"), Some(ymd(2019, 4, 30)));
    }

    #[test]
    fn month_day_continuation_inherits_era_and_year() {
        let mut r = resolver();
        assert_eq!(r.resolve("R1-6-10"), Some(ymd(2019, 6, 10)));
        assert_eq!(r.resolve("6-28"), Some(ymd(2019, 6, 28)));
        assert_eq!(r.resolve("7/2"), Some(ymd(2019, 7, 2)));
    }

    #[test]
    fn continuation_without_context_is_unresolved() {
        let mut r = resolver();
        assert_eq!(r.resolve("6-28"), None);
    }

    #[test]
    fn month_rollover_increments_year() {
        let mut r = resolver();
        assert_eq!(r.resolve("R1-12-28"), Some(ymd(2019, 12, 28)));
        assert_eq!(r.resolve("1-4"), Some(ymd(2020, 1, 4)));
        // Context is now Reiwa 2.
        assert_eq!(r.resolve("2-14"), Some(ymd(2020, 2, 14)));
    }

    #[test]
    fn small_backward_month_step_stays_in_year() {
        let mut r = resolver();
        assert_eq!(r.resolve("R2-3-10"), Some(ymd(2020, 3, 10)));
        assert_eq!(r.resolve("2-20"), Some(ymd(2020, 2, 20)));
    }

    #[test]
    fn heisei_rolls_into_reiwa_year_one() {
        let mut r = resolver();
        assert_eq!(r.resolve("H31-4-30"), Some(ymd(2019, 4, 30)));
        // May 1st of Heisei 31 is the first day of Reiwa; the Gregorian
        // date is unchanged and the context relabels to Reiwa 1.
        assert_eq!(r.resolve("5-1"), Some(ymd(2019, 5, 1)));
        assert_eq!(r.resolve("R1-5-7"), Some(ymd(2019, 5, 7)));
        // A bare year now reads as a Reiwa year.
        assert_eq!(r.resolve("2-1-15"), Some(ymd(2020, 1, 15)));
    }

    #[test]
    fn showa_rolls_into_heisei() {
        let mut r = resolver();
        assert_eq!(r.resolve("S64-1-7"), Some(ymd(1989, 1, 7)));
        assert_eq!(r.resolve("1-9"), Some(ymd(1989, 1, 9)));
        // Context relabeled to Heisei 1, so February continues to resolve.
        assert_eq!(r.resolve("2-1"), Some(ymd(1989, 2, 1)));
    }

    #[test]
    fn bare_two_digit_year_uses_reference_date() {
        let mut r = DateResolver::new(ymd(2019, 6, 1));
        // Reiwa 31 would be 2049, after the reference; Heisei 31 fits.
        assert_eq!(r.resolve("31-4-30"), Some(ymd(2019, 4, 30)));

        let mut r = DateResolver::new(ymd(2026, 8, 24));
        // Latest era wins: Reiwa 3, not Heisei 3.
        assert_eq!(r.resolve("3-6-15"), Some(ymd(2021, 6, 15)));
    }

    #[test]
    fn bare_year_prefers_established_context() {
        let mut r = DateResolver::new(ymd(2026, 8, 24));
        assert_eq!(r.resolve("平成3-6-15"), Some(ymd(1991, 6, 15)));
        // Context Heisei overrides the latest-era guess.
        assert_eq!(r.resolve("4-1-20"), Some(ymd(1992, 1, 20)));
    }

    #[test]
    fn gregorian_dates_pass_through_and_set_context() {
        let mut r = resolver();
        assert_eq!(r.resolve("2019-04-30"), Some(ymd(2019, 4, 30)));
        assert_eq!(r.resolve("5-2"), Some(ymd(2019, 5, 2)));
    }

    #[test]
    fn garbage_leaves_context_unchanged() {
        let mut r = resolver();
        assert_eq!(r.resolve("R2-3-10"), Some(ymd(2020, 3, 10)));
        assert_eq!(r.resolve("※※"), None);
        assert_eq!(r.resolve(""), None);
        assert_eq!(r.resolve("R2-2-30"), None); // invalid day
        assert_eq!(r.resolve("4-1"), Some(ymd(2020, 4, 1)));
    }

    #[test]
    fn era_year_zero_is_rejected() {
        let mut r = resolver();
        assert_eq!(r.resolve("R0-5-1"), None);
    }

    #[test]
    fn normalization_folds_separators() {
        assert_eq!(normalize_date_text("１２／３１"), "12-31");
        assert_eq!(normalize_date_text(" R1ー5ー1 "), "R1-5-1");
        assert_eq!(normalize_date_text("2019.04.30"), "2019-04-30");
        assert_eq!(normalize_date_text("--"), "");
    }

    #[test]
    fn marker_split_requires_following_digit() {
        let (era, rest) = split_era_marker("R1-5-1");
        assert_eq!(era, Some(Era::Reiwa));
        assert_eq!(rest, "1-5-1");

        // A lone letter with no digits is not a marker.
        let (era, _) = split_era_marker("Refund");
        assert_eq!(era, None);
    }
}
