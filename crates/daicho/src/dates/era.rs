//! The era calendars that appear on machine-printed passbooks.

use std::fmt;

use chrono::{Datelike, NaiveDate};

/// An era whose marker can appear in front of a printed year.
///
/// Only the three eras found on machine-printed passbooks are modeled;
/// anything older predates the document formats this crate handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Era {
    Showa,
    Heisei,
    Reiwa,
}

impl Era {
    /// All known eras, oldest first.
    pub fn all() -> [Era; 3] {
        [Era::Showa, Era::Heisei, Era::Reiwa]
    }

    /// Parses an era marker: full kanji, single kanji, or a Latin initial.
    pub fn from_marker(marker: &str) -> Option<Era> {
        match marker {
            "昭和" | "昭" | "S" | "s" => Some(Era::Showa),
            "平成" | "平" | "H" | "h" => Some(Era::Heisei),
            "令和" | "令" | "R" | "r" => Some(Era::Reiwa),
            _ => None,
        }
    }

    pub fn from_marker_char(marker: char) -> Option<Era> {
        match marker {
            '昭' | 'S' | 's' => Some(Era::Showa),
            '平' | 'H' | 'h' => Some(Era::Heisei),
            '令' | 'R' | 'r' => Some(Era::Reiwa),
            _ => None,
        }
    }

    /// First Gregorian day of the era.
    pub fn start(self) -> NaiveDate {
        let (y, m, d) = match self {
            Era::Showa => (1926, 12, 25),
            Era::Heisei => (1989, 1, 8),
            Era::Reiwa => (2019, 5, 1),
        };
        // Literal accession dates, always valid.
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// Gregorian year containing era year 1.
    pub fn first_year(self) -> i32 {
        self.start().year()
    }

    /// Gregorian year for year `era_year` of this era.
    pub fn gregorian_year(self, era_year: i32) -> i32 {
        self.first_year() + era_year - 1
    }

    /// Era year for a Gregorian year under this era's numbering.
    pub fn era_year(self, gregorian_year: i32) -> i32 {
        gregorian_year - self.first_year() + 1
    }

    pub fn next(self) -> Option<Era> {
        match self {
            Era::Showa => Some(Era::Heisei),
            Era::Heisei => Some(Era::Reiwa),
            Era::Reiwa => None,
        }
    }

    pub fn prev(self) -> Option<Era> {
        match self {
            Era::Showa => None,
            Era::Heisei => Some(Era::Showa),
            Era::Reiwa => Some(Era::Heisei),
        }
    }

    /// The era in effect on `date`, if any known era covers it.
    pub fn containing(date: NaiveDate) -> Option<Era> {
        Era::all()
            .into_iter()
            .rev()
            .find(|era| date >= era.start())
    }

    pub fn label(self) -> &'static str {
        match self {
            Era::Showa => "昭和",
            Era::Heisei => "平成",
            Era::Reiwa => "令和",
        }
    }
}

impl fmt::Display for Era {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}
