// Calendar quarters labelled `YYYY-Qn`.

use chrono::NaiveDate;
use std::fmt;

/// Day count assumed for a quarter whose label (or a related date) could not
/// be parsed.
pub const FALLBACK_QUARTER_DAYS: i64 = 91;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Quarter {
    pub year: i32,
    /// 1..=4
    pub number: u32,
}

impl Quarter {
    /// Parse `YYYY-Qn` (case-insensitive `q`, surrounding whitespace ignored).
    pub fn parse(label: &str) -> Option<Self> {
        let (year, q) = label.trim().split_once('-')?;
        if year.len() != 4 {
            return None;
        }
        let year: i32 = year.parse().ok()?;
        let number: u32 = q.strip_prefix(|c: char| c == 'Q' || c == 'q')?.parse().ok()?;
        if !(1..=4).contains(&number) {
            return None;
        }
        Some(Quarter { year, number })
    }

    pub fn start(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, (self.number - 1) * 3 + 1, 1)
    }

    /// Last day of the quarter (inclusive).
    pub fn end(&self) -> Option<NaiveDate> {
        let next = if self.number == 4 {
            NaiveDate::from_ymd_opt(self.year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(self.year, self.number * 3 + 1, 1)
        };
        next?.pred_opt()
    }

    pub fn range(&self) -> Option<(NaiveDate, NaiveDate)> {
        Some((self.start()?, self.end()?))
    }

    /// Inclusive number of days in the quarter.
    pub fn days(&self) -> Option<i64> {
        let (start, end) = self.range()?;
        Some((end - start).num_days() + 1)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.range()
            .map(|(start, end)| start <= date && date <= end)
            .unwrap_or(false)
    }
}

impl fmt::Display for Quarter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-Q{}", self.year, self.number)
    }
}

/// Year prefix of a quarter label. Works on malformed labels as long as the
/// first four characters are digits.
pub fn label_year(label: &str) -> Option<i32> {
    let label = label.trim();
    let year = label.get(..4)?;
    if !year.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    year.parse().ok()
}
