use crate::error::{ArrError, Result};
use chrono::{Datelike, NaiveDate};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A calendar month, the column unit of every matrix and waterfall.
///
/// Ordering is chronological. The textual form is `YYYY-MM`, which is also how
/// a month serializes (including as a JSON map key).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Month {
    year: i32,
    month: u32,
}

impl Month {
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(ArrError::DateError(format!(
                "Invalid month {} in year {}: must be between 1 and 12",
                month, year
            )));
        }
        Ok(Self { year, month })
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn succ(self) -> Self {
        self.add_months(1)
    }

    pub fn pred(self) -> Self {
        self.add_months(-1)
    }

    /// Shifts by `offset` calendar months; negative offsets move backwards.
    pub fn add_months(self, offset: i32) -> Self {
        let index = self.year * 12 + (self.month as i32 - 1) + offset;
        Self {
            year: index.div_euclid(12),
            month: index.rem_euclid(12) as u32 + 1,
        }
    }

    /// Number of months from `self` to `other` (negative if `other` is earlier).
    pub fn months_until(self, other: Month) -> i32 {
        let year_diff = other.year - self.year;
        let month_diff = other.month as i32 - self.month as i32;
        year_diff * 12 + month_diff
    }

    /// Every month from `start` to `end` inclusive, ascending. Empty when `end < start`.
    pub fn range_inclusive(start: Month, end: Month) -> Vec<Month> {
        let mut months = Vec::new();
        let mut current = start;
        while current <= end {
            months.push(current);
            current = current.succ();
        }
        months
    }

    /// The `len` months ending at (and including) `self`, ascending.
    pub fn trailing(self, len: u32) -> Vec<Month> {
        if len == 0 {
            return Vec::new();
        }
        Self::range_inclusive(self.add_months(-(len as i32 - 1)), self)
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Month {
    type Err = ArrError;

    /// Parses `YYYY-MM`.
    fn from_str(s: &str) -> Result<Self> {
        let as_date = format!("{}-01", s.trim());
        let date = NaiveDate::parse_from_str(&as_date, "%Y-%m-%d").map_err(|_| {
            ArrError::DateError(format!("Invalid month format: {}. Expected YYYY-MM", s))
        })?;
        Ok(Self::from_date(date))
    }
}

impl Serialize for Month {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Month {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}
