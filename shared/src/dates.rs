use anyhow::{bail, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A stay as a half-open interval `[check_in, check_out)`. The checkout
/// day consumes no night, so it is never iterated and never checked
/// against the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StayRange {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

impl StayRange {
    /// Rejects empty and inverted ranges. A zero-night stay is an input
    /// error, not something the ledger evaluates.
    pub fn new(check_in: NaiveDate, check_out: NaiveDate) -> Result<Self> {
        if check_out <= check_in {
            bail!("check-out date must be after check-in date");
        }
        Ok(Self { check_in, check_out })
    }

    pub fn nights(&self) -> i64 {
        (self.check_out - self.check_in).num_days()
    }

    /// Ascending dates in `[check_in, check_out)`.
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.check_out;
        let mut next = self.check_in;
        std::iter::from_fn(move || {
            if next >= end {
                return None;
            }
            let current = next;
            next = next.succ_opt().unwrap_or(end);
            Some(current)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn checkout_day_is_not_a_night() {
        let range = StayRange::new(d(2025, 6, 1), d(2025, 6, 3)).unwrap();
        let dates: Vec<_> = range.dates().collect();
        assert_eq!(dates, vec![d(2025, 6, 1), d(2025, 6, 2)]);
        assert_eq!(range.nights(), 2);
    }

    #[test]
    fn single_night_stay() {
        let range = StayRange::new(d(2025, 6, 1), d(2025, 6, 2)).unwrap();
        assert_eq!(range.dates().count(), 1);
        assert_eq!(range.nights(), 1);
    }

    #[test]
    fn empty_range_is_rejected() {
        assert!(StayRange::new(d(2025, 6, 1), d(2025, 6, 1)).is_err());
        assert!(StayRange::new(d(2025, 6, 3), d(2025, 6, 1)).is_err());
    }

    #[test]
    fn range_spans_month_boundary() {
        let range = StayRange::new(d(2025, 6, 29), d(2025, 7, 2)).unwrap();
        let dates: Vec<_> = range.dates().collect();
        assert_eq!(dates, vec![d(2025, 6, 29), d(2025, 6, 30), d(2025, 7, 1)]);
    }
}
