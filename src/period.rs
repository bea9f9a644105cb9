// src/period.rs
//
// Period Filter: a validated inclusive date range and the three-way
// partition it induces over dated/undated records. Undated records are
// included by policy and surfaced in the counts; excluding them was shown
// to distort totals by double-digit percentages for some companies.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PeriodError {
    #[error("Invalid period: start date {start} is after end date {end}")]
    StartAfterEnd { start: NaiveDate, end: NaiveDate },
}

/// Inclusive [start, end] date range. Construction is the single
/// fail-fast validation point of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Period {
    start: NaiveDate,
    end: NaiveDate,
}

impl Period {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, PeriodError> {
        if start > end {
            return Err(PeriodError::StartAfterEnd { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// Where a record lands relative to a period. With no period configured
/// every dated record is `InRange`; undated records stay `Undated` so the
/// policy remains visible in the counts either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatePartition {
    InRange,
    Undated,
    OutOfRange,
}

pub fn classify(period: Option<&Period>, date: Option<NaiveDate>) -> DatePartition {
    match (date, period) {
        (None, _) => DatePartition::Undated,
        (Some(_), None) => DatePartition::InRange,
        (Some(date), Some(period)) => {
            if period.contains(date) {
                DatePartition::InRange
            } else {
                DatePartition::OutOfRange
            }
        }
    }
}

/// Per-source partition counters attached to every summary. The three
/// counts always sum to the source's input row count; the undated hour
/// total makes the size of the undated-included slice visible.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PartitionCounts {
    pub in_range: u64,
    pub undated: u64,
    pub out_of_range: u64,
    pub undated_hours: Decimal,
    pub out_of_range_hours: Decimal,
}

impl PartitionCounts {
    pub fn record(&mut self, partition: DatePartition, hours: Option<Decimal>) {
        match partition {
            DatePartition::InRange => self.in_range += 1,
            DatePartition::Undated => {
                self.undated += 1;
                if let Some(hours) = hours {
                    self.undated_hours += hours;
                }
            }
            DatePartition::OutOfRange => {
                self.out_of_range += 1;
                if let Some(hours) = hours {
                    self.out_of_range_hours += hours;
                }
            }
        }
    }

    pub fn total(&self) -> u64 {
        self.in_range + self.undated + self.out_of_range
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("valid test date")
    }

    #[test]
    fn test_period_rejects_inverted_range() {
        let err = Period::new(d("2024-06-01"), d("2024-01-01")).unwrap_err();
        assert!(matches!(err, PeriodError::StartAfterEnd { .. }));
    }

    #[test]
    fn test_period_is_inclusive_on_both_ends() {
        let period = Period::new(d("2024-01-01"), d("2024-03-31")).unwrap();
        assert_eq!(
            classify(Some(&period), Some(d("2024-01-01"))),
            DatePartition::InRange
        );
        assert_eq!(
            classify(Some(&period), Some(d("2024-03-31"))),
            DatePartition::InRange
        );
        assert_eq!(
            classify(Some(&period), Some(d("2024-04-01"))),
            DatePartition::OutOfRange
        );
    }

    #[test]
    fn test_undated_is_undated_with_and_without_period() {
        let period = Period::new(d("2024-01-01"), d("2024-03-31")).unwrap();
        assert_eq!(classify(Some(&period), None), DatePartition::Undated);
        assert_eq!(classify(None, None), DatePartition::Undated);
        assert_eq!(
            classify(None, Some(d("1999-01-01"))),
            DatePartition::InRange
        );
    }

    #[test]
    fn test_partition_counts_sum_to_total() {
        let mut counts = PartitionCounts::default();
        counts.record(DatePartition::InRange, Some(dec!(8)));
        counts.record(DatePartition::Undated, Some(dec!(4)));
        counts.record(DatePartition::OutOfRange, None);
        assert_eq!(counts.total(), 3);
        assert_eq!(counts.undated_hours, dec!(4));
        assert_eq!(counts.out_of_range_hours, dec!(0));
    }
}
