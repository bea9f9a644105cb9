// src/filters.rs
//
// Unit/Status Filter: decides which project lines count as hour work and
// which time registrations count as actuals. The two source tables
// disagree precisely because one mixes planned and draft entries, so the
// filter boundary is explicit and everything excluded here is tallied in
// a breakdown rather than dropped.

use rust_decimal::Decimal;
use std::collections::BTreeMap;

use crate::gripp::ApprovalStatus;

/// Unit labels that denote hours. Matched case-insensitively against the
/// normalized (lower-cased, trimmed) unit field.
pub const HOUR_UNIT_SYNONYMS: [&str; 4] = ["uur", "hour", "hours", "u"];

/// True when the unit label denotes hours. Absent labels are not hours.
pub fn is_hour_unit(label: Option<&str>) -> bool {
    match label {
        Some(label) => {
            let label = label.trim().to_lowercase();
            HOUR_UNIT_SYNONYMS.contains(&label.as_str())
        }
        None => false,
    }
}

/// Which time registrations are admitted into the actuals. There is no
/// `Default` on purpose: every caller states its policy explicitly, since
/// mixing approved-only and all-statuses totals without noticing is the
/// principal failure mode of the old reporting scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    ApprovedOnly,
    AllStatuses,
}

impl StatusFilter {
    pub fn admits(&self, status: ApprovalStatus) -> bool {
        match self {
            StatusFilter::ApprovedOnly => status == ApprovalStatus::Approved,
            StatusFilter::AllStatuses => true,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StatusFilter::ApprovedOnly => "approved-only",
            StatusFilter::AllStatuses => "all-statuses",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub count: u64,
    pub hours: Decimal,
}

/// Count and hour total of time registrations excluded by the status
/// filter, keyed by status. Diagnostic output only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusBreakdown {
    pub by_status: BTreeMap<ApprovalStatus, Tally>,
}

impl StatusBreakdown {
    pub fn record(&mut self, status: ApprovalStatus, hours: Option<Decimal>) {
        let tally = self.by_status.entry(status).or_default();
        tally.count += 1;
        if let Some(hours) = hours {
            tally.hours += hours;
        }
    }

    pub fn total_count(&self) -> u64 {
        self.by_status.values().map(|t| t.count).sum()
    }
}

/// Quantities carried by project lines whose unit is not an hour unit
/// (materials, fixed fees, licences). Reported separately, never mixed
/// into the hour totals.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitBreakdown {
    pub by_unit: BTreeMap<String, Tally>,
}

impl UnitBreakdown {
    pub fn record(&mut self, unit: Option<&str>, quantity: Option<Decimal>) {
        let key = unit.unwrap_or("(no unit)").to_string();
        let tally = self.by_unit.entry(key).or_default();
        tally.count += 1;
        if let Some(quantity) = quantity {
            tally.hours += quantity;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_hour_unit_synonyms() {
        for label in ["uur", "Uur", "UUR", "hour", "hours", "u", " uur "] {
            assert!(is_hour_unit(Some(label)), "'{}' should match", label);
        }
        for label in ["stuk", "dag", "eur", ""] {
            assert!(!is_hour_unit(Some(label)), "'{}' should not match", label);
        }
        assert!(!is_hour_unit(None), "absent unit is not an hour unit");
    }

    #[test]
    fn test_status_filter_admission() {
        assert!(StatusFilter::ApprovedOnly.admits(ApprovalStatus::Approved));
        assert!(!StatusFilter::ApprovedOnly.admits(ApprovalStatus::Draft));
        assert!(!StatusFilter::ApprovedOnly.admits(ApprovalStatus::Unknown));
        assert!(StatusFilter::AllStatuses.admits(ApprovalStatus::Rejected));
    }

    #[test]
    fn test_status_breakdown_tallies_hours() {
        let mut breakdown = StatusBreakdown::default();
        breakdown.record(ApprovalStatus::Draft, Some(dec!(2.5)));
        breakdown.record(ApprovalStatus::Draft, None);
        breakdown.record(ApprovalStatus::Rejected, Some(dec!(1)));
        let draft = breakdown.by_status[&ApprovalStatus::Draft];
        assert_eq!(draft.count, 2);
        assert_eq!(draft.hours, dec!(2.5));
        assert_eq!(breakdown.total_count(), 3);
    }
}
