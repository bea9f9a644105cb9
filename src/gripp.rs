// src/gripp.rs
//
// Canonical typed records for the Gripp source tables mirrored into
// Postgres: urenregistratie (legacy time registration), projectlines
// (planned/billable lines), projects and companies. The normalizer in
// `normalize.rs` is the only producer of these records.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::BTreeSet;

/// Placeholder label for totals attributed to a company or project that
/// could not be resolved through the joins. Unmapped rows are kept in the
/// summary under this label, never dropped.
pub const UNMAPPED_LABEL: &str = "(unmapped)";

// --- Approval Status ---

/// Approval lifecycle of a time registration. Gripp labels the approved
/// state "Gefiatteerd"; anything we cannot recognise becomes `Unknown` and
/// is excluded from actuals (but still counted in the status breakdown).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ApprovalStatus {
    Draft,
    Submitted,
    Approved,
    Rejected,
    Unknown,
}

impl ApprovalStatus {
    /// Parses a source status label, case-insensitively. Both the Dutch
    /// labels used by Gripp and their English equivalents are accepted.
    pub fn parse(label: Option<&str>) -> Self {
        let Some(label) = label else {
            return ApprovalStatus::Unknown;
        };
        match label.trim().to_lowercase().as_str() {
            "concept" | "draft" => ApprovalStatus::Draft,
            "ingediend" | "submitted" => ApprovalStatus::Submitted,
            "gefiatteerd" | "goedgekeurd" | "approved" => ApprovalStatus::Approved,
            "afgekeurd" | "rejected" => ApprovalStatus::Rejected,
            _ => ApprovalStatus::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Draft => "draft",
            ApprovalStatus::Submitted => "submitted",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
            ApprovalStatus::Unknown => "unknown",
        }
    }
}

// --- Source Records ---

/// A logged work-hour record from the legacy urenregistratie table.
///
/// `hours` is `None` when the source value was absent *or* unparseable;
/// `hours_unparseable` distinguishes the two so that malformed values can
/// be counted instead of silently becoming zero.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeEntry {
    pub id: String,
    pub employee_id: Option<String>,
    pub project_id: Option<String>,
    pub hours: Option<Decimal>,
    pub hours_unparseable: bool,
    pub date: Option<NaiveDate>,
    pub status: ApprovalStatus,
}

/// A planned/billable line item from the projectlines table. This is not a
/// work log: `amount` is the planned quantity, `amount_written` the
/// quantity actually consumed. Which of the two feeds the hour totals is a
/// policy decision (`LineAmountField` in `reconcile.rs`).
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectLine {
    pub id: String,
    pub company_id: Option<String>,
    pub project_id: Option<String>,
    pub amount: Option<Decimal>,
    pub amount_unparseable: bool,
    pub amount_written: Option<Decimal>,
    pub amount_written_unparseable: bool,
    /// Lower-cased, trimmed unit label ("uur", "stuk", ...). `None` when
    /// the source field was empty.
    pub unit: Option<String>,
    pub hidden_for_timewriting: bool,
    pub created_on: Option<NaiveDate>,
    pub updated_on: Option<NaiveDate>,
}

/// Project master data. Never owns hour totals itself; it exists for the
/// company join and as a source of fallback dates.
#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    pub id: String,
    pub company_id: Option<String>,
    pub archived: bool,
    pub start_date: Option<NaiveDate>,
    pub deadline_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub updated_on: Option<NaiveDate>,
}

/// Company master data with its tag list parsed into a set once, so that
/// segmentation is a typed membership check rather than repeated substring
/// matching on the raw comma-separated field.
#[derive(Debug, Clone, PartialEq)]
pub struct Company {
    pub id: String,
    pub name: String,
    pub tags: BTreeSet<String>,
}

impl Company {
    /// Splits the raw comma-separated tag field. Tags are trimmed; empty
    /// segments are dropped. Matching stays exact (no case folding), which
    /// mirrors how the tags are maintained upstream.
    pub fn parse_tags(raw: &str) -> BTreeSet<String> {
        raw.split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}
