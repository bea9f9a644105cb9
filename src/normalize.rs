// src/normalize.rs
//
// Record Normalizer: raw extract rows (JSON-ish maps of heterogeneous
// values, often string-encoded) into the typed records of `gripp.rs`.
// All transforms here are pure and total: a value that cannot be parsed
// becomes "absent" or "unparseable", never a panic and never a zero.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use tracing::{debug, info};

use crate::gripp::{ApprovalStatus, Company, Project, ProjectLine, TimeEntry};

/// One raw row as loaded from an extract: column name -> JSON value.
/// CSV extracts yield only strings and nulls; JSON extracts may carry
/// native numbers and booleans. The coercions below accept both.
pub type RawRow = serde_json::Map<String, Value>;

/// Outcome of coercing a raw value to a decimal amount. `Unparseable` is
/// deliberately distinct from `Absent`: the aggregator counts the former
/// so malformed amounts are visible instead of silently missing.
#[derive(Debug, Clone, PartialEq)]
pub enum CoercedAmount {
    Value(Decimal),
    Absent,
    Unparseable,
}

impl CoercedAmount {
    pub fn value(&self) -> Option<Decimal> {
        match self {
            CoercedAmount::Value(d) => Some(*d),
            _ => None,
        }
    }

    pub fn is_unparseable(&self) -> bool {
        matches!(self, CoercedAmount::Unparseable)
    }
}

// --- Field Access Helpers ---

/// Returns the first of `keys` present in the row with a non-null value.
/// The mirror schema is not fully stable (e.g. "project" vs
/// "offerprojectbase_id"), so lookups accept the known aliases.
fn first_value<'a>(row: &'a RawRow, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| row.get(*k))
        .find(|v| !v.is_null())
}

fn opt_string(row: &RawRow, keys: &[&str]) -> Option<String> {
    match first_value(row, keys)? {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        // Numeric ids are common in the JSON extracts.
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn coerce_amount(row: &RawRow, keys: &[&str]) -> CoercedAmount {
    let Some(value) = first_value(row, keys) else {
        return CoercedAmount::Absent;
    };
    match value {
        Value::Number(n) => match Decimal::from_str(&n.to_string()) {
            Ok(d) => CoercedAmount::Value(d),
            Err(_) => CoercedAmount::Unparseable,
        },
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return CoercedAmount::Absent;
            }
            // Gripp exports use either "12.5" or the Dutch "12,5".
            let candidate = trimmed.replace(',', ".");
            match Decimal::from_str(&candidate) {
                Ok(d) => CoercedAmount::Value(d),
                Err(_) => CoercedAmount::Unparseable,
            }
        }
        _ => CoercedAmount::Unparseable,
    }
}

const DATE_FORMATS: [&str; 4] = [
    "%Y-%m-%d",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%d-%m-%Y",
];

/// Parses a date-like value. Timestamps are truncated to their date part;
/// anything unrecognised resolves to `None` (absent), never an error.
pub fn coerce_date(row: &RawRow, keys: &[&str]) -> Option<NaiveDate> {
    let raw = opt_string(row, keys)?;
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(&raw, format) {
            return Some(date);
        }
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(&raw, format) {
            return Some(dt.date());
        }
    }
    // Last resort for timestamps with fractional seconds or offsets:
    // the leading 10 characters of an ISO timestamp are the date.
    if let Some(prefix) = raw.get(..10) {
        if let Ok(date) = NaiveDate::parse_from_str(prefix, "%Y-%m-%d") {
            return Some(date);
        }
    }
    debug!("Could not parse date value '{}'", raw);
    None
}

fn coerce_bool(row: &RawRow, keys: &[&str]) -> bool {
    match first_value(row, keys) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64() == Some(1),
        Some(Value::String(s)) => {
            matches!(s.trim().to_lowercase().as_str(), "true" | "1" | "yes" | "ja")
        }
        _ => false,
    }
}

fn row_id(row: &RawRow, fallback_index: usize) -> String {
    opt_string(row, &["id"]).unwrap_or_else(|| format!("row-{}", fallback_index))
}

// --- Per-Table Normalizers ---

pub fn normalize_time_entry(row: &RawRow, index: usize) -> TimeEntry {
    let hours = coerce_amount(row, &["amount", "hours", "uren"]);
    TimeEntry {
        id: row_id(row, index),
        employee_id: opt_string(row, &["employee_id", "employee"]),
        project_id: opt_string(row, &["project_id", "project", "offerprojectbase_id"]),
        hours_unparseable: hours.is_unparseable(),
        hours: hours.value(),
        date: coerce_date(row, &["date", "datum"]),
        status: ApprovalStatus::parse(opt_string(row, &["status"]).as_deref()),
    }
}

pub fn normalize_project_line(row: &RawRow, index: usize) -> ProjectLine {
    let amount = coerce_amount(row, &["amount"]);
    let amount_written = coerce_amount(row, &["amountwritten", "amount_written"]);
    ProjectLine {
        id: row_id(row, index),
        company_id: opt_string(row, &["company_id", "company"]),
        project_id: opt_string(row, &["project_id", "project", "offerprojectbase_id"]),
        amount_unparseable: amount.is_unparseable(),
        amount: amount.value(),
        amount_written_unparseable: amount_written.is_unparseable(),
        amount_written: amount_written.value(),
        unit: opt_string(row, &["unit", "unity"]).map(|u| u.to_lowercase()),
        hidden_for_timewriting: coerce_bool(row, &["hiddenfortimewriting", "hidden_for_timewriting"]),
        created_on: coerce_date(row, &["createdon", "created_on"]),
        updated_on: coerce_date(row, &["updatedon", "updated_on"]),
    }
}

pub fn normalize_project(row: &RawRow, index: usize) -> Project {
    Project {
        id: row_id(row, index),
        company_id: opt_string(row, &["company_id", "company"]),
        archived: coerce_bool(row, &["archived"]),
        start_date: coerce_date(row, &["startdate", "start_date"]),
        deadline_date: coerce_date(row, &["deadlinedate", "deadline_date", "deadline"]),
        end_date: coerce_date(row, &["enddate", "end_date"]),
        updated_on: coerce_date(row, &["updatedon", "updated_on"]),
    }
}

pub fn normalize_company(row: &RawRow, index: usize) -> Company {
    let id = row_id(row, index);
    Company {
        name: opt_string(row, &["companyname", "company_name", "name"])
            .unwrap_or_else(|| format!("(company {})", id)),
        tags: opt_string(row, &["tags", "tag"])
            .map(|raw| Company::parse_tags(&raw))
            .unwrap_or_default(),
        id,
    }
}

// --- Batch Wrappers ---

pub fn normalize_time_entries(rows: &[RawRow]) -> Vec<TimeEntry> {
    let entries: Vec<TimeEntry> = rows
        .iter()
        .enumerate()
        .map(|(i, row)| normalize_time_entry(row, i))
        .collect();
    info!("Normalized {} time registrations", entries.len());
    entries
}

pub fn normalize_project_lines(rows: &[RawRow]) -> Vec<ProjectLine> {
    let lines: Vec<ProjectLine> = rows
        .iter()
        .enumerate()
        .map(|(i, row)| normalize_project_line(row, i))
        .collect();
    info!("Normalized {} project lines", lines.len());
    lines
}

pub fn normalize_projects(rows: &[RawRow]) -> Vec<Project> {
    let projects: Vec<Project> = rows
        .iter()
        .enumerate()
        .map(|(i, row)| normalize_project(row, i))
        .collect();
    info!("Normalized {} projects", projects.len());
    projects
}

pub fn normalize_companies(rows: &[RawRow]) -> Vec<Company> {
    let companies: Vec<Company> = rows
        .iter()
        .enumerate()
        .map(|(i, row)| normalize_company(row, i))
        .collect();
    info!("Normalized {} companies", companies.len());
    companies
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn row(value: Value) -> RawRow {
        value.as_object().expect("test row must be an object").clone()
    }

    #[test]
    fn test_amount_coercion_accepts_strings_and_numbers() {
        let r = row(json!({"a": "12.5", "b": 8, "c": "9,25"}));
        assert_eq!(coerce_amount(&r, &["a"]), CoercedAmount::Value(dec!(12.5)));
        assert_eq!(coerce_amount(&r, &["b"]), CoercedAmount::Value(dec!(8)));
        assert_eq!(
            coerce_amount(&r, &["c"]),
            CoercedAmount::Value(dec!(9.25)),
            "Dutch decimal comma must parse"
        );
    }

    #[test]
    fn test_amount_coercion_distinguishes_absent_from_unparseable() {
        let r = row(json!({"empty": "", "junk": "n.v.t.", "null": null}));
        assert_eq!(coerce_amount(&r, &["empty"]), CoercedAmount::Absent);
        assert_eq!(coerce_amount(&r, &["missing"]), CoercedAmount::Absent);
        assert_eq!(coerce_amount(&r, &["null"]), CoercedAmount::Absent);
        assert_eq!(
            coerce_amount(&r, &["junk"]),
            CoercedAmount::Unparseable,
            "garbage must be flagged, not treated as zero or absent"
        );
    }

    #[test]
    fn test_date_coercion_formats() {
        let r = row(json!({
            "plain": "2024-03-05",
            "stamp": "2024-03-05 14:30:00",
            "iso": "2024-03-05T14:30:00.123+02:00",
            "dutch": "05-03-2024",
            "junk": "gisteren"
        }));
        let expected = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        for key in ["plain", "stamp", "iso", "dutch"] {
            assert_eq!(coerce_date(&r, &[key]), Some(expected), "format {}", key);
        }
        assert_eq!(coerce_date(&r, &["junk"]), None);
    }

    #[test]
    fn test_normalize_project_line_lowercases_unit() {
        let r = row(json!({
            "id": 42,
            "company": 7,
            "unit": " Uur ",
            "amountwritten": "12.5",
            "hiddenfortimewriting": "1"
        }));
        let line = normalize_project_line(&r, 0);
        assert_eq!(line.id, "42");
        assert_eq!(line.company_id.as_deref(), Some("7"));
        assert_eq!(line.unit.as_deref(), Some("uur"));
        assert_eq!(line.amount_written, Some(dec!(12.5)));
        assert!(!line.amount_written_unparseable);
        assert!(line.hidden_for_timewriting);
    }

    #[test]
    fn test_normalize_time_entry_unparseable_hours() {
        let r = row(json!({"id": "te-1", "amount": "??", "status": "Gefiatteerd"}));
        let entry = normalize_time_entry(&r, 0);
        assert_eq!(entry.hours, None);
        assert!(entry.hours_unparseable);
        assert_eq!(entry.status, ApprovalStatus::Approved);
        assert_eq!(entry.date, None);
    }
}
