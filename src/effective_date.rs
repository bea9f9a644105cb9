// src/effective_date.rs
//
// Date Resolution Chain: assigns each record an effective date by walking
// an ordered list of candidate fields, remembering which field won. The
// old dashboards re-derived this ad hoc per script, each with a different
// ordering and no record of coverage; here the chain is one configurable
// value and coverage statistics fall out of every run.

use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::info;

use crate::gripp::{Project, ProjectLine, TimeEntry};

/// Candidate date fields, used both as chain elements and as provenance
/// tags on resolved dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DateSource {
    EntryDate,
    LineCreated,
    LineUpdated,
    ProjectStart,
    ProjectDeadline,
    ProjectEnd,
    ProjectUpdated,
}

impl DateSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DateSource::EntryDate => "entry_date",
            DateSource::LineCreated => "line_created",
            DateSource::LineUpdated => "line_updated",
            DateSource::ProjectStart => "project_start",
            DateSource::ProjectDeadline => "project_deadline",
            DateSource::ProjectEnd => "project_end",
            DateSource::ProjectUpdated => "project_updated",
        }
    }
}

/// An effective date together with the field that supplied it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedDate {
    pub date: NaiveDate,
    pub source: DateSource,
}

/// Ordered fallback list. The first candidate that yields a date wins;
/// if none do, the record is undated (and still aggregated, see the
/// period filter).
#[derive(Debug, Clone, PartialEq)]
pub struct DateChain {
    sources: Vec<DateSource>,
}

impl DateChain {
    pub fn new(sources: Vec<DateSource>) -> Self {
        Self { sources }
    }

    /// Default chain for time registrations: the entry date is the
    /// record's own meaning; project dates are a last resort.
    pub fn default_for_entries() -> Self {
        Self::new(vec![
            DateSource::EntryDate,
            DateSource::ProjectStart,
            DateSource::ProjectDeadline,
        ])
    }

    /// Default chain for project lines. Line creation is the closest
    /// thing to an event date these rows carry; coverage of the project
    /// fields varies wildly per company, hence the long tail.
    pub fn default_for_lines() -> Self {
        Self::new(vec![
            DateSource::LineCreated,
            DateSource::ProjectStart,
            DateSource::ProjectDeadline,
            DateSource::ProjectUpdated,
        ])
    }

    fn resolve<F>(&self, candidate: F) -> Option<ResolvedDate>
    where
        F: Fn(DateSource) -> Option<NaiveDate>,
    {
        self.sources.iter().find_map(|&source| {
            candidate(source).map(|date| ResolvedDate { date, source })
        })
    }

    pub fn resolve_entry(&self, entry: &TimeEntry, project: Option<&Project>) -> Option<ResolvedDate> {
        self.resolve(|source| entry_candidate(entry, project, source))
    }

    pub fn resolve_line(&self, line: &ProjectLine, project: Option<&Project>) -> Option<ResolvedDate> {
        self.resolve(|source| line_candidate(line, project, source))
    }
}

fn project_candidate(project: Option<&Project>, source: DateSource) -> Option<NaiveDate> {
    let project = project?;
    match source {
        DateSource::ProjectStart => project.start_date,
        DateSource::ProjectDeadline => project.deadline_date,
        DateSource::ProjectEnd => project.end_date,
        DateSource::ProjectUpdated => project.updated_on,
        _ => None,
    }
}

fn entry_candidate(entry: &TimeEntry, project: Option<&Project>, source: DateSource) -> Option<NaiveDate> {
    match source {
        DateSource::EntryDate => entry.date,
        DateSource::LineCreated | DateSource::LineUpdated => None,
        _ => project_candidate(project, source),
    }
}

fn line_candidate(line: &ProjectLine, project: Option<&Project>, source: DateSource) -> Option<NaiveDate> {
    match source {
        DateSource::LineCreated => line.created_on,
        DateSource::LineUpdated => line.updated_on,
        DateSource::EntryDate => None,
        _ => project_candidate(project, source),
    }
}

/// How often each candidate field supplied the effective date, plus the
/// undated remainder. Emitted in the diagnostics of every aggregation so
/// nobody has to rediscover the coverage numbers with one-off queries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DateCoverage {
    pub wins: BTreeMap<DateSource, u64>,
    pub undated: u64,
    pub total: u64,
}

impl DateCoverage {
    pub fn record(&mut self, resolved: Option<&ResolvedDate>) {
        self.total += 1;
        match resolved {
            Some(resolved) => *self.wins.entry(resolved.source).or_default() += 1,
            None => self.undated += 1,
        }
    }

    /// Percentage of records dated by `source`, 0.0 for an empty input.
    pub fn coverage_pct(&self, source: DateSource) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let wins = self.wins.get(&source).copied().unwrap_or(0);
        (wins as f64) * 100.0 / (self.total as f64)
    }

    pub fn log_summary(&self, label: &str) {
        for (source, wins) in &self.wins {
            info!(
                "{}: {} of {} records dated via {} ({:.1}%)",
                label,
                wins,
                self.total,
                source.as_str(),
                self.coverage_pct(*source)
            );
        }
        if self.undated > 0 {
            info!(
                "{}: {} of {} records have no resolvable date",
                label, self.undated, self.total
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gripp::ApprovalStatus;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("valid test date")
    }

    fn bare_line(id: &str) -> ProjectLine {
        ProjectLine {
            id: id.to_string(),
            company_id: None,
            project_id: None,
            amount: None,
            amount_unparseable: false,
            amount_written: None,
            amount_written_unparseable: false,
            unit: None,
            hidden_for_timewriting: false,
            created_on: None,
            updated_on: None,
        }
    }

    fn bare_project(id: &str) -> Project {
        Project {
            id: id.to_string(),
            company_id: None,
            archived: false,
            start_date: None,
            deadline_date: None,
            end_date: None,
            updated_on: None,
        }
    }

    #[test]
    fn test_line_falls_back_to_project_start() {
        let line = bare_line("l1");
        let mut project = bare_project("p1");
        project.start_date = Some(d("2024-02-01"));

        let resolved = DateChain::default_for_lines()
            .resolve_line(&line, Some(&project))
            .expect("project start should resolve");
        assert_eq!(resolved.date, d("2024-02-01"));
        assert_eq!(resolved.source, DateSource::ProjectStart);
    }

    #[test]
    fn test_first_candidate_wins() {
        let mut line = bare_line("l1");
        line.created_on = Some(d("2024-01-15"));
        let mut project = bare_project("p1");
        project.start_date = Some(d("2024-02-01"));

        let resolved = DateChain::default_for_lines()
            .resolve_line(&line, Some(&project))
            .unwrap();
        assert_eq!(resolved.source, DateSource::LineCreated);
        assert_eq!(resolved.date, d("2024-01-15"));
    }

    #[test]
    fn test_unresolvable_is_none_not_error() {
        let line = bare_line("l1");
        assert_eq!(DateChain::default_for_lines().resolve_line(&line, None), None);
    }

    #[test]
    fn test_entry_chain_ignores_line_fields() {
        let entry = TimeEntry {
            id: "t1".to_string(),
            employee_id: None,
            project_id: None,
            hours: None,
            hours_unparseable: false,
            date: Some(d("2024-03-03")),
            status: ApprovalStatus::Approved,
        };
        let resolved = DateChain::default_for_entries()
            .resolve_entry(&entry, None)
            .unwrap();
        assert_eq!(resolved.source, DateSource::EntryDate);
    }

    #[test]
    fn test_coverage_percentages() {
        let mut coverage = DateCoverage::default();
        let hit = ResolvedDate {
            date: d("2024-01-01"),
            source: DateSource::LineCreated,
        };
        coverage.record(Some(&hit));
        coverage.record(Some(&hit));
        coverage.record(None);
        coverage.record(None);
        assert_eq!(coverage.total, 4);
        assert_eq!(coverage.undated, 2);
        assert!((coverage.coverage_pct(DateSource::LineCreated) - 50.0).abs() < f64::EPSILON);
        assert_eq!(coverage.coverage_pct(DateSource::ProjectStart), 0.0);
    }
}
