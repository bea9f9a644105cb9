// src/reconcile.rs
//
// Aggregator: reconciles hour totals from the legacy urenregistratie
// source against the projectlines source, per company and per project.
// The whole pass is a pure function of its inputs and policy; the same
// inputs always produce the same summary, row order included.

use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{info, warn};

use crate::effective_date::{DateChain, DateCoverage};
use crate::filters::{is_hour_unit, StatusBreakdown, StatusFilter, UnitBreakdown};
use crate::gripp::{Company, Project, ProjectLine, TimeEntry, UNMAPPED_LABEL};
use crate::period::{self, DatePartition, PartitionCounts, Period};

// --- Policy ---

/// Which project-line quantity feeds the hour totals. The source system
/// never settled this; it is a reporting decision, so it is a required
/// parameter rather than a hard-coded pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineAmountField {
    /// `amountwritten`: hours actually consumed against the line.
    Written,
    /// `amount`: hours planned/quoted on the line.
    Planned,
}

impl LineAmountField {
    pub fn pick(&self, line: &ProjectLine) -> (Option<Decimal>, bool) {
        match self {
            LineAmountField::Written => (line.amount_written, line.amount_written_unparseable),
            LineAmountField::Planned => (line.amount, line.amount_unparseable),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LineAmountField::Written => "amountwritten",
            LineAmountField::Planned => "amount",
        }
    }
}

/// Aggregation policy. Deliberately has no `Default`: callers must state
/// the status filter and amount field on every invocation, so two reports
/// can never silently disagree on what they counted.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcilePolicy {
    pub status_filter: StatusFilter,
    pub line_amount: LineAmountField,
    pub entry_date_chain: DateChain,
    pub line_date_chain: DateChain,
    pub include_hidden_lines: bool,
}

impl ReconcilePolicy {
    /// Policy with the standard date chains and hidden lines excluded.
    pub fn new(status_filter: StatusFilter, line_amount: LineAmountField) -> Self {
        Self {
            status_filter,
            line_amount,
            entry_date_chain: DateChain::default_for_entries(),
            line_date_chain: DateChain::default_for_lines(),
            include_hidden_lines: false,
        }
    }
}

// --- Summary Types ---

/// Relationship between the two per-company (or per-project) totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Exact,
    Overrun,
    Underrun,
    /// Hours exist only in the time registration source.
    RegistrationOnly,
    /// Hours exist only in the project lines source.
    LinesOnly,
}

impl Classification {
    pub fn for_totals(registration_hours: Decimal, line_hours: Decimal) -> Self {
        if registration_hours.is_zero() && line_hours.is_zero() {
            Classification::Exact
        } else if line_hours.is_zero() {
            Classification::RegistrationOnly
        } else if registration_hours.is_zero() {
            Classification::LinesOnly
        } else if registration_hours == line_hours {
            Classification::Exact
        } else if registration_hours > line_hours {
            Classification::Overrun
        } else {
            Classification::Underrun
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Exact => "exact",
            Classification::Overrun => "overrun",
            Classification::Underrun => "underrun",
            Classification::RegistrationOnly => "registration-only",
            Classification::LinesOnly => "lines-only",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompanySummary {
    pub company_id: String,
    pub company_name: String,
    pub registration_hours: Decimal,
    pub line_hours: Decimal,
    /// registration_hours - line_hours.
    pub difference: Decimal,
    pub classification: Classification,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectSummary {
    pub project_id: String,
    pub company_id: String,
    pub registration_hours: Decimal,
    pub line_hours: Decimal,
    pub difference: Decimal,
    pub classification: Classification,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GrandTotals {
    pub registration_hours: Decimal,
    pub line_hours: Decimal,
    pub difference: Decimal,
}

/// Per-source bookkeeping of everything that did not flow into the sums.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SourceDiagnostics {
    pub partitions: PartitionCounts,
    pub unparseable_amounts: u64,
    pub missing_amounts: u64,
    pub unmapped_companies: u64,
}

/// Everything a consumer needs to know which filter state produced the
/// totals. Attached to every summary; never aggregated away.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagnostics {
    pub registrations: SourceDiagnostics,
    pub lines: SourceDiagnostics,
    pub excluded_statuses: StatusBreakdown,
    pub non_hour_units: UnitBreakdown,
    pub hidden_lines_skipped: u64,
    pub entry_date_coverage: DateCoverage,
    pub line_date_coverage: DateCoverage,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconciledSummary {
    /// One row per company appearing in either source, sorted by id.
    pub companies: Vec<CompanySummary>,
    /// One row per project appearing in either source, sorted by id.
    pub projects: Vec<ProjectSummary>,
    pub totals: GrandTotals,
    pub diagnostics: Diagnostics,
}

impl ReconciledSummary {
    pub fn company(&self, company_id: &str) -> Option<&CompanySummary> {
        self.companies.iter().find(|c| c.company_id == company_id)
    }

    pub fn project(&self, project_id: &str) -> Option<&ProjectSummary> {
        self.projects.iter().find(|p| p.project_id == project_id)
    }
}

/// Input tables, already normalized. The engine never loads data itself.
#[derive(Debug, Clone, Copy)]
pub struct ReconcileInput<'a> {
    pub time_entries: &'a [TimeEntry],
    pub project_lines: &'a [ProjectLine],
    pub projects: &'a [Project],
    pub companies: &'a [Company],
}

// --- Aggregation ---

/// Reconciles the two hour sources into per-company and per-project
/// summaries for the given period and policy.
///
/// Every input row lands in exactly one date partition of its source's
/// diagnostics; rows excluded by status, unit, hidden flag or amount
/// parseability are tallied in the corresponding breakdown. Companies
/// present in only one source appear with the other side at zero.
pub fn aggregate(
    input: &ReconcileInput,
    period: Option<&Period>,
    policy: &ReconcilePolicy,
) -> ReconciledSummary {
    let project_by_id: HashMap<&str, &Project> = input
        .projects
        .iter()
        .map(|p| (p.id.as_str(), p))
        .collect();
    let company_by_id: HashMap<&str, &Company> = input
        .companies
        .iter()
        .map(|c| (c.id.as_str(), c))
        .collect();

    let mut diagnostics = Diagnostics::default();
    let mut registration_by_company: BTreeMap<String, Decimal> = BTreeMap::new();
    let mut registration_by_project: BTreeMap<String, Decimal> = BTreeMap::new();
    let mut line_by_company: BTreeMap<String, Decimal> = BTreeMap::new();
    let mut line_by_project: BTreeMap<String, Decimal> = BTreeMap::new();

    info!(
        "Aggregating {} time registrations and {} project lines (statuses: {}, line amount: {})",
        input.time_entries.len(),
        input.project_lines.len(),
        policy.status_filter.as_str(),
        policy.line_amount.as_str()
    );

    // --- Time registrations (legacy source) ---
    for entry in input.time_entries {
        let project = entry
            .project_id
            .as_deref()
            .and_then(|id| project_by_id.get(id).copied());

        let resolved = policy.entry_date_chain.resolve_entry(entry, project);
        diagnostics.entry_date_coverage.record(resolved.as_ref());

        let partition = period::classify(period, resolved.map(|r| r.date));
        diagnostics
            .registrations
            .partitions
            .record(partition, entry.hours);

        if !policy.status_filter.admits(entry.status) {
            diagnostics.excluded_statuses.record(entry.status, entry.hours);
            continue;
        }
        if partition == DatePartition::OutOfRange {
            continue;
        }
        let hours = match entry.hours {
            Some(hours) => hours,
            None => {
                if entry.hours_unparseable {
                    warn!("Time registration {} has an unparseable amount; excluded from totals", entry.id);
                    diagnostics.registrations.unparseable_amounts += 1;
                } else {
                    diagnostics.registrations.missing_amounts += 1;
                }
                continue;
            }
        };

        // Company is reached through the project join; a broken join
        // lands the hours under the unmapped sentinel, not on the floor.
        let company_key = match project.and_then(|p| p.company_id.as_deref()) {
            Some(company_id) => company_id.to_string(),
            None => {
                warn!(
                    "Time registration {} has no resolvable company (project: {:?})",
                    entry.id, entry.project_id
                );
                diagnostics.registrations.unmapped_companies += 1;
                UNMAPPED_LABEL.to_string()
            }
        };
        let project_key = entry
            .project_id
            .clone()
            .unwrap_or_else(|| UNMAPPED_LABEL.to_string());

        *registration_by_company.entry(company_key).or_default() += hours;
        *registration_by_project.entry(project_key).or_default() += hours;
    }

    // --- Project lines (planned/billing source) ---
    for line in input.project_lines {
        let project = line
            .project_id
            .as_deref()
            .and_then(|id| project_by_id.get(id).copied());

        let resolved = policy.line_date_chain.resolve_line(line, project);
        diagnostics.line_date_coverage.record(resolved.as_ref());

        let (amount, unparseable) = policy.line_amount.pick(line);
        let partition = period::classify(period, resolved.map(|r| r.date));
        diagnostics.lines.partitions.record(partition, amount);

        if line.hidden_for_timewriting && !policy.include_hidden_lines {
            diagnostics.hidden_lines_skipped += 1;
            continue;
        }
        if !is_hour_unit(line.unit.as_deref()) {
            diagnostics.non_hour_units.record(line.unit.as_deref(), amount);
            continue;
        }
        if partition == DatePartition::OutOfRange {
            continue;
        }
        let amount = match amount {
            Some(amount) => amount,
            None => {
                if unparseable {
                    warn!("Project line {} has an unparseable {} value; excluded from totals", line.id, policy.line_amount.as_str());
                    diagnostics.lines.unparseable_amounts += 1;
                } else {
                    diagnostics.lines.missing_amounts += 1;
                }
                continue;
            }
        };

        // Lines carry a direct company reference; fall back to the
        // project join before giving up on the mapping.
        let company_key = match line
            .company_id
            .as_deref()
            .or_else(|| project.and_then(|p| p.company_id.as_deref()))
        {
            Some(company_id) => company_id.to_string(),
            None => {
                warn!(
                    "Project line {} has no resolvable company (project: {:?})",
                    line.id, line.project_id
                );
                diagnostics.lines.unmapped_companies += 1;
                UNMAPPED_LABEL.to_string()
            }
        };
        let project_key = line
            .project_id
            .clone()
            .unwrap_or_else(|| UNMAPPED_LABEL.to_string());

        *line_by_company.entry(company_key).or_default() += amount;
        *line_by_project.entry(project_key).or_default() += amount;
    }

    // --- Outer join and classification ---
    let company_ids: BTreeSet<&String> = registration_by_company
        .keys()
        .chain(line_by_company.keys())
        .collect();
    let mut companies = Vec::with_capacity(company_ids.len());
    let mut totals = GrandTotals::default();
    for company_id in company_ids {
        let registration_hours = registration_by_company
            .get(company_id)
            .copied()
            .unwrap_or_default();
        let line_hours = line_by_company.get(company_id).copied().unwrap_or_default();
        let company_name = if company_id.as_str() == UNMAPPED_LABEL {
            UNMAPPED_LABEL.to_string()
        } else {
            match company_by_id.get(company_id.as_str()) {
                Some(company) => company.name.clone(),
                None => {
                    warn!(
                        "Company {} appears in the hour totals but not in the companies table",
                        company_id
                    );
                    UNMAPPED_LABEL.to_string()
                }
            }
        };

        totals.registration_hours += registration_hours;
        totals.line_hours += line_hours;
        companies.push(CompanySummary {
            company_id: company_id.clone(),
            company_name,
            registration_hours,
            line_hours,
            difference: registration_hours - line_hours,
            classification: Classification::for_totals(registration_hours, line_hours),
        });
    }
    totals.difference = totals.registration_hours - totals.line_hours;

    let project_ids: BTreeSet<&String> = registration_by_project
        .keys()
        .chain(line_by_project.keys())
        .collect();
    let mut projects = Vec::with_capacity(project_ids.len());
    for project_id in project_ids {
        let registration_hours = registration_by_project
            .get(project_id)
            .copied()
            .unwrap_or_default();
        let line_hours = line_by_project.get(project_id).copied().unwrap_or_default();
        let company_id = project_by_id
            .get(project_id.as_str())
            .and_then(|p| p.company_id.as_deref())
            .unwrap_or(UNMAPPED_LABEL)
            .to_string();
        projects.push(ProjectSummary {
            project_id: project_id.clone(),
            company_id,
            registration_hours,
            line_hours,
            difference: registration_hours - line_hours,
            classification: Classification::for_totals(registration_hours, line_hours),
        });
    }

    diagnostics
        .entry_date_coverage
        .log_summary("Time registrations");
    diagnostics.line_date_coverage.log_summary("Project lines");
    info!(
        "Reconciled {} companies / {} projects: {} vs {} hours (difference {})",
        companies.len(),
        projects.len(),
        totals.registration_hours.round_dp(2),
        totals.line_hours.round_dp(2),
        totals.difference.round_dp(2)
    );

    ReconciledSummary {
        companies,
        projects,
        totals,
        diagnostics,
    }
}
