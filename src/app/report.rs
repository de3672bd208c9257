// NetGather - app/report.rs
//
// Post-run extraction and export. Takes a finished `CollectionState`,
// applies the filter chain, runs the pattern and split tiers over the
// filtered corpus, and assembles the row-sets to export.

use crate::app::state::CollectionState;
use crate::core::export::{self, ExportFormat};
use crate::core::extract::{self, BestAvailable};
use crate::core::filter::FilterSpec;
use crate::core::model::{LineRecord, Tier, TierOutcome};
use crate::core::table::{RowSet, RowSetKind, TableFilter};
use crate::util::error::ExportError;
use std::path::{Path, PathBuf};

/// What to do with the corpus once collection is over.
#[derive(Debug, Clone, Default)]
pub struct ReportOptions {
    pub filter: FilterSpec,

    /// Narrows the best-available structured table before export.
    pub table_filter: TableFilter,

    /// Named-group pattern for the pattern tier. Empty skips the tier.
    pub pattern: String,

    /// Delimiter for the split tier (or `whitespace`). Empty skips the tier.
    pub split_delimiter: String,

    /// Maximum splits per line; 0 is unlimited.
    pub maxsplit: usize,
}

/// Everything derived from one run.
#[derive(Debug, Clone)]
pub struct Report {
    pub all_lines: Vec<LineRecord>,
    pub filtered_lines: Vec<LineRecord>,

    /// Outcomes of the tiers that ran, in priority order.
    pub outcomes: Vec<TierOutcome>,

    /// Per-target failures and template diagnostics.
    pub failures: RowSet,

    table_filter: TableFilter,
}

impl Report {
    pub fn build(state: &CollectionState, options: &ReportOptions) -> Self {
        let filtered_lines = state.filtered(&options.filter);
        tracing::info!(
            all = state.corpus.len(),
            filtered = filtered_lines.len(),
            "Filter chain applied"
        );

        let mut outcomes = Vec::with_capacity(Tier::all().len());
        if state.templates_enabled() {
            outcomes.push(state.template_outcome());
        }
        if !options.pattern.trim().is_empty() {
            outcomes.push(extract::extract_pattern(&filtered_lines, &options.pattern));
        }
        if !options.split_delimiter.is_empty() {
            outcomes.push(extract::extract_split(
                &filtered_lines,
                &options.split_delimiter,
                options.maxsplit,
            ));
        }
        for outcome in &outcomes {
            match &outcome.reason {
                Some(reason) if outcome.is_empty() => {
                    tracing::info!(tier = outcome.tier.label(), reason = %reason, "Tier produced no rows")
                }
                _ => tracing::info!(tier = outcome.tier.label(), rows = outcome.rows.len(), "Tier complete"),
            }
        }

        Self {
            all_lines: state.corpus.clone(),
            filtered_lines,
            outcomes,
            failures: RowSet::from_failures(&state.results, &state.template_reasons),
            table_filter: options.table_filter.clone(),
        }
    }

    pub fn outcome(&self, tier: Tier) -> Option<&TierOutcome> {
        self.outcomes.iter().find(|o| o.tier == tier)
    }

    pub fn best(&self) -> BestAvailable<'_> {
        extract::best_available(&self.outcomes, &self.filtered_lines)
    }

    /// The best-available view as a row-set. A structured view is narrowed
    /// by the table filter; the line fallback is already filtered.
    pub fn best_row_set(&self) -> RowSet {
        match self.best() {
            BestAvailable::Structured(outcome) => {
                let full = RowSet::from_tier(outcome);
                let narrowed = full.filter(&self.table_filter);
                if !self.table_filter.is_empty() {
                    tracing::info!(
                        tier = outcome.tier.label(),
                        rows = full.len(),
                        kept = narrowed.len(),
                        "Table filter applied"
                    );
                }
                narrowed.with_kind(RowSetKind::BestAvailable)
            }
            BestAvailable::Lines(lines) => RowSet::from_lines(RowSetKind::BestAvailable, lines),
        }
    }

    /// Row-sets to export: both line views, each non-empty tier, the
    /// best-available view, and the failure list when there is one.
    pub fn row_sets(&self) -> Vec<RowSet> {
        let mut sets = vec![
            RowSet::from_lines(RowSetKind::AllLines, &self.all_lines),
            RowSet::from_lines(RowSetKind::FilteredLines, &self.filtered_lines),
        ];
        sets.extend(
            self.outcomes
                .iter()
                .filter(|o| !o.is_empty())
                .map(RowSet::from_tier),
        );
        sets.push(self.best_row_set());
        if !self.failures.is_empty() {
            sets.push(self.failures.clone());
        }
        sets
    }

    /// Write every row-set into `dir`, returning the files written.
    pub fn write(&self, dir: &Path, format: ExportFormat) -> Result<Vec<PathBuf>, ExportError> {
        self.row_sets()
            .iter()
            .map(|set| export::write_row_set(dir, set, format))
            .collect()
    }
}
