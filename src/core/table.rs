// NetGather - core/table.rs
//
// Row-sets: the tabular export shape shared by the line views, the
// structured tiers, and the failure list. Column order is fixed at
// construction and never re-sorted.

use crate::core::model::{
    ExecutionResult, ExtractionReason, LineRecord, Tier, TierOutcome,
};
use crate::util::constants;
use serde::Serialize;

/// Which view a row-set holds. Determines the export file stem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowSetKind {
    AllLines,
    FilteredLines,
    Template,
    Pattern,
    Split,
    /// The preferred structured view, whichever tier supplied it.
    BestAvailable,
    Failures,
}

impl RowSetKind {
    pub fn file_stem(&self) -> &'static str {
        match self {
            RowSetKind::AllLines => constants::EXPORT_ALL_LINES,
            RowSetKind::FilteredLines => constants::EXPORT_FILTERED_LINES,
            RowSetKind::Template => constants::EXPORT_TEMPLATE,
            RowSetKind::Pattern => constants::EXPORT_PATTERN,
            RowSetKind::Split => constants::EXPORT_SPLIT,
            RowSetKind::BestAvailable => constants::EXPORT_BEST,
            RowSetKind::Failures => constants::EXPORT_ERRORS,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RowSetKind::AllLines => "All lines",
            RowSetKind::FilteredLines => "Filtered lines",
            RowSetKind::Template => "Template rows",
            RowSetKind::Pattern => "Pattern rows",
            RowSetKind::Split => "Split columns",
            RowSetKind::BestAvailable => "Best available",
            RowSetKind::Failures => "Failures",
        }
    }
}

impl From<Tier> for RowSetKind {
    fn from(tier: Tier) -> Self {
        match tier {
            Tier::Template => RowSetKind::Template,
            Tier::Pattern => RowSetKind::Pattern,
            Tier::Split => RowSetKind::Split,
        }
    }
}

/// Ordered columns plus rows of optional cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowSet {
    pub kind: RowSetKind,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl RowSet {
    /// Line view: `host, line_no, line, ts`. Sentinels have no line number.
    pub fn from_lines(kind: RowSetKind, records: &[LineRecord]) -> Self {
        let columns = vec![
            constants::COLUMN_HOST.to_string(),
            constants::COLUMN_LINE_NO.to_string(),
            constants::COLUMN_LINE.to_string(),
            constants::COLUMN_TIMESTAMP.to_string(),
        ];
        let rows = records
            .iter()
            .map(|r| {
                vec![
                    Some(r.target.clone()),
                    r.line_number.map(|n| n.to_string()),
                    Some(r.text.clone()),
                    Some(r.captured_at.to_rfc3339()),
                ]
            })
            .collect();
        Self {
            kind,
            columns,
            rows,
        }
    }

    /// Structured tier rows. Template rows are `host` + values; pattern and
    /// split rows are `host, line_no, line` + extracted columns.
    pub fn from_tier(outcome: &TierOutcome) -> Self {
        let line_oriented = outcome.tier != Tier::Template;
        let mut columns = vec![constants::COLUMN_HOST.to_string()];
        if line_oriented {
            columns.push(constants::COLUMN_LINE_NO.to_string());
            columns.push(constants::COLUMN_LINE.to_string());
        }
        columns.extend(outcome.columns.iter().cloned());

        let rows = outcome
            .rows
            .iter()
            .map(|row| {
                let mut cells = Vec::with_capacity(columns.len());
                cells.push(Some(row.target.clone()));
                if line_oriented {
                    cells.push(row.line_number.map(|n| n.to_string()));
                    cells.push(row.line.clone());
                }
                cells.extend(outcome.columns.iter().map(|name| {
                    row.fields
                        .iter()
                        .find(|(column, _)| column == name)
                        .and_then(|(_, value)| value.clone())
                }));
                cells
            })
            .collect();

        Self {
            kind: outcome.tier.into(),
            columns,
            rows,
        }
    }

    /// Per-target failures followed by per-target template diagnostics:
    /// `host, kind, error`.
    pub fn from_failures(
        results: &[ExecutionResult],
        template_reasons: &[(String, ExtractionReason)],
    ) -> Self {
        let columns = vec![
            constants::COLUMN_HOST.to_string(),
            "kind".to_string(),
            constants::COLUMN_ERROR.to_string(),
        ];
        let mut rows: Vec<Vec<Option<String>>> = results
            .iter()
            .filter_map(|r| r.failure_reason().map(|f| (r, f)))
            .map(|(r, failure)| {
                vec![
                    Some(r.target.host.clone()),
                    Some(failure.kind.code().to_string()),
                    Some(failure.to_string()),
                ]
            })
            .collect();
        rows.extend(template_reasons.iter().map(|(host, reason)| {
            vec![
                Some(host.clone()),
                Some(reason.code().to_string()),
                Some(format!("template: {reason}")),
            ]
        }));
        Self {
            kind: RowSetKind::Failures,
            columns,
            rows,
        }
    }

    /// The same rows exported under another view.
    pub fn with_kind(mut self, kind: RowSetKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Apply a structured-table filter, returning a new row-set.
    pub fn filter(&self, filter: &TableFilter) -> RowSet {
        if filter.is_empty() {
            return self.clone();
        }
        let host_lower = filter.host_contains.to_lowercase();
        let text_lower = filter.contains.to_lowercase();
        let host_idx = self.column_index(constants::COLUMN_HOST);
        let text_idx = filter
            .column
            .as_deref()
            .and_then(|c| self.columns.iter().position(|name| name.eq_ignore_ascii_case(c)));

        let cell_contains = |cell: &Option<String>, needle: &str| {
            cell.as_deref()
                .is_some_and(|v| v.to_lowercase().contains(needle))
        };

        let rows = self
            .rows
            .iter()
            .filter(|row| {
                if !host_lower.is_empty() {
                    let Some(idx) = host_idx else {
                        return false;
                    };
                    if !cell_contains(&row[idx], &host_lower) {
                        return false;
                    }
                }
                if !text_lower.is_empty() {
                    return match (filter.column.as_deref(), text_idx) {
                        (None, _) => row.iter().any(|cell| cell_contains(cell, &text_lower)),
                        (Some(_), Some(idx)) => cell_contains(&row[idx], &text_lower),
                        (Some(_), None) => false,
                    };
                }
                true
            })
            .cloned()
            .collect();

        RowSet {
            kind: self.kind,
            columns: self.columns.clone(),
            rows,
        }
    }
}

/// Filter over a structured row-set. Both stages are case-insensitive
/// substring matches; empty stages are skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableFilter {
    /// Substring of the `host` column.
    pub host_contains: String,

    /// Restrict `contains` to this column (matched case-insensitively);
    /// `None` searches every column.
    pub column: Option<String>,

    pub contains: String,
}

impl TableFilter {
    pub fn is_empty(&self) -> bool {
        self.host_contains.is_empty() && self.contains.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{ExtractionRow, SessionFailure, Target};
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    fn pattern_outcome() -> TierOutcome {
        let row = |target: &str, n: usize, intf: &str, status: Option<&str>| ExtractionRow {
            tier: Tier::Pattern,
            target: target.to_string(),
            line_number: Some(n),
            line: Some(format!("{intf} line")),
            fields: vec![
                ("intf".to_string(), Some(intf.to_string())),
                ("status".to_string(), status.map(str::to_string)),
            ],
        };
        TierOutcome {
            tier: Tier::Pattern,
            columns: vec!["intf".to_string(), "status".to_string()],
            rows: vec![
                row("core-r1", 1, "Gi0/1", Some("up")),
                row("core-r1", 2, "Gi0/2", None),
                row("edge-r2", 1, "Vlan10", Some("down")),
            ],
            reason: None,
            target_reasons: Vec::new(),
        }
    }

    #[test]
    fn test_line_view_columns() {
        let records = vec![LineRecord {
            target: "r1".into(),
            line_number: Some(1),
            text: "hello".into(),
            captured_at: Utc.timestamp_opt(0, 0).unwrap(),
        }];
        let set = RowSet::from_lines(RowSetKind::AllLines, &records);
        assert_eq!(set.columns, vec!["host", "line_no", "line", "ts"]);
        assert_eq!(set.rows[0][1].as_deref(), Some("1"));
        assert_eq!(set.rows[0][3].as_deref(), Some("1970-01-01T00:00:00+00:00"));
    }

    #[test]
    fn test_tier_columns_are_prefixed() {
        let set = RowSet::from_tier(&pattern_outcome());
        assert_eq!(set.kind, RowSetKind::Pattern);
        assert_eq!(set.columns, vec!["host", "line_no", "line", "intf", "status"]);
        assert_eq!(set.rows[1][4], None);
    }

    #[test]
    fn test_failures_include_template_diagnostics() {
        let results = vec![
            ExecutionResult::success(Target::new(0, "r1"), "x".into(), Duration::ZERO),
            ExecutionResult::failure(
                Target::new(1, "r2"),
                SessionFailure::timeout(Duration::from_secs(25)),
                Duration::ZERO,
            ),
        ];
        let reasons = vec![("r1".to_string(), ExtractionReason::TemplateMatchEmpty)];
        let set = RowSet::from_failures(&results, &reasons);
        assert_eq!(set.len(), 2);
        assert_eq!(set.rows[0][1].as_deref(), Some("timeout"));
        assert_eq!(
            set.rows[1][2].as_deref(),
            Some("template: no rows parsed (template returned zero matches)")
        );
    }

    #[test]
    fn test_filter_any_column_and_specific_column() {
        let set = RowSet::from_tier(&pattern_outcome());

        let any = set.filter(&TableFilter {
            contains: "DOWN".into(),
            ..Default::default()
        });
        assert_eq!(any.len(), 1);

        let column = set.filter(&TableFilter {
            column: Some("INTF".into()),
            contains: "gi0".into(),
            ..Default::default()
        });
        assert_eq!(column.len(), 2);

        let host = set.filter(&TableFilter {
            host_contains: "EDGE".into(),
            ..Default::default()
        });
        assert_eq!(host.len(), 1);

        let unknown = set.filter(&TableFilter {
            column: Some("missing".into()),
            contains: "x".into(),
            ..Default::default()
        });
        assert!(unknown.is_empty());
    }
}
