// NetGather - core/filter.rs
//
// Composable filter chain for the line corpus.
// All active stages are AND-combined and applied in a fixed order.
// Core layer: pure logic, no I/O dependencies.

use crate::core::model::LineRecord;
use crate::util::error::FilterError;
use regex::{Regex, RegexBuilder};

/// Filter settings. Empty fields are no-op stages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSpec {
    /// Target identifier substring (case-insensitive).
    pub target_contains: String,

    /// Line must contain this substring (case-insensitive).
    pub include_text: String,

    /// Line must NOT contain this substring (case-insensitive).
    pub exclude_text: String,

    /// Line must match this regex (case-insensitive).
    pub include_regex: String,

    /// Line must NOT match this regex (case-insensitive).
    pub exclude_regex: String,
}

impl FilterSpec {
    /// Returns true if no stage is active.
    pub fn is_empty(&self) -> bool {
        self.target_contains.is_empty()
            && self.include_text.is_empty()
            && self.exclude_text.is_empty()
            && self.include_regex.is_empty()
            && self.exclude_regex.is_empty()
    }

    /// Compile the settings once so it can be applied to many records.
    pub fn compile(&self) -> CompiledFilter {
        CompiledFilter {
            target_lower: self.target_contains.to_lowercase(),
            include_lower: self.include_text.to_lowercase(),
            exclude_lower: self.exclude_text.to_lowercase(),
            include_regex: lenient_regex(&self.include_regex),
            exclude_regex: lenient_regex(&self.exclude_regex),
        }
    }
}

/// A `FilterSpec` with its substrings lowered and regexes compiled.
///
/// Invalid regexes compile to `None`, which skips the stage.
#[derive(Debug, Clone)]
pub struct CompiledFilter {
    target_lower: String,
    include_lower: String,
    exclude_lower: String,
    include_regex: Option<Regex>,
    exclude_regex: Option<Regex>,
}

impl CompiledFilter {
    /// Check a single record against every active stage, in order.
    pub fn matches(&self, record: &LineRecord) -> bool {
        // Stage 1: target identifier
        if !self.target_lower.is_empty()
            && !record.target.to_lowercase().contains(&self.target_lower)
        {
            return false;
        }

        // Stages 2 and 3 share one lowered copy of the line.
        if !self.include_lower.is_empty() || !self.exclude_lower.is_empty() {
            let text_lower = record.text.to_lowercase();
            if !self.include_lower.is_empty() && !text_lower.contains(&self.include_lower) {
                return false;
            }
            if !self.exclude_lower.is_empty() && text_lower.contains(&self.exclude_lower) {
                return false;
            }
        }

        // Stage 4: include regex
        if let Some(ref regex) = self.include_regex {
            if !regex.is_match(&record.text) {
                return false;
            }
        }

        // Stage 5: exclude regex
        if let Some(ref regex) = self.exclude_regex {
            if regex.is_match(&record.text) {
                return false;
            }
        }

        true
    }
}

/// Apply filter settings to a corpus, returning a new filtered corpus.
///
/// The input is never mutated and record order is preserved, so applying
/// the same settings twice yields the same result as applying them once.
pub fn apply_filters(records: &[LineRecord], spec: &FilterSpec) -> Vec<LineRecord> {
    if spec.is_empty() {
        return records.to_vec();
    }
    let compiled = spec.compile();
    records
        .iter()
        .filter(|record| compiled.matches(record))
        .cloned()
        .collect()
}

/// Compile a user regex case-insensitively, reporting the compile error.
///
/// The filter chain itself treats invalid patterns as absent; callers that
/// want to tell the user why use this first.
pub fn validate_regex(pattern: &str) -> Result<Option<Regex>, FilterError> {
    if pattern.is_empty() {
        return Ok(None);
    }
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map(Some)
        .map_err(|e| FilterError::InvalidRegex {
            pattern: pattern.to_string(),
            source: e,
        })
}

fn lenient_regex(pattern: &str) -> Option<Regex> {
    match validate_regex(pattern) {
        Ok(regex) => regex,
        Err(e) => {
            tracing::debug!(error = %e, "Ignoring invalid filter regex");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn rec(target: &str, n: usize, text: &str) -> LineRecord {
        LineRecord {
            target: target.to_string(),
            line_number: Some(n),
            text: text.to_string(),
            captured_at: Utc.timestamp_opt(0, 0).unwrap(),
        }
    }

    fn corpus() -> Vec<LineRecord> {
        vec![
            rec("core-r1", 1, "GigabitEthernet0/1 10.0.0.1 YES manual up up"),
            rec("core-r1", 2, "GigabitEthernet0/2 unassigned YES unset administratively down down"),
            rec("edge-r2", 1, "Vlan1 10.1.1.1 YES NVRAM up up"),
            rec("edge-r2", 2, "Loopback0 192.0.2.1 YES manual up up"),
        ]
    }

    #[test]
    fn test_empty_spec_returns_all() {
        assert_eq!(apply_filters(&corpus(), &FilterSpec::default()), corpus());
    }

    #[test]
    fn test_target_contains_case_insensitive() {
        let spec = FilterSpec {
            target_contains: "EDGE".into(),
            ..Default::default()
        };
        let out = apply_filters(&corpus(), &spec);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|r| r.target == "edge-r2"));
    }

    #[test]
    fn test_include_and_exclude_text() {
        let spec = FilterSpec {
            include_text: "gigabit".into(),
            exclude_text: "ADMINISTRATIVELY".into(),
            ..Default::default()
        };
        let out = apply_filters(&corpus(), &spec);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].line_number, Some(1));
    }

    #[test]
    fn test_regex_stages_case_insensitive() {
        let spec = FilterSpec {
            include_regex: r"^(gi|lo)".into(),
            exclude_regex: r"administratively\s+down".into(),
            ..Default::default()
        };
        let out = apply_filters(&corpus(), &spec);
        let lines: Vec<_> = out.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(
            lines,
            vec![
                "GigabitEthernet0/1 10.0.0.1 YES manual up up",
                "Loopback0 192.0.2.1 YES manual up up"
            ]
        );
    }

    #[test]
    fn test_invalid_regex_is_a_noop_stage() {
        let spec = FilterSpec {
            include_regex: "[unclosed".into(),
            ..Default::default()
        };
        assert_eq!(apply_filters(&corpus(), &spec).len(), corpus().len());
    }

    #[test]
    fn test_validate_regex_reports_error() {
        assert!(validate_regex("[unclosed").is_err());
        assert!(validate_regex("").unwrap().is_none());
        assert!(validate_regex(r"^Gi\d+").unwrap().is_some());
    }

    #[test]
    fn test_filter_is_idempotent() {
        let spec = FilterSpec {
            target_contains: "r".into(),
            include_text: "up".into(),
            exclude_regex: "loopback".into(),
            ..Default::default()
        };
        let once = apply_filters(&corpus(), &spec);
        let twice = apply_filters(&once, &spec);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_input_not_mutated_and_order_preserved() {
        let input = corpus();
        let spec = FilterSpec {
            include_text: "up up".into(),
            ..Default::default()
        };
        let out = apply_filters(&input, &spec);
        assert_eq!(input, corpus());
        assert_eq!(out, vec![input[0].clone(), input[2].clone(), input[3].clone()]);
    }
}
