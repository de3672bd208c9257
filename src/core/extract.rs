// NetGather - core/extract.rs
//
// Structured extraction over a line corpus. Three independent tiers:
//
//   template  - per-target parsing with a template from the registry
//   pattern   - a caller-supplied named-group regex applied to each line
//   split     - each line split into c0..cN columns by a delimiter
//
// No tier ever fails hard: unmatched input yields zero rows plus an
// `ExtractionReason`. `best_available` picks the first non-empty tier in
// priority order, falling back to the raw lines.

use crate::core::corpus::texts_by_target;
use crate::core::model::{ExtractionReason, ExtractionRow, LineRecord, Tier, TierOutcome};
use crate::core::registry::{lookup_in, TemplateRegistry};
use crate::util::constants;
use crate::util::error::TemplateError;
use regex::RegexBuilder;

// =============================================================================
// Template tier
// =============================================================================

/// Parse each target's reconstructed output with the template registered
/// for (`device_type`, `command`).
///
/// The registry is read once, so a source swap during the call does not
/// mix templates from two indexes.
pub fn extract_template(
    records: &[LineRecord],
    registry: &TemplateRegistry,
    device_type: &str,
    command: &str,
) -> TierOutcome {
    let Some(index) = registry.snapshot() else {
        return TierOutcome::empty(Tier::Template, ExtractionReason::NoTemplateDirectory);
    };
    let resolved = match lookup_in(&index, device_type, command) {
        Ok(resolved) => resolved,
        Err(reason) => {
            tracing::debug!(reason = %reason, "Template tier skipped");
            return TierOutcome::empty(Tier::Template, reason);
        }
    };

    let texts = texts_by_target(records);
    if texts.is_empty() {
        return TierOutcome::empty(Tier::Template, ExtractionReason::NoLines);
    }

    let columns: Vec<String> = resolved
        .template
        .header()
        .iter()
        .map(|name| name.to_lowercase())
        .collect();
    let mut rows = Vec::new();
    let mut target_reasons = Vec::new();

    for (target, text) in texts {
        if text.trim().is_empty() {
            target_reasons.push((target, ExtractionReason::NoLines));
            continue;
        }
        match resolved.template.parse_text(&text) {
            Ok(table) if table.rows.is_empty() => {
                target_reasons.push((target, ExtractionReason::TemplateMatchEmpty));
            }
            Ok(table) => {
                tracing::debug!(target = %target, rows = table.rows.len(), "Template parsed");
                for cells in table.rows {
                    rows.push(ExtractionRow {
                        tier: Tier::Template,
                        target: target.clone(),
                        line_number: None,
                        line: None,
                        fields: columns
                            .iter()
                            .cloned()
                            .zip(cells.iter().map(|c| Some(c.to_cell())))
                            .collect(),
                    });
                }
            }
            Err(e) => {
                tracing::debug!(target = %target, error = %e, "Template raised an error");
                target_reasons.push((target, template_reason(&e)));
            }
        }
    }

    let reason = if rows.is_empty() {
        Some(
            target_reasons
                .first()
                .map(|(_, r)| r.clone())
                .unwrap_or(ExtractionReason::TemplateMatchEmpty),
        )
    } else {
        target_reasons.first().map(|(_, r)| r.clone())
    };

    TierOutcome {
        tier: Tier::Template,
        columns,
        rows,
        reason,
        target_reasons,
    }
}

fn template_reason(error: &TemplateError) -> ExtractionReason {
    ExtractionReason::TemplateError {
        message: error.to_string(),
    }
}

// =============================================================================
// Pattern tier
// =============================================================================

/// Apply a named-group pattern to each line independently.
///
/// Matching is case-insensitive and unanchored unless the pattern anchors
/// itself. A line yields a row when the pattern matches and at least one
/// named group took part in the match.
pub fn extract_pattern(records: &[LineRecord], pattern: &str) -> TierOutcome {
    if pattern.trim().is_empty() {
        return TierOutcome::empty(Tier::Pattern, ExtractionReason::PatternAbsent);
    }
    if pattern.len() > constants::MAX_REGEX_PATTERN_LENGTH {
        return TierOutcome::empty(
            Tier::Pattern,
            ExtractionReason::PatternCompileError {
                message: format!(
                    "pattern is {} chars, exceeds maximum of {}",
                    pattern.len(),
                    constants::MAX_REGEX_PATTERN_LENGTH
                ),
            },
        );
    }

    let regex = match RegexBuilder::new(pattern).case_insensitive(true).build() {
        Ok(regex) => regex,
        Err(e) => {
            return TierOutcome::empty(
                Tier::Pattern,
                ExtractionReason::PatternCompileError {
                    message: e.to_string(),
                },
            )
        }
    };
    let columns: Vec<String> = regex.capture_names().flatten().map(str::to_string).collect();
    if columns.is_empty() {
        return TierOutcome::empty(
            Tier::Pattern,
            ExtractionReason::PatternCompileError {
                message: "pattern has no named groups".to_string(),
            },
        );
    }

    let mut lines = 0usize;
    let mut rows = Vec::new();
    for record in records.iter().filter(|r| !r.is_sentinel()) {
        lines += 1;
        let Some(caps) = regex.captures(&record.text) else {
            continue;
        };
        let fields: Vec<(String, Option<String>)> = columns
            .iter()
            .map(|name| (name.clone(), caps.name(name).map(|m| m.as_str().to_string())))
            .collect();
        if fields.iter().all(|(_, value)| value.is_none()) {
            continue;
        }
        rows.push(ExtractionRow {
            tier: Tier::Pattern,
            target: record.target.clone(),
            line_number: record.line_number,
            line: Some(record.text.clone()),
            fields,
        });
    }

    let reason = if lines == 0 {
        Some(ExtractionReason::NoLines)
    } else if rows.is_empty() {
        Some(ExtractionReason::PatternMatchEmpty)
    } else {
        None
    };
    tracing::debug!(lines, rows = rows.len(), "Pattern tier finished");

    TierOutcome {
        tier: Tier::Pattern,
        columns,
        rows,
        reason,
        target_reasons: Vec::new(),
    }
}

// =============================================================================
// Split tier
// =============================================================================

/// Split every line into `c0..cN` columns.
///
/// `delimiter` is a literal separator, or the keyword `whitespace`
/// (any case) for runs of whitespace with leading and trailing whitespace
/// ignored. `maxsplit` bounds the number of splits; 0 means unlimited and
/// the remainder after the last split stays in the final column.
pub fn extract_split(records: &[LineRecord], delimiter: &str, maxsplit: usize) -> TierOutcome {
    if delimiter.is_empty() {
        return TierOutcome::empty(Tier::Split, ExtractionReason::DelimiterAbsent);
    }
    let by_whitespace = delimiter.eq_ignore_ascii_case(constants::WHITESPACE_DELIMITER);

    let mut split_lines: Vec<(&LineRecord, Vec<String>)> = Vec::new();
    for record in records.iter().filter(|r| !r.is_sentinel()) {
        let parts = if by_whitespace {
            split_on_whitespace(&record.text, maxsplit)
        } else if maxsplit > 0 {
            record
                .text
                .splitn(maxsplit + 1, delimiter)
                .map(str::to_string)
                .collect()
        } else {
            record.text.split(delimiter).map(str::to_string).collect()
        };
        split_lines.push((record, parts));
    }

    if split_lines.is_empty() {
        return TierOutcome::empty(Tier::Split, ExtractionReason::NoLines);
    }

    let width = split_lines.iter().map(|(_, p)| p.len()).max().unwrap_or(0);
    let columns: Vec<String> = (0..width).map(|i| format!("c{i}")).collect();

    let rows = split_lines
        .into_iter()
        .map(|(record, parts)| {
            let mut parts = parts.into_iter();
            ExtractionRow {
                tier: Tier::Split,
                target: record.target.clone(),
                line_number: record.line_number,
                line: Some(record.text.clone()),
                fields: columns
                    .iter()
                    .map(|name| (name.clone(), parts.next()))
                    .collect(),
            }
        })
        .collect();

    TierOutcome {
        tier: Tier::Split,
        columns,
        rows,
        reason: None,
        target_reasons: Vec::new(),
    }
}

fn split_on_whitespace(text: &str, maxsplit: usize) -> Vec<String> {
    let mut parts = Vec::new();
    let mut rest = text.trim();
    while !rest.is_empty() {
        if maxsplit > 0 && parts.len() == maxsplit {
            parts.push(rest.to_string());
            break;
        }
        match rest.find(char::is_whitespace) {
            Some(idx) => {
                parts.push(rest[..idx].to_string());
                rest = rest[idx..].trim_start();
            }
            None => {
                parts.push(rest.to_string());
                break;
            }
        }
    }
    parts
}

// =============================================================================
// Best available
// =============================================================================

/// The preferred structured view of a run.
#[derive(Debug, Clone, Copy)]
pub enum BestAvailable<'a> {
    Structured(&'a TierOutcome),
    Lines(&'a [LineRecord]),
}

/// First non-empty tier in priority order (template, pattern, split),
/// otherwise the raw lines. Tiers that were not run are simply absent.
pub fn best_available<'a>(outcomes: &'a [TierOutcome], lines: &'a [LineRecord]) -> BestAvailable<'a> {
    Tier::all()
        .iter()
        .find_map(|tier| outcomes.iter().find(|o| o.tier == *tier && !o.is_empty()))
        .map(BestAvailable::Structured)
        .unwrap_or(BestAvailable::Lines(lines))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::corpus::{build_corpus, CorpusOptions};
    use chrono::{TimeZone, Utc};
    use std::fs;

    fn corpus(outputs: &[(&str, &str)]) -> Vec<LineRecord> {
        build_corpus(
            outputs.iter().map(|(t, o)| (*t, Some(*o))),
            CorpusOptions::default(),
            Utc.timestamp_opt(0, 0).unwrap(),
        )
    }

    fn registry_with_version_template() -> (tempfile::TempDir, TemplateRegistry) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("index"),
            "Template, Hostname, Platform, Command\n\
             cisco_ios_show_version.textfsm, .*, cisco_ios, sh[[ow]] ver[[sion]]\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("cisco_ios_show_version.textfsm"),
            "Value HOSTNAME (\\S+)\nValue UPTIME (.+)\n\nStart\n  ^${HOSTNAME} uptime is ${UPTIME} -> Record\n",
        )
        .unwrap();
        let registry = TemplateRegistry::from_dir(dir.path()).unwrap();
        (dir, registry)
    }

    #[test]
    fn test_pattern_keeps_matching_lines_only() {
        let records = corpus(&[("r1", "eth0 up\nbad")]);
        let out = extract_pattern(&records, r"^(?P<a>\S+)\s+(?P<b>\S+)$");
        assert_eq!(out.rows.len(), 1);
        assert_eq!(out.columns, vec!["a", "b"]);
        assert_eq!(out.rows[0].get("a"), Some("eth0"));
        assert_eq!(out.rows[0].get("b"), Some("up"));
        assert!(out.reason.is_none());
    }

    #[test]
    fn test_pattern_three_way_state() {
        let records = corpus(&[("r1", "eth0 up")]);
        assert_eq!(
            extract_pattern(&records, "").reason,
            Some(ExtractionReason::PatternAbsent)
        );
        assert_eq!(
            extract_pattern(&records, "(?P<a>[unclosed").reason.map(|r| r.code()),
            Some("pattern_compile_error")
        );
        assert_eq!(
            extract_pattern(&records, r"(\S+)").reason.map(|r| r.code()),
            Some("pattern_compile_error")
        );
        let empty = extract_pattern(&records, r"^(?P<vlan>vlan\d+)");
        assert!(empty.rows.is_empty());
        assert_eq!(empty.reason, Some(ExtractionReason::PatternMatchEmpty));
    }

    #[test]
    fn test_pattern_is_case_insensitive() {
        let records = corpus(&[("r1", "GigabitEthernet0/1 up")]);
        let out = extract_pattern(&records, r"^(?P<intf>gigabit\S+)");
        assert_eq!(out.rows[0].get("intf"), Some("GigabitEthernet0/1"));
    }

    #[test]
    fn test_split_whitespace_with_maxsplit() {
        let records = corpus(&[("r1", "Gi0/1 up up")]);
        let out = extract_split(&records, "whitespace", 1);
        assert_eq!(out.columns, vec!["c0", "c1"]);
        assert_eq!(out.rows[0].get("c0"), Some("Gi0/1"));
        assert_eq!(out.rows[0].get("c1"), Some("up up"));
    }

    #[test]
    fn test_split_pads_short_rows() {
        let records = corpus(&[("r1", "  a   b  c \nd")]);
        let out = extract_split(&records, "WHITESPACE", 0);
        assert_eq!(out.columns, vec!["c0", "c1", "c2"]);
        assert_eq!(out.rows[0].get("c0"), Some("a"));
        assert_eq!(out.rows[0].get("c2"), Some("c"));
        assert_eq!(out.rows[1].get("c0"), Some("d"));
        assert_eq!(out.rows[1].fields[1], ("c1".to_string(), None));
    }

    #[test]
    fn test_split_literal_delimiter() {
        let records = corpus(&[("r1", "a,b,c")]);
        let unlimited = extract_split(&records, ",", 0);
        assert_eq!(unlimited.columns.len(), 3);
        let bounded = extract_split(&records, ",", 1);
        assert_eq!(bounded.rows[0].get("c1"), Some("b,c"));
        assert_eq!(
            extract_split(&records, "", 0).reason,
            Some(ExtractionReason::DelimiterAbsent)
        );
    }

    #[test]
    fn test_template_tier_parses_per_target() {
        let (_dir, registry) = registry_with_version_template();
        let records = corpus(&[
            ("r1", "r1 uptime is 2 days\nother text"),
            ("r2", "% Invalid input"),
        ]);
        let out = extract_template(&records, &registry, "cisco_xe", "show version");
        assert_eq!(out.columns, vec!["hostname", "uptime"]);
        assert_eq!(out.rows.len(), 1);
        assert_eq!(out.rows[0].target, "r1");
        assert_eq!(out.rows[0].get("uptime"), Some("2 days"));
        assert_eq!(
            out.target_reasons,
            vec![("r2".to_string(), ExtractionReason::TemplateMatchEmpty)]
        );
    }

    #[test]
    fn test_template_tier_miss_is_not_an_error() {
        let (_dir, registry) = registry_with_version_template();
        let records = corpus(&[("r1", "anything")]);
        let out = extract_template(&records, &registry, "cisco_ios", "show clock");
        assert!(out.rows.is_empty());
        assert_eq!(out.reason.map(|r| r.code()), Some("template_not_found"));

        let none = extract_template(&records, &TemplateRegistry::new(), "cisco_ios", "show version");
        assert_eq!(none.reason, Some(ExtractionReason::NoTemplateDirectory));
    }

    #[test]
    fn test_best_available_priority() {
        let (_dir, registry) = registry_with_version_template();
        let records = corpus(&[("r1", "r1 uptime is 2 days")]);
        let outcomes = vec![
            extract_split(&records, "whitespace", 0),
            extract_pattern(&records, r"^(?P<host>\S+)"),
            extract_template(&records, &registry, "cisco_ios", "show version"),
        ];
        match best_available(&outcomes, &records) {
            BestAvailable::Structured(o) => assert_eq!(o.tier, Tier::Template),
            BestAvailable::Lines(_) => panic!("expected structured rows"),
        }

        let fallback = vec![extract_pattern(&records, r"^(?P<x>nomatch)")];
        assert!(matches!(
            best_available(&fallback, &records),
            BestAvailable::Lines(lines) if lines.len() == 1
        ));
    }
}
