// NetGather - core/corpus.rs
//
// Line corpus builder: turns successful execution results into ordered
// line records. Pure: the capture timestamp is passed in, so the same
// input always yields the same corpus.

use crate::core::model::{ExecutionResult, LineRecord};
use chrono::{DateTime, Utc};

/// Options for building a line corpus.
#[derive(Debug, Clone, Copy, Default)]
pub struct CorpusOptions {
    /// Keep one sentinel record (no line number, empty text) for a target
    /// whose output was empty, so silent targets remain visible.
    pub keep_empty: bool,
}

/// Build the corpus for a sequence of `(target, output)` pairs.
///
/// Records for one target are contiguous and in original line order;
/// targets appear in the order given. Numbering restarts at 1 per target.
pub fn build_corpus<'a, I>(
    outputs: I,
    options: CorpusOptions,
    captured_at: DateTime<Utc>,
) -> Vec<LineRecord>
where
    I: IntoIterator<Item = (&'a str, Option<&'a str>)>,
{
    let mut records = Vec::new();
    for (target, output) in outputs {
        append_target(&mut records, target, output, options, captured_at);
    }
    records
}

/// Build the corpus from execution results, skipping failed targets.
pub fn corpus_from_results(
    results: &[ExecutionResult],
    options: CorpusOptions,
    captured_at: DateTime<Utc>,
) -> Vec<LineRecord> {
    build_corpus(
        results
            .iter()
            .filter(|r| r.is_success())
            .map(|r| (r.target.host.as_str(), r.output())),
        options,
        captured_at,
    )
}

/// Append one target's lines to an existing corpus.
pub fn append_target(
    records: &mut Vec<LineRecord>,
    target: &str,
    output: Option<&str>,
    options: CorpusOptions,
    captured_at: DateTime<Utc>,
) {
    let text = output.unwrap_or("");
    let before = records.len();

    // str::lines handles both \n and \r\n and drops a single trailing newline.
    for (idx, line) in text.lines().enumerate() {
        records.push(LineRecord {
            target: target.to_string(),
            line_number: Some(idx + 1),
            text: line.to_string(),
            captured_at,
        });
    }

    if options.keep_empty && records.len() == before {
        records.push(LineRecord {
            target: target.to_string(),
            line_number: None,
            text: String::new(),
            captured_at,
        });
    }
}

/// Reconstruct each target's raw text from a corpus, in first-seen target
/// order. Sentinel records contribute nothing.
pub fn texts_by_target(records: &[LineRecord]) -> Vec<(String, String)> {
    let mut out: Vec<(String, String)> = Vec::new();
    for record in records {
        let needs_new = out.last().map(|(t, _)| t != &record.target).unwrap_or(true);
        if needs_new {
            // A target can reappear when its host string was listed twice;
            // those outputs are kept as separate blocks.
            out.push((record.target.clone(), String::new()));
        }
        if record.is_sentinel() {
            continue;
        }
        if let Some((_, text)) = out.last_mut() {
            text.push_str(&record.text);
            text.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{SessionFailure, Target};
    use std::time::Duration;

    fn ts() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_n_lines_produce_n_records() {
        let records = build_corpus(
            [("r1", Some("a\nb\nc"))],
            CorpusOptions::default(),
            ts(),
        );
        assert_eq!(records.len(), 3);
        let numbers: Vec<_> = records.iter().map(|r| r.line_number).collect();
        assert_eq!(numbers, vec![Some(1), Some(2), Some(3)]);
        assert_eq!(records[2].text, "c");
    }

    #[test]
    fn test_numbering_restarts_per_target() {
        let records = build_corpus(
            [("r1", Some("a\nb")), ("r2", Some("x\r\ny\r\n"))],
            CorpusOptions::default(),
            ts(),
        );
        assert_eq!(records.len(), 4);
        assert_eq!(records[2].target, "r2");
        assert_eq!(records[2].line_number, Some(1));
        assert_eq!(records[3].text, "y");
    }

    #[test]
    fn test_empty_output_without_sentinel_yields_nothing() {
        let records = build_corpus(
            [("r1", Some("")), ("r2", None)],
            CorpusOptions::default(),
            ts(),
        );
        assert!(records.is_empty());
    }

    #[test]
    fn test_empty_output_with_sentinel() {
        let records = build_corpus(
            [("r1", Some(""))],
            CorpusOptions { keep_empty: true },
            ts(),
        );
        assert_eq!(records.len(), 1);
        assert!(records[0].is_sentinel());
        assert_eq!(records[0].text, "");
    }

    #[test]
    fn test_builder_is_pure() {
        let input = [("r1", Some("a\nb")), ("r2", Some(""))];
        let opts = CorpusOptions { keep_empty: true };
        assert_eq!(build_corpus(input, opts, ts()), build_corpus(input, opts, ts()));
    }

    #[test]
    fn test_failed_results_are_skipped() {
        let results = vec![
            ExecutionResult::success(Target::new(0, "r1"), "one\ntwo".into(), Duration::ZERO),
            ExecutionResult::failure(
                Target::new(1, "r2"),
                SessionFailure::timeout(Duration::from_secs(5)),
                Duration::ZERO,
            ),
        ];
        let records = corpus_from_results(&results, CorpusOptions { keep_empty: true }, ts());
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.target == "r1"));
    }

    #[test]
    fn test_texts_by_target_round_trip() {
        let records = build_corpus(
            [("r1", Some("a\nb")), ("r2", Some("")), ("r3", Some("z"))],
            CorpusOptions { keep_empty: true },
            ts(),
        );
        let texts = texts_by_target(&records);
        assert_eq!(
            texts,
            vec![
                ("r1".to_string(), "a\nb\n".to_string()),
                ("r2".to_string(), String::new()),
                ("r3".to_string(), "z\n".to_string()),
            ]
        );
    }
}
