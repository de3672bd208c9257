// NetGather - app/state.rs
//
// Collection state: the single consumer of `CollectionEvent`s. Owns the
// results, the line corpus, the per-target template rows, and the run
// summary. Nothing else mutates these while a run is live.

use crate::core::corpus::{self, CorpusOptions};
use crate::core::extract;
use crate::core::filter::{self, FilterSpec};
use crate::core::model::{
    CollectionEvent, ExecutionResult, ExtractionReason, ExtractionRow, LineRecord, RunSummary,
    Tier, TierOutcome,
};
use crate::core::registry::TemplateRegistry;
use chrono::Utc;
use std::collections::BTreeMap;
use std::time::Duration;

/// Template parsing done as each target completes.
#[derive(Debug, Clone)]
pub struct TemplateContext {
    pub registry: TemplateRegistry,
    pub device_type: String,
    pub command: String,
}

/// Everything known about the current run.
#[derive(Debug, Default)]
pub struct CollectionState {
    /// Targets dispatched, set by `Started`.
    pub total: usize,

    /// Results received so far.
    pub completed: usize,

    /// Every result, in completion order.
    pub results: Vec<ExecutionResult>,

    /// Unfiltered line corpus, appended per completed target.
    pub corpus: Vec<LineRecord>,

    /// Template rows accumulated per completed target.
    pub template_rows: Vec<ExtractionRow>,

    /// Template value names (lower-cased), once any target produced rows.
    pub template_columns: Vec<String>,

    /// Successful targets whose output produced no template rows.
    pub template_reasons: Vec<(String, ExtractionReason)>,

    /// Reason the template tier did not run at all (no index, no match).
    pub template_skipped: Option<ExtractionReason>,

    /// Set once the run has finished.
    pub summary: Option<RunSummary>,

    /// Set when the run could not start.
    pub error: Option<String>,

    corpus_options: CorpusOptions,
    template: Option<TemplateContext>,
}

impl CollectionState {
    pub fn new(corpus_options: CorpusOptions, template: Option<TemplateContext>) -> Self {
        Self {
            corpus_options,
            template,
            ..Default::default()
        }
    }

    /// Whether template parsing was requested for this run.
    pub fn templates_enabled(&self) -> bool {
        self.template.is_some()
    }

    pub fn is_finished(&self) -> bool {
        self.summary.is_some() || self.error.is_some()
    }

    /// Fold one event into the state.
    pub fn apply(&mut self, event: CollectionEvent) {
        match event {
            CollectionEvent::Started { total } => {
                self.total = total;
            }
            CollectionEvent::TargetCompleted {
                result, completed, ..
            } => {
                self.completed = completed;
                self.record_result(result);
            }
            CollectionEvent::Finished { duration } => {
                self.summary = Some(self.build_summary(duration));
            }
            CollectionEvent::Failed { error } => {
                tracing::error!(error = %error, "Collection could not start");
                self.error = Some(error);
            }
        }
    }

    fn record_result(&mut self, result: ExecutionResult) {
        if let Some(output) = result.output() {
            let start = self.corpus.len();
            corpus::append_target(
                &mut self.corpus,
                &result.target.host,
                Some(output),
                self.corpus_options,
                Utc::now(),
            );
            self.parse_template(start);
        }
        self.results.push(result);
    }

    /// Run the template tier over the records just appended at `start..`.
    fn parse_template(&mut self, start: usize) {
        let Some(ref ctx) = self.template else {
            return;
        };
        if self.template_skipped.is_some() {
            return;
        }
        let records = &self.corpus[start..];
        let Some(target) = records.first().map(|r| r.target.clone()) else {
            return;
        };

        let outcome = extract::extract_template(records, &ctx.registry, &ctx.device_type, &ctx.command);
        if outcome.rows.is_empty() {
            match outcome.reason {
                // Index-level misses are the same for every target.
                Some(reason @ ExtractionReason::NoTemplateDirectory)
                | Some(reason @ ExtractionReason::TemplateNotFound { .. }) => {
                    tracing::info!(reason = %reason, "Template parsing disabled for this run");
                    self.template_skipped = Some(reason);
                }
                Some(reason) => self.template_reasons.push((target, reason)),
                None => {}
            }
            return;
        }
        if self.template_columns.is_empty() {
            self.template_columns = outcome.columns;
        }
        self.template_reasons.extend(outcome.target_reasons);
        self.template_rows.extend(outcome.rows);
    }

    fn build_summary(&self, duration: Duration) -> RunSummary {
        let mut failures_by_kind = BTreeMap::new();
        for failure in self.results.iter().filter_map(|r| r.failure_reason()) {
            *failures_by_kind.entry(failure.kind).or_insert(0) += 1;
        }
        RunSummary {
            total_targets: self.total,
            succeeded: self.results.iter().filter(|r| r.is_success()).count(),
            failures_by_kind,
            total_lines: self.corpus.iter().filter(|r| !r.is_sentinel()).count(),
            structured_rows: self.template_rows.len(),
            duration,
        }
    }

    /// Template rows gathered during the run, as a tier outcome.
    pub fn template_outcome(&self) -> TierOutcome {
        if self.template_rows.is_empty() {
            let reason = self
                .template_skipped
                .clone()
                .or_else(|| self.template_reasons.first().map(|(_, r)| r.clone()))
                .unwrap_or(ExtractionReason::NoLines);
            let mut outcome = TierOutcome::empty(Tier::Template, reason);
            outcome.target_reasons = self.template_reasons.clone();
            return outcome;
        }
        TierOutcome {
            tier: Tier::Template,
            columns: self.template_columns.clone(),
            rows: self.template_rows.clone(),
            reason: self.template_reasons.first().map(|(_, r)| r.clone()),
            target_reasons: self.template_reasons.clone(),
        }
    }

    /// Failed results only.
    pub fn failures(&self) -> impl Iterator<Item = &ExecutionResult> {
        self.results.iter().filter(|r| !r.is_success())
    }

    /// The corpus narrowed by `filters`.
    pub fn filtered(&self, filters: &FilterSpec) -> Vec<LineRecord> {
        filter::apply_filters(&self.corpus, filters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{FailureKind, SessionFailure, Target};
    use std::fs;

    fn completed(result: ExecutionResult, n: usize) -> CollectionEvent {
        CollectionEvent::TargetCompleted {
            result,
            completed: n,
            total: 3,
        }
    }

    fn ok(index: usize, host: &str, text: &str) -> ExecutionResult {
        ExecutionResult::success(Target::new(index, host), text.to_string(), Duration::ZERO)
    }

    #[test]
    fn test_state_folds_events() {
        let mut state = CollectionState::new(CorpusOptions::default(), None);
        state.apply(CollectionEvent::Started { total: 3 });
        state.apply(completed(ok(0, "r1", "a\nb\nc"), 1));
        state.apply(completed(
            ExecutionResult::failure(
                Target::new(1, "r2"),
                SessionFailure::timeout(Duration::from_secs(5)),
                Duration::from_secs(5),
            ),
            2,
        ));
        state.apply(completed(ok(2, "r3", "1\n2\n3\n4\n5"), 3));
        assert!(!state.is_finished());
        state.apply(CollectionEvent::Finished {
            duration: Duration::from_secs(6),
        });

        let summary = state.summary.as_ref().unwrap();
        assert_eq!(summary.total_targets, 3);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.failures_by_kind.get(&FailureKind::Timeout), Some(&1));
        assert_eq!(summary.total_lines, 8);
        assert_eq!(state.corpus.len(), 8);
        assert_eq!(state.failures().count(), 1);
        assert!(state.is_finished());
    }

    #[test]
    fn test_template_rows_accumulate_per_target() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("index"),
            "Template, Platform, Command\nclock.textfsm, cisco_ios, show clock\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("clock.textfsm"),
            "Value TIME (\\S+)\n\nStart\n  ^\\*?${TIME} UTC -> Record\n",
        )
        .unwrap();
        let ctx = TemplateContext {
            registry: TemplateRegistry::from_dir(dir.path()).unwrap(),
            device_type: "cisco_ios".into(),
            command: "show clock".into(),
        };

        let mut state = CollectionState::new(CorpusOptions::default(), Some(ctx));
        state.apply(completed(ok(0, "r1", "*10:00:01 UTC Mon"), 1));
        state.apply(completed(ok(1, "r2", "% Invalid input"), 2));

        assert_eq!(state.template_rows.len(), 1);
        assert_eq!(state.template_rows[0].get("time"), Some("10:00:01"));
        assert_eq!(
            state.template_reasons,
            vec![("r2".to_string(), ExtractionReason::TemplateMatchEmpty)]
        );
        assert_eq!(state.template_outcome().columns, vec!["time"]);
    }

    #[test]
    fn test_missing_template_is_recorded_once() {
        let mut state = CollectionState::new(
            CorpusOptions::default(),
            Some(TemplateContext {
                registry: TemplateRegistry::new(),
                device_type: "cisco_ios".into(),
                command: "show clock".into(),
            }),
        );
        state.apply(completed(ok(0, "r1", "x"), 1));
        state.apply(completed(ok(1, "r2", "y"), 2));
        assert_eq!(state.template_skipped, Some(ExtractionReason::NoTemplateDirectory));
        assert!(state.template_reasons.is_empty());
        assert_eq!(
            state.template_outcome().reason,
            Some(ExtractionReason::NoTemplateDirectory)
        );
    }

    #[test]
    fn test_every_failure_is_kept_and_counted() {
        let total = 10_001;
        let mut state = CollectionState::default();
        state.apply(CollectionEvent::Started { total });
        for i in 0..total {
            state.apply(CollectionEvent::TargetCompleted {
                result: ExecutionResult::failure(
                    Target::new(i, format!("r{i}")),
                    SessionFailure::authentication(),
                    Duration::ZERO,
                ),
                completed: i + 1,
                total,
            });
        }
        state.apply(CollectionEvent::Finished {
            duration: Duration::from_secs(1),
        });

        assert_eq!(state.results.len(), total);
        assert_eq!(state.failures().count(), total);
        let summary = state.summary.as_ref().unwrap();
        assert_eq!(summary.failed(), total);
        assert_eq!(
            summary.failures_by_kind.get(&FailureKind::Authentication),
            Some(&total)
        );
    }

    #[test]
    fn test_start_failure_finishes_state() {
        let mut state = CollectionState::default();
        state.apply(CollectionEvent::Failed {
            error: "No hosts found in the target list".into(),
        });
        assert!(state.is_finished());
        assert!(state.summary.is_none());
    }
}
