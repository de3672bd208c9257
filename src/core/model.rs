// NetGather - core/model.rs
//
// Core data model types. Pure data definitions with no I/O and no
// platform dependencies.
//
// These types are the shared vocabulary across all layers.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

// =============================================================================
// Target
// =============================================================================

/// One remote device, the unit of independent collection.
///
/// `index` is the position in the input list, so duplicate host strings
/// remain distinct targets that are dispatched independently.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Target {
    pub index: usize,
    pub host: String,
}

impl Target {
    pub fn new(index: usize, host: impl Into<String>) -> Self {
        Self {
            index,
            host: host.into(),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.host)
    }
}

// =============================================================================
// Session failures
// =============================================================================

/// Classification of a per-target failure.
///
/// Every kind is recoverable: it is recorded against its target and the
/// run carries on with the remaining targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The device rejected the credentials.
    Authentication,
    /// The session did not answer within the per-target timeout.
    Timeout,
    /// Connection-level error (refused, unreachable, reset, ...).
    Transport,
    /// The transport itself is not installed or not configured.
    TransportUnavailable,
    /// Any other provider error; the message carries the detail.
    Unknown,
    /// The run was stopped before this target was started.
    Cancelled,
}

impl FailureKind {
    /// Returns all variants in display order.
    pub fn all() -> &'static [FailureKind] {
        &[
            FailureKind::Authentication,
            FailureKind::Timeout,
            FailureKind::Transport,
            FailureKind::TransportUnavailable,
            FailureKind::Unknown,
            FailureKind::Cancelled,
        ]
    }

    /// Human-readable label for display.
    pub fn label(&self) -> &'static str {
        match self {
            FailureKind::Authentication => "Authentication failed",
            FailureKind::Timeout => "Timeout",
            FailureKind::Transport => "Connection error",
            FailureKind::TransportUnavailable => "Transport not available",
            FailureKind::Unknown => "Error",
            FailureKind::Cancelled => "Cancelled",
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            FailureKind::Authentication => "authentication",
            FailureKind::Timeout => "timeout",
            FailureKind::Transport => "transport",
            FailureKind::TransportUnavailable => "transport_unavailable",
            FailureKind::Unknown => "unknown",
            FailureKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A classified failure reported by a session provider (or by the executor
/// itself for timeouts and cancellation).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionFailure {
    pub kind: FailureKind,
    /// Provider detail. May be empty for self-explanatory kinds.
    pub message: String,
}

impl SessionFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn authentication() -> Self {
        Self::new(FailureKind::Authentication, "")
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(
            FailureKind::Timeout,
            format!("no response within {}s", after.as_secs()),
        )
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Transport, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(FailureKind::TransportUnavailable, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Unknown, message)
    }

    pub fn cancelled() -> Self {
        Self::new(FailureKind::Cancelled, "run stopped before this host started")
    }
}

impl fmt::Display for SessionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            f.write_str(self.kind.label())
        } else {
            write!(f, "{}: {}", self.kind.label(), self.message)
        }
    }
}

// =============================================================================
// Execution result
// =============================================================================

/// What a single target invocation produced: raw text or a failure, never both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Output(String),
    Failed(SessionFailure),
}

/// Exactly one of these is produced per target by the executor.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub target: Target,
    pub outcome: Outcome,
    /// Wall-clock time spent on this target (zero for cancelled targets).
    pub elapsed: Duration,
}

impl ExecutionResult {
    pub fn success(target: Target, output: String, elapsed: Duration) -> Self {
        Self {
            target,
            outcome: Outcome::Output(output),
            elapsed,
        }
    }

    pub fn failure(target: Target, failure: SessionFailure, elapsed: Duration) -> Self {
        Self {
            target,
            outcome: Outcome::Failed(failure),
            elapsed,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Output(_))
    }

    /// Raw output text, if the invocation succeeded.
    pub fn output(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Output(text) => Some(text),
            Outcome::Failed(_) => None,
        }
    }

    /// Failure detail, if the invocation failed.
    pub fn failure_reason(&self) -> Option<&SessionFailure> {
        match &self.outcome {
            Outcome::Output(_) => None,
            Outcome::Failed(failure) => Some(failure),
        }
    }
}

// =============================================================================
// Line corpus
// =============================================================================

/// One line of one target's output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineRecord {
    /// Target host string.
    pub target: String,

    /// 1-based line number within the target's output. `None` marks the
    /// sentinel record kept for a target that returned no output.
    pub line_number: Option<usize>,

    /// Line text without its terminator.
    pub text: String,

    /// When the corpus was built from the target's output.
    pub captured_at: DateTime<Utc>,
}

impl LineRecord {
    pub fn is_sentinel(&self) -> bool {
        self.line_number.is_none()
    }
}

// =============================================================================
// Structured extraction
// =============================================================================

/// The three structured-extraction strategies, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Template,
    Pattern,
    Split,
}

impl Tier {
    /// Returns all tiers in priority order (best first).
    pub fn all() -> &'static [Tier] {
        &[Tier::Template, Tier::Pattern, Tier::Split]
    }

    pub fn label(&self) -> &'static str {
        match self {
            Tier::Template => "template",
            Tier::Pattern => "pattern",
            Tier::Split => "split",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One structured row produced by exactly one tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionRow {
    pub tier: Tier,
    pub target: String,

    /// Source line for line-oriented tiers (pattern, split). The template
    /// tier parses whole outputs, so it has no single source line.
    pub line_number: Option<usize>,
    pub line: Option<String>,

    /// Extracted fields in column order.
    pub fields: Vec<(String, Option<String>)>,
}

impl ExtractionRow {
    /// Look up a field value by column name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(column, _)| column == name)
            .and_then(|(_, value)| value.as_deref())
    }
}

/// Machine-readable explanation for a tier that produced no rows.
///
/// Never an error: callers degrade to the next tier or report zero rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum ExtractionReason {
    /// No template directory is active.
    NoTemplateDirectory,
    /// The index has no entry for this (platform, command).
    TemplateNotFound { platform: String, command: String },
    /// A template exists but the output produced zero rows.
    TemplateMatchEmpty,
    /// The template failed to load or raised an `Error` action.
    TemplateError { message: String },
    /// No pattern was supplied.
    PatternAbsent,
    /// The pattern does not compile or has no named groups.
    PatternCompileError { message: String },
    /// The pattern is valid but matched no line.
    PatternMatchEmpty,
    /// No delimiter was supplied.
    DelimiterAbsent,
    /// There were no lines to work on.
    NoLines,
}

impl ExtractionReason {
    /// Stable code consumed by diagnostics and UIs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoTemplateDirectory => "no_template_directory",
            Self::TemplateNotFound { .. } => "template_not_found",
            Self::TemplateMatchEmpty => "template_match_empty",
            Self::TemplateError { .. } => "template_error",
            Self::PatternAbsent => "pattern_absent",
            Self::PatternCompileError { .. } => "pattern_compile_error",
            Self::PatternMatchEmpty => "pattern_match_empty",
            Self::DelimiterAbsent => "delimiter_absent",
            Self::NoLines => "no_lines",
        }
    }
}

impl fmt::Display for ExtractionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoTemplateDirectory => f.write_str("templates index not found"),
            Self::TemplateNotFound { platform, command } => write!(
                f,
                "no template for platform='{platform}', command='{command}'"
            ),
            Self::TemplateMatchEmpty => {
                f.write_str("no rows parsed (template returned zero matches)")
            }
            Self::TemplateError { message } => write!(f, "template error: {message}"),
            Self::PatternAbsent => f.write_str("no pattern supplied"),
            Self::PatternCompileError { message } => write!(f, "invalid regex: {message}"),
            Self::PatternMatchEmpty => f.write_str("regex valid but no lines matched"),
            Self::DelimiterAbsent => f.write_str("no delimiter supplied"),
            Self::NoLines => f.write_str("no lines to process"),
        }
    }
}

/// Result of running one tier: rows (possibly none) plus the reason when
/// there are none.
#[derive(Debug, Clone)]
pub struct TierOutcome {
    pub tier: Tier,

    /// Field column names in output order (excluding host/line columns).
    pub columns: Vec<String>,

    pub rows: Vec<ExtractionRow>,

    /// Set whenever `rows` is empty; for the template tier it may also hold
    /// the first per-target reason when only some targets produced rows.
    pub reason: Option<ExtractionReason>,

    /// Targets that produced no rows in a per-target tier, with the reason.
    pub target_reasons: Vec<(String, ExtractionReason)>,
}

impl TierOutcome {
    pub fn empty(tier: Tier, reason: ExtractionReason) -> Self {
        Self {
            tier,
            columns: Vec::new(),
            rows: Vec::new(),
            reason: Some(reason),
            target_reasons: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// =============================================================================
// Run summary and progress events
// =============================================================================

/// Summary statistics for a completed collection run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Targets dispatched (including duplicates).
    pub total_targets: usize,

    /// Targets that returned output.
    pub succeeded: usize,

    /// Failures grouped by kind.
    pub failures_by_kind: BTreeMap<FailureKind, usize>,

    /// Lines in the unfiltered corpus.
    pub total_lines: usize,

    /// Rows parsed by the template tier during collection.
    pub structured_rows: usize,

    /// Wall-clock run duration.
    pub duration: Duration,
}

impl RunSummary {
    pub fn failed(&self) -> usize {
        self.failures_by_kind.values().sum()
    }
}

/// Progress messages sent from the collection thread to the consumer.
#[derive(Debug, Clone)]
pub enum CollectionEvent {
    /// The pool accepted the run.
    Started { total: usize },

    /// One target finished (successfully or not).
    TargetCompleted {
        result: ExecutionResult,
        completed: usize,
        total: usize,
    },

    /// Every target has produced its result.
    Finished { duration: Duration },

    /// The run could not start (e.g. worker pool creation failed).
    Failed { error: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_is_exclusive() {
        let ok = ExecutionResult::success(Target::new(0, "r1"), "x".into(), Duration::ZERO);
        assert!(ok.is_success());
        assert_eq!(ok.output(), Some("x"));
        assert!(ok.failure_reason().is_none());

        let failed = ExecutionResult::failure(
            Target::new(1, "r2"),
            SessionFailure::authentication(),
            Duration::ZERO,
        );
        assert!(!failed.is_success());
        assert!(failed.output().is_none());
        assert_eq!(
            failed.failure_reason().map(|f| f.kind),
            Some(FailureKind::Authentication)
        );
    }

    #[test]
    fn test_failure_display() {
        assert_eq!(
            SessionFailure::authentication().to_string(),
            "Authentication failed"
        );
        assert_eq!(
            SessionFailure::unknown("boom").to_string(),
            "Error: boom"
        );
    }

    #[test]
    fn test_reason_codes_are_stable() {
        assert_eq!(ExtractionReason::TemplateMatchEmpty.code(), "template_match_empty");
        assert_eq!(
            ExtractionReason::TemplateNotFound {
                platform: "cisco_ios".into(),
                command: "show clock".into()
            }
            .code(),
            "template_not_found"
        );
        assert_eq!(ExtractionReason::PatternMatchEmpty.code(), "pattern_match_empty");
    }

    #[test]
    fn test_row_get() {
        let row = ExtractionRow {
            tier: Tier::Pattern,
            target: "r1".into(),
            line_number: Some(1),
            line: Some("eth0 up".into()),
            fields: vec![("a".into(), Some("eth0".into())), ("b".into(), None)],
        };
        assert_eq!(row.get("a"), Some("eth0"));
        assert_eq!(row.get("b"), None);
        assert_eq!(row.get("missing"), None);
    }
}
