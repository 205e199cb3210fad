//! Diagnostics channel: non-fatal findings returned alongside the plan.
use std::fmt;

use serde::Serialize;

/// How serious a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Expected outcome worth recording (e.g. a skipped condition).
    Info,
    /// Something was excluded or fell back to a default.
    Warning,
}

/// Which resolution stage produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// A selector could not be evaluated and counted as false.
    SelectorEvaluation,
    /// A condition check could not run or its pattern was invalid.
    ConditionCheck,
    /// A conditional section was excluded by an `on_failure: fail` condition.
    SectionExcluded,
    /// A merge tie was settled by the fallback strategy.
    MergeConflict,
    /// A rule could not be applied to an operation.
    RuleApplication,
    /// A resolved operation failed plan validation.
    Validation,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SelectorEvaluation => "selector",
            Self::ConditionCheck => "condition",
            Self::SectionExcluded => "section",
            Self::MergeConflict => "merge",
            Self::RuleApplication => "rule",
            Self::Validation => "validation",
        })
    }
}

/// A single non-fatal finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Severity.
    pub severity: Severity,
    /// Producing stage.
    pub kind: DiagnosticKind,
    /// Block, section, rule or identity key the finding is about.
    pub source: String,
    /// Human-readable message.
    pub message: String,
}

impl Diagnostic {
    /// A warning.
    #[must_use]
    pub fn warning(
        kind: DiagnosticKind,
        source: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity: Severity::Warning,
            kind,
            source: source.into(),
            message: message.into(),
        }
    }

    /// An informational note.
    #[must_use]
    pub fn info(kind: DiagnosticKind, source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            ..Self::warning(kind, source, message)
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.kind, self.source, self.message)
    }
}

/// Ordered collector of diagnostics.
///
/// Every recorded diagnostic is also emitted as a `tracing` event so the CLI
/// log file captures it even when the caller discards the list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    /// Empty collector.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Record `diagnostic`.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        let Diagnostic {
            severity,
            kind,
            source,
            message,
        } = &diagnostic;
        match severity {
            Severity::Warning => tracing::warn!(kind = %kind, source = %source, "{message}"),
            Severity::Info => tracing::debug!(kind = %kind, source = %source, "{message}"),
        }
        self.0.push(diagnostic);
    }

    /// Record a warning.
    pub fn warn(&mut self, kind: DiagnosticKind, source: impl Into<String>, message: impl Into<String>) {
        self.push(Diagnostic::warning(kind, source, message));
    }

    /// Record an informational note.
    pub fn note(&mut self, kind: DiagnosticKind, source: impl Into<String>, message: impl Into<String>) {
        self.push(Diagnostic::info(kind, source, message));
    }

    /// Append every diagnostic from `other`, preserving order.
    pub fn extend(&mut self, other: Self) {
        self.0.extend(other.0);
    }

    /// Whether nothing was recorded.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of diagnostics.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Number of warnings.
    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.0
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .count()
    }

    /// Iterate in recording order.
    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.0.iter()
    }

    /// Diagnostics of `kind`.
    pub fn of_kind(&self, kind: DiagnosticKind) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter().filter(move |d| d.kind == kind)
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
