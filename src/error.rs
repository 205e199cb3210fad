//! Domain-specific error types for the resolution engine.
//!
//! Internal modules return typed errors built with [`thiserror`]. Only
//! [`TemplateError`] and [`ResolveError`] can abort a resolution; every other
//! type in this module is demoted to a
//! [`Diagnostic`](crate::resolve::Diagnostic) and the engine carries on with
//! a best-effort plan. Command handlers at the CLI boundary convert fatal
//! errors to [`anyhow::Error`] via `?`.
//!
//! # Error hierarchy
//!
//! ```text
//! ResolveError                 - fatal, aborts resolution
//! ├── Template(TemplateError)  - unreadable or malformed template
//! ├── WorkerPool               - probe pool could not be built
//! └── DuplicateIdentity        - uniqueness invariant broken
//!
//! non-fatal (reported as diagnostics)
//! ├── ProbeError               - machine context could not answer
//! ├── SelectorError            - selector treated as false
//! ├── ConditionError           - condition handled per on_failure
//! ├── MergeConflictError       - tie resolved by fallback_strategy
//! └── RuleError                - rule effect skipped for one operation
//! ```

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Fatal errors that abort a whole resolution run.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// The template could not be loaded or is structurally malformed.
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    /// The bounded worker pool used for probes could not be created.
    #[error("Failed to build probe worker pool: {0}")]
    WorkerPool(String),

    /// Two resolved operations ended up with the same identity key.
    #[error("Resolved plan contains duplicate identity key {0}")]
    DuplicateIdentity(String),
}

/// Errors raised while reading or structurally validating a template.
#[derive(Error, Debug)]
pub enum TemplateError {
    /// The template file could not be read.
    #[error("IO error reading template {path}: {source}")]
    Io {
        /// Path to the file that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The template is not valid YAML or does not fit the template grammar.
    #[error("Invalid template syntax in {origin}: {source}")]
    Parse {
        /// File path or `"<inline>"` for in-memory templates.
        origin: String,
        /// Underlying YAML error.
        source: serde_yaml::Error,
    },

    /// The template parsed but violates a structural rule.
    #[error("Malformed template at {location}: {message}")]
    Malformed {
        /// Section path of the offending element (e.g. `machine_specific[1]`).
        location: String,
        /// Human-readable description of the problem.
        message: String,
    },
}

impl TemplateError {
    /// Shorthand for [`TemplateError::Malformed`].
    #[must_use]
    pub fn malformed(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Malformed {
            location: location.into(),
            message: message.into(),
        }
    }
}

/// Errors returned by a [`MachineContext`](crate::context::MachineContext)
/// when a probe cannot be answered.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// The requested value does not exist on this machine.
    #[error("{0} not found")]
    NotFound(String),

    /// The probe kind cannot be answered on this platform or by this provider.
    #[error("{0} is not supported by this machine context")]
    Unsupported(String),

    /// The probe ran but failed.
    #[error("{probe} failed: {reason}")]
    Failed {
        /// Description of the probe.
        probe: String,
        /// Human-readable failure reason.
        reason: String,
    },

    /// The probe did not finish before the resolution deadline.
    #[error("{probe} timed out after {}ms", .elapsed.as_millis())]
    TimedOut {
        /// Description of the probe.
        probe: String,
        /// Time spent before the probe was abandoned.
        elapsed: Duration,
    },
}

/// A machine selector could not be evaluated; the selector counts as false.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectorError {
    /// The probe behind the selector failed.
    #[error("selector probe unavailable: {0}")]
    Probe(#[from] ProbeError),

    /// The selector's `matches` pattern is not a valid regular expression.
    #[error("invalid selector pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Regex compiler message.
        reason: String,
    },
}

/// A condition check could not run or could not be interpreted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConditionError {
    /// The check itself failed to produce output.
    #[error("check '{check}' could not run: {source}")]
    Check {
        /// The check expression.
        check: String,
        /// Underlying probe failure.
        source: ProbeError,
    },

    /// `expected_result` is not a valid regular expression.
    #[error("invalid expected_result pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Regex compiler message.
        reason: String,
    },
}

/// Two entries set the same field at the same priority and the declared
/// `conflict_resolution` could not pick one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unresolved tie on field '{field}' of {identity} between {}; applied fallback {fallback}", .sources.join(", "))]
pub struct MergeConflictError {
    /// Identity key of the conflicting group.
    pub identity: String,
    /// Dotted field path that collided.
    pub field: String,
    /// Names of the tied sources in rank order.
    pub sources: Vec<String>,
    /// Name of the fallback strategy that settled the tie.
    pub fallback: String,
}

/// An inheritance rule could not be applied to one operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    /// A placeholder referenced a variable the machine context cannot supply.
    #[error("cannot expand %{variable}% in '{path}': {source}")]
    UnknownVariable {
        /// Variable name between the percent signs.
        variable: String,
        /// Path being rewritten.
        path: String,
        /// Why the context could not answer.
        source: ProbeError,
    },

    /// A registry path does not start with a recognised hive.
    #[error("'{0}' does not start with a known registry hive")]
    UnknownHive(String),
}
