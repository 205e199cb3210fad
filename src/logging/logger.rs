//! Structured logger for command output and the run summary.
use std::path::PathBuf;

use super::STAGE_TARGET;
use super::utils::log_file_path;
use crate::resolve::{Diagnostics, Severity};

/// Structured logger for a single command run.
///
/// All messages are also written to a persistent log file at
/// `$XDG_CACHE_HOME/config-resolver/<command>.log` (default
/// `~/.cache/config-resolver/<command>.log`) with timestamps and ANSI codes
/// stripped, regardless of the verbose flag.
#[derive(Debug)]
pub struct Logger {
    log_file: Option<PathBuf>,
}

impl Logger {
    /// Create a new logger.
    ///
    /// Stores the log file path for display in the run summary. The file
    /// itself is created by [`init_subscriber`](super::subscriber::init_subscriber).
    #[must_use]
    pub fn new(command: &str) -> Self {
        Self {
            log_file: log_file_path(command),
        }
    }

    /// Return the log file path, if available.
    #[must_use]
    pub const fn log_path(&self) -> Option<&PathBuf> {
        self.log_file.as_ref()
    }

    /// Log an error message.
    pub fn error(&self, msg: &str) {
        tracing::error!("{msg}");
    }

    /// Log a warning message.
    pub fn warn(&self, msg: &str) {
        tracing::warn!("{msg}");
    }

    /// Log a stage header (major section).
    pub fn stage(&self, msg: &str) {
        tracing::info!(target: STAGE_TARGET, "{msg}");
    }

    /// Log an informational message.
    pub fn info(&self, msg: &str) {
        tracing::info!("{msg}");
    }

    /// Log a debug message (suppressed on console unless verbose; always
    /// written to the log file).
    pub fn debug(&self, msg: &str) {
        tracing::debug!("{msg}");
    }

    /// Print a one-line tally of a resolution followed by the log path.
    pub fn print_summary(&self, operations: usize, diagnostics: &Diagnostics) {
        let warnings = diagnostics.warning_count();
        let notes = diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Info)
            .count();
        let color = if warnings > 0 { "\x1b[33m" } else { "\x1b[32m" };
        self.info(&format!(
            "{color}{operations} operation(s), {warnings} warning(s)\x1b[0m, \x1b[2m{notes} note(s)\x1b[0m"
        ));
        if let Some(path) = &self.log_file {
            self.info(&format!("\x1b[2mlog: {}\x1b[0m", path.display()));
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use std::fs;

    use super::super::isolated_logger;
    use crate::resolve::DiagnosticKind;

    fn contents(log: &super::Logger) -> String {
        fs::read_to_string(log.log_path().expect("log path")).unwrap()
    }

    #[test]
    fn log_file_is_created() {
        let (log, _tmp, _guard) = isolated_logger();
        let path = log.log_path().expect("log path should exist");
        assert!(path.exists(), "log file should be created by the file layer");
    }

    #[test]
    fn debug_always_written_to_file() {
        let (log, _tmp, _guard) = isolated_logger();
        let marker = format!("debug-marker-{}", std::process::id());
        log.debug(&marker);
        assert!(contents(&log).contains(&marker));
    }

    #[test]
    fn warn_and_error_are_tagged() {
        let (log, _tmp, _guard) = isolated_logger();
        log.warn("probe slow");
        log.error("template unreadable");
        let text = contents(&log);
        assert!(text.contains("[warn] probe slow"));
        assert!(text.contains("[error] template unreadable"));
    }

    #[test]
    fn stage_written_to_file_with_arrow() {
        let (log, _tmp, _guard) = isolated_logger();
        log.stage("Resolving desktop");
        assert!(contents(&log).contains("==> Resolving desktop"));
    }

    #[test]
    fn summary_counts_warnings_and_notes() {
        let (log, _tmp, _guard) = isolated_logger();
        let mut diags = crate::resolve::Diagnostics::new();
        diags.warn(DiagnosticKind::MergeConflict, "registry:HKCU:\\X", "tie");
        diags.note(DiagnosticKind::ConditionCheck, "gaming", "skipped");
        log.print_summary(3, &diags);
        let text = contents(&log);
        assert!(text.contains("3 operation(s), 1 warning(s), 1 note(s)"));
        assert!(text.contains("log: "));
    }
}
