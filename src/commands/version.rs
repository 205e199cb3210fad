//! Command: print version information.

/// Print the config-resolver version to stdout.
pub fn run() {
    super::emit(&format!("config-resolver {}", crate::logging::version()));
}
