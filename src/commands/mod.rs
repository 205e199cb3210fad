//! Subcommand implementations.
pub mod resolve;
pub mod validate;
pub mod version;

/// Write a command's output to stdout, outside the log.
#[allow(clippy::print_stdout)]
pub(crate) fn emit(text: &str) {
    println!("{}", text.trim_end());
}
