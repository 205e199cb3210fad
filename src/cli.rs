//! Command-line interface definition.
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::settings::{DEFAULT_SETTINGS_FILE, OutputFormat};

/// Top-level CLI entry point for the configuration resolver.
#[derive(Parser, Debug)]
#[command(
    name = "config-resolver",
    about = "Resolve backup templates into per-machine operation plans",
    version
)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve a template for this (or a described) machine
    Resolve(ResolveOpts),
    /// Check a template for structural errors
    Validate(ValidateOpts),
    /// Print version information
    Version,
}

impl Command {
    /// Name used for the per-command log file.
    #[must_use]
    pub const fn log_name(&self) -> &'static str {
        match self {
            Self::Resolve(_) => "resolve",
            Self::Validate(_) => "validate",
            Self::Version => "version",
        }
    }
}

/// Options for the `resolve` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct ResolveOpts {
    /// Template file (YAML)
    pub template: PathBuf,

    /// Describe the machine with a context file instead of probing this one
    #[arg(short, long)]
    pub context: Option<PathBuf>,

    /// Output format (defaults to the settings file, then `summary`)
    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Probe deadline in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Maximum number of concurrent probes
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Gather probes sequentially on the main thread
    #[arg(long = "no-parallel")]
    pub no_parallel: bool,

    /// Resolver settings file
    #[arg(long, default_value = DEFAULT_SETTINGS_FILE)]
    pub config: PathBuf,
}

/// Options for the `validate` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct ValidateOpts {
    /// Template file (YAML)
    pub template: PathBuf,
}
