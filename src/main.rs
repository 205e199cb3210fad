//! `config-resolver` command-line entry point.
use anyhow::Result;
use clap::Parser;

use config_resolver::{cli, commands, logging};

fn main() -> Result<()> {
    let _ = enable_ansi_support::enable_ansi_support();
    let args = cli::Cli::parse();
    logging::init_subscriber(args.verbose, args.command.log_name());
    let log = logging::Logger::new(args.command.log_name());

    match &args.command {
        cli::Command::Resolve(opts) => commands::resolve::run(opts, &log),
        cli::Command::Validate(opts) => commands::validate::run(opts, &log),
        cli::Command::Version => {
            commands::version::run();
            Ok(())
        }
    }
}
