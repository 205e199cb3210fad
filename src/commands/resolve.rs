//! Command: resolve a template into an operation plan.
use std::fmt::Write as _;
use std::time::Duration;

use anyhow::{Context as _, Result};

use crate::cli::ResolveOpts;
use crate::context::{FixedContext, MachineContext, SystemContext};
use crate::logging::Logger;
use crate::resolve::{self, Resolution, ResolveOptions, Severity};
use crate::settings::{OutputFormat, Settings};
use crate::template::Template;

/// Run the resolve command.
///
/// # Errors
///
/// Returns an error if the settings, template or context file cannot be
/// loaded, or if resolution fails fatally.
pub fn run(opts: &ResolveOpts, log: &Logger) -> Result<()> {
    let settings = Settings::load(&opts.config)?;
    let options = effective_options(&settings, opts);
    let format = opts.format.unwrap_or(settings.output.format);
    log.debug(&format!(
        "timeout {}s, {} worker(s), parallel {}",
        options.timeout.as_secs(),
        options.max_workers,
        options.parallel
    ));

    log.stage("Loading template");
    let template = Template::load(&opts.template)
        .with_context(|| format!("Failed to load template: {}", opts.template.display()))?;
    log.info(&format!("template: {}", template.metadata.name));

    let ctx: Box<dyn MachineContext> = match &opts.context {
        Some(path) => {
            log.info(&format!("context: {}", path.display()));
            Box::new(FixedContext::load(path)?)
        }
        None => Box::new(SystemContext::new()),
    };

    log.stage("Resolving");
    let resolution = resolve::resolve(&template, ctx.as_ref(), &options)
        .with_context(|| format!("Failed to resolve template: {}", template.metadata.name))?;

    match format {
        OutputFormat::Json => super::emit(&serde_json::to_string_pretty(&resolution)?),
        OutputFormat::Yaml => super::emit(&serde_yaml::to_string(&resolution)?),
        OutputFormat::Summary => {
            super::emit(&render_summary(&resolution));
            log.print_summary(resolution.plan.len(), &resolution.diagnostics);
        }
    }
    Ok(())
}

/// Settings file values with command-line overrides applied.
fn effective_options(settings: &Settings, opts: &ResolveOpts) -> ResolveOptions {
    let mut options = settings.to_options();
    if let Some(secs) = opts.timeout {
        options = options.with_timeout(Duration::from_secs(secs));
    }
    if let Some(jobs) = opts.jobs {
        options = options.with_max_workers(jobs);
    }
    if opts.no_parallel {
        options = options.with_parallel(false);
    }
    options
}

/// Render a resolution as a human-readable listing.
///
/// One line per operation in plan order (`kind path [value] <- sources`),
/// followed by the diagnostics.
#[must_use]
pub fn render_summary(resolution: &Resolution) -> String {
    let plan = &resolution.plan;
    let mut out = format!(
        "plan '{}': {} operation(s)",
        plan.template,
        plan.len()
    );
    for op in plan {
        let key = op
            .key_name
            .as_ref()
            .map_or_else(String::new, |k| format!(" [{k}]"));
        let sources: Vec<&str> = op.resolution.effective_sources().collect();
        write!(
            out,
            "\n  {:<12} {}{key} <- {}",
            op.kind.as_str(),
            op.path,
            sources.join(", ")
        )
        .unwrap_or(());
        if !op.resolution.rules.is_empty() {
            write!(out, " (rules: {})", op.resolution.rules.join(", ")).unwrap_or(());
        }
    }
    if !resolution.diagnostics.is_empty() {
        write!(out, "\ndiagnostics: {}", resolution.diagnostics.len()).unwrap_or(());
        for d in &resolution.diagnostics {
            let level = match d.severity {
                Severity::Warning => "warn",
                Severity::Info => "info",
            };
            write!(out, "\n  {level} {d}").unwrap_or(());
        }
    }
    out
}
