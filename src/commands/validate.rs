//! Command: check a template for structural errors.
use anyhow::{Context as _, Result};

use crate::cli::ValidateOpts;
use crate::logging::Logger;
use crate::resolve::probes;
use crate::template::Template;

/// Run the validate command.
///
/// Loading a template runs structural validation, so a template that loads
/// is valid. The counts printed afterwards are informational.
///
/// # Errors
///
/// Returns an error if the template cannot be read, parsed or validated.
pub fn run(opts: &ValidateOpts, log: &Logger) -> Result<()> {
    log.stage("Validating template");
    let template = Template::load(&opts.template)
        .with_context(|| format!("Invalid template: {}", opts.template.display()))?;

    for line in outline(&template) {
        log.info(&line);
    }
    log.info(&format!("\x1b[32m✓ {} is valid\x1b[0m", template.metadata.name));
    Ok(())
}

/// One line per template part, with the number of probes a resolution needs.
fn outline(template: &Template) -> Vec<String> {
    let shared = template.shared.items().iter().count();
    let mut lines = vec![format!("shared: {shared} item(s)")];
    lines.extend(template.machine_specific.iter().map(|block| {
        format!(
            "machine block '{}': {} selector(s), {} item(s)",
            block.name,
            block.machine_selectors.len(),
            block.items().iter().count()
        )
    }));
    lines.extend(template.conditional_sections.iter().map(|section| {
        format!(
            "conditional section '{}': {} condition(s), {} item(s)",
            section.name,
            section.conditions.len(),
            section.items().iter().count()
        )
    }));
    lines.push(format!(
        "{} inheritance rule(s), {} probe(s) required",
        template.inheritance_rules.len(),
        probes::required_probes(template).len()
    ));
    lines
}
