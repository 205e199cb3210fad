//! Condition Evaluator: runtime checks gating conditional sections.
use regex::RegexBuilder;

use super::diagnostic::{DiagnosticKind, Diagnostics};
use crate::context::{MachineContext, Probe};
use crate::error::ConditionError;
use crate::template::{Condition, ConditionKind, ConditionalSection, OnFailure};

/// Probe answering `condition`: `environment` checks read a variable, every
/// other kind runs the check as a command.
#[must_use]
pub fn probe_for(condition: &Condition) -> Probe {
    match condition.kind {
        ConditionKind::Environment => Probe::EnvVar(condition.check.clone()),
        ConditionKind::Hardware | ConditionKind::Software | ConditionKind::Custom => {
            Probe::Command(condition.check.clone())
        }
    }
}

/// Evaluate one condition: the trimmed check output must match
/// `expected_result`.
///
/// # Errors
///
/// Returns [`ConditionError`] if the check cannot run or the pattern does
/// not compile.
pub fn evaluate(condition: &Condition, ctx: &dyn MachineContext) -> Result<bool, ConditionError> {
    let re = RegexBuilder::new(&condition.expected_result)
        .case_insensitive(!condition.case_sensitive)
        .build()
        .map_err(|e| ConditionError::InvalidPattern {
            pattern: condition.expected_result.clone(),
            reason: e.to_string(),
        })?;
    let output = ctx
        .resolve(&probe_for(condition))
        .map_err(|source| ConditionError::Check {
            check: condition.check.clone(),
            source,
        })?;
    Ok(re.is_match(output.trim()))
}

/// Whether `section` contributes its items.
///
/// Failed checks follow their `on_failure` policy: `skip` and `warn` make the
/// condition false, `fail` excludes the whole section. None of them abort
/// the resolution.
pub fn section_applies(
    section: &ConditionalSection,
    ctx: &dyn MachineContext,
    diagnostics: &mut Diagnostics,
) -> bool {
    let mut outcomes = Vec::with_capacity(section.conditions.len());
    for condition in &section.conditions {
        let outcome = match evaluate(condition, ctx) {
            Ok(passed) => passed,
            Err(e) => match condition.on_failure {
                OnFailure::Skip => {
                    diagnostics.note(DiagnosticKind::ConditionCheck, &section.name, e.to_string());
                    false
                }
                OnFailure::Warn => {
                    diagnostics.warn(DiagnosticKind::ConditionCheck, &section.name, e.to_string());
                    false
                }
                OnFailure::Fail => {
                    diagnostics.warn(
                        DiagnosticKind::SectionExcluded,
                        &section.name,
                        format!("section excluded: {e}"),
                    );
                    return false;
                }
            },
        };
        outcomes.push(outcome);
    }
    let applies = section.logic.combine(outcomes.into_iter());
    tracing::debug!(
        "conditional section '{}' {}",
        section.name,
        if applies { "applies" } else { "does not apply" }
    );
    applies
}
