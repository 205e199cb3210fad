//! Selector Evaluator: matches machine selectors against the context.
use regex::RegexBuilder;

use super::diagnostic::{DiagnosticKind, Diagnostics};
use crate::context::MachineContext;
use crate::error::SelectorError;
use crate::template::{MachineSelector, MachineSpecificBlock, Operator};

/// Evaluate one selector.
///
/// `equals` compares whole strings; `matches` is an unanchored regex search.
/// Both ignore case unless the selector is `case_sensitive`.
///
/// # Errors
///
/// Returns [`SelectorError`] if the probe cannot be answered or the pattern
/// does not compile. Callers treat either as "does not match".
pub fn evaluate(
    selector: &MachineSelector,
    ctx: &dyn MachineContext,
) -> Result<bool, SelectorError> {
    let (Some(probe), Some(expected)) = (selector.probe(), selector.comparand()) else {
        return Ok(false);
    };
    let actual = ctx.resolve(&probe)?;
    match selector.operator() {
        Operator::Equals => Ok(if selector.case_sensitive {
            actual == expected
        } else {
            actual.to_lowercase() == expected.to_lowercase()
        }),
        Operator::Matches => {
            let re = RegexBuilder::new(expected)
                .case_insensitive(!selector.case_sensitive)
                .build()
                .map_err(|e| SelectorError::InvalidPattern {
                    pattern: expected.to_string(),
                    reason: e.to_string(),
                })?;
            Ok(re.is_match(&actual))
        }
    }
}

/// Whether `block` applies to this machine.
///
/// Selectors combine with the block's `selector_logic`. A selector that
/// cannot be evaluated counts as false and is reported as a warning.
pub fn block_matches(
    block: &MachineSpecificBlock,
    ctx: &dyn MachineContext,
    diagnostics: &mut Diagnostics,
) -> bool {
    let outcomes: Vec<bool> = block
        .machine_selectors
        .iter()
        .map(|selector| {
            evaluate(selector, ctx).unwrap_or_else(|e| {
                diagnostics.warn(DiagnosticKind::SelectorEvaluation, &block.name, e.to_string());
                false
            })
        })
        .collect();
    let matched = block.selector_logic.combine(outcomes.into_iter());
    tracing::debug!(
        "machine block '{}' {}",
        block.name,
        if matched { "matched" } else { "did not match" }
    );
    matched
}
