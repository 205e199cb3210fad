//! Plan validation: per-operation checks run after the rules.
//!
//! Each check is an [`OperationValidator`]. `validation_level` decides what
//! a finding does: nothing (`lenient`), a warning (`moderate`), or a warning
//! and removal of the operation (`strict`).
use std::collections::BTreeSet;

use super::diagnostic::{DiagnosticKind, Diagnostics};
use super::placeholder;
use super::plan::ResolvedOperation;
use crate::error::ResolveError;
use crate::hive::Hive;
use crate::template::{ResourceKind, ValidationLevel};

/// A single check over a resolved operation.
pub trait OperationValidator {
    /// Short check name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Describe what is wrong with `op`, or `None` if it passes.
    fn check(&self, op: &ResolvedOperation) -> Option<String>;
}

/// Registry paths must start with a recognised hive.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistryHiveValidator;

impl OperationValidator for RegistryHiveValidator {
    fn name(&self) -> &'static str {
        "registry-hive"
    }

    fn check(&self, op: &ResolvedOperation) -> Option<String> {
        (op.kind == ResourceKind::Registry && Hive::split(&op.path).is_none())
            .then(|| format!("'{}' does not start with a known registry hive", op.path))
    }
}

/// Paths must not carry unexpanded `%VAR%` tokens.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderValidator;

impl OperationValidator for PlaceholderValidator {
    fn name(&self) -> &'static str {
        "placeholder"
    }

    fn check(&self, op: &ResolvedOperation) -> Option<String> {
        let tokens: Vec<String> = std::iter::once(op.path.as_str())
            .chain(op.dynamic_state_path.as_deref())
            .flat_map(placeholder::variables)
            .map(|name| format!("%{name}%"))
            .collect();
        (!tokens.is_empty()).then(|| format!("unexpanded placeholder(s) {}", tokens.join(", ")))
    }
}

/// The target path must not be blank.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyPathValidator;

impl OperationValidator for EmptyPathValidator {
    fn name(&self) -> &'static str {
        "empty-path"
    }

    fn check(&self, op: &ResolvedOperation) -> Option<String> {
        op.path.trim().is_empty().then(|| "target path is empty".to_string())
    }
}

/// The built-in checks, in the order they run.
#[must_use]
pub fn validators() -> Vec<Box<dyn OperationValidator>> {
    vec![
        Box::new(EmptyPathValidator),
        Box::new(RegistryHiveValidator),
        Box::new(PlaceholderValidator),
    ]
}

/// Run the built-in checks over `operations` at `level`.
pub fn validate_plan(
    operations: Vec<ResolvedOperation>,
    level: ValidationLevel,
    diagnostics: &mut Diagnostics,
) -> Vec<ResolvedOperation> {
    validate_with(operations, level, &validators(), diagnostics)
}

/// Run `checks` over `operations` at `level`.
pub fn validate_with(
    operations: Vec<ResolvedOperation>,
    level: ValidationLevel,
    checks: &[Box<dyn OperationValidator>],
    diagnostics: &mut Diagnostics,
) -> Vec<ResolvedOperation> {
    if level == ValidationLevel::Lenient {
        return operations;
    }
    operations
        .into_iter()
        .filter(|op| {
            let mut ok = true;
            for check in checks {
                if let Some(problem) = check.check(op) {
                    ok = false;
                    let message = if level == ValidationLevel::Strict {
                        format!("{problem}; operation dropped ({})", check.name())
                    } else {
                        format!("{problem} ({})", check.name())
                    };
                    diagnostics.warn(DiagnosticKind::Validation, op.identity.to_string(), message);
                }
            }
            ok || level != ValidationLevel::Strict
        })
        .collect()
}

/// Verify no two operations share an identity key.
///
/// # Errors
///
/// Returns [`ResolveError::DuplicateIdentity`] naming the first repeated key.
pub fn ensure_unique(operations: &[ResolvedOperation]) -> Result<(), ResolveError> {
    let mut seen = BTreeSet::new();
    for op in operations {
        if !seen.insert(&op.identity) {
            return Err(ResolveError::DuplicateIdentity(op.identity.to_string()));
        }
    }
    Ok(())
}
