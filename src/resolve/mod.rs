//! Resolution Orchestrator.
//!
//! [`resolve`] turns a template and a machine context into an
//! [`OperationPlan`] plus [`Diagnostics`]:
//!
//! 1. structural validation (fatal on failure)
//! 2. probe gathering on the worker pool, up to the barrier
//! 3. aggregation of the included blocks
//! 4. conflict resolution per identity key
//! 5. inheritance rules, in declaration order
//! 6. plan validation at the template's `validation_level`
//! 7. uniqueness check and ordering
//!
//! Steps 3 to 7 are single-threaded and read only from the gathered probe
//! answers, so the same inputs always produce the same plan.
pub mod aggregate;
pub mod condition;
pub mod diagnostic;
pub mod merge;
pub mod placeholder;
pub mod plan;
pub mod probes;
pub mod rules;
pub mod selector;
pub mod validate;

use std::time::Duration;

use serde::Serialize;

use crate::context::MachineContext;
use crate::error::ResolveError;
use crate::template::{Template, validation};

pub use aggregate::{AggregatedItem, SourceKind};
pub use diagnostic::{Diagnostic, DiagnosticKind, Diagnostics, Severity};
pub use plan::{Contribution, OperationPlan, Outcome, ResolutionInfo, ResolvedOperation};
pub use probes::ProbeResults;

/// Default resolution deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default probe worker count.
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// Knobs for one resolution run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Deadline for all probes, measured from the start of gathering.
    pub timeout: Duration,
    /// Upper bound on concurrent probes.
    pub max_workers: usize,
    /// Run probes on a worker pool instead of the calling thread.
    pub parallel: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_workers: DEFAULT_MAX_WORKERS,
            parallel: true,
        }
    }
}

impl ResolveOptions {
    /// Set the probe deadline.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the worker bound (at least one worker is always used).
    #[must_use]
    pub const fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    /// Enable or disable the worker pool.
    #[must_use]
    pub const fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

/// A finished resolution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    /// The ordered, conflict-free plan.
    pub plan: OperationPlan,
    /// Non-fatal findings, in the order they were recorded.
    pub diagnostics: Diagnostics,
}

/// Resolve `template` against `ctx`.
///
/// Nothing is executed: the result describes what an executor should do.
/// Calling this twice with unchanged inputs yields identical plans.
///
/// # Errors
///
/// Returns a [`ResolveError`] if the template is structurally malformed, the
/// probe worker pool cannot be built, or the finished plan would contain two
/// operations for the same identity key.
pub fn resolve(
    template: &Template,
    ctx: &dyn MachineContext,
    options: &ResolveOptions,
) -> Result<Resolution, ResolveError> {
    validation::validate(template)?;

    let required = probes::required_probes(template);
    let answers = probes::gather(&required, ctx, options)?;

    let mut diagnostics = Diagnostics::new();
    let items = aggregate::aggregate(template, &answers, &mut diagnostics);
    let merged = merge::merge(items, &template.configuration, &mut diagnostics);
    let ruled = rules::apply(merged, template, &answers, &mut diagnostics);
    let mut operations = validate::validate_plan(
        ruled,
        template.configuration.validation_level,
        &mut diagnostics,
    );
    validate::ensure_unique(&operations)?;
    operations.sort_by_key(|op| op.order);

    tracing::info!(
        "resolved '{}' into {} operation(s) with {} warning(s)",
        template.metadata.name,
        operations.len(),
        diagnostics.warning_count()
    );
    Ok(Resolution {
        plan: OperationPlan::new(template.metadata.name.clone(), operations),
        diagnostics,
    })
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::context::{FixedContext, MockMachineContext};
    use crate::template::{MachineSelector, MachineSpecificBlock, SettingItem};

    fn template() -> Template {
        let mut t = Template::new("desktop");
        t.shared.files.push(SettingItem::new("Saves", "C:\\Games\\saves"));
        t.shared
            .registry
            .push(SettingItem::new("Console", "HKCU:\\Console"));
        let mut gaming = MachineSpecificBlock::new("gaming");
        gaming
            .machine_selectors
            .push(MachineSelector::machine_name("GAMING-RIG"));
        gaming
            .registry
            .push(SettingItem::new("Game DVR", "HKCU:\\System\\GameConfigStore"));
        t.machine_specific.push(gaming);
        t
    }

    #[test]
    fn options_builders() {
        let options = ResolveOptions::default()
            .with_timeout(Duration::from_secs(5))
            .with_max_workers(2)
            .with_parallel(false);
        assert_eq!(options.timeout, Duration::from_secs(5));
        assert_eq!(options.max_workers, 2);
        assert!(!options.parallel);
    }

    #[test]
    fn plan_order_follows_declaration() {
        let ctx = FixedContext::new().with_hostname("gaming-rig");
        let resolution = resolve(&template(), &ctx, &ResolveOptions::default()).unwrap();
        let paths: Vec<_> = resolution.plan.iter().map(|op| op.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "HKCU:\\Console",
                "C:\\Games\\saves",
                "HKCU:\\System\\GameConfigStore"
            ]
        );
        assert!(resolution.diagnostics.is_empty());
    }

    #[test]
    fn malformed_template_is_fatal() {
        let mut t = template();
        t.machine_specific[0].machine_selectors.clear();
        let err = resolve(&t, &FixedContext::new(), &ResolveOptions::default()).unwrap_err();
        assert!(matches!(err, ResolveError::Template(_)));
    }

    #[test]
    fn unanswerable_hostname_gives_shared_only_plan() {
        let mut mock = MockMachineContext::new();
        mock.expect_resolve_until()
            .returning(|probe, _| Err(crate::error::ProbeError::NotFound(probe.to_string())));
        let resolution = resolve(
            &template(),
            &mock,
            &ResolveOptions::default().with_parallel(false),
        )
        .unwrap();
        assert_eq!(resolution.plan.len(), 2);
        assert_eq!(resolution.diagnostics.warning_count(), 1);
    }
}
