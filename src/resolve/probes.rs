//! Probe gathering: the concurrent half of a resolution.
//!
//! Every selector, condition and placeholder probe the template can ask is
//! collected up front and answered on a bounded worker pool. [`gather`]
//! returns only when every probe has an answer or has timed out, so the
//! stages after it read from an in-memory [`ProbeResults`] and never block.
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use rayon::prelude::*;

use super::{ResolveOptions, condition, placeholder};
use crate::context::{MachineContext, Probe};
use crate::error::{ProbeError, ResolveError};
use crate::template::{ItemLists, MachineSelector, Template, Transformation};

/// Every probe resolving `template` may need.
#[must_use]
pub fn required_probes(template: &Template) -> BTreeSet<Probe> {
    let mut probes: BTreeSet<Probe> = template
        .machine_specific
        .iter()
        .flat_map(|block| &block.machine_selectors)
        .filter_map(MachineSelector::probe)
        .collect();

    probes.extend(
        template
            .conditional_sections
            .iter()
            .flat_map(|section| &section.conditions)
            .map(condition::probe_for),
    );

    let expands = template
        .inheritance_rules
        .iter()
        .any(|rule| rule.transformation == Some(Transformation::ExpandEnvironment));
    if expands {
        let lists = std::iter::once(template.shared.items())
            .chain(template.machine_specific.iter().map(|b| b.items()))
            .chain(template.conditional_sections.iter().map(|s| s.items()));
        for (_, item) in lists.flat_map(ItemLists::iter) {
            let paths = std::iter::once(item.target_path()).chain(item.dynamic_state_path.as_deref());
            for path in paths {
                probes.extend(
                    placeholder::variables(path)
                        .into_iter()
                        .map(|name| Probe::EnvVar(name.to_string())),
                );
            }
        }
    }
    probes
}

/// Answers gathered before the barrier.
///
/// Implements [`MachineContext`] so the evaluators run unchanged against it.
/// A probe that was never gathered is reported as unsupported.
#[derive(Debug, Clone, Default)]
pub struct ProbeResults {
    answers: BTreeMap<Probe, Result<String, ProbeError>>,
}

impl ProbeResults {
    /// Number of gathered probes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.answers.len()
    }

    /// Whether nothing was gathered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }

    /// Number of probes abandoned at the deadline.
    #[must_use]
    pub fn timed_out(&self) -> usize {
        self.answers
            .values()
            .filter(|answer| matches!(answer, Err(ProbeError::TimedOut { .. })))
            .count()
    }
}

impl MachineContext for ProbeResults {
    fn resolve(&self, probe: &Probe) -> Result<String, ProbeError> {
        self.answers
            .get(probe)
            .cloned()
            .unwrap_or_else(|| Err(ProbeError::Unsupported(probe.to_string())))
    }
}

/// Answer every probe in `probes` against `ctx`.
///
/// Probes run on a pool of at most `options.max_workers` threads unless
/// parallelism is disabled. A probe still running at the resolution
/// deadline, or one whose answer arrives after it, is recorded as
/// [`ProbeError::TimedOut`].
///
/// # Errors
///
/// Returns [`ResolveError::WorkerPool`] if the thread pool cannot be built.
pub fn gather(
    probes: &BTreeSet<Probe>,
    ctx: &dyn MachineContext,
    options: &ResolveOptions,
) -> Result<ProbeResults, ResolveError> {
    let started = Instant::now();
    let deadline = started.checked_add(options.timeout);
    let ask = |probe: &Probe| (probe.clone(), answer(ctx, probe, started, deadline));

    let answers: BTreeMap<Probe, Result<String, ProbeError>> =
        if options.parallel && probes.len() > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(options.max_workers.max(1))
                .thread_name(|i| format!("probe-{i}"))
                .build()
                .map_err(|e| ResolveError::WorkerPool(e.to_string()))?;
            pool.install(|| probes.par_iter().map(&ask).collect())
        } else {
            probes.iter().map(&ask).collect()
        };

    let results = ProbeResults { answers };
    tracing::debug!(
        "gathered {} probe(s) in {}ms ({} timed out)",
        results.len(),
        started.elapsed().as_millis(),
        results.timed_out()
    );
    Ok(results)
}

fn answer(
    ctx: &dyn MachineContext,
    probe: &Probe,
    started: Instant,
    deadline: Option<Instant>,
) -> Result<String, ProbeError> {
    let Some(deadline) = deadline else {
        return ctx.resolve(probe);
    };
    let timed_out = || ProbeError::TimedOut {
        probe: probe.to_string(),
        elapsed: started.elapsed(),
    };
    if Instant::now() >= deadline {
        return Err(timed_out());
    }
    let result = ctx.resolve_until(probe, deadline);
    if result.is_ok() && Instant::now() > deadline {
        return Err(timed_out());
    }
    tracing::debug!("probe {probe}: {}", if result.is_ok() { "answered" } else { "failed" });
    result
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::context::{FixedContext, MockMachineContext};
    use crate::template::{
        Condition, ConditionKind, ConditionalSection, InheritanceRule, MachineSpecificBlock,
        ResourceKind, SettingItem,
    };

    fn template() -> Template {
        let mut t = Template::new("desktop");
        let mut gaming = MachineSpecificBlock::new("gaming");
        gaming
            .machine_selectors
            .push(MachineSelector::machine_name("GAMING-RIG"));
        gaming
            .machine_selectors
            .push(MachineSelector::hostname_pattern("^rig-"));
        t.machine_specific.push(gaming);

        let mut nvidia = ConditionalSection::new("nvidia");
        nvidia.conditions.push(Condition::new(
            ConditionKind::Hardware,
            "nvidia-smi -L",
            "NVIDIA",
        ));
        t.conditional_sections.push(nvidia);

        let mut saves = SettingItem::new("Saves", "%USERPROFILE%\\Saved Games");
        saves.dynamic_state_path = Some("%LOCALAPPDATA%\\Game".to_string());
        t.shared.files.push(saves);
        t
    }

    // -----------------------------------------------------------------------
    // required_probes
    // -----------------------------------------------------------------------

    #[test]
    fn selectors_and_conditions_are_deduplicated() {
        let probes = required_probes(&template());
        assert_eq!(
            probes.into_iter().collect::<Vec<_>>(),
            vec![Probe::Hostname, Probe::Command("nvidia-smi -L".to_string())]
        );
    }

    #[test]
    fn placeholders_only_probed_when_expansion_rule_exists() {
        let mut t = template();
        t.inheritance_rules.push(InheritanceRule::transform(
            "expand",
            vec![ResourceKind::Files],
            Transformation::ExpandEnvironment,
        ));
        let probes = required_probes(&t);
        assert!(probes.contains(&Probe::EnvVar("USERPROFILE".to_string())));
        assert!(probes.contains(&Probe::EnvVar("LOCALAPPDATA".to_string())));
        assert_eq!(probes.len(), 4);
    }

    // -----------------------------------------------------------------------
    // gather
    // -----------------------------------------------------------------------

    fn probes() -> BTreeSet<Probe> {
        [
            Probe::Hostname,
            Probe::EnvVar("USERPROFILE".to_string()),
            Probe::Command("nvidia-smi -L".to_string()),
        ]
        .into_iter()
        .collect()
    }

    fn rig() -> FixedContext {
        FixedContext::new()
            .with_hostname("gaming-rig")
            .with_env("USERPROFILE", "C:\\Users\\gamer")
    }

    #[test]
    fn parallel_and_sequential_agree() {
        let parallel = gather(&probes(), &rig(), &ResolveOptions::default()).unwrap();
        let sequential = gather(
            &probes(),
            &rig(),
            &ResolveOptions::default().with_parallel(false),
        )
        .unwrap();
        for probe in probes() {
            assert_eq!(parallel.resolve(&probe), sequential.resolve(&probe));
        }
        assert_eq!(parallel.resolve(&Probe::Hostname).unwrap(), "gaming-rig");
    }

    #[test]
    fn failures_are_recorded_not_raised() {
        let results = gather(&probes(), &rig(), &ResolveOptions::default()).unwrap();
        assert!(matches!(
            results.resolve(&Probe::Command("nvidia-smi -L".to_string())),
            Err(ProbeError::Unsupported(_))
        ));
    }

    #[test]
    fn ungathered_probe_is_unsupported() {
        let results = ProbeResults::default();
        assert!(results.is_empty());
        assert!(matches!(
            results.resolve(&Probe::Hostname),
            Err(ProbeError::Unsupported(_))
        ));
    }

    #[test]
    fn zero_timeout_never_calls_context() {
        let mut mock = MockMachineContext::new();
        mock.expect_resolve().times(0);
        let options = ResolveOptions::default().with_timeout(Duration::ZERO);
        let results = gather(&probes(), &mock, &options).unwrap();
        assert_eq!(results.timed_out(), 3);
    }

    struct SlowContext;

    impl MachineContext for SlowContext {
        fn resolve(&self, probe: &Probe) -> Result<String, ProbeError> {
            if matches!(probe, Probe::Command(_)) {
                thread::sleep(Duration::from_millis(300));
            }
            Ok("done".to_string())
        }
    }

    #[test]
    fn slow_probe_times_out_while_fast_ones_answer() {
        let options = ResolveOptions::default().with_timeout(Duration::from_millis(100));
        let results = gather(&probes(), &SlowContext, &options).unwrap();
        assert_eq!(results.resolve(&Probe::Hostname).unwrap(), "done");
        assert!(matches!(
            results.resolve(&Probe::Command("nvidia-smi -L".to_string())),
            Err(ProbeError::TimedOut { .. })
        ));
        assert_eq!(results.timed_out(), 1);
    }
}
