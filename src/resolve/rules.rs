//! Rule Engine: tag-scoped global rules over the merged operations.
//!
//! Rules run once each, in declaration order; a rule sees the output of the
//! rules before it. There is no fixed-point iteration.
use std::collections::BTreeMap;

use super::aggregate::SourceKind;
use super::diagnostic::{DiagnosticKind, Diagnostics};
use super::merge::{Candidate, FieldMerger, rank};
use super::placeholder;
use super::plan::{Outcome, ResolvedOperation};
use crate::context::MachineContext;
use crate::error::RuleError;
use crate::hive::Hive;
use crate::template::{
    Configuration, InheritanceRule, MergeLevel, ResourceKind, RuleAction, Template,
    Transformation,
};

/// Apply every rule of `template` to `operations`.
///
/// A rule whose `applies_to` names no section kind present in the template
/// is skipped. Failures affect one operation at a time: the operation is
/// kept as it was and a warning is recorded.
pub fn apply(
    mut operations: Vec<ResolvedOperation>,
    template: &Template,
    ctx: &dyn MachineContext,
    diagnostics: &mut Diagnostics,
) -> Vec<ResolvedOperation> {
    let present = template.present_kinds();
    for rule in &template.inheritance_rules {
        if !rule.applies_to.iter().any(|kind| present.contains(kind)) {
            tracing::debug!("rule '{}' skipped: no matching section kind", rule.name);
            continue;
        }
        operations = match rule.action {
            RuleAction::Transform => transform_all(operations, rule, ctx, diagnostics),
            RuleAction::Merge => {
                merge_selected(operations, rule, &template.configuration, diagnostics)
            }
        };
    }
    operations
}

fn selects(rule: &InheritanceRule, op: &ResolvedOperation) -> bool {
    rule.applies_to_kind(op.kind) && rule.condition.matches(&op.inheritance_tags)
}

// ---------------------------------------------------------------------------
// Transform
// ---------------------------------------------------------------------------

fn transform_all(
    mut operations: Vec<ResolvedOperation>,
    rule: &InheritanceRule,
    ctx: &dyn MachineContext,
    diagnostics: &mut Diagnostics,
) -> Vec<ResolvedOperation> {
    let Some(transformation) = rule.transformation else {
        return operations;
    };
    let mut rewritten = 0usize;
    for op in operations.iter_mut().filter(|op| selects(rule, op)) {
        match transform(op, transformation, ctx) {
            Ok(Some((path, dynamic_state_path))) => {
                op.path = path;
                op.dynamic_state_path = dynamic_state_path;
                op.resolution.rules.push(rule.name.clone());
                rewritten += 1;
            }
            Ok(None) => {}
            Err(e) => diagnostics.warn(
                DiagnosticKind::RuleApplication,
                &rule.name,
                format!("{}: {e}", op.identity),
            ),
        }
    }
    tracing::debug!("rule '{}' rewrote {rewritten} operation(s)", rule.name);
    operations
}

/// Rewritten `(path, dynamic_state_path)`, or `None` when nothing changes.
///
/// Both paths are computed before either is replaced so a failure leaves
/// the operation untouched.
fn transform(
    op: &ResolvedOperation,
    transformation: Transformation,
    ctx: &dyn MachineContext,
) -> Result<Option<(String, Option<String>)>, RuleError> {
    let (path, dynamic_state_path) = match transformation {
        Transformation::ExpandEnvironment => (
            placeholder::expand(&op.path, ctx)?,
            op.dynamic_state_path
                .as_deref()
                .map(|p| placeholder::expand(p, ctx))
                .transpose()?,
        ),
        Transformation::NormalizeRegistryRoot => {
            if op.kind != ResourceKind::Registry {
                return Ok(None);
            }
            let path =
                Hive::normalize(&op.path).ok_or_else(|| RuleError::UnknownHive(op.path.clone()))?;
            (path, op.dynamic_state_path.clone())
        }
    };
    let changed = path != op.path || dynamic_state_path != op.dynamic_state_path;
    Ok(changed.then_some((path, dynamic_state_path)))
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

type GroupKey = (ResourceKind, String, Option<String>);

fn merge_selected(
    mut operations: Vec<ResolvedOperation>,
    rule: &InheritanceRule,
    config: &Configuration,
    diagnostics: &mut Diagnostics,
) -> Vec<ResolvedOperation> {
    let mut groups: BTreeMap<GroupKey, Vec<usize>> = BTreeMap::new();
    for (i, op) in operations.iter().enumerate() {
        if selects(rule, op) {
            let key_name = match rule.parameters.merge_level {
                MergeLevel::Value => op.key_name.clone(),
                MergeLevel::Key => None,
            };
            groups
                .entry((op.kind, op.path.clone(), key_name))
                .or_default()
                .push(i);
        }
    }

    let key_level = rule.parameters.merge_level == MergeLevel::Key;
    let mut absorbed = vec![false; operations.len()];
    for ((kind, path, _), mut members) in groups.into_iter().filter(|(_, m)| m.len() > 1) {
        // A key-level merge exports the whole key; an unselected operation
        // already exporting that key would make it ambiguous.
        let clash = key_level
            && operations.iter().enumerate().any(|(i, op)| {
                !members.contains(&i) && op.kind == kind && op.path == path && op.key_name.is_none()
            });
        if clash {
            diagnostics.warn(
                DiagnosticKind::RuleApplication,
                &rule.name,
                format!(
                    "{kind} key {path} is also exported whole by an operation outside \
                     this rule; not merged"
                ),
            );
            continue;
        }

        members.sort_by(|&a, &b| {
            let key = |i: usize| {
                operations
                    .get(i)
                    .map_or((i64::MIN, SourceKind::Shared, i), |op| {
                        (op.priority, op.source_kind, op.order)
                    })
            };
            rank(key(a), key(b), config.machine_precedence)
        });
        let Some((&head, rest)) = members.split_first() else {
            continue;
        };

        let ranked: Vec<&ResolvedOperation> =
            members.iter().filter_map(|&i| operations.get(i)).collect();
        let Some(label) = ranked.first().map(|op| op.identity.to_string()) else {
            continue;
        };
        let candidates: Vec<Candidate<'_>> = ranked.iter().map(|&op| Candidate::from(op)).collect();
        let fields = FieldMerger::new(
            &label,
            config.fallback_strategy,
            rule.parameters.conflict_resolution,
            diagnostics,
        )
        .merge(&candidates);
        let order = ranked.iter().map(|op| op.order).min();
        let mut contributions: Vec<_> = ranked
            .iter()
            .skip(1)
            .flat_map(|op| op.resolution.contributions.iter().cloned())
            .collect();
        for c in &mut contributions {
            if c.outcome == Outcome::Selected {
                c.outcome = Outcome::Merged;
            }
        }

        for &i in rest {
            if let Some(flag) = absorbed.get_mut(i) {
                *flag = true;
            }
        }
        if let Some(op) = operations.get_mut(head) {
            op.inheritance_tags = fields.tags;
            op.dynamic_state_path = fields.dynamic_state_path;
            op.attributes = fields.attributes;
            if key_level {
                op.key_name = None;
            }
            op.order = order.unwrap_or(op.order);
            op.resolution.contributions.extend(contributions);
            op.resolution.rules.push(rule.name.clone());
            tracing::debug!(
                "rule '{}' merged {} operation(s) into {label}",
                rule.name,
                rest.len()
            );
        }
    }

    operations
        .into_iter()
        .zip(absorbed)
        .filter_map(|(op, gone)| (!gone).then_some(op))
        .collect()
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use serde_yaml::Value;

    use super::*;
    use crate::context::FixedContext;
    use crate::resolve::plan::tests::operation;
    use crate::template::{ConflictResolution, SettingItem, TagCondition};

    fn ctx() -> FixedContext {
        FixedContext::new().with_env("SystemRoot", "C:\\Windows")
    }

    fn template_with(rule: InheritanceRule) -> Template {
        let mut t = Template::new("desktop");
        t.shared.registry.push(SettingItem::new("r", "HKCU:\\R"));
        t.shared.files.push(SettingItem::new("f", "C:\\f"));
        t.inheritance_rules.push(rule);
        t
    }

    fn tagged(mut op: ResolvedOperation, tags: &[&str]) -> ResolvedOperation {
        op.inheritance_tags = tags.iter().map(ToString::to_string).collect();
        op
    }

    // -----------------------------------------------------------------------
    // Transform
    // -----------------------------------------------------------------------

    #[test]
    fn expand_rewrites_path_but_keeps_identity() {
        let t = template_with(InheritanceRule::transform(
            "expand",
            vec![ResourceKind::Files],
            Transformation::ExpandEnvironment,
        ));
        let op = operation(ResourceKind::Files, "%SystemRoot%\\System32\\drivers\\etc\\hosts");
        let identity = op.identity.clone();
        let mut diags = Diagnostics::new();
        let ops = apply(vec![op], &t, &ctx(), &mut diags);
        assert_eq!(ops[0].path, "C:\\Windows\\System32\\drivers\\etc\\hosts");
        assert_eq!(ops[0].identity, identity);
        assert_eq!(ops[0].resolution.rules, vec!["expand"]);
        assert!(diags.is_empty());
    }

    #[test]
    fn expand_also_rewrites_dynamic_state_path() {
        let t = template_with(InheritanceRule::transform(
            "expand",
            vec![ResourceKind::Files],
            Transformation::ExpandEnvironment,
        ));
        let mut op = operation(ResourceKind::Files, "C:\\Games");
        op.dynamic_state_path = Some("%SystemRoot%\\Temp".to_string());
        let ops = apply(vec![op], &t, &ctx(), &mut Diagnostics::new());
        assert_eq!(ops[0].dynamic_state_path.as_deref(), Some("C:\\Windows\\Temp"));
    }

    #[test]
    fn failed_expansion_keeps_operation_and_warns() {
        let t = template_with(InheritanceRule::transform(
            "expand",
            vec![ResourceKind::Files],
            Transformation::ExpandEnvironment,
        ));
        let mut op = operation(ResourceKind::Files, "%SystemRoot%\\x");
        op.dynamic_state_path = Some("%GAMEDIR%\\saves".to_string());
        let mut diags = Diagnostics::new();
        let ops = apply(vec![op], &t, &ctx(), &mut diags);
        assert_eq!(ops[0].path, "%SystemRoot%\\x");
        assert!(ops[0].resolution.rules.is_empty());
        assert_eq!(diags.of_kind(DiagnosticKind::RuleApplication).count(), 1);
    }

    #[test]
    fn transform_only_touches_applicable_kinds() {
        let t = template_with(InheritanceRule::transform(
            "expand",
            vec![ResourceKind::Files],
            Transformation::ExpandEnvironment,
        ));
        let op = operation(ResourceKind::Registry, "HKCU:\\%SystemRoot%");
        let ops = apply(vec![op], &t, &ctx(), &mut Diagnostics::new());
        assert_eq!(ops[0].path, "HKCU:\\%SystemRoot%");
    }

    #[test]
    fn normalize_registry_root() {
        let t = template_with(InheritanceRule::transform(
            "roots",
            vec![ResourceKind::Registry],
            Transformation::NormalizeRegistryRoot,
        ));
        let ops = apply(
            vec![
                operation(ResourceKind::Registry, "HKEY_CURRENT_USER\\Console"),
                operation(ResourceKind::Registry, "Software\\NoHive"),
            ],
            &t,
            &ctx(),
            &mut Diagnostics::new(),
        );
        assert_eq!(ops[0].path, "HKCU:\\Console");
        assert_eq!(ops[1].path, "Software\\NoHive");
    }

    #[test]
    fn rule_for_absent_kind_is_skipped() {
        let mut t = Template::new("desktop");
        t.shared.files.push(SettingItem::new("f", "%SystemRoot%\\f"));
        t.inheritance_rules.push(InheritanceRule::transform(
            "roots",
            vec![ResourceKind::Registry],
            Transformation::NormalizeRegistryRoot,
        ));
        let op = operation(ResourceKind::Registry, "HKEY_CURRENT_USER\\Console");
        let ops = apply(vec![op], &t, &ctx(), &mut Diagnostics::new());
        assert_eq!(ops[0].path, "HKEY_CURRENT_USER\\Console");
        assert!(ops[0].resolution.rules.is_empty());
    }

    // -----------------------------------------------------------------------
    // Merge
    // -----------------------------------------------------------------------

    fn key_merge_rule() -> InheritanceRule {
        let mut rule = InheritanceRule::merge(
            "gaming",
            vec![ResourceKind::Registry],
            TagCondition::all_of(["gaming", "performance"]),
        );
        rule.parameters.merge_level = MergeLevel::Key;
        rule
    }

    fn value_op(key: &str, priority: i64, attrs: &str, tags: &[&str]) -> ResolvedOperation {
        let base = operation(ResourceKind::Registry, "HKCU:\\System\\GameConfigStore");
        let mut op = tagged(base, tags);
        op.key_name = Some(key.to_string());
        op.identity.key_name = Some(key.to_string());
        op.priority = priority;
        op.attributes = serde_yaml::from_str(attrs).unwrap();
        op
    }

    #[test]
    fn key_level_merge_collapses_value_entries() {
        let t = template_with(key_merge_rule());
        let mut low = value_op("GameDVR_Enabled", 50, "a: 1", &["gaming", "performance"]);
        low.order = 3;
        let mut high = value_op("GameDVR_FSEBehavior", 100, "b: 2", &["gaming", "performance"]);
        high.source = "gaming-rig".to_string();
        high.source_kind = SourceKind::MachineSpecific;
        high.order = 7;
        let mut diags = Diagnostics::new();
        let ops = apply(vec![low, high], &t, &ctx(), &mut diags);
        assert_eq!(ops.len(), 1);
        let op = &ops[0];
        assert_eq!(op.key_name, None);
        assert_eq!(op.identity.key_name.as_deref(), Some("GameDVR_FSEBehavior"));
        assert_eq!(op.attributes["a"], Value::from(1));
        assert_eq!(op.attributes["b"], Value::from(2));
        assert_eq!(op.order, 3);
        assert_eq!(op.resolution.rules, vec!["gaming"]);
        assert_eq!(op.resolution.contributions.len(), 2);
        assert_eq!(op.resolution.contributions[1].outcome, Outcome::Merged);
    }

    #[test]
    fn key_level_merge_skips_key_exported_elsewhere() {
        let t = template_with(key_merge_rule());
        let whole = operation(ResourceKind::Registry, "HKCU:\\System\\GameConfigStore");
        let mut diags = Diagnostics::new();
        let ops = apply(
            vec![
                value_op("GameDVR_Enabled", 50, "a: 1", &["gaming", "performance"]),
                value_op("GameDVR_FSEBehavior", 50, "b: 1", &["gaming", "performance"]),
                whole,
            ],
            &t,
            &ctx(),
            &mut diags,
        );
        assert_eq!(ops.len(), 3);
        assert!(ops.iter().all(|op| op.resolution.rules.is_empty()));
        assert_eq!(diags.of_kind(DiagnosticKind::RuleApplication).count(), 1);
    }

    #[test]
    fn value_level_merge_keeps_distinct_value_names() {
        let mut rule = key_merge_rule();
        rule.parameters.merge_level = MergeLevel::Value;
        let t = template_with(rule);
        let ops = apply(
            vec![
                value_op("A", 50, "a: 1", &["gaming", "performance"]),
                value_op("B", 50, "b: 1", &["gaming", "performance"]),
            ],
            &t,
            &ctx(),
            &mut Diagnostics::new(),
        );
        assert_eq!(ops.len(), 2);
    }

    #[test]
    fn unselected_operations_are_left_alone() {
        let t = template_with(key_merge_rule());
        let ops = apply(
            vec![
                value_op("A", 50, "a: 1", &["gaming", "performance"]),
                value_op("B", 50, "b: 1", &["gaming"]),
            ],
            &t,
            &ctx(),
            &mut Diagnostics::new(),
        );
        assert_eq!(ops.len(), 2);
        assert!(ops.iter().all(|op| op.resolution.rules.is_empty()));
    }

    #[test]
    fn rule_conflict_resolution_overrides_items() {
        let mut rule = key_merge_rule();
        rule.parameters.conflict_resolution = Some(ConflictResolution::LastWins);
        let t = template_with(rule);
        let ops = apply(
            vec![
                value_op("A", 50, "mode: 1", &["gaming", "performance"]),
                value_op("B", 50, "mode: 2", &["gaming", "performance"]),
            ],
            &t,
            &ctx(),
            &mut Diagnostics::new(),
        );
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].attributes["mode"], Value::from(2));
    }

    #[test]
    fn rules_apply_in_declaration_order() {
        let mut t = template_with(InheritanceRule::transform(
            "roots",
            vec![ResourceKind::Registry],
            Transformation::NormalizeRegistryRoot,
        ));
        t.inheritance_rules.push(InheritanceRule::merge(
            "collapse",
            vec![ResourceKind::Registry],
            TagCondition::default(),
        ));
        let ops = apply(
            vec![
                operation(ResourceKind::Registry, "HKEY_CURRENT_USER\\Console"),
                operation(ResourceKind::Registry, "HKCU:\\Console"),
            ],
            &t,
            &ctx(),
            &mut Diagnostics::new(),
        );
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].resolution.rules, vec!["roots", "collapse"]);
    }
}
