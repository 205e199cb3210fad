//! Conflict Resolver: one operation per identity key.
//!
//! Entries targeting the same resource are ranked by priority, then source
//! kind (when `machine_precedence` is on), then encounter order. A `replace`
//! entry supersedes everything ranked below it; `merge` entries are folded
//! together field by field. Same-priority disagreements on a field are
//! settled by `conflict_resolution`, then by the template's
//! `fallback_strategy`.
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use serde_yaml::{Mapping, Value};

use super::aggregate::{AggregatedItem, SourceKind};
use super::diagnostic::{DiagnosticKind, Diagnostics};
use super::plan::{Contribution, Outcome, ResolutionInfo, ResolvedOperation};
use crate::error::MergeConflictError;
use crate::template::{
    Attributes, ConflictResolution, Configuration, FallbackStrategy, IdentityKey,
    InheritancePolicy,
};

/// Compare two entries by rank: higher priority first, then the more
/// specific source kind, then earlier encounter.
pub(crate) fn rank(
    a: (i64, SourceKind, usize),
    b: (i64, SourceKind, usize),
    machine_precedence: bool,
) -> Ordering {
    b.0.cmp(&a.0)
        .then_with(|| {
            if machine_precedence {
                b.1.cmp(&a.1)
            } else {
                Ordering::Equal
            }
        })
        .then_with(|| a.2.cmp(&b.2))
}

/// The mergeable view of one ranked contributor.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Candidate<'a> {
    pub source: &'a str,
    pub source_kind: SourceKind,
    pub priority: i64,
    pub conflict_resolution: ConflictResolution,
    pub tags: &'a BTreeSet<String>,
    pub dynamic_state_path: Option<&'a str>,
    pub attributes: &'a Attributes,
}

impl<'a> From<&AggregatedItem<'a>> for Candidate<'a> {
    fn from(entry: &AggregatedItem<'a>) -> Self {
        Self {
            source: entry.source_name,
            source_kind: entry.source,
            priority: entry.priority,
            conflict_resolution: entry.item.conflict_resolution,
            tags: &entry.item.inheritance_tags,
            dynamic_state_path: entry.item.dynamic_state_path.as_deref(),
            attributes: &entry.item.attributes,
        }
    }
}

impl<'a> From<&'a ResolvedOperation> for Candidate<'a> {
    fn from(op: &'a ResolvedOperation) -> Self {
        Self {
            source: &op.source,
            source_kind: op.source_kind,
            priority: op.priority,
            conflict_resolution: op.conflict_resolution,
            tags: &op.inheritance_tags,
            dynamic_state_path: op.dynamic_state_path.as_deref(),
            attributes: &op.attributes,
        }
    }
}

/// Fields produced by folding ranked candidates together.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MergedFields {
    pub tags: BTreeSet<String>,
    pub dynamic_state_path: Option<String>,
    pub attributes: Attributes,
}

/// Tie-settling context for one identity group.
pub(crate) struct FieldMerger<'d> {
    identity: &'d str,
    fallback: FallbackStrategy,
    conflict_override: Option<ConflictResolution>,
    diagnostics: &'d mut Diagnostics,
}

impl<'d> FieldMerger<'d> {
    pub(crate) const fn new(
        identity: &'d str,
        fallback: FallbackStrategy,
        conflict_override: Option<ConflictResolution>,
        diagnostics: &'d mut Diagnostics,
    ) -> Self {
        Self {
            identity,
            fallback,
            conflict_override,
            diagnostics,
        }
    }

    /// Fold `candidates` (already in rank order) into one set of fields.
    pub(crate) fn merge(&mut self, candidates: &[Candidate<'_>]) -> MergedFields {
        let tags = candidates
            .iter()
            .flat_map(|c| c.tags.iter().cloned())
            .collect();

        let paths: Vec<_> = candidates
            .iter()
            .filter_map(|c| c.dynamic_state_path.map(|p| (c, p)))
            .collect();
        let dynamic_state_path = self
            .pick("dynamic_state_path", &paths)
            .map(ToString::to_string);

        let keys: BTreeSet<&String> = candidates
            .iter()
            .flat_map(|c| c.attributes.keys())
            .collect();
        let mut attributes = Attributes::new();
        for key in keys {
            let providers: Vec<_> = candidates
                .iter()
                .filter_map(|c| c.attributes.get(key).map(|v| (c, v)))
                .collect();
            let value = self.merge_value(&format!("attributes.{key}"), &providers);
            attributes.insert(key.clone(), value);
        }

        MergedFields {
            tags,
            dynamic_state_path,
            attributes,
        }
    }

    fn merge_value(&mut self, field: &str, providers: &[(&Candidate<'_>, &Value)]) -> Value {
        let providers: Vec<_> = providers
            .iter()
            .filter(|(_, v)| !v.is_null())
            .copied()
            .collect();
        let Some(&(first, top)) = providers.first() else {
            return Value::Null;
        };
        let same_shape = providers
            .iter()
            .take_while(|(c, _)| c.priority == first.priority)
            .all(|(_, v)| shape(v) == shape(top));
        if !same_shape {
            return self.pick(field, &providers).cloned().unwrap_or(Value::Null);
        }

        match top {
            Value::Mapping(_) => {
                let maps: Vec<_> = providers
                    .iter()
                    .filter_map(|&(c, v)| v.as_mapping().map(|m| (c, m)))
                    .collect();
                let mut keys: Vec<&Value> = Vec::new();
                for key in maps.iter().flat_map(|(_, m)| m.keys()) {
                    if !keys.contains(&key) {
                        keys.push(key);
                    }
                }
                let mut out = Mapping::new();
                for key in keys {
                    let sub: Vec<_> = maps
                        .iter()
                        .filter_map(|&(c, m)| m.get(key).map(|v| (c, v)))
                        .collect();
                    let label = key
                        .as_str()
                        .map_or_else(|| format!("{key:?}"), ToString::to_string);
                    let merged = self.merge_value(&format!("{field}.{label}"), &sub);
                    out.insert(key.clone(), merged);
                }
                Value::Mapping(out)
            }
            Value::Sequence(_) => {
                let mut out: Vec<Value> = Vec::new();
                for element in providers
                    .iter()
                    .filter_map(|(_, v)| v.as_sequence())
                    .flatten()
                {
                    if !out.contains(element) {
                        out.push(element.clone());
                    }
                }
                Value::Sequence(out)
            }
            _ => self.pick(field, &providers).cloned().unwrap_or(Value::Null),
        }
    }

    /// Top-ranked value of a scalar field, settling same-priority
    /// disagreements.
    fn pick<'v, T: PartialEq + ?Sized>(
        &mut self,
        field: &str,
        providers: &[(&Candidate<'_>, &'v T)],
    ) -> Option<&'v T> {
        let &(first, value) = providers.first()?;
        let tied: Vec<_> = providers
            .iter()
            .take_while(|(c, _)| c.priority == first.priority)
            .collect();
        if tied.iter().all(|(_, v)| *v == value) {
            return Some(value);
        }

        let policy = self.conflict_override.unwrap_or(first.conflict_resolution);
        let chosen = match policy {
            ConflictResolution::MachineWins => agreed(&tied, false),
            ConflictResolution::SharedWins => agreed(&tied, true),
            ConflictResolution::FirstWins => tied.first().map(|&&(_, v)| v),
            ConflictResolution::LastWins => tied.last().map(|&&(_, v)| v),
        };
        if let Some(v) = chosen {
            return Some(v);
        }

        let conflict = MergeConflictError {
            identity: self.identity.to_string(),
            field: field.to_string(),
            sources: tied.iter().map(|(c, _)| c.source.to_string()).collect(),
            fallback: self.fallback.as_str().to_string(),
        };
        self.diagnostics
            .warn(DiagnosticKind::MergeConflict, self.identity, conflict.to_string());
        let fallback = match self.fallback {
            FallbackStrategy::UseShared => tied
                .iter()
                .find(|(c, _)| c.source_kind == SourceKind::Shared),
            FallbackStrategy::UseMachine => tied
                .iter()
                .find(|(c, _)| c.source_kind != SourceKind::Shared),
            FallbackStrategy::UseFirst => None,
        };
        Some(fallback.map_or(value, |&&(_, v)| v))
    }
}

/// The value shared by every tied provider on one side of the
/// shared/non-shared split.
///
/// `None` when that side is empty or its providers disagree; the tie is then
/// unresolved.
fn agreed<'v, T: PartialEq + ?Sized>(
    tied: &[&(&Candidate<'_>, &'v T)],
    shared: bool,
) -> Option<&'v T> {
    let mut side = tied
        .iter()
        .filter(|&&&(c, _)| (c.source_kind == SourceKind::Shared) == shared)
        .map(|&&(_, v)| v);
    let first = side.next()?;
    side.all(|v| v == first).then_some(first)
}

const fn shape(value: &Value) -> u8 {
    match value {
        Value::Mapping(_) => 0,
        Value::Sequence(_) => 1,
        _ => 2,
    }
}

/// Resolve the aggregated items into one operation per identity key, in
/// order of first encounter.
pub fn merge(
    items: Vec<AggregatedItem<'_>>,
    config: &Configuration,
    diagnostics: &mut Diagnostics,
) -> Vec<ResolvedOperation> {
    let mut index: BTreeMap<IdentityKey, usize> = BTreeMap::new();
    let mut groups: Vec<Vec<AggregatedItem<'_>>> = Vec::new();
    for item in items {
        if let Some(group) = index.get(&item.identity).and_then(|&i| groups.get_mut(i)) {
            group.push(item);
        } else {
            index.insert(item.identity.clone(), groups.len());
            groups.push(vec![item]);
        }
    }

    groups
        .into_iter()
        .filter_map(|group| resolve_group(group, config, diagnostics))
        .collect()
}

fn resolve_group(
    mut group: Vec<AggregatedItem<'_>>,
    config: &Configuration,
    diagnostics: &mut Diagnostics,
) -> Option<ResolvedOperation> {
    let order = group.iter().map(|e| e.order).min()?;
    group.sort_by(|a, b| {
        rank(
            (a.priority, a.source, a.order),
            (b.priority, b.source, b.order),
            config.machine_precedence,
        )
    });
    let head = group.first()?;

    // Entries up to and including the first replace entry are merged.
    let merged_len = group
        .iter()
        .position(|e| e.policy == InheritancePolicy::Replace)
        .map_or(group.len(), |i| i + 1);

    let contributions = group
        .iter()
        .enumerate()
        .map(|(i, e)| Contribution {
            source: e.source_name.to_string(),
            source_kind: e.source,
            priority: e.priority,
            item: e.item.name.clone(),
            outcome: match i {
                0 => Outcome::Selected,
                i if i < merged_len => Outcome::Merged,
                _ => Outcome::Superseded,
            },
        })
        .collect();

    let label = head.identity.to_string();
    let candidates: Vec<Candidate<'_>> = group.iter().take(merged_len).map(Candidate::from).collect();
    let fields = FieldMerger::new(&label, config.fallback_strategy, None, diagnostics)
        .merge(&candidates);
    if group.len() > 1 {
        tracing::debug!(
            "{label}: {} contributor(s), {merged_len} merged, selected '{}'",
            group.len(),
            head.source_name
        );
    }

    Some(ResolvedOperation {
        identity: head.identity.clone(),
        kind: head.kind(),
        name: head.item.name.clone(),
        path: head.identity.target_path.clone(),
        key_name: head.identity.key_name.clone(),
        action: head.item.action,
        dynamic_state_path: fields.dynamic_state_path,
        inheritance_tags: fields.tags,
        priority: head.priority,
        source: head.source_name.to_string(),
        source_kind: head.source,
        conflict_resolution: head.item.conflict_resolution,
        order,
        attributes: fields.attributes,
        resolution: ResolutionInfo {
            policy: head.policy,
            contributions,
            rules: Vec::new(),
        },
    })
}
