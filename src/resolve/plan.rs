//! The resolution output: an ordered, conflict-free operation plan.
use std::collections::BTreeSet;

use serde::Serialize;

use super::aggregate::SourceKind;
use crate::template::{
    Action, Attributes, ConflictResolution, IdentityKey, InheritancePolicy, ResourceKind,
};

/// What happened to one contributing item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Top-ranked entry; its scalar fields won.
    Selected,
    /// Folded into the selected entry field by field.
    Merged,
    /// Discarded by a `replace` entry ranked above it.
    Superseded,
}

/// Provenance record for one item that targeted an operation's resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Contribution {
    /// Name of the contributing block or section.
    pub source: String,
    /// Kind of the contributing block.
    pub source_kind: SourceKind,
    /// Effective priority the item carried.
    pub priority: i64,
    /// Item name as declared.
    pub item: String,
    /// What became of it.
    pub outcome: Outcome,
}

/// How an operation was produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolutionInfo {
    /// Policy of the selected entry.
    pub policy: InheritancePolicy,
    /// Every contributor in rank order.
    pub contributions: Vec<Contribution>,
    /// Rules that rewrote or merged this operation, in application order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<String>,
}

impl ResolutionInfo {
    /// Names of the sources that shaped the result (selected or merged).
    pub fn effective_sources(&self) -> impl Iterator<Item = &str> {
        self.contributions
            .iter()
            .filter(|c| c.outcome != Outcome::Superseded)
            .map(|c| c.source.as_str())
    }
}

/// One executor unit: the template item shape, pre-resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedOperation {
    /// Identity key as aggregated. Transform rules rewrite `path` but never this.
    #[serde(skip)]
    pub identity: IdentityKey,
    /// Resource kind.
    pub kind: ResourceKind,
    /// Item name.
    pub name: String,
    /// Final target path.
    pub path: String,
    /// Registry value name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_name: Option<String>,
    /// Executor action.
    pub action: Action,
    /// Live state location, if distinct from `path`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dynamic_state_path: Option<String>,
    /// Union of contributor tags.
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub inheritance_tags: BTreeSet<String>,
    /// Priority of the selected entry.
    pub priority: i64,
    /// Source of the selected entry.
    pub source: String,
    /// Kind of the selected entry's source.
    #[serde(skip)]
    pub source_kind: SourceKind,
    /// Tie-break policy of the selected entry, reused by rule-scoped merges.
    #[serde(skip)]
    pub conflict_resolution: ConflictResolution,
    /// First encounter position of the identity; drives plan order.
    #[serde(skip)]
    pub order: usize,
    /// Merged free-form attributes. Their names never collide with the
    /// fields above; see [`crate::template::RESERVED_ATTRIBUTES`].
    #[serde(flatten)]
    pub attributes: Attributes,
    /// Provenance.
    pub resolution: ResolutionInfo,
}

/// The final plan handed to the executor.
///
/// Operations are ordered by first encounter of their identity key: shared
/// items first, then matched machine-specific blocks, then applicable
/// conditional sections.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationPlan {
    /// Name of the resolved template.
    pub template: String,
    operations: Vec<ResolvedOperation>,
}

impl OperationPlan {
    pub(crate) const fn new(template: String, operations: Vec<ResolvedOperation>) -> Self {
        Self {
            template,
            operations,
        }
    }

    /// Operations in plan order.
    #[must_use]
    pub fn operations(&self) -> &[ResolvedOperation] {
        &self.operations
    }

    /// Iterate in plan order.
    pub fn iter(&self) -> std::slice::Iter<'_, ResolvedOperation> {
        self.operations.iter()
    }

    /// Number of operations.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.operations.len()
    }

    /// Whether the plan is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Operations of `kind`, in plan order.
    pub fn of_kind(&self, kind: ResourceKind) -> impl Iterator<Item = &ResolvedOperation> {
        self.operations.iter().filter(move |op| op.kind == kind)
    }

    /// Registry operations.
    pub fn registry(&self) -> impl Iterator<Item = &ResolvedOperation> {
        self.of_kind(ResourceKind::Registry)
    }

    /// File operations.
    pub fn files(&self) -> impl Iterator<Item = &ResolvedOperation> {
        self.of_kind(ResourceKind::Files)
    }

    /// Application operations.
    pub fn applications(&self) -> impl Iterator<Item = &ResolvedOperation> {
        self.of_kind(ResourceKind::Applications)
    }

    /// The operation resolved for `identity`.
    #[must_use]
    pub fn get(&self, identity: &IdentityKey) -> Option<&ResolvedOperation> {
        self.operations.iter().find(|op| &op.identity == identity)
    }

    /// Lowercase hex SHA-256 of the plan's JSON form.
    ///
    /// Two runs over the same template and machine produce the same
    /// fingerprint.
    ///
    /// # Errors
    ///
    /// Returns an error if an attribute value cannot be represented as JSON.
    pub fn fingerprint(&self) -> Result<String, serde_json::Error> {
        use sha2::{Digest, Sha256};
        use std::fmt::Write as _;

        let bytes = serde_json::to_vec(self)?;
        let digest = Sha256::digest(&bytes);
        let mut hex = String::with_capacity(64);
        for b in &digest {
            // write! to a String is infallible; unwrap_or(()) makes that explicit.
            write!(hex, "{b:02x}").unwrap_or(());
        }
        Ok(hex)
    }
}

impl<'a> IntoIterator for &'a OperationPlan {
    type Item = &'a ResolvedOperation;
    type IntoIter = std::slice::Iter<'a, ResolvedOperation>;

    fn into_iter(self) -> Self::IntoIter {
        self.operations.iter()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
pub(crate) mod tests {
    use super::*;
    use crate::template::SettingItem;

    pub(crate) fn operation(kind: ResourceKind, path: &str) -> ResolvedOperation {
        let item = SettingItem::new(path, path);
        ResolvedOperation {
            identity: item.identity(kind),
            kind,
            name: item.name.clone(),
            path: path.to_string(),
            key_name: None,
            action: Action::Backup,
            dynamic_state_path: None,
            inheritance_tags: BTreeSet::new(),
            priority: 50,
            source: "shared".to_string(),
            source_kind: SourceKind::Shared,
            conflict_resolution: ConflictResolution::default(),
            order: 0,
            attributes: Attributes::new(),
            resolution: ResolutionInfo {
                policy: InheritancePolicy::Replace,
                contributions: vec![Contribution {
                    source: "shared".to_string(),
                    source_kind: SourceKind::Shared,
                    priority: 50,
                    item: item.name,
                    outcome: Outcome::Selected,
                }],
                rules: Vec::new(),
            },
        }
    }

    fn plan() -> OperationPlan {
        OperationPlan::new(
            "desktop".to_string(),
            vec![
                operation(ResourceKind::Registry, "HKCU:\\Console"),
                operation(ResourceKind::Files, "C:\\Games\\saves"),
                operation(ResourceKind::Registry, "HKCU:\\Control Panel\\Desktop"),
            ],
        )
    }

    #[test]
    fn per_kind_views_keep_plan_order() {
        let plan = plan();
        let registry: Vec<_> = plan.registry().map(|op| op.path.as_str()).collect();
        assert_eq!(registry, vec!["HKCU:\\Console", "HKCU:\\Control Panel\\Desktop"]);
        assert_eq!(plan.files().count(), 1);
        assert_eq!(plan.applications().count(), 0);
    }

    #[test]
    fn get_by_identity() {
        let plan = plan();
        let key = SettingItem::new("x", "C:\\Games\\saves").identity(ResourceKind::Files);
        assert_eq!(plan.get(&key).unwrap().path, "C:\\Games\\saves");
    }

    #[test]
    fn attributes_flatten_into_operation() {
        let mut op = operation(ResourceKind::Registry, "HKCU:\\Console");
        op.attributes
            .insert("FontSize".to_string(), serde_yaml::Value::from(14));
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["FontSize"], 14);
        assert_eq!(json["kind"], "registry");
        assert!(json.get("identity").is_none());
        assert_eq!(json["resolution"]["contributions"][0]["outcome"], "selected");
    }

    #[test]
    fn fixed_fields_are_all_reserved() {
        let mut op = operation(ResourceKind::Registry, "HKCU:\\Console");
        op.key_name = Some("FontSize".to_string());
        op.dynamic_state_path = Some("HKCU:\\Live".to_string());
        op.inheritance_tags.insert("terminal".to_string());
        let json = serde_json::to_value(&op).unwrap();
        let keys: Vec<_> = json.as_object().unwrap().keys().cloned().collect();
        for key in &keys {
            assert!(
                crate::template::RESERVED_ATTRIBUTES.contains(&key.as_str()),
                "{key} is not reserved"
            );
        }
        assert_eq!(keys.len(), crate::template::RESERVED_ATTRIBUTES.len());
    }

    #[test]
    fn fingerprint_is_stable_and_content_sensitive() {
        let a = plan().fingerprint().unwrap();
        assert_eq!(a.len(), 64);
        assert_eq!(a, plan().fingerprint().unwrap());

        let mut changed = plan();
        changed.operations[0].priority = 51;
        assert_ne!(a, changed.fingerprint().unwrap());
    }

    #[test]
    fn effective_sources_skip_superseded() {
        let mut op = operation(ResourceKind::Files, "C:\\x");
        op.resolution.contributions.push(Contribution {
            source: "gaming".to_string(),
            source_kind: SourceKind::MachineSpecific,
            priority: 10,
            item: "x".to_string(),
            outcome: Outcome::Superseded,
        });
        assert_eq!(op.resolution.effective_sources().collect::<Vec<_>>(), vec!["shared"]);
    }
}
