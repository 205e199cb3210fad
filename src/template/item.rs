//! Setting items: the registry keys, files and application probes a
//! template captures or restores.
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Free-form item attributes (every key that is not part of the fixed
/// item grammar). Merged key-by-key during conflict resolution.
pub type Attributes = BTreeMap<String, serde_yaml::Value>;

/// Keys a resolved operation writes next to its attributes.
///
/// An attribute with one of these names would be emitted twice, so
/// structural validation rejects it.
pub const RESERVED_ATTRIBUTES: &[&str] = &[
    "kind",
    "name",
    "path",
    "key_name",
    "action",
    "dynamic_state_path",
    "inheritance_tags",
    "priority",
    "source",
    "resolution",
];

/// Kind of resource an item targets, derived from the list it is declared in.
///
/// Doubles as the "section kind" an inheritance rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// A registry key or single registry value.
    Registry,
    /// A file or directory.
    Files,
    /// An application-state discovery unit.
    Applications,
}

impl ResourceKind {
    /// All kinds, in plan order.
    pub const ALL: [Self; 3] = [Self::Registry, Self::Files, Self::Applications];

    /// Template list name for this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Registry => "registry",
            Self::Files => "files",
            Self::Applications => "applications",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the executor does with an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Keep both sides in sync.
    Sync,
    /// Capture only.
    #[default]
    Backup,
}

/// How an item combines with lower-priority items for the same target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InheritancePolicy {
    /// Field-level deep merge.
    Merge,
    /// Supersede lower-priority items entirely.
    #[default]
    Replace,
}

/// Tie-break policy when two items set the same field at the same priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    /// Prefer machine-specific or conditional sources over shared.
    #[default]
    MachineWins,
    /// Prefer the shared source.
    SharedWins,
    /// Prefer the earliest-ranked contributor.
    FirstWins,
    /// Prefer the latest-ranked contributor.
    LastWins,
}

/// A single setting declared in a template block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingItem {
    /// Human-readable item name.
    pub name: String,
    /// Target path (registry key, file path). Applications may omit it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Value name for single-value registry entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_name: Option<String>,
    /// Executor action.
    #[serde(default)]
    pub action: Action,
    /// Where live application state is read from, if distinct from `path`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dynamic_state_path: Option<String>,
    /// Tags used by inheritance rules.
    #[serde(default)]
    pub inheritance_tags: BTreeSet<String>,
    /// Explicit priority; absent means the block priority applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inheritance_priority: Option<i64>,
    /// Merge or replace when colliding.
    #[serde(default)]
    pub inheritance_policy: InheritancePolicy,
    /// Tie-break policy for same-priority field collisions.
    #[serde(default)]
    pub conflict_resolution: ConflictResolution,
    /// Any other keys.
    #[serde(flatten)]
    pub attributes: Attributes,
}

impl SettingItem {
    /// Create an item with default policy and no attributes.
    #[must_use]
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: Some(path.into()),
            key_name: None,
            action: Action::default(),
            dynamic_state_path: None,
            inheritance_tags: BTreeSet::new(),
            inheritance_priority: None,
            inheritance_policy: InheritancePolicy::default(),
            conflict_resolution: ConflictResolution::default(),
            attributes: Attributes::new(),
        }
    }

    /// The path the item targets; applications fall back to their name.
    #[must_use]
    pub fn target_path(&self) -> &str {
        self.path.as_deref().unwrap_or(&self.name)
    }

    /// Conflict-grouping key for this item when declared under `kind`.
    #[must_use]
    pub fn identity(&self, kind: ResourceKind) -> IdentityKey {
        IdentityKey {
            kind,
            target_path: self.target_path().to_string(),
            key_name: self.key_name.clone(),
        }
    }
}

/// `(resource_kind, target_path, key_name)`: two items with the same key
/// target the same underlying resource.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IdentityKey {
    /// Resource kind.
    pub kind: ResourceKind,
    /// Target path as declared.
    pub target_path: String,
    /// Registry value name, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_name: Option<String>,
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key_name {
            Some(key) => write!(f, "{}:{} [{key}]", self.kind, self.target_path),
            None => write!(f, "{}:{}", self.kind, self.target_path),
        }
    }
}

/// The three item lists every template block carries.
#[derive(Debug, Clone, Copy)]
pub struct ItemLists<'a> {
    /// `registry:` entries.
    pub registry: &'a [SettingItem],
    /// `files:` entries.
    pub files: &'a [SettingItem],
    /// `applications:` entries.
    pub applications: &'a [SettingItem],
}

impl<'a> ItemLists<'a> {
    /// Items in declaration order, registry first, each tagged with its kind.
    pub fn iter(self) -> impl Iterator<Item = (ResourceKind, &'a SettingItem)> {
        self.registry
            .iter()
            .map(|i| (ResourceKind::Registry, i))
            .chain(self.files.iter().map(|i| (ResourceKind::Files, i)))
            .chain(
                self.applications
                    .iter()
                    .map(|i| (ResourceKind::Applications, i)),
            )
    }

    /// Whether all three lists are empty.
    #[must_use]
    pub fn is_empty(self) -> bool {
        self.registry.is_empty() && self.files.is_empty() && self.applications.is_empty()
    }

    /// Whether any list of `kind` has entries.
    #[must_use]
    pub fn has_kind(self, kind: ResourceKind) -> bool {
        match kind {
            ResourceKind::Registry => !self.registry.is_empty(),
            ResourceKind::Files => !self.files.is_empty(),
            ResourceKind::Applications => !self.applications.is_empty(),
        }
    }
}
