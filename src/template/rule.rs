//! Global inheritance rules applied over the resolved set.
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::item::{ConflictResolution, ResourceKind};
use super::tag_matcher::{self, MatchMode};

/// Tag predicate selecting the operations a rule acts on.
///
/// Every populated clause must hold; an empty condition selects everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TagCondition {
    /// Every tag must be present.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags_contain_all: Vec<String>,
    /// At least one tag must be present.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags_contain_any: Vec<String>,
    /// No tag may be present.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags_exclude: Vec<String>,
}

impl TagCondition {
    /// Condition requiring every tag in `tags`.
    #[must_use]
    pub fn all_of<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags_contain_all: tags.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Whether `tags` satisfy this condition.
    #[must_use]
    pub fn matches(&self, tags: &BTreeSet<String>) -> bool {
        tag_matcher::matches(&self.tags_contain_all, tags, MatchMode::All)
            && (self.tags_contain_any.is_empty()
                || tag_matcher::matches(&self.tags_contain_any, tags, MatchMode::Any))
            && !tag_matcher::matches(&self.tags_exclude, tags, MatchMode::Any)
    }
}

/// What a rule does to the operations it selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    /// Re-merge colliding selected operations.
    Merge,
    /// Rewrite selected operations in place.
    Transform,
}

/// Granularity of a rule-scoped merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeLevel {
    /// Operations collide when their full identity (path and value name) match.
    #[default]
    Value,
    /// Operations collide when they target the same key, whatever the value name.
    Key,
}

/// Rule parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuleParameters {
    /// Merge granularity.
    pub merge_level: MergeLevel,
    /// Tie-break override for the rule-scoped merge.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict_resolution: Option<ConflictResolution>,
}

/// Built-in pure transformations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transformation {
    /// Expand `%VAR%` tokens in paths from the machine environment.
    ExpandEnvironment,
    /// Rewrite registry roots to the `HKCU:\` drive spelling.
    NormalizeRegistryRoot,
}

/// An `inheritance_rules:` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InheritanceRule {
    /// Rule name, used in provenance and diagnostics.
    pub name: String,
    /// Section kinds the rule applies to.
    #[serde(default)]
    pub applies_to: Vec<ResourceKind>,
    /// Tag predicate.
    #[serde(default)]
    pub condition: TagCondition,
    /// Rule action.
    pub action: RuleAction,
    /// Action parameters.
    #[serde(default)]
    pub parameters: RuleParameters,
    /// Transformation routine; required for `transform`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transformation: Option<Transformation>,
}

impl InheritanceRule {
    /// Merge rule over `applies_to` selecting `condition`.
    #[must_use]
    pub fn merge(
        name: impl Into<String>,
        applies_to: Vec<ResourceKind>,
        condition: TagCondition,
    ) -> Self {
        Self {
            name: name.into(),
            applies_to,
            condition,
            action: RuleAction::Merge,
            parameters: RuleParameters::default(),
            transformation: None,
        }
    }

    /// Transform rule running `transformation` over `applies_to`.
    #[must_use]
    pub fn transform(
        name: impl Into<String>,
        applies_to: Vec<ResourceKind>,
        transformation: Transformation,
    ) -> Self {
        Self {
            name: name.into(),
            applies_to,
            condition: TagCondition::default(),
            action: RuleAction::Transform,
            parameters: RuleParameters::default(),
            transformation: Some(transformation),
        }
    }

    /// Whether the rule covers operations of `kind`.
    #[must_use]
    pub fn applies_to_kind(&self, kind: ResourceKind) -> bool {
        self.applies_to.contains(&kind)
    }
}
