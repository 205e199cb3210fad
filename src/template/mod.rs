//! Template data model.
//!
//! A template is loaded once per run and never mutated; every resolution
//! stage borrows it. Shapes are closed (`deny_unknown_fields`) except for
//! [`SettingItem`] attributes, so an unknown section kind or enum variant is
//! rejected at load time instead of being silently ignored.
pub mod item;
pub mod loader;
pub mod rule;
pub mod section;
pub mod selector;
pub mod tag_matcher;
pub mod validation;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::TemplateError;

pub use item::{
    Action, Attributes, ConflictResolution, IdentityKey, InheritancePolicy, ItemLists,
    RESERVED_ATTRIBUTES, ResourceKind, SettingItem,
};
pub use rule::{InheritanceRule, MergeLevel, RuleAction, RuleParameters, TagCondition, Transformation};
pub use section::{
    Condition, ConditionKind, ConditionalSection, Logic, MachineSpecificBlock, MergeStrategy,
    OnFailure, SharedBlock,
};
pub use selector::{MachineSelector, Operator, SelectorKind};

/// `metadata:` block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Template name.
    pub name: String,
    /// Template version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Free-text description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// How layers combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InheritanceMode {
    /// Items merge or replace per their policy.
    #[default]
    Hierarchical,
    /// Every collision is resolved by replacement.
    Override,
}

/// How strictly the resolved plan is validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationLevel {
    /// Drop offending operations.
    Strict,
    /// Warn about offending operations.
    #[default]
    Moderate,
    /// Skip plan validation.
    Lenient,
}

/// What settles a merge tie that `conflict_resolution` could not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackStrategy {
    /// Prefer the shared source, else the first tied entry.
    #[default]
    UseShared,
    /// Prefer a non-shared source, else the first tied entry.
    UseMachine,
    /// Take the first tied entry.
    UseFirst,
}

impl FallbackStrategy {
    /// Template spelling, for diagnostics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UseShared => "use_shared",
            Self::UseMachine => "use_machine",
            Self::UseFirst => "use_first",
        }
    }
}

/// `configuration:` block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Configuration {
    /// Layer combination mode.
    pub inheritance_mode: InheritanceMode,
    /// Break priority ties by source kind (machine > conditional > shared).
    pub machine_precedence: bool,
    /// Plan validation strictness.
    pub validation_level: ValidationLevel,
    /// Merge-tie fallback.
    pub fallback_strategy: FallbackStrategy,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            inheritance_mode: InheritanceMode::default(),
            machine_precedence: true,
            validation_level: ValidationLevel::default(),
            fallback_strategy: FallbackStrategy::default(),
        }
    }
}

/// A parsed, structurally valid template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Template {
    /// Descriptive metadata.
    pub metadata: Metadata,
    /// Global behaviour switches.
    #[serde(default)]
    pub configuration: Configuration,
    /// Items that apply to every machine.
    #[serde(default)]
    pub shared: SharedBlock,
    /// Selector-gated overrides, in declaration order.
    #[serde(default)]
    pub machine_specific: Vec<MachineSpecificBlock>,
    /// Check-gated sections, in declaration order.
    #[serde(default)]
    pub conditional_sections: Vec<ConditionalSection>,
    /// Global rules, applied in declaration order.
    #[serde(default)]
    pub inheritance_rules: Vec<InheritanceRule>,
}

impl Template {
    /// Empty template named `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            metadata: Metadata {
                name: name.into(),
                ..Metadata::default()
            },
            ..Self::default()
        }
    }

    /// Load and validate a template file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not a valid template
    /// document, or fails structural validation.
    pub fn load(path: &Path) -> Result<Self, TemplateError> {
        loader::load(path)
    }

    /// Parse and validate a template from YAML text.
    ///
    /// # Errors
    ///
    /// Same as [`Template::load`], minus I/O.
    pub fn from_yaml(content: &str) -> Result<Self, TemplateError> {
        loader::parse(content, "<inline>")
    }

    /// Section kinds that carry at least one item anywhere in the template.
    #[must_use]
    pub fn present_kinds(&self) -> Vec<ResourceKind> {
        ResourceKind::ALL
            .into_iter()
            .filter(|&kind| {
                self.shared.items().has_kind(kind)
                    || self.machine_specific.iter().any(|b| b.items().has_kind(kind))
                    || self
                        .conditional_sections
                        .iter()
                        .any(|s| s.items().has_kind(kind))
            })
            .collect()
    }
}
