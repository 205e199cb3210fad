//! Template blocks: the shared defaults, machine-specific overrides and
//! conditionally-gated sections.
use serde::{Deserialize, Serialize};

use super::item::{ItemLists, SettingItem};
use super::selector::MachineSelector;

/// Default priority of shared items.
pub const SHARED_PRIORITY: i64 = 50;
/// Default priority of conditional-section items.
pub const CONDITIONAL_PRIORITY: i64 = 75;
/// Default priority of machine-specific items.
pub const MACHINE_PRIORITY: i64 = 100;

/// Block-level merge strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Items follow their own `inheritance_policy`.
    #[default]
    DeepMerge,
    /// Every item from this block replaces lower-priority items.
    Replace,
}

/// How several predicates combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Logic {
    /// All must hold.
    And,
    /// At least one must hold.
    Or,
}

impl Logic {
    const fn and() -> Self {
        Self::And
    }

    const fn or() -> Self {
        Self::Or
    }

    /// Combine predicate outcomes. An empty set is false for both modes.
    #[must_use]
    pub fn combine(self, mut outcomes: impl Iterator<Item = bool>) -> bool {
        match self {
            Self::And => {
                let mut any = false;
                for outcome in outcomes.by_ref() {
                    if !outcome {
                        return false;
                    }
                    any = true;
                }
                any
            }
            Self::Or => outcomes.any(|o| o),
        }
    }
}

/// The `shared:` block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SharedBlock {
    /// Source name used in provenance; defaults to `shared`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Block priority; defaults to [`SHARED_PRIORITY`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    /// Block merge strategy.
    #[serde(default)]
    pub merge_strategy: MergeStrategy,
    /// Registry items.
    #[serde(default)]
    pub registry: Vec<SettingItem>,
    /// File items.
    #[serde(default)]
    pub files: Vec<SettingItem>,
    /// Application items.
    #[serde(default)]
    pub applications: Vec<SettingItem>,
}

impl SharedBlock {
    /// Provenance name.
    #[must_use]
    pub fn source_name(&self) -> &str {
        self.name.as_deref().unwrap_or("shared")
    }

    /// Effective block priority.
    #[must_use]
    pub fn priority(&self) -> i64 {
        self.priority.unwrap_or(SHARED_PRIORITY)
    }

    /// Contained items.
    #[must_use]
    pub fn items(&self) -> ItemLists<'_> {
        ItemLists {
            registry: &self.registry,
            files: &self.files,
            applications: &self.applications,
        }
    }
}

/// A `machine_specific:` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MachineSpecificBlock {
    /// Block name.
    pub name: String,
    /// Selectors deciding whether the block applies.
    #[serde(default, alias = "selectors")]
    pub machine_selectors: Vec<MachineSelector>,
    /// How selectors combine.
    #[serde(default = "Logic::or")]
    pub selector_logic: Logic,
    /// Block priority; defaults to [`MACHINE_PRIORITY`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    /// Block merge strategy.
    #[serde(default)]
    pub merge_strategy: MergeStrategy,
    /// Registry items.
    #[serde(default)]
    pub registry: Vec<SettingItem>,
    /// File items.
    #[serde(default)]
    pub files: Vec<SettingItem>,
    /// Application items.
    #[serde(default)]
    pub applications: Vec<SettingItem>,
}

impl MachineSpecificBlock {
    /// Empty block named `name` with no selectors.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            machine_selectors: Vec::new(),
            selector_logic: Logic::Or,
            priority: None,
            merge_strategy: MergeStrategy::default(),
            registry: Vec::new(),
            files: Vec::new(),
            applications: Vec::new(),
        }
    }

    /// Effective block priority.
    #[must_use]
    pub fn priority(&self) -> i64 {
        self.priority.unwrap_or(MACHINE_PRIORITY)
    }

    /// Contained items.
    #[must_use]
    pub fn items(&self) -> ItemLists<'_> {
        ItemLists {
            registry: &self.registry,
            files: &self.files,
            applications: &self.applications,
        }
    }
}

/// Category of a runtime check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKind {
    /// Hardware probe command.
    Hardware,
    /// Installed-software probe command.
    Software,
    /// `check` names an environment variable.
    Environment,
    /// Arbitrary probe command.
    Custom,
}

/// What to do when a check cannot produce a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnFailure {
    /// Treat the condition as false, quietly.
    Skip,
    /// Treat the condition as false and warn.
    #[default]
    Warn,
    /// Exclude the whole section and warn.
    Fail,
}

/// A runtime check gating a conditional section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Condition {
    /// Check category.
    #[serde(rename = "type")]
    pub kind: ConditionKind,
    /// Command to run, or variable name for `environment`.
    pub check: String,
    /// Regular expression the trimmed check output must match.
    pub expected_result: String,
    /// Failure policy.
    #[serde(default)]
    pub on_failure: OnFailure,
    /// Match `expected_result` case-sensitively.
    #[serde(default)]
    pub case_sensitive: bool,
}

impl Condition {
    /// Condition of `kind` with the default failure policy.
    #[must_use]
    pub fn new(
        kind: ConditionKind,
        check: impl Into<String>,
        expected_result: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            check: check.into(),
            expected_result: expected_result.into(),
            on_failure: OnFailure::default(),
            case_sensitive: false,
        }
    }
}

/// A `conditional_sections:` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConditionalSection {
    /// Section name.
    pub name: String,
    /// Checks gating the section.
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// How checks combine.
    #[serde(default = "Logic::and")]
    pub logic: Logic,
    /// Section priority; defaults to [`CONDITIONAL_PRIORITY`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    /// Section merge strategy.
    #[serde(default)]
    pub merge_strategy: MergeStrategy,
    /// Registry items.
    #[serde(default)]
    pub registry: Vec<SettingItem>,
    /// File items.
    #[serde(default)]
    pub files: Vec<SettingItem>,
    /// Application items.
    #[serde(default)]
    pub applications: Vec<SettingItem>,
}

impl ConditionalSection {
    /// Empty section named `name` with no conditions.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            conditions: Vec::new(),
            logic: Logic::And,
            priority: None,
            merge_strategy: MergeStrategy::default(),
            registry: Vec::new(),
            files: Vec::new(),
            applications: Vec::new(),
        }
    }

    /// Effective section priority.
    #[must_use]
    pub fn priority(&self) -> i64 {
        self.priority.unwrap_or(CONDITIONAL_PRIORITY)
    }

    /// Contained items.
    #[must_use]
    pub fn items(&self) -> ItemLists<'_> {
        ItemLists {
            registry: &self.registry,
            files: &self.files,
            applications: &self.applications,
        }
    }
}
