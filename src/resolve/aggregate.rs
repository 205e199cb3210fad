//! Template Aggregator: flattens the included blocks into one
//! provenance-tagged item list.
use std::fmt;

use serde::Serialize;

use super::condition;
use super::diagnostic::Diagnostics;
use super::selector;
use crate::context::MachineContext;
use crate::template::{
    IdentityKey, InheritanceMode, InheritancePolicy, ItemLists, MergeStrategy, ResourceKind,
    SettingItem, Template,
};

/// Kind of block an item came from.
///
/// Ordered by tie-break precedence: a greater value wins a priority tie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// The `shared:` block.
    Shared,
    /// A conditional section.
    Conditional,
    /// A machine-specific block.
    MachineSpecific,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Shared => "shared",
            Self::Conditional => "conditional",
            Self::MachineSpecific => "machine_specific",
        })
    }
}

/// An included item with its provenance and effective priority.
#[derive(Debug, Clone)]
pub struct AggregatedItem<'t> {
    /// Conflict-grouping key.
    pub identity: IdentityKey,
    /// The declared item.
    pub item: &'t SettingItem,
    /// Kind of the contributing block.
    pub source: SourceKind,
    /// Name of the contributing block.
    pub source_name: &'t str,
    /// Item priority, or the block priority when the item has none.
    pub priority: i64,
    /// Policy after block strategy and inheritance mode are applied.
    pub policy: InheritancePolicy,
    /// Encounter position, for stable tie-breaks and plan order.
    pub order: usize,
}

impl AggregatedItem<'_> {
    /// Resource kind.
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        self.identity.kind
    }
}

struct Block<'t> {
    source: SourceKind,
    name: &'t str,
    priority: i64,
    strategy: MergeStrategy,
    items: ItemLists<'t>,
}

/// Collect every item the machine is entitled to.
///
/// Shared items come first, then matching machine-specific blocks, then
/// applicable conditional sections, each in declaration order.
pub fn aggregate<'t>(
    template: &'t Template,
    ctx: &dyn MachineContext,
    diagnostics: &mut Diagnostics,
) -> Vec<AggregatedItem<'t>> {
    let mut blocks = vec![Block {
        source: SourceKind::Shared,
        name: template.shared.source_name(),
        priority: template.shared.priority(),
        strategy: template.shared.merge_strategy,
        items: template.shared.items(),
    }];

    for block in &template.machine_specific {
        if selector::block_matches(block, ctx, diagnostics) {
            blocks.push(Block {
                source: SourceKind::MachineSpecific,
                name: &block.name,
                priority: block.priority(),
                strategy: block.merge_strategy,
                items: block.items(),
            });
        }
    }

    for section in &template.conditional_sections {
        if condition::section_applies(section, ctx, diagnostics) {
            blocks.push(Block {
                source: SourceKind::Conditional,
                name: &section.name,
                priority: section.priority(),
                strategy: section.merge_strategy,
                items: section.items(),
            });
        }
    }

    let override_mode = template.configuration.inheritance_mode == InheritanceMode::Override;
    let mut out = Vec::new();
    for block in blocks {
        for (kind, item) in block.items.iter() {
            let policy = if override_mode || block.strategy == MergeStrategy::Replace {
                InheritancePolicy::Replace
            } else {
                item.inheritance_policy
            };
            out.push(AggregatedItem {
                identity: item.identity(kind),
                item,
                source: block.source,
                source_name: block.name,
                priority: item.inheritance_priority.unwrap_or(block.priority),
                policy,
                order: out.len(),
            });
        }
    }
    tracing::debug!("aggregated {} item(s)", out.len());
    out
}
