//! All/any tag matching for inheritance rule conditions.
use std::collections::BTreeSet;

/// Match mode for tag filtering.
///
/// Controls whether all or any of a rule's tags must be present on an
/// operation for the rule to select it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// All tags must be present (AND logic).
    All,
    /// Any tag must be present (OR logic).
    Any,
}

/// Check if an operation's tags satisfy a rule's required tags.
///
/// # Arguments
///
/// * `required` - Tags named by the rule condition
/// * `present` - Tags carried by the operation
/// * `mode` - Whether to match all (AND) or any (OR)
///
/// # Examples
///
/// ```
/// use std::collections::BTreeSet;
/// use config_resolver::template::tag_matcher::{MatchMode, matches};
///
/// let rule = vec!["gaming".to_string(), "performance".to_string()];
/// let tags: BTreeSet<String> = ["gaming".to_string()].into();
///
/// // AND mode: both "gaming" and "performance" must be present
/// assert!(!matches(&rule, &tags, MatchMode::All));
///
/// // OR mode: at least one of them must be present
/// assert!(matches(&rule, &tags, MatchMode::Any));
/// ```
#[must_use]
pub fn matches(required: &[String], present: &BTreeSet<String>, mode: MatchMode) -> bool {
    match mode {
        MatchMode::All => required.iter().all(|tag| present.contains(tag)),
        MatchMode::Any => required.iter().any(|tag| present.contains(tag)),
    }
}
