//! Structural validation run after parsing.
//!
//! These checks catch templates that deserialize cleanly but cannot be
//! resolved safely. Any failure is fatal: no default plan is constructed.
use super::item::{ItemLists, RESERVED_ATTRIBUTES, ResourceKind};
use super::rule::RuleAction;
use super::Template;
use crate::error::TemplateError;

/// Validate the structure of `template`, reporting the first problem found.
///
/// # Errors
///
/// Returns [`TemplateError::Malformed`] naming the offending element.
pub fn validate(template: &Template) -> Result<(), TemplateError> {
    if template.metadata.name.trim().is_empty() {
        return Err(TemplateError::malformed("metadata.name", "must not be empty"));
    }

    validate_items("shared", template.shared.items())?;

    for (i, block) in template.machine_specific.iter().enumerate() {
        let location = format!("machine_specific[{i}] ({})", block.name);
        if block.machine_selectors.is_empty() {
            return Err(TemplateError::malformed(
                location,
                "machine-specific block has no selectors",
            ));
        }
        for (j, selector) in block.machine_selectors.iter().enumerate() {
            if let Some(field) = selector.missing_field() {
                return Err(TemplateError::malformed(
                    format!("{location}.machine_selectors[{j}]"),
                    format!("selector is missing required field '{field}'"),
                ));
            }
        }
        validate_items(&location, block.items())?;
    }

    for (i, section) in template.conditional_sections.iter().enumerate() {
        let location = format!("conditional_sections[{i}] ({})", section.name);
        if section.conditions.is_empty() {
            return Err(TemplateError::malformed(
                location,
                "conditional section has no conditions",
            ));
        }
        validate_items(&location, section.items())?;
    }

    for (i, rule) in template.inheritance_rules.iter().enumerate() {
        let location = format!("inheritance_rules[{i}] ({})", rule.name);
        if rule.applies_to.is_empty() {
            return Err(TemplateError::malformed(location, "applies_to is empty"));
        }
        if rule.action == RuleAction::Transform && rule.transformation.is_none() {
            return Err(TemplateError::malformed(
                location,
                "transform rule has no transformation",
            ));
        }
    }

    Ok(())
}

fn validate_items(location: &str, items: ItemLists<'_>) -> Result<(), TemplateError> {
    let mut index = [0usize; 3];
    for (kind, item) in items.iter() {
        let slot = match kind {
            ResourceKind::Registry => &mut index[0],
            ResourceKind::Files => &mut index[1],
            ResourceKind::Applications => &mut index[2],
        };
        let at = format!("{location}.{kind}[{slot}]");
        *slot += 1;

        if item.name.trim().is_empty() {
            return Err(TemplateError::malformed(at, "item name must not be empty"));
        }
        let has_path = item.path.as_deref().is_some_and(|p| !p.trim().is_empty());
        if kind != ResourceKind::Applications && !has_path {
            return Err(TemplateError::malformed(
                at,
                format!("{kind} item '{}' has no path", item.name),
            ));
        }
        if let Some(key) = item
            .attributes
            .keys()
            .find(|k| RESERVED_ATTRIBUTES.contains(&k.as_str()))
        {
            return Err(TemplateError::malformed(
                at,
                format!(
                    "attribute '{key}' of item '{}' clashes with an operation field",
                    item.name
                ),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::template::{
        ConditionalSection, InheritanceRule, MachineSelector, MachineSpecificBlock, SelectorKind,
        SettingItem, TagCondition,
    };

    fn template() -> Template {
        Template::new("desktop")
    }

    fn message(template: &Template) -> String {
        validate(template).unwrap_err().to_string()
    }

    #[test]
    fn empty_template_with_name_is_valid() {
        assert!(validate(&template()).is_ok());
    }

    #[test]
    fn blank_name_is_rejected() {
        let t = Template::new("  ");
        assert!(message(&t).contains("metadata.name"));
    }

    #[test]
    fn machine_block_without_selectors_is_rejected() {
        let mut t = template();
        t.machine_specific.push(MachineSpecificBlock::new("gaming"));
        assert!(message(&t).contains("machine_specific[0] (gaming)"));
    }

    #[test]
    fn incomplete_selector_is_rejected() {
        let mut t = template();
        let mut block = MachineSpecificBlock::new("gaming");
        block
            .machine_selectors
            .push(MachineSelector::new(SelectorKind::EnvironmentVariable));
        t.machine_specific.push(block);
        let msg = message(&t);
        assert!(msg.contains("machine_selectors[0]"), "{msg}");
        assert!(msg.contains("'variable'"), "{msg}");
    }

    #[test]
    fn conditional_section_without_conditions_is_rejected() {
        let mut t = template();
        t.conditional_sections.push(ConditionalSection::new("nvidia"));
        assert!(message(&t).contains("no conditions"));
    }

    #[test]
    fn rule_without_applies_to_is_rejected() {
        let mut t = template();
        t.inheritance_rules.push(InheritanceRule::merge(
            "gaming",
            Vec::new(),
            TagCondition::default(),
        ));
        assert!(message(&t).contains("applies_to is empty"));
    }

    #[test]
    fn transform_rule_without_transformation_is_rejected() {
        let mut t = template();
        let mut rule = InheritanceRule::transform(
            "expand",
            vec![ResourceKind::Files],
            crate::template::Transformation::ExpandEnvironment,
        );
        rule.transformation = None;
        t.inheritance_rules.push(rule);
        assert!(message(&t).contains("no transformation"));
    }

    #[test]
    fn registry_item_without_path_is_rejected() {
        let mut t = template();
        let mut item = SettingItem::new("Console", "");
        item.path = None;
        t.shared.registry.push(item);
        assert!(message(&t).contains("shared.registry[0]"));
    }

    #[test]
    fn application_item_without_path_is_allowed() {
        let mut t = template();
        let mut item = SettingItem::new("Steam", "");
        item.path = None;
        t.shared.applications.push(item);
        assert!(validate(&t).is_ok());
    }

    #[test]
    fn attribute_named_like_an_operation_field_is_rejected() {
        let mut t = template();
        let mut saves = SettingItem::new("saves", "C:\\Games");
        saves
            .attributes
            .insert("source".to_string(), serde_yaml::Value::from("D:\\Backup"));
        t.shared.files.push(saves);
        let msg = message(&t);
        assert!(msg.contains("shared.files[0]"), "{msg}");
        assert!(msg.contains("'source'"), "{msg}");
    }

    #[test]
    fn item_index_counts_per_kind() {
        let mut t = template();
        t.shared.registry.push(SettingItem::new("a", "HKCU:\\A"));
        t.shared.files.push(SettingItem::new("ok", "C:\\ok.txt"));
        t.shared.files.push(SettingItem::new("", "C:\\bad.txt"));
        assert!(message(&t).contains("shared.files[1]"));
    }
}
