//! Machine selectors: predicates on the identity of the executing machine.
use serde::{Deserialize, Serialize};

use crate::context::Probe;

/// Which machine property a selector reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectorKind {
    /// Exact host name.
    MachineName,
    /// Host name regular expression.
    HostnamePattern,
    /// Environment variable value.
    EnvironmentVariable,
    /// Registry value.
    RegistryValue,
}

/// How the probed value is compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    /// String equality.
    Equals,
    /// Unanchored regular expression search.
    Matches,
}

/// A `machine_selectors:` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MachineSelector {
    /// Selector kind.
    #[serde(rename = "type")]
    pub kind: SelectorKind,
    /// Comparand for name selectors; fallback comparand for the others.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Comparand for environment and registry selectors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_value: Option<String>,
    /// Environment variable name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable: Option<String>,
    /// Registry key path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Registry value name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Explicit operator; see [`MachineSelector::operator`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<Operator>,
    /// Compare case-sensitively.
    #[serde(default)]
    pub case_sensitive: bool,
}

impl MachineSelector {
    /// Selector of `kind` with every optional field unset.
    #[must_use]
    pub const fn new(kind: SelectorKind) -> Self {
        Self {
            kind,
            value: None,
            expected_value: None,
            variable: None,
            path: None,
            name: None,
            operator: None,
            case_sensitive: false,
        }
    }

    /// `machine_name` selector for `name`.
    #[must_use]
    pub fn machine_name(name: impl Into<String>) -> Self {
        Self {
            value: Some(name.into()),
            ..Self::new(SelectorKind::MachineName)
        }
    }

    /// `hostname_pattern` selector for `pattern`.
    #[must_use]
    pub fn hostname_pattern(pattern: impl Into<String>) -> Self {
        Self {
            value: Some(pattern.into()),
            ..Self::new(SelectorKind::HostnamePattern)
        }
    }

    /// `environment_variable` selector.
    #[must_use]
    pub fn environment_variable(variable: impl Into<String>, expected: impl Into<String>) -> Self {
        Self {
            variable: Some(variable.into()),
            expected_value: Some(expected.into()),
            ..Self::new(SelectorKind::EnvironmentVariable)
        }
    }

    /// `registry_value` selector.
    #[must_use]
    pub fn registry_value(
        path: impl Into<String>,
        name: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self {
            path: Some(path.into()),
            name: Some(name.into()),
            expected_value: Some(expected.into()),
            ..Self::new(SelectorKind::RegistryValue)
        }
    }

    /// Effective operator: explicit, else `matches` for `hostname_pattern`
    /// and `equals` for everything else.
    #[must_use]
    pub fn operator(&self) -> Operator {
        self.operator.unwrap_or(match self.kind {
            SelectorKind::HostnamePattern => Operator::Matches,
            _ => Operator::Equals,
        })
    }

    /// Probe answering this selector, or `None` if a required field is missing.
    #[must_use]
    pub fn probe(&self) -> Option<Probe> {
        match self.kind {
            SelectorKind::MachineName | SelectorKind::HostnamePattern => Some(Probe::Hostname),
            SelectorKind::EnvironmentVariable => {
                self.variable.clone().map(Probe::EnvVar)
            }
            SelectorKind::RegistryValue => Some(Probe::RegistryValue {
                path: self.path.clone()?,
                name: self.name.clone()?,
            }),
        }
    }

    /// Value the probe result is compared against.
    #[must_use]
    pub fn comparand(&self) -> Option<&str> {
        match self.kind {
            SelectorKind::MachineName | SelectorKind::HostnamePattern => self
                .value
                .as_deref()
                .or(self.expected_value.as_deref()),
            SelectorKind::EnvironmentVariable | SelectorKind::RegistryValue => self
                .expected_value
                .as_deref()
                .or(self.value.as_deref()),
        }
    }

    /// Name of the first required field that is missing, if any.
    #[must_use]
    pub fn missing_field(&self) -> Option<&'static str> {
        match self.kind {
            SelectorKind::EnvironmentVariable if self.variable.is_none() => Some("variable"),
            SelectorKind::RegistryValue if self.path.is_none() => Some("path"),
            SelectorKind::RegistryValue if self.name.is_none() => Some("name"),
            _ if self.comparand().is_none() => match self.kind {
                SelectorKind::MachineName | SelectorKind::HostnamePattern => Some("value"),
                _ => Some("expected_value"),
            },
            _ => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn hostname_pattern_defaults_to_matches() {
        assert_eq!(
            MachineSelector::hostname_pattern("^GAMING-").operator(),
            Operator::Matches
        );
        assert_eq!(
            MachineSelector::machine_name("GAMING-RIG").operator(),
            Operator::Equals
        );
    }

    #[test]
    fn explicit_operator_wins() {
        let mut sel = MachineSelector::machine_name("GAMING-.*");
        sel.operator = Some(Operator::Matches);
        assert_eq!(sel.operator(), Operator::Matches);
    }

    #[test]
    fn environment_selector_probe_and_comparand() {
        let sel = MachineSelector::environment_variable("COMPUTERNAME", "OFFICE");
        assert_eq!(sel.probe(), Some(Probe::EnvVar("COMPUTERNAME".to_string())));
        assert_eq!(sel.comparand(), Some("OFFICE"));
    }

    #[test]
    fn environment_selector_falls_back_to_value() {
        let mut sel = MachineSelector::new(SelectorKind::EnvironmentVariable);
        sel.variable = Some("X".to_string());
        sel.value = Some("1".to_string());
        assert_eq!(sel.comparand(), Some("1"));
        assert_eq!(sel.missing_field(), None);
    }

    #[test]
    fn registry_selector_needs_path_and_name() {
        let mut sel = MachineSelector::registry_value("HKLM:\\SOFTWARE\\V", "Edition", "Pro");
        assert!(sel.probe().is_some());
        sel.name = None;
        assert_eq!(sel.probe(), None);
        assert_eq!(sel.missing_field(), Some("name"));
    }

    #[test]
    fn machine_name_without_value_is_incomplete() {
        let sel = MachineSelector::new(SelectorKind::MachineName);
        assert_eq!(sel.missing_field(), Some("value"));
    }

    #[test]
    fn deserialize_from_yaml() {
        let sel: MachineSelector =
            serde_yaml::from_str("type: machine_name\nvalue: GAMING-RIG\ncase_sensitive: true\n")
                .unwrap();
        assert_eq!(sel.kind, SelectorKind::MachineName);
        assert!(sel.case_sensitive);
    }

    #[test]
    fn unknown_selector_type_is_rejected() {
        let res: Result<MachineSelector, _> = serde_yaml::from_str("type: wmi_query\nvalue: x\n");
        assert!(res.is_err());
    }
}
