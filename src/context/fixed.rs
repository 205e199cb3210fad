//! In-memory machine context with pre-recorded answers.
//!
//! Used for offline resolution (`--context machine.yaml`), previews of what
//! a template would do on another machine, and tests.
use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context as _, Result};
use serde::Deserialize;

use super::{MachineContext, Probe};
use crate::error::ProbeError;

/// Recorded outcome of a command probe.
#[derive(Debug, Clone, PartialEq, Eq)]
enum CommandAnswer {
    Output(String),
    Failure(String),
}

/// A [`MachineContext`] that answers from fixed tables.
///
/// Environment variable names are matched case-insensitively, the way
/// Windows treats them. Probes with no recorded answer fail with
/// [`ProbeError::NotFound`] (or [`ProbeError::Unsupported`] for commands).
#[derive(Debug, Clone, Default)]
pub struct FixedContext {
    hostname: Option<String>,
    env: BTreeMap<String, String>,
    registry: BTreeMap<(String, String), String>,
    commands: BTreeMap<String, CommandAnswer>,
}

/// On-disk shape of a context file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ContextFile {
    hostname: Option<String>,
    environment: BTreeMap<String, String>,
    registry: Vec<RegistryFact>,
    commands: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct RegistryFact {
    path: String,
    name: String,
    value: String,
}

impl FixedContext {
    /// Create an empty context that knows nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a context file (YAML).
    ///
    /// ```yaml
    /// hostname: GAMING-RIG
    /// environment:
    ///   SystemRoot: C:\Windows
    /// registry:
    ///   - { path: 'HKLM:\SOFTWARE\Vendor', name: Edition, value: Pro }
    /// commands:
    ///   "nvidia-smi -L": "GPU 0: NVIDIA GeForce RTX 4090"
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid YAML.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read context file: {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse context file: {}", path.display()))
    }

    /// Parse a context document from YAML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid context document.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let file: ContextFile = serde_yaml::from_str(content)?;
        let mut ctx = Self::new();
        if let Some(hostname) = file.hostname {
            ctx = ctx.with_hostname(hostname);
        }
        for (name, value) in file.environment {
            ctx = ctx.with_env(name, value);
        }
        for fact in file.registry {
            ctx = ctx.with_registry_value(fact.path, fact.name, fact.value);
        }
        for (script, output) in file.commands {
            ctx = ctx.with_command_output(script, output);
        }
        Ok(ctx)
    }

    /// Set the hostname.
    #[must_use]
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    /// Record an environment variable.
    #[must_use]
    pub fn with_env(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.env
            .insert(name.as_ref().to_ascii_uppercase(), value.into());
        self
    }

    /// Record a registry value.
    #[must_use]
    pub fn with_registry_value(
        mut self,
        path: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.registry
            .insert((path.into(), name.into()), value.into());
        self
    }

    /// Record the output of a command probe.
    #[must_use]
    pub fn with_command_output(
        mut self,
        script: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        self.commands
            .insert(script.into(), CommandAnswer::Output(output.into()));
        self
    }

    /// Record that a command probe fails with `reason`.
    #[must_use]
    pub fn with_command_failure(
        mut self,
        script: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        self.commands
            .insert(script.into(), CommandAnswer::Failure(reason.into()));
        self
    }
}

impl MachineContext for FixedContext {
    fn resolve(&self, probe: &Probe) -> Result<String, ProbeError> {
        match probe {
            Probe::Hostname => self
                .hostname
                .clone()
                .ok_or_else(|| ProbeError::NotFound(probe.to_string())),
            Probe::EnvVar(name) => self
                .env
                .get(&name.to_ascii_uppercase())
                .cloned()
                .ok_or_else(|| ProbeError::NotFound(probe.to_string())),
            Probe::RegistryValue { path, name } => self
                .registry
                .get(&(path.clone(), name.clone()))
                .cloned()
                .ok_or_else(|| ProbeError::NotFound(probe.to_string())),
            Probe::Command(script) => match self.commands.get(script) {
                Some(CommandAnswer::Output(out)) => Ok(out.clone()),
                Some(CommandAnswer::Failure(reason)) => Err(ProbeError::Failed {
                    probe: probe.to_string(),
                    reason: reason.clone(),
                }),
                None => Err(ProbeError::Unsupported(probe.to_string())),
            },
        }
    }
}
