//! Resolver settings file (`resolver.toml`).
//!
//! ```toml
//! [resolution]
//! timeout_secs = 30
//! max_workers = 4
//! parallel = true
//!
//! [output]
//! format = "summary"
//! ```
//!
//! Every key is optional; a missing file yields the defaults.
use std::path::Path;
use std::time::Duration;

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};

use crate::resolve::{DEFAULT_MAX_WORKERS, DEFAULT_TIMEOUT, ResolveOptions};

/// Default settings file name, looked up in the working directory.
pub const DEFAULT_SETTINGS_FILE: &str = "resolver.toml";

/// Top-level settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Probe gathering knobs.
    pub resolution: ResolutionSettings,
    /// Output rendering.
    pub output: OutputSettings,
}

/// `[resolution]` table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolutionSettings {
    /// Probe deadline in seconds.
    pub timeout_secs: u64,
    /// Upper bound on concurrent probes.
    pub max_workers: usize,
    /// Gather probes on a worker pool.
    pub parallel: bool,
}

impl Default for ResolutionSettings {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            max_workers: DEFAULT_MAX_WORKERS,
            parallel: true,
        }
    }
}

/// `[output]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputSettings {
    /// How `resolve` prints the plan.
    pub format: OutputFormat,
}

/// Plan rendering.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Pretty-printed JSON of the plan and diagnostics.
    Json,
    /// YAML of the plan and diagnostics.
    Yaml,
    /// Human-readable table.
    #[default]
    Summary,
}

impl Settings {
    /// Load settings from `path`; a missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return toml::from_str("").context("Failed to create default settings");
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML settings: {}", path.display()))
    }

    /// Engine options described by the `[resolution]` table.
    #[must_use]
    pub const fn to_options(&self) -> ResolveOptions {
        ResolveOptions {
            timeout: Duration::from_secs(self.resolution.timeout_secs),
            max_workers: self.resolution.max_workers,
            parallel: self.resolution.parallel,
        }
    }
}
