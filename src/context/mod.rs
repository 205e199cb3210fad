//! Machine context: the read-only view of the executing machine.
//!
//! The engine never reads hostnames, environment variables, registry values
//! or command output itself. Everything goes through a [`MachineContext`],
//! which keeps resolution a pure function of `(template, context)` and lets
//! tests swap in [`FixedContext`] or a mock.
pub mod fixed;
pub mod system;

use std::fmt;
use std::time::Instant;

use crate::error::ProbeError;

pub use fixed::FixedContext;
pub use system::SystemContext;

/// A single question asked of the machine.
///
/// Probes are ordered and hashable so the orchestrator can deduplicate them
/// before fanning out to the worker pool.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Probe {
    /// The machine's host (computer) name.
    Hostname,
    /// An environment variable, looked up case-insensitively.
    EnvVar(String),
    /// A registry value (`path` is the key, `name` the value name).
    RegistryValue {
        /// Registry key path (e.g. `HKLM:\SOFTWARE\Vendor`).
        path: String,
        /// Value name under the key.
        name: String,
    },
    /// A hardware/software check expression whose output is returned.
    Command(String),
}

impl fmt::Display for Probe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hostname => write!(f, "hostname"),
            Self::EnvVar(name) => write!(f, "environment variable {name}"),
            Self::RegistryValue { path, name } => write!(f, "registry value {path}\\{name}"),
            Self::Command(script) => write!(f, "command `{script}`"),
        }
    }
}

/// Source of machine facts consumed by selectors, conditions and
/// placeholder expansion.
///
/// Implementations must be safe to call from several worker threads at
/// once; the orchestrator evaluates independent probes concurrently.
#[cfg_attr(test, mockall::automock)]
pub trait MachineContext: Send + Sync {
    /// Answer `probe`, or explain why it cannot be answered.
    ///
    /// # Errors
    ///
    /// Returns a [`ProbeError`] if the value does not exist, the probe kind
    /// is unsupported, or the underlying check fails.
    fn resolve(&self, probe: &Probe) -> Result<String, ProbeError>;

    /// Answer `probe`, abandoning the attempt once `deadline` passes.
    ///
    /// The default implementation ignores the deadline; providers that run
    /// slow external checks override it so in-flight work is cancelled.
    ///
    /// # Errors
    ///
    /// Same as [`MachineContext::resolve`], plus [`ProbeError::TimedOut`].
    fn resolve_until(&self, probe: &Probe, deadline: Instant) -> Result<String, ProbeError> {
        let _ = deadline;
        self.resolve(probe)
    }
}
