//! Live machine context backed by the running system.
use std::time::Instant;

use super::{MachineContext, Probe};
use crate::error::ProbeError;
use crate::exec::{self, ExecError};

/// A [`MachineContext`] that reads the machine it runs on.
///
/// - hostname via the `hostname` crate
/// - environment variables from the process environment
/// - registry values through `winreg` (Windows only)
/// - checks through PowerShell (Windows) or `sh -c` (elsewhere)
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemContext;

impl SystemContext {
    /// Create a context for the current machine.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn run_check(probe: &Probe, script: &str, deadline: Option<Instant>) -> Result<String, ProbeError> {
        tracing::debug!("running check: {script}");
        let result = exec::run_script(script, deadline).map_err(|e| match e {
            ExecError::TimedOut { elapsed, .. } => ProbeError::TimedOut {
                probe: probe.to_string(),
                elapsed,
            },
            other => ProbeError::Failed {
                probe: probe.to_string(),
                reason: other.to_string(),
            },
        })?;
        if result.success {
            Ok(result.stdout.trim().to_string())
        } else {
            Err(ProbeError::Failed {
                probe: probe.to_string(),
                reason: format!(
                    "exit {}: {}",
                    result.code.unwrap_or(-1),
                    result.stderr.trim()
                ),
            })
        }
    }

    fn answer(probe: &Probe, deadline: Option<Instant>) -> Result<String, ProbeError> {
        match probe {
            Probe::Hostname => hostname::get()
                .map_err(|e| ProbeError::Failed {
                    probe: probe.to_string(),
                    reason: e.to_string(),
                })?
                .into_string()
                .map_err(|_| ProbeError::Failed {
                    probe: probe.to_string(),
                    reason: "hostname is not valid UTF-8".to_string(),
                }),
            Probe::EnvVar(name) => {
                std::env::var(name).map_err(|_| ProbeError::NotFound(probe.to_string()))
            }
            Probe::RegistryValue { path, name } => registry::read_value(probe, path, name),
            Probe::Command(script) => Self::run_check(probe, script, deadline),
        }
    }
}

impl MachineContext for SystemContext {
    fn resolve(&self, probe: &Probe) -> Result<String, ProbeError> {
        Self::answer(probe, None)
    }

    fn resolve_until(&self, probe: &Probe, deadline: Instant) -> Result<String, ProbeError> {
        Self::answer(probe, Some(deadline))
    }
}

#[cfg(windows)]
mod registry {
    use winreg::RegKey;
    use winreg::enums::{
        HKEY_CLASSES_ROOT, HKEY_CURRENT_CONFIG, HKEY_CURRENT_USER, HKEY_LOCAL_MACHINE, HKEY_USERS,
    };

    use crate::context::Probe;
    use crate::error::ProbeError;
    use crate::hive::Hive;

    /// Read a registry value as a string; DWORD/QWORD values are rendered
    /// in decimal.
    pub(super) fn read_value(probe: &Probe, path: &str, name: &str) -> Result<String, ProbeError> {
        let (hive, subkey) =
            Hive::split(path).ok_or_else(|| ProbeError::Failed {
                probe: probe.to_string(),
                reason: format!("'{path}' does not start with a known registry hive"),
            })?;
        let root = RegKey::predef(match hive {
            Hive::CurrentUser => HKEY_CURRENT_USER,
            Hive::LocalMachine => HKEY_LOCAL_MACHINE,
            Hive::ClassesRoot => HKEY_CLASSES_ROOT,
            Hive::Users => HKEY_USERS,
            Hive::CurrentConfig => HKEY_CURRENT_CONFIG,
        });
        let key = root
            .open_subkey(subkey)
            .map_err(|_| ProbeError::NotFound(probe.to_string()))?;
        if let Ok(text) = key.get_value::<String, _>(name) {
            return Ok(text);
        }
        if let Ok(dword) = key.get_value::<u32, _>(name) {
            return Ok(dword.to_string());
        }
        key.get_value::<u64, _>(name)
            .map(|qword| qword.to_string())
            .map_err(|_| ProbeError::NotFound(probe.to_string()))
    }
}

#[cfg(not(windows))]
mod registry {
    use crate::context::Probe;
    use crate::error::ProbeError;

    pub(super) fn read_value(probe: &Probe, _path: &str, _name: &str) -> Result<String, ProbeError> {
        Err(ProbeError::Unsupported(probe.to_string()))
    }
}
