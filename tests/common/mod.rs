// Shared helpers for integration tests.
//
// Provides a representative desktop template, machine contexts describing a
// few typical machines, and a temporary-directory-backed template file so
// each integration test can load from disk without repeating boilerplate.
//
// Used by all integration test binaries that declare `mod common;`.
#![allow(dead_code)]

use std::path::{Path, PathBuf};

use config_resolver::context::FixedContext;
use config_resolver::template::Template;

/// Desktop template used across the integration tests.
///
/// - `shared` (priority 60): console settings, a wallpaper value and a
///   terminal settings folder under `%LOCALAPPDATA%`
/// - `gaming` machine block (priority 90, hostnames starting `gaming-`):
///   more console settings
/// - `nvidia` conditional section: driver profiles when `nvidia-smi` reports
///   an NVIDIA GPU
/// - `expand-paths` rule: expands environment placeholders in file paths
///   tagged `expand`
pub const DESKTOP_TEMPLATE: &str = r#"
metadata:
  name: desktop
  version: "1.0"
configuration:
  validation_level: moderate
shared:
  priority: 60
  registry:
    - name: Console
      path: 'HKCU:\Console'
      inheritance_policy: merge
      inheritance_tags: [terminal]
      foo: 1
    - name: Wallpaper
      path: 'HKEY_CURRENT_USER\Control Panel\Desktop'
      key_name: Wallpaper
  files:
    - name: Windows Terminal
      path: '%LOCALAPPDATA%\Packages\Microsoft.WindowsTerminal\LocalState'
      inheritance_tags: [terminal, expand]
machine_specific:
  - name: gaming
    machine_selectors:
      - type: hostname_pattern
        value: '^gaming-'
    priority: 90
    registry:
      - name: Console
        path: 'HKCU:\Console'
        inheritance_policy: merge
        bar: 2
conditional_sections:
  - name: nvidia
    conditions:
      - type: hardware
        check: nvidia-smi -L
        expected_result: NVIDIA
        on_failure: skip
    files:
      - name: NVIDIA profiles
        path: 'C:\ProgramData\NVIDIA Corporation\Drs'
inheritance_rules:
  - name: expand-paths
    applies_to: [files]
    condition:
      tags_contain_any: [expand]
    action: transform
    transformation: expand_environment
"#;

/// Command probed by the `nvidia` section.
pub const GPU_CHECK: &str = "nvidia-smi -L";

/// Parse [`DESKTOP_TEMPLATE`].
pub fn desktop() -> Template {
    Template::from_yaml(DESKTOP_TEMPLATE).expect("desktop template parses")
}

/// A gaming machine with an NVIDIA GPU.
pub fn gaming_rig() -> FixedContext {
    FixedContext::new()
        .with_hostname("GAMING-RIG")
        .with_env("LOCALAPPDATA", "C:\\Users\\player\\AppData\\Local")
        .with_command_output(GPU_CHECK, "GPU 0: NVIDIA GeForce RTX 4090 (UUID: GPU-1)")
}

/// An office machine with no discrete GPU tooling installed.
pub fn office_pc() -> FixedContext {
    FixedContext::new()
        .with_hostname("office-pc")
        .with_env("LOCALAPPDATA", "C:\\Users\\clerk\\AppData\\Local")
}

/// A template file written into an isolated temporary directory.
pub struct TemplateFile {
    _dir: tempfile::TempDir,
    path: PathBuf,
}

impl TemplateFile {
    /// Write `content` to `template.yaml` in a fresh temporary directory.
    pub fn new(content: &str) -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("template.yaml");
        std::fs::write(&path, content).expect("write template");
        Self { _dir: dir, path }
    }

    /// Path of the written file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
