//! YAML template loading.
use std::path::Path;

use super::Template;
use super::validation;
use crate::error::TemplateError;

/// Read, parse and structurally validate the template at `path`.
///
/// # Errors
///
/// Returns [`TemplateError::Io`] if the file cannot be read,
/// [`TemplateError::Parse`] if it does not fit the template grammar, and
/// [`TemplateError::Malformed`] if it fails structural validation.
pub fn load(path: &Path) -> Result<Template, TemplateError> {
    let content = std::fs::read_to_string(path).map_err(|source| TemplateError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&content, &path.display().to_string())
}

/// Parse and validate template text. `origin` names the source in errors.
///
/// # Errors
///
/// See [`load`].
pub fn parse(content: &str, origin: &str) -> Result<Template, TemplateError> {
    let template: Template =
        serde_yaml::from_str(content).map_err(|source| TemplateError::Parse {
            origin: origin.to_string(),
            source,
        })?;
    validation::validate(&template)?;
    tracing::debug!(
        "loaded template '{}' from {origin}: {} machine block(s), {} conditional section(s), {} rule(s)",
        template.metadata.name,
        template.machine_specific.len(),
        template.conditional_sections.len(),
        template.inheritance_rules.len()
    );
    Ok(template)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    const MINIMAL: &str = "\
metadata:
  name: desktop
shared:
  registry:
    - name: Console
      path: 'HKCU:\\Console'
";

    #[test]
    fn parse_minimal_template() {
        let template = parse(MINIMAL, "<test>").unwrap();
        assert_eq!(template.metadata.name, "desktop");
        assert_eq!(template.shared.registry.len(), 1);
    }

    #[test]
    fn parse_error_names_origin() {
        let err = parse("metadata: [", "broken.yaml").unwrap_err();
        assert!(matches!(err, TemplateError::Parse { .. }));
        assert!(err.to_string().contains("broken.yaml"));
    }

    #[test]
    fn parse_runs_structural_validation() {
        let err = parse("metadata: { name: '' }\n", "<test>").unwrap_err();
        assert!(matches!(err, TemplateError::Malformed { .. }));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("desktop.yaml");
        std::fs::write(&path, MINIMAL).unwrap();
        let template = load(&path).unwrap();
        assert_eq!(template.metadata.name, "desktop");
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(&dir.path().join("missing.yaml")).unwrap_err();
        assert!(matches!(err, TemplateError::Io { .. }));
    }
}
