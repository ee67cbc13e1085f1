//! Template lookup and rendering
//!
//! Templates are plain text with `{{ name }}` placeholders. Built-in
//! templates ship inside the binary; a directory override replaces any of
//! them by file name and can add new ones.

use declarative::{ActionError, TemplateRenderer, interpolate};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

const BUILTIN: &[(&str, &str)] = &[
    (
        "datadog_check.yaml",
        include_str!("../../templates/datadog_check.yaml"),
    ),
    (
        "datadog_check.py",
        include_str!("../../templates/datadog_check.py"),
    ),
];

#[derive(Debug, Clone, Default)]
pub struct TemplateLibrary {
    override_dir: Option<PathBuf>,
}

impl TemplateLibrary {
    pub fn new(override_dir: Option<PathBuf>) -> Self {
        Self { override_dir }
    }

    /// Names of the built-in templates
    pub fn builtin_names() -> impl Iterator<Item = &'static str> {
        BUILTIN.iter().map(|(name, _)| *name)
    }

    /// Raw template text, preferring the override directory
    pub fn source(&self, template_id: &str) -> Result<Cow<'static, str>, ActionError> {
        if template_id.contains(['/', '\\']) || template_id.starts_with('.') {
            return Err(ActionError::render(format!(
                "invalid template name '{template_id}'"
            )));
        }

        if let Some(dir) = &self.override_dir {
            let path = dir.join(template_id);
            if path.is_file() {
                log::debug!("Using template override {}", path.display());
                return fs::read_to_string(&path).map(Cow::Owned).map_err(|e| {
                    ActionError::render(format!("Could not read {}: {e}", path.display()))
                });
            }
        }

        BUILTIN
            .iter()
            .find(|(name, _)| *name == template_id)
            .map(|(_, body)| Cow::Borrowed(*body))
            .ok_or_else(|| ActionError::render(format!("no template named '{template_id}'")))
    }
}

impl TemplateRenderer for TemplateLibrary {
    fn render(
        &self,
        template_id: &str,
        context: &BTreeMap<String, String>,
    ) -> Result<Vec<u8>, ActionError> {
        let source = self.source(template_id)?;
        interpolate(&source, context)
            .map(String::into_bytes)
            .map_err(|e| ActionError::render(format!("{template_id}: {e}")))
    }
}
