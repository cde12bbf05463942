//! Template registry
//!
//! Maps a `(language, framework)` target to the template set that renders
//! it. New targets are added by registering an implementation, never by
//! branching on strings inside the engine. The registry is owned by the
//! generation engine, not ambient global state.

use std::collections::HashMap;
use std::sync::Arc;

use super::context::RenderContext;

/// Error type for template rendering
#[derive(Debug, Clone, thiserror::Error)]
pub enum RenderError {
    #[error("template context is missing required data: {0}")]
    MissingContext(String),
    #[error("failed to render {file}: {reason}")]
    File { file: String, reason: String },
}

/// Error type for registry lookups
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    #[error("no template set registered for target '{language}/{framework}'")]
    TargetNotFound { language: String, framework: String },
}

/// One rendered file in a generated source tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    /// Path relative to the artifact root
    pub path: String,
    pub contents: String,
}

/// A complete rendered source tree.
///
/// Files are kept in insertion order; rendering is all-or-nothing, a
/// partially rendered set is never persisted.
#[derive(Debug, Clone, Default)]
pub struct FileSet {
    files: Vec<GeneratedFile>,
}

impl FileSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, path: impl Into<String>, contents: impl Into<String>) {
        self.files.push(GeneratedFile {
            path: path.into(),
            contents: contents.into(),
        });
    }

    pub fn files(&self) -> &[GeneratedFile] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn into_files(self) -> Vec<GeneratedFile> {
        self.files
    }
}

/// A template set renders a complete server source tree for one target.
pub trait TemplateSet: Send + Sync {
    fn language(&self) -> &'static str;

    fn framework(&self) -> &'static str;

    /// Liveness path the rendered server exposes, consumed by the build
    /// service's probe definition and the deployment health poller.
    fn health_path(&self) -> &'static str {
        "/health"
    }

    /// Port the rendered server listens on inside its container.
    fn container_port(&self) -> u16 {
        8000
    }

    fn render(&self, context: &RenderContext) -> Result<FileSet, RenderError>;
}

/// Registry mapping targets to template sets
#[derive(Clone)]
pub struct TemplateRegistry {
    templates: HashMap<(String, String), Arc<dyn TemplateSet>>,
}

impl TemplateRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            templates: HashMap::new(),
        }
    }

    /// Create a registry with every built-in target registered
    pub fn with_builtin_targets() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(super::targets::python_fastapi::PythonFastapi));
        registry.register(Arc::new(super::targets::node_express::NodeExpress));
        registry
    }

    pub fn register(&mut self, template_set: Arc<dyn TemplateSet>) {
        let key = (
            template_set.language().to_string(),
            template_set.framework().to_string(),
        );
        self.templates.insert(key, template_set);
    }

    pub fn get(
        &self,
        language: &str,
        framework: &str,
    ) -> Result<Arc<dyn TemplateSet>, RegistryError> {
        self.templates
            .get(&(language.to_string(), framework.to_string()))
            .cloned()
            .ok_or_else(|| RegistryError::TargetNotFound {
                language: language.to_string(),
                framework: framework.to_string(),
            })
    }

    /// Supported targets, sorted for stable ordering
    pub fn list_targets(&self) -> Vec<(String, String)> {
        let mut targets: Vec<_> = self.templates.keys().cloned().collect();
        targets.sort();
        targets
    }
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::with_builtin_targets()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_targets_registered() {
        let registry = TemplateRegistry::with_builtin_targets();

        assert!(registry.get("python", "fastapi").is_ok());
        assert!(registry.get("node", "express").is_ok());

        let targets = registry.list_targets();
        assert_eq!(
            targets,
            vec![
                ("node".to_string(), "express".to_string()),
                ("python".to_string(), "fastapi".to_string()),
            ]
        );
    }

    #[test]
    fn test_unknown_target_rejected() {
        let registry = TemplateRegistry::with_builtin_targets();
        let result = registry.get("cobol", "cics");

        assert!(matches!(
            result,
            Err(RegistryError::TargetNotFound { .. })
        ));
    }
}
