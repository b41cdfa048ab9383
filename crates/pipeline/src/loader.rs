//! Workflow template lookup.
//!
//! Templates are ComfyUI API-format graphs stored as `<name>.json` files.
//! Nodes carry their role in `_meta.role`; see
//! [`WorkflowTemplate::from_graph`].

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sampler_core::error::CoreError;
use sampler_core::workflow::WorkflowTemplate;

#[async_trait]
pub trait WorkflowLoader: Send + Sync {
    /// Fetch a validated template, `NotFound` if no such workflow exists.
    async fn load(&self, name: &str) -> Result<WorkflowTemplate, CoreError>;
}

/// Loads templates from a directory of JSON files.
pub struct DirWorkflowLoader {
    dir: PathBuf,
}

impl DirWorkflowLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, CoreError> {
        let valid = !name.is_empty()
            && !name.starts_with('.')
            && !name.contains(['/', '\\'])
            && name != "..";
        if !valid {
            return Err(CoreError::Validation(format!(
                "Invalid workflow name '{name}'"
            )));
        }
        Ok(self.dir.join(format!("{name}.json")))
    }
}

#[async_trait]
impl WorkflowLoader for DirWorkflowLoader {
    async fn load(&self, name: &str) -> Result<WorkflowTemplate, CoreError> {
        let path = self.path_for(name)?;

        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CoreError::NotFound {
                    entity: "Workflow",
                    key: name.to_string(),
                });
            }
            Err(e) => {
                return Err(CoreError::Internal(format!(
                    "Failed to read workflow {}: {e}",
                    path.display()
                )));
            }
        };

        let graph: serde_json::Value = serde_json::from_str(&raw).map_err(|e| {
            CoreError::Validation(format!("Workflow '{name}' is not valid JSON: {e}"))
        })?;

        let template = WorkflowTemplate::from_graph(name, graph)?;
        template.validate()?;
        tracing::debug!(workflow = name, roles = template.roles.len(), "Loaded workflow template");
        Ok(template)
    }
}
