use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Path traversal detected: {} escapes the sample root", path.display())]
    PathTraversal { path: PathBuf },

    #[error("Internal error: {0}")]
    Internal(String),
}
