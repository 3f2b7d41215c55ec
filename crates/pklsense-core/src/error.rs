use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid type annotation '{input}': {reason}")]
    InvalidTypeAnnotation { input: String, reason: String },

    #[error("Invalid module source: {0}")]
    InvalidSource(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
