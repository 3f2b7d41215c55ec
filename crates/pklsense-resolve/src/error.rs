use pklsense_registry::GraphError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackgroundError {
    #[error("Resolution of '{0}' was cancelled")]
    Cancelled(String),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("Background resolution task failed: {0}")]
    Join(String),
}
