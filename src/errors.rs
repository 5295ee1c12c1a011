//! Error taxonomy for the fallible parts of the pipeline
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconcilerError {
    #[error("No live node at path {path:?}")]
    PathNotFound { path: Vec<usize> },

    #[error("Child index {index} out of bounds for parent with {len} children")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("Live node {node} is not an element")]
    NotAnElement { node: String },

    #[error("A forest has no single live representation")]
    ForestNotMaterializable,

    #[error("Unknown live node {node}")]
    UnknownNode { node: String },

    #[error("Move source index {from} was not a child of the parent when the batch started")]
    MoveSourceMissing { from: usize },

    #[error("Patch {action} is not valid at the root")]
    InvalidAtRoot { action: String },

    #[error("Invalid configuration: {details}")]
    ConfigError { details: String },

    #[error("Type conversion error: expected {expected}, got {actual}")]
    TypeConversionError { expected: String, actual: String },

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}
