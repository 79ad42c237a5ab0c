//! Error types for grid construction

use thiserror::Error;
use vineyard_core::CoreError;

/// Errors that abort a grid build
#[derive(Error, Debug)]
pub enum GridError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Geometry error: {0}")]
    Geometry(String),

    #[error("Row search exceeded {limit} iterations (stopped at {iterations})")]
    BoundedSearchExceeded { iterations: usize, limit: usize },

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl GridError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn geometry(msg: impl Into<String>) -> Self {
        Self::Geometry(msg.into())
    }

    pub fn shape_mismatch(msg: impl Into<String>) -> Self {
        Self::ShapeMismatch(msg.into())
    }
}

pub type GridResult<T> = Result<T, GridError>;
