//! Error types for observation localization

use thiserror::Error;
use vineyard_core::CoreError;
use vineyard_grid::GridError;

/// Errors that can occur while locating observations
#[derive(Error, Debug)]
pub enum LocatorError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Coordinate table error: {0}")]
    CoordinateTable(String),

    #[error("Detector error: {0}")]
    Detector(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Grid(#[from] GridError),
}

impl LocatorError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn coordinate_table(msg: impl Into<String>) -> Self {
        Self::CoordinateTable(msg.into())
    }

    pub fn detector(msg: impl Into<String>) -> Self {
        Self::Detector(msg.into())
    }
}

pub type LocatorResult<T> = Result<T, LocatorError>;
