//! Ошибки конвейера

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("empty dataset")]
    EmptyDataset,
    #[error("Status column not found in data")]
    MissingStatusColumn,
    #[error("insufficient data: {found} records found (minimum {required} required)")]
    InsufficientData { found: usize, required: usize },
    #[error("transform or model is not fitted")]
    NotFitted,
    #[error("feature dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("model fitting failed: {0}")]
    Fit(String),
    #[error("no trained models found in {}", .0.display())]
    NotFound(PathBuf),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
