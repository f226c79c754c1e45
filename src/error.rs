//! Error types for the diamond price pipeline

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, DiamondError>;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum DiamondError {
    /// Columns or column types differ from the declared/fitted schema
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Model not fitted")]
    NotFitted,

    /// No persisted pipeline at the expected location
    #[error("Model artifact not found at {}; run `diamond-price train` to produce it", path.display())]
    ArtifactNotFound { path: PathBuf },

    #[error("Experiment tracker unavailable: {0}")]
    TrackerUnavailable(String),

    #[error("Prediction failed: {0}")]
    PredictionFailure(String),

    /// Training data carries a category outside the declared vocabulary
    #[error("Unknown category '{value}' in column '{column}'")]
    UnknownCategory { column: String, value: String },

    #[error("Insufficient data for {what}: need at least {required} rows, got {actual}")]
    InsufficientData {
        what: String,
        required: usize,
        actual: usize,
    },

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl DiamondError {
    /// Whether the error came from the schema/data contract rather than the environment
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            DiamondError::SchemaMismatch(_)
                | DiamondError::UnknownCategory { .. }
                | DiamondError::InsufficientData { .. }
                | DiamondError::ValidationError(_)
                | DiamondError::DataError(_)
        )
    }
}

impl From<polars::error::PolarsError> for DiamondError {
    fn from(err: polars::error::PolarsError) -> Self {
        DiamondError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for DiamondError {
    fn from(err: serde_json::Error) -> Self {
        DiamondError::SerializationError(err.to_string())
    }
}

impl From<bincode::Error> for DiamondError {
    fn from(err: bincode::Error) -> Self {
        DiamondError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for DiamondError {
    fn from(err: ndarray::ShapeError) -> Self {
        DiamondError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DiamondError::SchemaMismatch("missing column 'cut'".to_string());
        assert_eq!(err.to_string(), "Schema mismatch: missing column 'cut'");
    }

    #[test]
    fn test_artifact_not_found_mentions_train() {
        let err = DiamondError::ArtifactNotFound {
            path: PathBuf::from("models/m.bin"),
        };
        let msg = err.to_string();
        assert!(msg.contains("models/m.bin"));
        assert!(msg.contains("diamond-price train"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: DiamondError = io_err.into();
        assert!(matches!(err, DiamondError::IoError(_)));
    }

    #[test]
    fn test_data_error_classification() {
        assert!(DiamondError::SchemaMismatch("x".into()).is_data_error());
        assert!(!DiamondError::TrackerUnavailable("down".into()).is_data_error());
        assert!(!DiamondError::NotFitted.is_data_error());
    }
}
