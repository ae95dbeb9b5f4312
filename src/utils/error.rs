//! Error Handling Module
//!
//! Defines the error type shared by the dataset, model and training modules.
//! Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for cifar_zoo operations
#[derive(Error, Debug)]
pub enum CifarError {
    /// Error reading or decoding a CIFAR-10 batch file
    #[error("Failed to read CIFAR-10 batch '{0}': {1}")]
    BatchFile(PathBuf, String),

    /// Error with dataset operations
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Malformed split selection such as `train[5:`
    #[error("Invalid split selection '{0}': {1}")]
    InvalidSlice(String, String),

    /// Error building or running a model
    #[error("Model error: {0}")]
    Model(String),

    /// Error with training
    #[error("Training error: {0}")]
    Training(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Image encoding error
    #[error("Image error: {0}")]
    Image(String),
}

impl From<serde_json::Error> for CifarError {
    fn from(err: serde_json::Error) -> Self {
        CifarError::Serialization(err.to_string())
    }
}

impl From<image::ImageError> for CifarError {
    fn from(err: image::ImageError) -> Self {
        CifarError::Image(err.to_string())
    }
}

/// Convenience Result type for cifar_zoo operations
pub type Result<T> = std::result::Result<T, CifarError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CifarError::Dataset("test error".to_string());
        assert_eq!(format!("{}", err), "Dataset error: test error");
    }

    #[test]
    fn test_batch_file_error() {
        let path = PathBuf::from("/data/cifar-10-batches-bin/data_batch_1.bin");
        let err = CifarError::BatchFile(path, "truncated record".to_string());
        assert!(format!("{}", err).contains("data_batch_1.bin"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: CifarError = io_err.into();
        assert!(matches!(err, CifarError::Io(_)));
    }

    #[test]
    fn test_json_error_conversion() {
        let err: CifarError = serde_json::from_str::<u32>("not json").unwrap_err().into();
        assert!(matches!(err, CifarError::Serialization(_)));
    }
}
