//! Error types for dataset preparation operations

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for dataset operations
pub type Result<T> = std::result::Result<T, DatasetError>;

/// Error types for fetching, tiling, augmenting and sorting
#[derive(Error, Debug)]
pub enum DatasetError {
    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding or encoding errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// HTTP errors while fetching the dataset archive
    #[error("Network error: {0}")]
    Network(String),

    /// Zip archive could not be read or unpacked
    #[error("Archive error: {0}")]
    Archive(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Downloaded archive does not match the configured digest
    #[error("Checksum mismatch for '{}': expected {expected}, got {actual}", .path.display())]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// Source image cannot hold a single tile
    #[error(
        "Image '{}' is {width}x{height}, smaller than a {tile_width}x{tile_height} tile",
        .path.display()
    )]
    ImageTooSmall {
        path: PathBuf,
        width: u32,
        height: u32,
        tile_width: u32,
        tile_height: u32,
    },

    /// Operation not valid in the current state (e.g. no tile selected)
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Config file (de)serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DatasetError {
    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new invalid state error
    pub fn invalid_state<S: Into<String>>(msg: S) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        Self::Io(std::io::Error::new(
            error.kind(),
            format!(
                "Failed to {} '{}': {}",
                operation,
                path.as_ref().display(),
                error
            ),
        ))
    }

    /// Create network error with request context
    pub fn network_error<S: Into<String>, E: std::fmt::Display>(context: S, error: E) -> Self {
        Self::Network(format!("{}: {}", context.into(), error))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {}", rec),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {}).{}",
            parameter, value, valid_range, recommendation
        ))
    }
}

impl From<zip::result::ZipError> for DatasetError {
    fn from(error: zip::result::ZipError) -> Self {
        Self::Archive(error.to_string())
    }
}
