use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the calling engine.
#[derive(Error, Debug)]
pub enum CallerError {
    /// Parameter values outside their supported range
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Malformed pedigree file or unsupported family structure
    #[error("Pedigree error: {0}")]
    Pedigree(String),

    /// Segment lists are not index-aligned across samples
    #[error("Segment mismatch: {0}")]
    SegmentMismatch(String),

    /// A sample lacks the coverage or allele data its model needs
    #[error("Missing data for sample '{sample}': {message}")]
    MissingData { sample: String, message: String },

    #[error("Unknown sample: {0}")]
    UnknownSample(String),

    /// Joint copy-number state space cannot be indexed
    #[error("State space error: {0}")]
    StateSpace(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CallerError>;

impl CallerError {
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter(message.into())
    }

    pub fn pedigree(message: impl Into<String>) -> Self {
        Self::Pedigree(message.into())
    }

    pub fn missing_data(sample: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MissingData {
            sample: sample.into(),
            message: message.into(),
        }
    }
}
