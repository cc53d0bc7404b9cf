//! Error types for the dojofeed application
use crate::defectdojo::DojoError;

/// Custom error type for dojofeed operations
#[derive(thiserror::Error, Debug)]
pub enum FeedError {
    /// GVM API error
    #[error("GVM API error: {0}")]
    Gvm(#[from] gvm_platform::GvmError),

    /// DefectDojo API error
    #[error("DefectDojo error: {0}")]
    Dojo(#[from] DojoError),

    /// File I/O error
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid calendar date
    #[error("Invalid date: {0}")]
    InvalidDate(String),

    /// The GVM server does not offer a required report format
    #[error("Report format '{0}' is not available on this GVM server")]
    MissingReportFormat(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for dojofeed operations
pub type Result<T> = std::result::Result<T, FeedError>;
