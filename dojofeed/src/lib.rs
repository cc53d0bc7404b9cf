//! Dojofeed library - OpenVAS/GVM report import for DefectDojo
//!
//! This library exports GVM scan reports for one calendar day as CSV and
//! imports each export into DefectDojo under the product matching its scan
//! task name.
pub mod cleanup;
pub mod cli;
pub mod credentials;
pub mod datetime;
pub mod defectdojo;
pub mod error;
pub mod export;
pub mod upload;

// Re-export commonly used types
pub use cleanup::CsvArtifact;
pub use credentials::SecureToken;
pub use defectdojo::{DojoClient, DojoConfig, DojoError};
pub use error::{FeedError, Result};
pub use export::ExportedReport;
pub use upload::{RunSummary, UploadConfig};
