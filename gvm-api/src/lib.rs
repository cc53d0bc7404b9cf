//! # GVM Platform Client Library
//!
//! A Rust client library for talking to a Greenbone Vulnerability Management
//! (GVM/OpenVAS) server over the GMP XML protocol.
//!
//! The library covers the session and report surface of GMP: connecting over
//! TLS or a local Unix socket, authenticating, and listing, rendering and
//! downloading scan reports in any installed report format.
//!
//! ## Features
//!
//! - 🔌 **TLS and Unix socket transports** - gvmd's native listeners, with
//!   CA-file or platform trust roots and an opt-out for self-signed setups
//! - 🔐 **Session handling** - GMP `authenticate` and `get_version`
//! - 📋 **Report listing** - typed filter builder for the GMP filter grammar
//! - 📥 **Report download** - render in any report format, base64 decoding
//!   handled transparently
//! - 🚀 **Async/Await** - built on tokio
//! - ⚡ **Type-Safe** - typed errors for transport, protocol and data faults
//!
//! ## Quick Start
//!
//! ```no_run
//! use chrono::NaiveDate;
//! use gvm_platform::{GvmClient, GvmConfig, ReportFilter};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = GvmConfig::new("admin".to_string(), "secret".to_string())
//!         .with_host("gvm.internal.example".to_string());
//!
//!     let mut client = GvmClient::connect(config).await?;
//!     client.authenticate().await?;
//!
//!     let from: NaiveDate = "2022-11-01".parse()?;
//!     let to: NaiveDate = "2022-11-02".parse()?;
//!     let filter = ReportFilter::new()
//!         .with_rows(-1)
//!         .with_created_between(from, to);
//!
//!     for report in client.get_reports(&filter).await? {
//!         println!("{} {}", report.id, report.task);
//!     }
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod connection;
pub mod report;

use std::fmt;
use std::path::PathBuf;

// Re-export common types for convenience
pub use client::GvmClient;
pub use connection::GvmConnection;
pub use report::{ReportFilter, ReportFormat, ReportSummary};

/// Custom error type for GMP operations.
///
/// Covers transport faults, protocol-level failures reported by the server
/// and malformed response data.
#[derive(Debug, thiserror::Error)]
pub enum GvmError {
    /// Socket I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TLS setup or handshake failed
    #[error("TLS error: {0}")]
    Tls(#[from] tokio_rustls::rustls::Error),
    /// An operation exceeded its configured deadline
    #[error("{operation} timed out after {seconds}s")]
    Timeout {
        operation: &'static str,
        seconds: u64,
    },
    /// Response XML could not be parsed
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),
    /// Report payload was not valid base64
    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),
    /// Response was not valid UTF-8
    #[error("invalid UTF-8 in response: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    /// The server answered a command with a non-2xx GMP status
    #[error("GMP command failed with status {status}: {status_text}")]
    Command { status: String, status_text: String },
    /// Authentication was rejected
    #[error("authentication failed: {0}")]
    Authentication(String),
    /// The server response did not have the expected shape
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    /// Configuration is invalid
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Convenience result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, GvmError>;

/// Configuration for the GMP client.
///
/// Holds the credentials, transport selection and TLS trust settings for one
/// gvmd endpoint. By default the client connects over TLS to
/// `127.0.0.1:9390` and verifies the server certificate against the platform
/// trust store.
#[derive(Clone)]
pub struct GvmConfig {
    /// GMP username
    pub username: String,
    /// GMP password (kept out of Debug output)
    pub password: String,
    /// Hostname or IP address of the gvmd TLS listener
    pub host: String,
    /// Port of the gvmd TLS listener
    pub port: u16,
    /// Path to a local gvmd Unix socket; takes precedence over TLS when set
    #[cfg(unix)]
    pub socket_path: Option<PathBuf>,
    /// PEM file with the CA certificate(s) to trust instead of the platform
    /// trust store
    pub ca_cert: Option<PathBuf>,
    /// Whether to validate TLS certificates (default: true)
    pub validate_certificates: bool,
    /// Deadline for establishing the connection, in seconds
    pub connect_timeout_secs: u64,
    /// Deadline for reading one command response, in seconds
    pub response_timeout_secs: u64,
}

impl GvmConfig {
    /// Create a new configuration for a local gvmd with default transport
    /// settings (TLS to `127.0.0.1:9390`, certificates validated).
    ///
    /// # Arguments
    ///
    /// * `username` - GMP user to authenticate as
    /// * `password` - password for that user
    pub fn new(username: String, password: String) -> Self {
        Self {
            username,
            password,
            host: "127.0.0.1".to_string(),
            port: 9390,
            #[cfg(unix)]
            socket_path: None,
            ca_cert: None,
            validate_certificates: true, // Default to secure
            connect_timeout_secs: 30,
            response_timeout_secs: 300,
        }
    }

    /// Set the gvmd hostname for the TLS transport.
    pub fn with_host(mut self, host: String) -> Self {
        self.host = host;
        self
    }

    /// Set the gvmd port for the TLS transport.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Connect through a local gvmd Unix socket instead of TLS.
    #[cfg(unix)]
    pub fn with_unix_socket(mut self, path: PathBuf) -> Self {
        self.socket_path = Some(path);
        self
    }

    /// Trust the CA certificate(s) in the given PEM file instead of the
    /// platform trust store.
    pub fn with_ca_cert(mut self, path: PathBuf) -> Self {
        self.ca_cert = Some(path);
        self
    }

    /// Disable certificate validation for self-signed gvmd deployments.
    ///
    /// WARNING: This should only be used on trusted networks. The TLS
    /// session is still encrypted but the server identity is not checked.
    pub fn with_certificate_validation_disabled(mut self) -> Self {
        self.validate_certificates = false;
        self
    }

    /// Override the connect deadline.
    pub fn with_connect_timeout(mut self, seconds: u64) -> Self {
        self.connect_timeout_secs = seconds;
        self
    }

    /// Override the per-response read deadline.
    pub fn with_response_timeout(mut self, seconds: u64) -> Self {
        self.response_timeout_secs = seconds;
        self
    }
}

impl fmt::Debug for GvmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("GvmConfig");
        s.field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("host", &self.host)
            .field("port", &self.port);
        #[cfg(unix)]
        s.field("socket_path", &self.socket_path);
        s.field("ca_cert", &self.ca_cert)
            .field("validate_certificates", &self.validate_certificates)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("response_timeout_secs", &self.response_timeout_secs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_creation() {
        let config = GvmConfig::new("admin".to_string(), "secret".to_string());

        assert_eq!(config.username, "admin");
        assert_eq!(config.password, "secret");
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 9390);
        assert!(config.ca_cert.is_none());
        assert!(config.validate_certificates); // Default is secure
        assert_eq!(config.connect_timeout_secs, 30);
        assert_eq!(config.response_timeout_secs, 300);
    }

    #[test]
    fn test_config_builder_chain() {
        let config = GvmConfig::new("admin".to_string(), "secret".to_string())
            .with_host("gsm.example.com".to_string())
            .with_port(9391)
            .with_connect_timeout(5)
            .with_response_timeout(60);

        assert_eq!(config.host, "gsm.example.com");
        assert_eq!(config.port, 9391);
        assert_eq!(config.connect_timeout_secs, 5);
        assert_eq!(config.response_timeout_secs, 60);
    }

    #[test]
    fn test_certificate_validation_disabled() {
        let config = GvmConfig::new("admin".to_string(), "secret".to_string())
            .with_certificate_validation_disabled();

        assert!(!config.validate_certificates);
    }

    #[test]
    fn test_config_debug_redacts_password() {
        let config = GvmConfig::new("admin".to_string(), "hunter2".to_string());
        let debug_output = format!("{config:?}");

        assert!(debug_output.contains("admin"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("hunter2"));
    }

    #[cfg(unix)]
    #[test]
    fn test_unix_socket_config() {
        let config = GvmConfig::new("admin".to_string(), "secret".to_string())
            .with_unix_socket(PathBuf::from("/run/gvmd/gvmd.sock"));

        assert_eq!(
            config.socket_path.as_deref(),
            Some(std::path::Path::new("/run/gvmd/gvmd.sock"))
        );
    }

    #[test]
    fn test_error_display() {
        let error = GvmError::Command {
            status: "400".to_string(),
            status_text: "Bogus command name".to_string(),
        };
        assert_eq!(
            format!("{error}"),
            "GMP command failed with status 400: Bogus command name"
        );

        let error = GvmError::Authentication("bad credentials".to_string());
        assert_eq!(format!("{error}"), "authentication failed: bad credentials");
    }
}
