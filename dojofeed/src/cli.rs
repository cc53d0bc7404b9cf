//! CLI argument parsing for dojofeed
use crate::credentials::{self, SecureToken};
use crate::datetime;
use crate::defectdojo::DojoConfig;
use crate::error::Result;
use crate::upload::UploadConfig;
use clap::Parser;
use gvm_platform::GvmConfig;
use std::path::PathBuf;
use url::Url;

#[derive(Parser, Debug)]
#[command(
    name = "dojofeed",
    version,
    about = "Import OpenVAS/GVM scan reports into DefectDojo",
    long_about = "CLI tool that exports every GVM report scanned on a given calendar day as \
CSV and imports each export into DefectDojo under the product matching the scan task name",
    after_help = "EXAMPLES:
  # Import every report scanned on 1 Nov 2022
  dojofeed 1 11 2022 https://dojo.example.com 9a1f0c2e... \\
      --gvm-host gvm.internal --gvm-username admin

  # Password from the environment, local Unix socket transport
  GVM_PASSWORD=secret dojofeed 1 11 2022 https://dojo.example.com 9a1f0c2e... \\
      --gvm-socket /run/gvmd/gvmd.sock --gvm-username admin

The DefectDojo token is the API v2 key shown on the user profile page.
Each product must already exist in DefectDojo under the same name as its
GVM scan task; reports whose task has no matching product are skipped."
)]
pub struct Args {
    /// Day of month the reports were scanned (1-31)
    #[arg(value_parser = validate_day)]
    pub day: u32,

    /// Month the reports were scanned (1-12)
    #[arg(value_parser = validate_month)]
    pub month: u32,

    /// Year the reports were scanned (1970-9999)
    #[arg(value_parser = validate_year)]
    pub year: i32,

    /// Base URL of the DefectDojo instance, e.g. https://dojo.example.com
    #[arg(value_parser = validate_url)]
    pub dojo_url: Url,

    /// DefectDojo API v2 token
    pub dojo_token: String,

    /// Hostname or IP address of the gvmd TLS listener
    #[arg(long, default_value = "127.0.0.1")]
    pub gvm_host: String,

    /// Port of the gvmd TLS listener
    #[arg(long, default_value_t = 9390)]
    pub gvm_port: u16,

    /// Connect through a local gvmd Unix socket instead of TLS
    #[cfg(unix)]
    #[arg(long, value_name = "PATH", conflicts_with = "gvm_host")]
    pub gvm_socket: Option<PathBuf>,

    /// GMP username to authenticate as
    #[arg(long)]
    pub gvm_username: String,

    /// GMP password; falls back to the GVM_PASSWORD environment variable
    #[arg(long)]
    pub gvm_password: Option<String>,

    /// PEM file with the CA certificate(s) the gvmd TLS listener presents
    #[arg(long, value_name = "PEM")]
    pub gvm_ca_cert: Option<PathBuf>,

    /// Skip TLS certificate validation (self-signed gvmd deployments only)
    #[arg(long)]
    pub gvm_disable_cert_validation: bool,

    /// Directory for the exported CSV scratch files
    #[arg(long, default_value = ".", value_parser = validate_output_dir)]
    pub output_dir: PathBuf,
}

/// Assemble the run configuration from parsed arguments.
///
/// Resolves the GVM password (flag or environment) and computes the one-day
/// report window.
///
/// # Errors
///
/// Returns an error when the date components do not form a real calendar
/// date or when no GVM password is available.
pub fn create_upload_config_from_args(args: Args) -> Result<UploadConfig> {
    let window = datetime::report_window(args.day, args.month, args.year)?;
    let password = credentials::resolve_gvm_password(args.gvm_password)?;

    let mut gvm = GvmConfig::new(args.gvm_username, password)
        .with_host(args.gvm_host)
        .with_port(args.gvm_port);
    #[cfg(unix)]
    if let Some(socket) = args.gvm_socket {
        gvm = gvm.with_unix_socket(socket);
    }
    if let Some(ca_cert) = args.gvm_ca_cert {
        gvm = gvm.with_ca_cert(ca_cert);
    }
    if args.gvm_disable_cert_validation {
        gvm = gvm.with_certificate_validation_disabled();
    }

    let dojo = DojoConfig::new(args.dojo_url, SecureToken::new(args.dojo_token));

    Ok(UploadConfig {
        window,
        gvm,
        dojo,
        output_dir: args.output_dir,
    })
}

/// Validate day of month (1-31)
fn validate_day(s: &str) -> std::result::Result<u32, String> {
    let value: u32 = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number", s))?;
    if !(1..=31).contains(&value) {
        return Err(format!("Day must be between 1 and 31 (got {})", value));
    }
    Ok(value)
}

/// Validate month of year (1-12)
fn validate_month(s: &str) -> std::result::Result<u32, String> {
    let value: u32 = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number", s))?;
    if !(1..=12).contains(&value) {
        return Err(format!("Month must be between 1 and 12 (got {})", value));
    }
    Ok(value)
}

/// Validate four-digit year (1970-9999)
fn validate_year(s: &str) -> std::result::Result<i32, String> {
    let value: i32 = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number", s))?;
    if !(1970..=9999).contains(&value) {
        return Err(format!(
            "Year must be between 1970 and 9999 (got {})",
            value
        ));
    }
    Ok(value)
}

/// Validate the DefectDojo base URL (http or https with a host)
fn validate_url(s: &str) -> std::result::Result<Url, String> {
    let url = Url::parse(s.trim()).map_err(|e| format!("'{}' is not a valid URL: {}", s, e))?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(format!(
                "URL scheme must be http or https (got '{}')",
                other
            ));
        }
    }

    if url.host_str().is_none() {
        return Err(format!("URL '{}' has no host", s));
    }

    Ok(url)
}

/// Validate the output directory (must be a directory if it already exists;
/// a missing directory is created at export time)
fn validate_output_dir(s: &str) -> std::result::Result<PathBuf, String> {
    let path = PathBuf::from(s);
    if path.exists() && !path.is_dir() {
        return Err(format!("Path '{}' exists but is not a directory", s));
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn base_args() -> Vec<&'static str> {
        vec![
            "dojofeed",
            "1",
            "11",
            "2022",
            "https://dojo.example.com",
            "9a1f0c2e",
            "--gvm-username",
            "admin",
        ]
    }

    #[test]
    fn test_parse_minimal_invocation() {
        let args = Args::try_parse_from(base_args()).unwrap();
        assert_eq!(args.day, 1);
        assert_eq!(args.month, 11);
        assert_eq!(args.year, 2022);
        assert_eq!(args.dojo_url.as_str(), "https://dojo.example.com/");
        assert_eq!(args.dojo_token, "9a1f0c2e");
        assert_eq!(args.gvm_host, "127.0.0.1");
        assert_eq!(args.gvm_port, 9390);
        assert_eq!(args.gvm_username, "admin");
        assert!(args.gvm_password.is_none());
        assert!(!args.gvm_disable_cert_validation);
        assert_eq!(args.output_dir, PathBuf::from("."));
    }

    #[test]
    fn test_parse_requires_all_positionals() {
        let result = Args::try_parse_from([
            "dojofeed",
            "1",
            "11",
            "2022",
            "https://dojo.example.com",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_requires_gvm_username() {
        let result = Args::try_parse_from([
            "dojofeed",
            "1",
            "11",
            "2022",
            "https://dojo.example.com",
            "9a1f0c2e",
        ]);
        assert!(result.is_err());
    }

    #[test]
    #[cfg(unix)]
    fn test_socket_conflicts_with_host() {
        let mut argv = base_args();
        argv.extend(["--gvm-socket", "/run/gvmd/gvmd.sock", "--gvm-host", "gvm.internal"]);
        assert!(Args::try_parse_from(argv).is_err());
    }

    #[test]
    fn test_validate_day_range() {
        assert_eq!(validate_day("1").unwrap(), 1);
        assert_eq!(validate_day("31").unwrap(), 31);
        assert!(validate_day("0").is_err());
        assert!(validate_day("32").is_err());
        assert!(validate_day("abc").is_err());
    }

    #[test]
    fn test_validate_month_range() {
        assert_eq!(validate_month("12").unwrap(), 12);
        assert!(validate_month("0").is_err());
        assert!(validate_month("13").is_err());
    }

    #[test]
    fn test_validate_year_range() {
        assert_eq!(validate_year("2022").unwrap(), 2022);
        assert!(validate_year("1969").is_err());
        assert!(validate_year("10000").is_err());
    }

    #[test]
    fn test_validate_url_schemes() {
        assert!(validate_url("https://dojo.example.com").is_ok());
        assert!(validate_url("http://10.0.0.8:8080").is_ok());

        let err = validate_url("ftp://dojo.example.com").unwrap_err();
        assert!(err.contains("http or https"));

        assert!(validate_url("not a url").is_err());
    }

    #[test]
    fn test_validate_output_dir() {
        let temp_dir = TempDir::new().unwrap();
        assert!(validate_output_dir(temp_dir.path().to_str().unwrap()).is_ok());

        // Not yet existing is fine, it gets created before the export
        let missing = temp_dir.path().join("not_yet");
        assert!(validate_output_dir(missing.to_str().unwrap()).is_ok());

        let file_path = temp_dir.path().join("plain_file");
        fs::write(&file_path, "x").unwrap();
        let err = validate_output_dir(file_path.to_str().unwrap()).unwrap_err();
        assert!(err.contains("not a directory"));
    }

    #[test]
    fn test_create_upload_config_from_args() {
        let mut argv = base_args();
        argv.extend([
            "--gvm-password",
            "secret",
            "--gvm-host",
            "gvm.internal",
            "--gvm-port",
            "9391",
            "--gvm-disable-cert-validation",
        ]);
        let args = Args::try_parse_from(argv).unwrap();

        let config = create_upload_config_from_args(args).unwrap();
        assert_eq!(config.window.0.to_string(), "2022-11-01");
        assert_eq!(config.window.1.to_string(), "2022-11-02");
        assert_eq!(config.gvm.username, "admin");
        assert_eq!(config.gvm.password, "secret");
        assert_eq!(config.gvm.host, "gvm.internal");
        assert_eq!(config.gvm.port, 9391);
        assert!(!config.gvm.validate_certificates);
        assert_eq!(
            config.dojo.api_url().unwrap().as_str(),
            "https://dojo.example.com/api/v2/"
        );
    }

    #[test]
    fn test_create_upload_config_rejects_bad_date() {
        let mut argv = vec![
            "dojofeed",
            "30",
            "2",
            "2023",
            "https://dojo.example.com",
            "9a1f0c2e",
            "--gvm-username",
            "admin",
        ];
        argv.extend(["--gvm-password", "secret"]);
        let args = Args::try_parse_from(argv).unwrap();

        let err = create_upload_config_from_args(args).unwrap_err();
        assert!(err.to_string().contains("2023-02-30"));
    }
}
