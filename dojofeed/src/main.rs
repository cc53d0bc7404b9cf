//! Dojofeed - OpenVAS/GVM to DefectDojo import tool
//!
//! CLI tool that exports every GVM report scanned on a calendar day as CSV
//! and imports each export into DefectDojo
use clap::Parser;
use dojofeed::{cli, upload};
use log::error;

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Parse CLI arguments
    let args = cli::Args::parse();

    let config = match cli::create_upload_config_from_args(args) {
        Ok(config) => config,
        Err(e) => {
            error!("❌ {e}");
            std::process::exit(1);
        }
    };

    match upload::run(config).await {
        Ok(summary) if summary.failed == 0 => {}
        Ok(summary) => {
            error!(
                "❌ {} of {} reports failed to import",
                summary.failed,
                summary.total()
            );
            std::process::exit(1);
        }
        Err(e) => {
            error!("❌ Import run failed: {e}");
            std::process::exit(1);
        }
    }
}
