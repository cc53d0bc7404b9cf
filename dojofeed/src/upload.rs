//! Run orchestrator: export from GVM, import into DefectDojo
//!
//! The run is linear: connect and authenticate to gvmd, list the day's
//! reports, export them all as CSV, then walk the exports and import each
//! one into DefectDojo. Setup failures abort the run; tracker failures on
//! one report skip just that report.
use crate::defectdojo::{DojoClient, DojoConfig, EngagementRequest};
use crate::error::Result;
use crate::export::{self, ExportedReport};
use chrono::{Local, NaiveDate};
use gvm_platform::{GvmClient, GvmConfig, ReportFilter};
use log::{error, info};
use std::path::PathBuf;

/// Configuration for one import run
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Day window the report listing is filtered to, `[from, to)`
    pub window: (NaiveDate, NaiveDate),
    /// GMP endpoint and credentials
    pub gvm: GvmConfig,
    /// DefectDojo endpoint and token
    pub dojo: DojoConfig,
    /// Where the CSV scratch files are written
    pub output_dir: PathBuf,
}

/// Outcome counts of one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Reports whose findings reached a DefectDojo test
    pub imported: usize,
    /// Reports skipped after a tracker-side failure
    pub failed: usize,
}

impl RunSummary {
    #[must_use]
    pub fn total(&self) -> usize {
        self.imported + self.failed
    }
}

/// Listing filter: every report created within the window, unpaginated.
fn listing_filter(from: NaiveDate, to: NaiveDate) -> ReportFilter {
    ReportFilter::new()
        .with_rows(-1)
        .with_created_between(from, to)
}

/// Execute one full export/import run.
///
/// # Errors
///
/// Fatal setup failures (GVM connect/auth/listing/export, missing CSV
/// format, DefectDojo unreachable) return an error. Per-report tracker
/// failures are logged, counted in the summary and do not abort the run.
pub async fn run(config: UploadConfig) -> Result<RunSummary> {
    let (from, to) = config.window;
    info!("🚀 Importing GVM reports scanned on {from} into DefectDojo");

    let mut gvm = GvmClient::connect(config.gvm).await?;
    gvm.authenticate().await?;
    let version = gvm.get_version().await?;
    info!("Connected to gvmd (GMP version {version})");

    let reports = gvm.get_reports(&listing_filter(from, to)).await?;
    if reports.is_empty() {
        info!("No reports were created between {from} and {to}, nothing to import");
        return Ok(RunSummary::default());
    }

    info!("Found {} reports created on {from}:", reports.len());
    for report in &reports {
        info!("  {} ({})", report.id, report.task);
    }

    let format_id = export::resolve_csv_format(&mut gvm).await?;
    let exported =
        export::export_reports(&mut gvm, &reports, &format_id, &config.output_dir).await?;

    // Guards for every CSV are live from here on, so an unreachable tracker
    // aborts without leaving scratch files behind
    let dojo = DojoClient::new(&config.dojo)?;
    dojo.validate_connection().await?;

    let mut summary = RunSummary::default();
    for report in exported {
        match process_report(&dojo, &report).await {
            Ok(test_id) => {
                info!("Imported findings to test (ID: {test_id})");
                summary.imported += 1;
            }
            Err(e) => {
                error!("❌ Skipping report {}: {e}", report.id);
                summary.failed += 1;
            }
        }
        // the report's CSV guard drops here, success or failure
    }

    info!(
        "✅ Run complete: {} imported, {} failed, {} total",
        summary.imported,
        summary.failed,
        summary.total()
    );
    Ok(summary)
}

/// Import one exported report: product lookup, ad-hoc engagement, scan
/// import. Returns the id of the test the findings landed in.
async fn process_report(dojo: &DojoClient, report: &ExportedReport) -> Result<i64> {
    let product = dojo.find_product_by_name(&report.task).await?;
    info!("Found product (ID: {})", product.id);

    let engagement = dojo
        .create_engagement(&EngagementRequest::ad_hoc(product.id, Local::now()))
        .await?;
    info!("Created new AdHoc import engagement (ID: {})", engagement.id);

    let import = dojo
        .import_scan(engagement.id, Local::now().date_naive(), report.artifact.path())
        .await?;
    Ok(import.test)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_filter_covers_the_window() {
        let from = "2022-11-01".parse().unwrap();
        let to = "2022-11-02".parse().unwrap();
        assert_eq!(
            listing_filter(from, to).to_filter_string(),
            "rows=-1 created>2022-11-01 and created<2022-11-02"
        );
    }

    #[test]
    fn test_run_summary_totals() {
        let empty = RunSummary::default();
        assert_eq!(empty.total(), 0);

        let summary = RunSummary {
            imported: 3,
            failed: 2,
        };
        assert_eq!(summary.total(), 5);
    }
}
