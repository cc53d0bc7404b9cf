//! CSV export workflow for GVM reports
//!
//! Renders every report of the run's listing through the server-side
//! "CSV Results" format and writes the decoded payloads to scratch files,
//! each owned by a cleanup guard from the moment it exists.
use crate::cleanup::CsvArtifact;
use crate::error::{FeedError, Result};
use gvm_platform::{GvmClient, ReportFilter, ReportFormat, ReportSummary};
use log::{debug, info};
use std::fs;
use std::path::Path;

/// Name of the GVM report format used for the export
pub const CSV_RESULTS_FORMAT: &str = "CSV Results";

/// One report exported to disk, with its scratch file guard
#[derive(Debug)]
pub struct ExportedReport {
    /// Report identifier (UUID)
    pub id: String,
    /// Task name the report was scanned under; matched against DefectDojo
    /// product names
    pub task: String,
    /// Guard owning the CSV on disk
    pub artifact: CsvArtifact,
}

/// Export filter: every result, overrides and notes applied, most severe
/// first.
fn export_filter() -> ReportFilter {
    ReportFilter::new()
        .with_first(1)
        .with_rows(-1)
        .with_apply_overrides(true)
        .with_notes(true)
        .with_sort_reverse("severity".to_string())
}

fn select_csv_format(formats: Vec<ReportFormat>) -> Result<String> {
    formats
        .into_iter()
        .find(|format| format.name == CSV_RESULTS_FORMAT)
        .map(|format| format.id)
        .ok_or_else(|| FeedError::MissingReportFormat(CSV_RESULTS_FORMAT.to_string()))
}

/// Resolve the id of the "CSV Results" report format.
///
/// # Errors
///
/// Fatal when the server's catalog has no format of that exact name; no
/// fallback format is ever substituted.
pub async fn resolve_csv_format(client: &mut GvmClient) -> Result<String> {
    let formats = client.get_report_formats().await?;
    debug!("Server offers {} report formats", formats.len());
    select_csv_format(formats)
}

/// Export every listed report as CSV into `output_dir`.
///
/// Files are named `<report_id>.csv`. Each one is wrapped in a
/// [`CsvArtifact`] as soon as it is written, so when a later export fails
/// the guards collected up to that point remove their files on unwind.
///
/// # Errors
///
/// Any fetch, decode or write failure is fatal and propagates.
pub async fn export_reports(
    client: &mut GvmClient,
    reports: &[ReportSummary],
    format_id: &str,
    output_dir: &Path,
) -> Result<Vec<ExportedReport>> {
    fs::create_dir_all(output_dir)?;
    let filter = export_filter();

    let mut exported = Vec::with_capacity(reports.len());
    for report in reports {
        debug!("🚀 Exporting report {} (task '{}')", report.id, report.task);
        let payload = client.get_report(&report.id, format_id, &filter).await?;

        let path = output_dir.join(format!("{}.csv", report.id));
        fs::write(&path, &payload)?;
        info!(
            "📄 Exported report {} ({} bytes) to {}",
            report.id,
            payload.len(),
            path.display()
        );

        exported.push(ExportedReport {
            id: report.id.clone(),
            task: report.task.clone(),
            artifact: CsvArtifact::new(path),
        });
    }

    Ok(exported)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(id: &str, name: &str) -> ReportFormat {
        ReportFormat {
            id: id.to_string(),
            name: name.to_string(),
        }
    }

    #[test]
    fn test_export_filter_renders_expected_terms() {
        assert_eq!(
            export_filter().to_filter_string(),
            "first=1 rows=-1 apply_overrides=1 notes=1 sort-reverse=severity"
        );
    }

    #[test]
    fn test_select_csv_format_by_exact_name() {
        let formats = vec![
            format("a994b278", "XML"),
            format("c1645568", "CSV Results"),
            format("9087b18c", "CSV Hosts"),
        ];
        assert_eq!(select_csv_format(formats).unwrap(), "c1645568");
    }

    #[test]
    fn test_select_csv_format_rejects_near_matches() {
        let formats = vec![
            format("a994b278", "csv results"),
            format("9087b18c", "CSV Results Summary"),
        ];
        let err = select_csv_format(formats).unwrap_err();
        assert!(matches!(err, FeedError::MissingReportFormat(_)));
        assert!(err.to_string().contains("CSV Results"));
    }

    #[test]
    fn test_select_csv_format_empty_catalog() {
        assert!(select_csv_format(Vec::new()).is_err());
    }
}
