//! Report operations: listing, format catalog and formatted download.
//!
//! GMP addresses all three through `get_reports` / `get_report_formats`
//! commands filtered with the textual GMP filter grammar. The filter is
//! modeled by [`ReportFilter`] so callers never assemble grammar strings by
//! hand.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::NaiveDate;
use log::debug;
use quick_xml::Reader;
use quick_xml::escape::escape;
use quick_xml::events::Event;

use crate::client::GvmClient;
use crate::{GvmError, Result};

/// One entry of the report listing.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportSummary {
    /// Report identifier (UUID)
    pub id: String,
    /// Name of the task that produced the report, trimmed
    pub task: String,
}

/// One entry of the report format catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportFormat {
    /// Format identifier (UUID)
    pub id: String,
    /// Human-readable format name, e.g. "CSV Results"
    pub name: String,
}

/// Builder for the GMP filter grammar.
///
/// Renders the terms in a fixed order (`first`, `rows`, the creation window,
/// `apply_overrides`, `notes`, `sort-reverse`), space-separated, with the two
/// creation bounds joined by `and` as the grammar expects.
#[derive(Debug, Clone, Default)]
pub struct ReportFilter {
    /// First row to include (1-based)
    pub first: Option<i64>,
    /// Maximum number of rows, -1 for unbounded
    pub rows: Option<i64>,
    /// Only reports created after this date
    pub created_after: Option<NaiveDate>,
    /// Only reports created before this date
    pub created_before: Option<NaiveDate>,
    /// Whether overrides are applied to results
    pub apply_overrides: Option<bool>,
    /// Whether notes are included in results
    pub notes: Option<bool>,
    /// Field to sort by, descending
    pub sort_reverse: Option<String>,
}

impl ReportFilter {
    /// Create a new empty filter.
    pub fn new() -> Self {
        Default::default()
    }

    /// Set the first row to include.
    pub fn with_first(mut self, first: i64) -> Self {
        self.first = Some(first);
        self
    }

    /// Set the row limit (-1 for unbounded).
    pub fn with_rows(mut self, rows: i64) -> Self {
        self.rows = Some(rows);
        self
    }

    /// Restrict to reports created within `[from, to)`.
    pub fn with_created_between(mut self, from: NaiveDate, to: NaiveDate) -> Self {
        self.created_after = Some(from);
        self.created_before = Some(to);
        self
    }

    /// Apply result overrides.
    pub fn with_apply_overrides(mut self, apply: bool) -> Self {
        self.apply_overrides = Some(apply);
        self
    }

    /// Include notes in results.
    pub fn with_notes(mut self, notes: bool) -> Self {
        self.notes = Some(notes);
        self
    }

    /// Sort by the given field, descending.
    pub fn with_sort_reverse(mut self, field: String) -> Self {
        self.sort_reverse = Some(field);
        self
    }

    /// Render the filter in the textual form gvmd expects.
    pub fn to_filter_string(&self) -> String {
        let mut terms: Vec<String> = Vec::new();

        if let Some(first) = self.first {
            terms.push(format!("first={first}"));
        }
        if let Some(rows) = self.rows {
            terms.push(format!("rows={rows}"));
        }
        match (self.created_after, self.created_before) {
            (Some(after), Some(before)) => {
                terms.push(format!("created>{after} and created<{before}"));
            }
            (Some(after), None) => terms.push(format!("created>{after}")),
            (None, Some(before)) => terms.push(format!("created<{before}")),
            (None, None) => {}
        }
        if let Some(apply) = self.apply_overrides {
            terms.push(format!("apply_overrides={}", apply as u8));
        }
        if let Some(notes) = self.notes {
            terms.push(format!("notes={}", notes as u8));
        }
        if let Some(ref field) = self.sort_reverse {
            terms.push(format!("sort-reverse={field}"));
        }

        terms.join(" ")
    }
}

impl GvmClient {
    /// List reports matching the filter.
    ///
    /// # Arguments
    ///
    /// * `filter` - filter narrowing the listing, typically a creation
    ///   window with `rows=-1`
    ///
    /// # Returns
    ///
    /// One [`ReportSummary`] per report, in server order.
    ///
    /// # Errors
    ///
    /// Returns an error on transport or protocol failure, or when the
    /// response cannot be parsed.
    pub async fn get_reports(&mut self, filter: &ReportFilter) -> Result<Vec<ReportSummary>> {
        let filter_string = filter.to_filter_string();
        debug!("Listing reports with filter '{filter_string}'");
        let response = self.command(&get_reports_command(filter)).await?;
        parse_report_list(&response)
    }

    /// Fetch the report format catalog.
    ///
    /// # Errors
    ///
    /// Returns an error on transport or protocol failure.
    pub async fn get_report_formats(&mut self) -> Result<Vec<ReportFormat>> {
        let response = self.command("<get_report_formats/>").await?;
        parse_report_formats(&response)
    }

    /// Download one report rendered in the given format and return the
    /// decoded payload bytes.
    ///
    /// gvmd delivers formatted reports base64-encoded inside the response
    /// document; the decoding happens here.
    ///
    /// # Errors
    ///
    /// Returns an error on transport or protocol failure, when the response
    /// carries no payload, or when the payload is not valid base64.
    pub async fn get_report(
        &mut self,
        report_id: &str,
        format_id: &str,
        filter: &ReportFilter,
    ) -> Result<Vec<u8>> {
        debug!("Downloading report {report_id} in format {format_id}");
        let response = self
            .command(&get_report_command(report_id, format_id, filter))
            .await?;
        parse_report_payload(&response)
    }
}

fn get_reports_command(filter: &ReportFilter) -> String {
    format!(
        "<get_reports filter=\"{}\"/>",
        escape(&filter.to_filter_string())
    )
}

fn get_report_command(report_id: &str, format_id: &str, filter: &ReportFilter) -> String {
    format!(
        "<get_reports report_id=\"{}\" format_id=\"{}\" filter=\"{}\" details=\"1\"/>",
        escape(report_id),
        escape(format_id),
        escape(&filter.to_filter_string())
    )
}

/// Parse a report listing response.
///
/// Each `<report>` container directly under the response root is one entry;
/// the container nests the report body in another `<report>` element, which
/// must not be mistaken for an entry of its own.
fn parse_report_list(xml: &str) -> Result<Vec<ReportSummary>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut reports = Vec::new();
    let mut path: Vec<String> = Vec::new();
    let mut current: Option<ReportSummary> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if name == "report" && path.len() == 1 {
                    let mut summary = ReportSummary {
                        id: String::new(),
                        task: String::new(),
                    };
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"id" {
                            summary.id = attr.unescape_value()?.to_string();
                        }
                    }
                    current = Some(summary);
                }
                path.push(name);
            }
            Ok(Event::Text(ref text)) => {
                if path.len() == 4
                    && path[1] == "report"
                    && path[2] == "task"
                    && path[3] == "name"
                    && let Some(report) = current.as_mut()
                {
                    report.task = text.unescape()?.trim().to_string();
                }
            }
            Ok(Event::End(_)) => {
                if path.len() == 2
                    && path[1] == "report"
                    && let Some(report) = current.take()
                {
                    reports.push(report);
                }
                path.pop();
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(GvmError::Xml(e)),
        }
        buf.clear();
    }

    Ok(reports)
}

/// Parse the report format catalog.
///
/// Only the `<name>` directly under each `<report_format>` counts; formats
/// nest further `<name>` elements inside their `<param>` children.
fn parse_report_formats(xml: &str) -> Result<Vec<ReportFormat>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut formats = Vec::new();
    let mut path: Vec<String> = Vec::new();
    let mut current: Option<ReportFormat> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if name == "report_format" && path.len() == 1 {
                    let mut format = ReportFormat {
                        id: String::new(),
                        name: String::new(),
                    };
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"id" {
                            format.id = attr.unescape_value()?.to_string();
                        }
                    }
                    current = Some(format);
                }
                path.push(name);
            }
            Ok(Event::Text(ref text)) => {
                if path.len() == 3
                    && path[1] == "report_format"
                    && path[2] == "name"
                    && let Some(format) = current.as_mut()
                {
                    format.name = text.unescape()?.to_string();
                }
            }
            Ok(Event::End(_)) => {
                if path.len() == 2
                    && path[1] == "report_format"
                    && let Some(format) = current.take()
                {
                    formats.push(format);
                }
                path.pop();
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(GvmError::Xml(e)),
        }
        buf.clear();
    }

    Ok(formats)
}

/// Extract and decode the payload of a formatted report response.
///
/// The payload is the text content of the `<report>` element directly under
/// the response root. gvmd may wrap long base64 output, so ASCII whitespace
/// is stripped before decoding.
fn parse_report_payload(xml: &str) -> Result<Vec<u8>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut payload = String::new();
    let mut path: Vec<String> = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                path.push(String::from_utf8_lossy(e.name().as_ref()).to_string());
            }
            Ok(Event::Text(ref text)) => {
                if path.len() == 2 && path[1] == "report" {
                    payload.push_str(&text.unescape()?);
                }
            }
            Ok(Event::End(_)) => {
                path.pop();
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(GvmError::Xml(e)),
        }
        buf.clear();
    }

    let cleaned: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if cleaned.is_empty() {
        return Err(GvmError::InvalidResponse(
            "report response carried no payload".to_string(),
        ));
    }

    Ok(BASE64.decode(cleaned.as_bytes())?)
}
