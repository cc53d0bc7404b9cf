//! DefectDojo REST API v2 integration
//!
//! Minimal client for the four calls the import flow needs: connectivity
//! check, product lookup by name, engagement creation and scan import.

use crate::credentials::SecureToken;
use chrono::{DateTime, NaiveDate, TimeZone};
use log::debug;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode, multipart};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use url::Url;

/// DefectDojo endpoint configuration
#[derive(Debug, Clone)]
pub struct DojoConfig {
    /// Base URL of the instance, e.g. `https://dojo.example.com`
    pub base_url: Url,
    /// API v2 token
    pub token: SecureToken,
}

impl DojoConfig {
    pub fn new(base_url: Url, token: SecureToken) -> Self {
        Self { base_url, token }
    }

    /// API v2 root under the configured base URL.
    ///
    /// A base path without a trailing slash would lose its last segment
    /// during the join, so one is appended first.
    pub fn api_url(&self) -> Result<Url, DojoError> {
        let mut base = self.base_url.clone();
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }
        Ok(base.join("api/v2/")?)
    }
}

/// Error types for the DefectDojo integration
#[derive(Debug, thiserror::Error)]
pub enum DojoError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid DefectDojo URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Invalid API token: {0}")]
    InvalidToken(String),
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("DefectDojo is not reachable: HTTP {status}")]
    Unreachable { status: u16 },
    #[error("no product is named '{name}'")]
    ProductNotFound { name: String },
    #[error("DefectDojo API error: {context}: HTTP {status} - {detail}")]
    Api {
        status: u16,
        context: String,
        detail: String,
    },
    #[error("Unexpected DefectDojo response: {0}")]
    InvalidResponse(String),
}

/// One product entry from the products listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
}

/// Envelope of the paginated products listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductsResponse {
    pub count: i64,
    pub results: Vec<Product>,
}

/// Engagement creation response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngagementResponse {
    pub id: i64,
}

/// Import response; `test` is the id of the test the findings landed in
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportScanResponse {
    pub test: i64,
}

/// Engagement creation payload.
///
/// Sent field-for-field the way the tracker expects an ad-hoc import
/// engagement; the server does not default absent fields consistently
/// across versions, so every one is spelled out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngagementRequest {
    pub tags: Vec<String>,
    pub name: String,
    pub description: Option<String>,
    pub version: String,
    pub first_contacted: Option<String>,
    pub target_start: String,
    pub target_end: String,
    pub reason: Option<String>,
    pub active: bool,
    pub tracker: Option<String>,
    pub test_strategy: Option<String>,
    pub threat_model: bool,
    pub api_test: bool,
    pub pen_test: bool,
    pub check_list: bool,
    pub status: String,
    pub engagement_type: String,
    pub build_id: String,
    pub commit_hash: String,
    pub branch_tag: String,
    pub source_code_management_uri: Option<String>,
    pub deduplication_on_engagement: bool,
    pub lead: Option<i64>,
    pub requester: Option<i64>,
    pub preset: Option<i64>,
    pub report_type: Option<i64>,
    pub product: i64,
    pub build_server: Option<i64>,
    pub source_code_management_server: Option<i64>,
    pub orchestration_engine: Option<i64>,
}

impl EngagementRequest {
    /// Build the payload for an ad-hoc import engagement on one product,
    /// stamped with the given wall-clock time in its name and date as its
    /// one-day target window.
    pub fn ad_hoc<Tz: TimeZone>(product_id: i64, now: DateTime<Tz>) -> Self
    where
        Tz::Offset: std::fmt::Display,
    {
        let today = now.format("%Y-%m-%d").to_string();
        Self {
            tags: Vec::new(),
            name: format!(
                "AdHoc Import from OpenVAS - {}",
                now.format("%a, %d %b %Y %H:%M:%S")
            ),
            description: None,
            version: String::new(),
            first_contacted: None,
            target_start: today.clone(),
            target_end: today,
            reason: None,
            active: true,
            tracker: None,
            test_strategy: None,
            threat_model: false,
            api_test: false,
            pen_test: false,
            check_list: false,
            status: "Completed".to_string(),
            engagement_type: "Interactive".to_string(),
            build_id: String::new(),
            commit_hash: String::new(),
            branch_tag: String::new(),
            source_code_management_uri: None,
            deduplication_on_engagement: false,
            lead: None,
            requester: None,
            preset: None,
            report_type: None,
            product: product_id,
            build_server: None,
            source_code_management_server: None,
            orchestration_engine: None,
        }
    }
}

/// DefectDojo API v2 client
pub struct DojoClient {
    client: Client,
    api_url: Url,
}

impl DojoClient {
    /// Create a client with the API token installed as a default header.
    ///
    /// # Errors
    ///
    /// Returns an error when the token cannot be carried in a header or
    /// the HTTP client fails to build.
    pub fn new(config: &DojoConfig) -> Result<Self, DojoError> {
        let mut headers = HeaderMap::new();
        let mut token_value = HeaderValue::from_str(&format!("Token {}", config.token.as_str()))
            .map_err(|_| {
                DojoError::InvalidToken(
                    "token contains characters that cannot appear in a header".to_string(),
                )
            })?;
        token_value.set_sensitive(true);
        headers.insert(AUTHORIZATION, token_value);

        // import-scan parses the uploaded file synchronously, so the
        // request deadline is generous
        let client = Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(300))
            .build()?;

        Ok(Self {
            client,
            api_url: config.api_url()?,
        })
    }

    /// Check that the API root answers before any per-report work starts.
    ///
    /// # Errors
    ///
    /// [`DojoError::Unreachable`] on any non-200 answer.
    pub async fn validate_connection(&self) -> Result<(), DojoError> {
        let url = self.api_url.clone();
        debug!("🌐 GET {url}");

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(DojoError::Unreachable {
                status: status.as_u16(),
            });
        }
        Ok(())
    }

    /// Look up a product by name.
    ///
    /// # Errors
    ///
    /// [`DojoError::ProductNotFound`] when the listing matches nothing,
    /// [`DojoError::Api`] on a non-200 answer.
    pub async fn find_product_by_name(&self, name: &str) -> Result<Product, DojoError> {
        let mut url = self.api_url.join("products/")?;
        url.query_pairs_mut().append_pair("name", name);
        debug!("🌐 GET {url}");

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            let detail = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(DojoError::Api {
                status: status.as_u16(),
                context: format!("product lookup for '{name}'"),
                detail,
            });
        }

        let listing: ProductsResponse = response.json().await?;
        if listing.count == 0 {
            return Err(DojoError::ProductNotFound {
                name: name.to_string(),
            });
        }
        if listing.count > 1 {
            debug!(
                "Products listing matched {} entries for '{name}', using the first",
                listing.count
            );
        }
        listing.results.into_iter().next().ok_or_else(|| {
            DojoError::InvalidResponse(
                "products listing reported matches but carried no results".to_string(),
            )
        })
    }

    /// Create an ad-hoc import engagement.
    ///
    /// # Errors
    ///
    /// [`DojoError::Api`] when the server answers anything but 201.
    pub async fn create_engagement(
        &self,
        request: &EngagementRequest,
    ) -> Result<EngagementResponse, DojoError> {
        let url = self.api_url.join("engagements/")?;
        debug!("🌐 POST {url}");
        if log::log_enabled!(log::Level::Debug) {
            match serde_json::to_string_pretty(request) {
                Ok(json) => debug!("📤 Engagement payload:\n{json}"),
                Err(e) => debug!("Failed to serialize engagement payload: {e}"),
            }
        }

        let response = self.client.post(url).json(request).send().await?;
        let status = response.status();
        if status != StatusCode::CREATED {
            let detail = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(DojoError::Api {
                status: status.as_u16(),
                context: format!("engagement creation for product {}", request.product),
                detail,
            });
        }

        Ok(response.json().await?)
    }

    /// Import one exported CSV into an engagement as an OpenVAS scan.
    ///
    /// The file is attached under its on-disk name so the tracker records
    /// which report produced the findings.
    ///
    /// # Errors
    ///
    /// [`DojoError::Io`] when the CSV cannot be read back,
    /// [`DojoError::Api`] when the server answers anything but 201.
    pub async fn import_scan(
        &self,
        engagement_id: i64,
        scan_date: NaiveDate,
        csv_path: &Path,
    ) -> Result<ImportScanResponse, DojoError> {
        let url = self.api_url.join("import-scan/")?;

        let file_name = csv_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "report.csv".to_string());
        let file_part = multipart::Part::bytes(fs::read(csv_path)?)
            .file_name(file_name)
            .mime_str("text/csv")?;

        let form = multipart::Form::new()
            .text("scan_date", scan_date.format("%Y-%m-%d").to_string())
            .text("minimum_severity", "Info")
            .text("active", "true")
            .text("verified", "true")
            .text("scan_type", "OpenVAS CSV")
            .text("engagement", engagement_id.to_string())
            .text("close_old_findings", "false")
            .text("push_to_jira", "false")
            .part("file", file_part);

        debug!("🌐 POST {url}");
        let response = self.client.post(url).multipart(form).send().await?;
        let status = response.status();
        if status != StatusCode::CREATED {
            let detail = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(DojoError::Api {
                status: status.as_u16(),
                context: format!("scan import into engagement {engagement_id}"),
                detail,
            });
        }

        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn config(base: &str) -> DojoConfig {
        DojoConfig::new(Url::parse(base).unwrap(), SecureToken::from("t0ken"))
    }

    #[test]
    fn test_api_url_appends_api_v2() {
        assert_eq!(
            config("https://dojo.example.com").api_url().unwrap().as_str(),
            "https://dojo.example.com/api/v2/"
        );

        // A base path keeps its last segment
        assert_eq!(
            config("https://dojo.example.com/dojo").api_url().unwrap().as_str(),
            "https://dojo.example.com/dojo/api/v2/"
        );
    }

    #[test]
    fn test_config_debug_redacts_token() {
        let debug_output = format!("{:?}", config("https://dojo.example.com"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("t0ken"));
    }

    #[tokio::test]
    async fn test_client_new_builds_api_url() {
        let client = DojoClient::new(&config("https://dojo.example.com")).unwrap();
        assert_eq!(client.api_url.as_str(), "https://dojo.example.com/api/v2/");
    }

    #[test]
    fn test_ad_hoc_engagement_payload() {
        let now = Utc.with_ymd_and_hms(2022, 11, 1, 9, 30, 0).unwrap();
        let request = EngagementRequest::ad_hoc(42, now);

        assert_eq!(
            request.name,
            "AdHoc Import from OpenVAS - Tue, 01 Nov 2022 09:30:00"
        );
        assert_eq!(request.target_start, "2022-11-01");
        assert_eq!(request.target_end, "2022-11-01");
        assert_eq!(request.product, 42);
        assert_eq!(request.status, "Completed");
        assert_eq!(request.engagement_type, "Interactive");
        assert!(request.active);
        assert!(!request.deduplication_on_engagement);
    }

    #[test]
    fn test_ad_hoc_engagement_serializes_every_field() {
        let now = Utc.with_ymd_and_hms(2022, 11, 1, 9, 30, 0).unwrap();
        let value = serde_json::to_value(EngagementRequest::ad_hoc(7, now)).unwrap();
        let object = value.as_object().unwrap();

        assert_eq!(object.len(), 30);
        assert_eq!(object["tags"], serde_json::json!([]));
        assert_eq!(object["description"], serde_json::Value::Null);
        assert_eq!(object["version"], "");
        assert_eq!(object["first_contacted"], serde_json::Value::Null);
        assert_eq!(object["active"], true);
        assert_eq!(object["threat_model"], false);
        assert_eq!(object["api_test"], false);
        assert_eq!(object["pen_test"], false);
        assert_eq!(object["check_list"], false);
        assert_eq!(object["build_id"], "");
        assert_eq!(object["commit_hash"], "");
        assert_eq!(object["branch_tag"], "");
        assert_eq!(object["lead"], serde_json::Value::Null);
        assert_eq!(object["requester"], serde_json::Value::Null);
        assert_eq!(object["preset"], serde_json::Value::Null);
        assert_eq!(object["report_type"], serde_json::Value::Null);
        assert_eq!(object["product"], 7);
        assert_eq!(object["build_server"], serde_json::Value::Null);
        assert_eq!(
            object["source_code_management_server"],
            serde_json::Value::Null
        );
        assert_eq!(object["orchestration_engine"], serde_json::Value::Null);
    }

    #[test]
    fn test_products_response_decoding() {
        let json = r#"{
            "count": 1,
            "next": null,
            "previous": null,
            "results": [
                {"id": 7, "name": "Demo Project", "description": "ignored"}
            ]
        }"#;

        let listing: ProductsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(listing.count, 1);
        assert_eq!(listing.results[0].id, 7);
        assert_eq!(listing.results[0].name, "Demo Project");
    }

    #[test]
    fn test_import_scan_response_decoding() {
        let json = r#"{"scan_date": "2022-11-01", "test": 55, "engagement": 12}"#;
        let response: ImportScanResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.test, 55);
    }
}
