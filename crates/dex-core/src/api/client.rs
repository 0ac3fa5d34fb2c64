//! HTTP client for the dataset API
//!
//! Wraps every remote interaction of a run: the dataset snapshot, lines
//! pagination, the attachment upload, and the attachment-list PATCH.

use crate::api::endpoints;
use crate::api::types::{Attachment, Dataset, Page};
use crate::error::{ExportError, Result};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Method, RequestBuilder};
use std::path::Path;
use std::time::Duration;
use tokio_util::io::ReaderStream;

// ============================================================================
// Client Constants
// ============================================================================

/// Default timeout for API requests in seconds.
/// Can be overridden via DEX_HTTP_TIMEOUT_SECS environment variable.
/// Set to 5 minutes to accommodate large pages and attachment uploads.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 300;

/// API key header understood by the dataset platform.
const API_KEY_HEADER: &str = "x-apiKey";

/// Client for one dataset platform, cheap to clone
#[derive(Clone)]
pub struct DatasetClient {
    client: Client,
    api_key: Option<String>,
}

impl DatasetClient {
    /// Create a new client, honoring the timeout environment override
    pub fn new(api_key: Option<String>) -> Result<Self> {
        let timeout_secs = std::env::var("DEX_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS);

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self { client, api_key })
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let mut builder = self.client.request(method, url);
        if let Some(ref key) = self.api_key {
            builder = builder.header(API_KEY_HEADER, key);
        }
        builder
    }

    /// Fetch the dataset snapshot (schema, bbox, attachments)
    pub async fn get_dataset(&self, href: &str) -> Result<Dataset> {
        let response = self
            .request(Method::GET, href)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }

    /// Fetch one page of the lines API
    pub async fn fetch_page(&self, url: &str) -> Result<Page> {
        let response = self
            .request(Method::GET, url)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }

    /// Upload one produced file as a metadata attachment
    ///
    /// The file is streamed, not buffered; the part carries the exact length
    /// so the platform sees a content-length header.
    pub async fn upload_attachment(&self, href: &str, path: &Path) -> Result<Attachment> {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| {
                ExportError::config(format!("attachment path '{}' has no file name", path.display()))
            })?;

        let file = tokio::fs::File::open(path).await?;
        let length = file.metadata().await?.len();
        let part = Part::stream_with_length(Body::wrap_stream(ReaderStream::new(file)), length)
            .file_name(filename);
        let form = Form::new().part("attachment", part);

        let response = self
            .request(Method::POST, &endpoints::attachments_url(href))
            .multipart(form)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }

    /// Replace the dataset's whole attachment list
    pub async fn patch_attachments(&self, href: &str, attachments: &[Attachment]) -> Result<()> {
        self.request(Method::PATCH, href)
            .json(&serde_json::json!({ "attachments": attachments }))
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }
}
