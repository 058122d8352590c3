//! Output file uploads
//!
//! Files produced by a prediction are PUT to a pre-signed endpoint, one
//! request per file, and replaced in the output by the URL they now live at.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, Url};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::error::{ClientError, Result};
use crate::retry::RetryPolicy;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const READ_TIMEOUT: Duration = Duration::from_secs(15);

/// Uploads a local file and returns a stable reference to it
#[async_trait]
pub trait FileUploader: Send + Sync {
    async fn upload(&self, path: &Path) -> Result<String>;
}

/// Uploader for a pre-signed HTTP endpoint
#[derive(Debug, Clone)]
pub struct SignedUrlUploader {
    endpoint: String,
    client: Client,
    retry: RetryPolicy,
}

impl SignedUrlUploader {
    /// Create an uploader for the given endpoint with the default retry policy
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .read_timeout(READ_TIMEOUT)
            .build()?;
        Ok(Self::with_client(endpoint, client))
    }

    /// Create an uploader with a custom HTTP client
    pub fn with_client(endpoint: impl Into<String>, client: Client) -> Self {
        Self {
            endpoint: endpoint.into(),
            client,
            retry: RetryPolicy::file_upload(),
        }
    }

    /// Where a file with this name gets PUT
    pub fn destination(&self, filename: &str) -> Result<Url> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", self.endpoint, e)))?;

        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(format!("{}: not a base URL", self.endpoint)))?
            .pop_if_empty()
            .push(filename);

        Ok(url)
    }
}

#[async_trait]
impl FileUploader for SignedUrlUploader {
    async fn upload(&self, path: &Path) -> Result<String> {
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                ClientError::InvalidUrl(format!("{} has no usable file name", path.display()))
            })?;

        let destination = self.destination(filename)?;
        let content_type = content_type_for_extension(filename);
        let body = tokio::fs::read(path).await?;

        debug!(
            "Uploading {} ({} bytes, {}) to {}",
            path.display(),
            body.len(),
            content_type,
            destination
        );

        let response = self
            .retry
            .send(Method::PUT, || {
                self.client
                    .put(destination.clone())
                    .header(CONTENT_TYPE, content_type)
                    .body(body.clone())
            })
            .await?;

        Ok(strip_query(response.url()))
    }
}

/// Drops signing parameters from the URL a file ended up at
pub fn strip_query(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.set_fragment(None);
    url.to_string()
}

/// Guess a Content-Type from a file extension.
pub fn content_type_for_extension(filename: &str) -> &'static str {
    let ext = match filename.rsplit_once('.') {
        Some((_, ext)) => ext.to_lowercase(),
        None => return "application/octet-stream",
    };
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "mp4" | "m4v" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "wav" => "audio/wav",
        "mp3" => "audio/mpeg",
        "ogg" => "audio/ogg",
        "flac" => "audio/flac",
        "txt" => "text/plain",
        "json" => "application/json",
        "csv" => "text/csv",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
}
