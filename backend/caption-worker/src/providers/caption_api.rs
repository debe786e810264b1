//! Captioning API integration
//!
//! Downloads the photo, uploads it as `multipart/form-data` (file field
//! `image`, filename `file.jpg`) with an `Api-Key` header, and reads the
//! caption from the JSON response.
use crate::error::{Result, WorkerError};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Url};
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Default captioning endpoint
pub const DEFAULT_CAPTION_URL: &str = "https://api.deepai.org/api/neuraltalk";

const API_KEY_HEADER: &str = "Api-Key";
const IMAGE_FIELD: &str = "image";
const IMAGE_FILE_NAME: &str = "file.jpg";

/// Produces a caption for a photo URL
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Captioner: Send + Sync {
    async fn caption(&self, photo_url: &str) -> Result<String>;
}

/// Shared captioner handle
pub type SharedCaptioner = Arc<dyn Captioner>;

// ============================================
// Response types
// ============================================

/// Body returned by the captioning API
///
/// `err` is an application-level error and is independent of the HTTP status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CaptionApiResponse {
    #[serde(rename = "Output", alias = "output")]
    pub output: String,
    #[serde(rename = "Job_id", alias = "job_id")]
    pub job_id: i64,
    #[serde(rename = "Err", alias = "err")]
    pub err: String,
}

impl CaptionApiResponse {
    /// Turn the response into a caption or an API error
    ///
    /// A non-empty `err` wins over any `output`. An empty caption is an error
    /// too: republishing it would put the record straight back into the queue.
    pub fn into_caption(self) -> Result<String> {
        if !self.err.is_empty() {
            return Err(WorkerError::Api(self.err));
        }

        if self.output.is_empty() {
            return Err(WorkerError::Api("empty caption".to_string()));
        }

        Ok(self.output)
    }
}

/// Check the photo URL parses and names a host
pub fn validate_photo_url(photo_url: &str) -> Result<Url> {
    let parsed = Url::parse(photo_url)
        .map_err(|e| WorkerError::InvalidPhotoUrl(format!("{}: {}", photo_url, e)))?;

    match parsed.host_str() {
        Some(host) if !host.is_empty() => Ok(parsed),
        _ => Err(WorkerError::InvalidPhotoUrl(format!(
            "{}: missing host",
            photo_url
        ))),
    }
}

/// HTTP client for the captioning API
pub struct CaptionApiClient {
    client: Client,
    endpoint: String,
    api_key: String,
    fetch_timeout: Duration,
    caption_timeout: Duration,
}

impl CaptionApiClient {
    /// Create a client for the given endpoint and key
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        fetch_timeout: Duration,
        caption_timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| WorkerError::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            fetch_timeout,
            caption_timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Download the photo bytes
    pub async fn fetch_image(&self, photo_url: &str) -> Result<Vec<u8>> {
        let url = validate_photo_url(photo_url).map_err(|e| {
            error!(photo_url = %photo_url, "Incorrect photo url provided");
            e
        })?;

        let response = self
            .client
            .get(url)
            .timeout(self.fetch_timeout)
            .send()
            .await
            .map_err(|e| self.transport_error("image fetch", self.fetch_timeout, e))?;

        let status = response.status();
        if !status.is_success() {
            error!(photo_url = %photo_url, status = %status, "Photo download failed");
            return Err(WorkerError::Fetch(format!(
                "{} returned {}",
                photo_url, status
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.transport_error("image fetch", self.fetch_timeout, e))?;

        debug!(photo_url = %photo_url, bytes = bytes.len(), "Photo downloaded");
        Ok(bytes.to_vec())
    }

    /// Upload image bytes and return the caption
    pub async fn request_caption(&self, image: Vec<u8>) -> Result<String> {
        let part = Part::bytes(image)
            .file_name(IMAGE_FILE_NAME)
            .mime_str("application/octet-stream")
            .map_err(|e| WorkerError::Api(format!("failed to build image part: {}", e)))?;
        let form = Form::new().part(IMAGE_FIELD, part);

        let start = Instant::now();

        let response = self
            .client
            .post(&self.endpoint)
            .header(API_KEY_HEADER, &self.api_key)
            .multipart(form)
            .timeout(self.caption_timeout)
            .send()
            .await
            .map_err(|e| self.transport_error("caption request", self.caption_timeout, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.transport_error("caption request", self.caption_timeout, e))?;

        let caption_response: CaptionApiResponse =
            serde_json::from_str(&body).map_err(|e| {
                error!(status = %status, error = %e, "Couldn't read response from caption API");
                WorkerError::Api(format!("unreadable response ({}): {}", status, e))
            })?;

        debug!(
            status = %status,
            job_id = caption_response.job_id,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Caption API response received"
        );

        caption_response.into_caption()
    }

    fn transport_error(
        &self,
        operation: &'static str,
        after: Duration,
        err: reqwest::Error,
    ) -> WorkerError {
        if err.is_timeout() {
            return WorkerError::Timeout { operation, after };
        }

        match operation {
            "image fetch" => WorkerError::Fetch(err.to_string()),
            _ => WorkerError::Api(err.to_string()),
        }
    }
}

#[async_trait]
impl Captioner for CaptionApiClient {
    async fn caption(&self, photo_url: &str) -> Result<String> {
        let image = self.fetch_image(photo_url).await?;
        let caption = self.request_caption(image).await?;

        info!(photo_url = %photo_url, caption = %caption, "Photo captioned");
        Ok(caption)
    }
}
