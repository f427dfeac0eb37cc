//! Mastodon platform implementation
//!
//! Speaks the Mastodon REST API directly. Works against any Fediverse server
//! implementing the v1 statuses and v2 media/instance endpoints.

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use crate::config::MastodonConfig;
use crate::error::{PlatformError, Result};
use crate::platforms::Platform;

/// Header carrying the calls left in the current rate-limit window
pub const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";

#[derive(Debug, Deserialize)]
struct IdResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct InstanceResponse {
    configuration: InstanceConfiguration,
}

#[derive(Debug, Deserialize)]
struct InstanceConfiguration {
    statuses: StatusesConfiguration,
}

#[derive(Debug, Deserialize)]
struct StatusesConfiguration {
    characters_reserved_per_url: usize,
}

/// Mastodon platform client
pub struct MastodonClient {
    client: reqwest::Client,
    /// Base URL without trailing slash (e.g. "https://mastodon.social")
    instance_url: String,
    access_token: String,
}

impl MastodonClient {
    pub fn new(instance_url: String, access_token: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("gallerycast/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PlatformError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            instance_url: instance_url.trim_end_matches('/').to_string(),
            access_token,
        })
    }

    /// Create a client from configuration, reading the access token from
    /// the configured token file
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::Authentication` if the token file cannot be
    /// read or is empty.
    pub fn from_config(config: &MastodonConfig) -> Result<Self> {
        let token_path = shellexpand::full(&config.token_file).map_err(|e| {
            PlatformError::Authentication(format!("Failed to expand token file path: {}", e))
        })?;

        let token = std::fs::read_to_string(token_path.as_ref())
            .map_err(|e| {
                PlatformError::Authentication(format!("Failed to read Mastodon token file: {}", e))
            })?
            .trim()
            .to_string();

        if token.is_empty() {
            return Err(
                PlatformError::Authentication("Mastodon token file is empty".to_string()).into(),
            );
        }

        Self::new(
            normalize_instance_url(&config.instance),
            token,
            config.timeout()?,
        )
    }

    pub fn instance_url(&self) -> &str {
        &self.instance_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.instance_url, path)
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        context: &str,
    ) -> Result<reqwest::Response> {
        let response = request
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| map_request_error(e, context))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_status_error(status, &body, context).into());
        }

        Ok(response)
    }

    async fn upload_media(&self, media: &[u8]) -> Result<String> {
        let mime = sniff_image_mime(media);
        let part = Part::bytes(media.to_vec())
            .file_name(format!("image.{}", mime.rsplit('/').next().unwrap_or("jpg")))
            .mime_str(mime)
            .map_err(|e| PlatformError::Posting(format!("Invalid media type {}: {}", mime, e)))?;

        let request = self
            .client
            .post(self.url("/api/v2/media"))
            .multipart(Form::new().part("file", part));

        let uploaded: IdResponse = self
            .send(request, "upload media")
            .await?
            .json()
            .await
            .map_err(|e| map_parse_error(e, "upload media"))?;

        debug!(media_id = %uploaded.id, bytes = media.len(), "uploaded media");
        Ok(uploaded.id)
    }

    async fn create_status(&self, body: serde_json::Value) -> Result<String> {
        let request = self.client.post(self.url("/api/v1/statuses")).json(&body);

        let status: IdResponse = self
            .send(request, "post status")
            .await?
            .json()
            .await
            .map_err(|e| map_parse_error(e, "post status"))?;

        Ok(status.id)
    }
}

#[async_trait]
impl Platform for MastodonClient {
    fn name(&self) -> &str {
        "mastodon"
    }

    async fn post_text(&self, status: &str, sensitive: bool) -> Result<String> {
        self.create_status(json!({
            "status": status,
            "sensitive": sensitive,
        }))
        .await
    }

    async fn post_with_media(
        &self,
        status: &str,
        media: &[u8],
        sensitive: bool,
    ) -> Result<String> {
        let media_id = self.upload_media(media).await?;

        self.create_status(json!({
            "status": status,
            "media_ids": [media_id],
            "sensitive": sensitive,
        }))
        .await
    }

    async fn remaining_quota(&self) -> Result<u32> {
        let request = self
            .client
            .get(self.url("/api/v1/accounts/verify_credentials"));
        let response = self.send(request, "verify credentials").await?;

        parse_remaining(response.headers())
    }

    async fn media_reservation(&self) -> Result<usize> {
        let request = self.client.get(self.url("/api/v2/instance"));

        let instance: InstanceResponse = self
            .send(request, "fetch instance info")
            .await?
            .json()
            .await
            .map_err(|e| map_parse_error(e, "fetch instance info"))?;

        Ok(instance.configuration.statuses.characters_reserved_per_url)
    }
}

/// Ensure the instance URL has a scheme, defaulting to https
pub fn normalize_instance_url(instance: &str) -> String {
    if instance.starts_with("http://") || instance.starts_with("https://") {
        instance.to_string()
    } else {
        format!("https://{}", instance)
    }
}

fn parse_remaining(headers: &HeaderMap) -> Result<u32> {
    let value = headers.get(RATE_LIMIT_REMAINING).ok_or_else(|| {
        PlatformError::Posting("Response carried no X-RateLimit-Remaining header".to_string())
    })?;

    value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse::<u32>().ok())
        .ok_or_else(|| {
            PlatformError::Posting(format!("Unparseable X-RateLimit-Remaining: {:?}", value))
                .into()
        })
}

/// Guess the upload MIME type from magic bytes; JPEG when unknown
fn sniff_image_mime(bytes: &[u8]) -> &'static str {
    match bytes {
        [0x89, b'P', b'N', b'G', ..] => "image/png",
        [b'G', b'I', b'F', b'8', ..] => "image/gif",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "image/webp",
        _ => "image/jpeg",
    }
}

/// Map a non-success HTTP status to PlatformError
///
/// - 401/403 → `Authentication` (token revoked or lacking scope)
/// - 422 → `Validation` (the server rejected the status or media)
/// - 429 → `RateLimit`
/// - 5xx and anything else → `Network`
fn map_status_error(status: StatusCode, body: &str, context: &str) -> PlatformError {
    let detail = if body.is_empty() {
        status.to_string()
    } else {
        format!("{}: {}", status, body)
    };

    match status.as_u16() {
        401 | 403 => PlatformError::Authentication(format!(
            "Mastodon authentication failed ({}): {}. \
                Suggestion: Verify your access token is valid and has write scope.",
            context, detail
        )),
        422 => PlatformError::Validation(format!(
            "Mastodon validation failed ({}): {}",
            context, detail
        )),
        429 => PlatformError::RateLimit(format!(
            "Mastodon rate limit exceeded ({}): {}",
            context, detail
        )),
        500..=599 => PlatformError::Network(format!(
            "Mastodon server error ({}): {}",
            context, detail
        )),
        _ => PlatformError::Network(format!("Mastodon HTTP error ({}): {}", context, detail)),
    }
}

fn map_request_error(error: reqwest::Error, context: &str) -> PlatformError {
    if error.is_timeout() {
        PlatformError::Network(format!("Mastodon request timed out ({})", context))
    } else if error.is_builder() {
        PlatformError::Authentication(format!(
            "Invalid Mastodon instance URL ({}): {}. \
                Suggestion: Check the instance in your configuration.",
            context, error
        ))
    } else {
        PlatformError::Network(format!("Mastodon request failed ({}): {}", context, error))
    }
}

fn map_parse_error(error: reqwest::Error, context: &str) -> PlatformError {
    PlatformError::Posting(format!(
        "Mastodon response parse error ({}): {}",
        context, error
    ))
}
