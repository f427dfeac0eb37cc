//! Gallery feed client
//!
//! Talks to the Imgur v3 gallery endpoint (or anything answering with the
//! same envelope). Every failure here is fatal for the poll cycle.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::config::GalleryConfig;
use crate::error::{FeedError, Result};
use crate::types::GalleryItem;

/// Response envelope of the gallery API
#[derive(Debug, Deserialize)]
pub struct FeedResponse {
    #[serde(default)]
    pub data: Vec<GalleryItem>,
    pub success: bool,
    pub status: i32,
}

impl FeedResponse {
    /// Items in feed order (newest first), or an error if the envelope
    /// reports failure
    pub fn into_items(self) -> Result<Vec<GalleryItem>> {
        if !self.success || self.status != 200 {
            return Err(FeedError::Unsuccessful {
                success: self.success,
                status: self.status,
            }
            .into());
        }
        Ok(self.data)
    }
}

/// Source of gallery items, newest first
#[async_trait]
pub trait GallerySource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<GalleryItem>>;
}

pub struct ImgurGallery {
    client: reqwest::Client,
    feed_url: String,
    client_id: String,
}

impl ImgurGallery {
    pub fn new(feed_url: String, client_id: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("gallerycast/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FeedError::Request(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            feed_url,
            client_id,
        })
    }

    pub fn from_config(config: &GalleryConfig) -> Result<Self> {
        Self::new(
            config.feed_url.clone(),
            config.client_id.clone(),
            config.timeout()?,
        )
    }
}

#[async_trait]
impl GallerySource for ImgurGallery {
    async fn fetch(&self) -> Result<Vec<GalleryItem>> {
        debug!(url = %self.feed_url, "fetching gallery feed");

        let response = self
            .client
            .get(&self.feed_url)
            .header(ACCEPT, "application/json")
            .header(AUTHORIZATION, format!("Client-ID {}", self.client_id))
            .send()
            .await
            .map_err(|e| FeedError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::HttpStatus(status.as_u16()).into());
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FeedError::Request(e.to_string()))?;
        let feed: FeedResponse =
            serde_json::from_slice(&body).map_err(|e| FeedError::Decode(e.to_string()))?;

        let items = feed.into_items()?;
        debug!(count = items.len(), "gallery feed fetched");
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GallerycastError;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gallery(server: &MockServer) -> ImgurGallery {
        ImgurGallery::new(
            format!("{}/3/gallery/top/top/0.json", server.uri()),
            "client123".to_string(),
            Duration::from_secs(2),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_fetch_sends_headers_and_parses_items() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/3/gallery/top/top/0.json"))
            .and(header("Accept", "application/json"))
            .and(header("Authorization", "Client-ID client123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    {"id": "new0001", "title": "Newest", "cover": "cov0001", "is_album": true},
                    {"id": "old0002", "title": "Oldest", "link": "http://i.imgur.com/old0002.png",
                     "size": 2048, "nsfw": true}
                ],
                "success": true,
                "status": 200
            })))
            .expect(1)
            .mount(&server)
            .await;

        let items = gallery(&server).fetch().await.unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, "new0001");
        assert_eq!(items[0].cover_id.as_deref(), Some("cov0001"));
        assert_eq!(items[1].size_bytes, 2048);
        assert!(items[1].is_sensitive);
    }

    #[tokio::test]
    async fn test_http_error_is_upstream_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        match gallery(&server).fetch().await {
            Err(GallerycastError::Feed(FeedError::HttpStatus(503))) => {}
            other => panic!("expected HTTP status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_success_false_is_upstream_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [],
                "success": false,
                "status": 200
            })))
            .mount(&server)
            .await;

        assert!(matches!(
            gallery(&server).fetch().await,
            Err(GallerycastError::Feed(FeedError::Unsuccessful { success: false, .. }))
        ));
    }

    #[tokio::test]
    async fn test_body_status_other_than_200_is_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [],
                "success": true,
                "status": 429
            })))
            .mount(&server)
            .await;

        assert!(matches!(
            gallery(&server).fetch().await,
            Err(GallerycastError::Feed(FeedError::Unsuccessful { status: 429, .. }))
        ));
    }

    #[tokio::test]
    async fn test_malformed_body_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        assert!(matches!(
            gallery(&server).fetch().await,
            Err(GallerycastError::Feed(FeedError::Decode(_)))
        ));
    }

    #[test]
    fn test_into_items_success() {
        let feed = FeedResponse {
            data: vec![],
            success: true,
            status: 200,
        };
        assert!(feed.into_items().unwrap().is_empty());
    }
}
