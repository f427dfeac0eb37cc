//! Mock platform implementation for testing
//!
//! A configurable stand-in for the posting service. It records every status
//! it is asked to publish and can be told to fail, either outright or after
//! a number of successful posts, so batch-abort behaviour can be exercised
//! without network access.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use crate::error::{PlatformError, Result};
use crate::platforms::Platform;

/// A status the mock accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedStatus {
    pub status: String,
    /// Size of the attached image, if any
    pub media_bytes: Option<usize>,
    pub sensitive: bool,
}

/// Configuration for mock platform behavior
#[derive(Debug, Clone)]
pub struct MockConfig {
    pub name: String,

    /// Whether posting should succeed
    pub post_succeeds: bool,

    /// Fail every post after this many have succeeded
    pub fail_after: Option<usize>,

    /// Error to return on posting failure
    pub post_error: Option<String>,

    /// Delay before completing operations (simulates network latency)
    pub delay: Duration,

    /// Value returned by `remaining_quota`, or an error when `None`
    pub remaining_quota: Option<u32>,

    /// Value returned by `media_reservation`, or an error when `None`
    pub media_reservation: Option<usize>,

    /// Number of times a post method has been called
    pub post_call_count: Arc<Mutex<usize>>,

    /// Statuses that have been posted (for verification)
    pub posted: Arc<Mutex<Vec<PostedStatus>>>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            name: "mock".to_string(),
            post_succeeds: true,
            fail_after: None,
            post_error: None,
            delay: Duration::from_millis(0),
            remaining_quota: Some(300),
            media_reservation: Some(23),
            post_call_count: Arc::new(Mutex::new(0)),
            posted: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

/// Mock platform for testing
pub struct MockPlatform {
    config: MockConfig,
}

impl MockPlatform {
    pub fn new(config: MockConfig) -> Self {
        Self { config }
    }

    /// Create a mock platform that always succeeds
    pub fn success(name: &str) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            ..Default::default()
        })
    }

    /// Create a mock platform that fails posting
    pub fn post_failure(name: &str, error: &str) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            post_succeeds: false,
            post_error: Some(error.to_string()),
            ..Default::default()
        })
    }

    /// Create a mock platform whose posts start failing after `successes`
    pub fn failing_after(name: &str, successes: usize) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            fail_after: Some(successes),
            ..Default::default()
        })
    }

    /// Create a mock platform reporting the given quota
    pub fn with_quota(name: &str, remaining: u32) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            remaining_quota: Some(remaining),
            ..Default::default()
        })
    }

    pub fn post_call_count(&self) -> usize {
        *self.config.post_call_count.lock().unwrap()
    }

    pub fn posted(&self) -> Vec<PostedStatus> {
        self.config.posted.lock().unwrap().clone()
    }

    /// Just the status texts, in posting order
    pub fn posted_content(&self) -> Vec<String> {
        self.posted().into_iter().map(|p| p.status).collect()
    }

    async fn record(&self, status: &str, media: Option<&[u8]>, sensitive: bool) -> Result<String> {
        let call = {
            let mut count = self.config.post_call_count.lock().unwrap();
            *count += 1;
            *count
        };

        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }

        let within_budget = self.config.fail_after.map_or(true, |n| call <= n);
        if !(self.config.post_succeeds && within_budget) {
            let error_msg = self
                .config
                .post_error
                .clone()
                .unwrap_or_else(|| "Mock posting failed".to_string());
            return Err(PlatformError::Posting(error_msg).into());
        }

        self.config.posted.lock().unwrap().push(PostedStatus {
            status: status.to_string(),
            media_bytes: media.map(<[u8]>::len),
            sensitive,
        });

        Ok(format!("{}:mock-{}", self.config.name, uuid::Uuid::new_v4()))
    }
}

#[async_trait]
impl Platform for MockPlatform {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn post_text(&self, status: &str, sensitive: bool) -> Result<String> {
        self.record(status, None, sensitive).await
    }

    async fn post_with_media(
        &self,
        status: &str,
        media: &[u8],
        sensitive: bool,
    ) -> Result<String> {
        self.record(status, Some(media), sensitive).await
    }

    async fn remaining_quota(&self) -> Result<u32> {
        self.config.remaining_quota.ok_or_else(|| {
            PlatformError::Network("Mock quota lookup failed".to_string()).into()
        })
    }

    async fn media_reservation(&self) -> Result<usize> {
        self.config.media_reservation.ok_or_else(|| {
            PlatformError::Network("Mock instance lookup failed".to_string()).into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_success() {
        let platform = MockPlatform::success("test");
        assert_eq!(platform.name(), "test");

        let post_id = platform.post_text("Test content", false).await.unwrap();
        assert!(post_id.starts_with("test:mock-"));
        assert_eq!(platform.post_call_count(), 1);
        assert_eq!(platform.posted_content(), vec!["Test content"]);
    }

    #[tokio::test]
    async fn test_mock_records_media_and_sensitivity() {
        let platform = MockPlatform::success("test");

        platform
            .post_with_media("With image", &[1, 2, 3], true)
            .await
            .unwrap();

        assert_eq!(
            platform.posted(),
            vec![PostedStatus {
                status: "With image".to_string(),
                media_bytes: Some(3),
                sensitive: true,
            }]
        );
    }

    #[tokio::test]
    async fn test_mock_post_failure() {
        let platform = MockPlatform::post_failure("test", "Network error");

        let result = platform.post_text("Test content", false).await;
        assert!(result.unwrap_err().to_string().contains("Network error"));
        assert_eq!(platform.post_call_count(), 1);
        assert!(platform.posted().is_empty());
    }

    #[tokio::test]
    async fn test_mock_failing_after() {
        let platform = MockPlatform::failing_after("test", 2);

        assert!(platform.post_text("one", false).await.is_ok());
        assert!(platform.post_text("two", false).await.is_ok());
        assert!(platform.post_text("three", false).await.is_err());
        assert_eq!(platform.posted_content(), vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_mock_with_delay() {
        let platform = MockPlatform::new(MockConfig {
            delay: Duration::from_millis(50),
            ..Default::default()
        });

        let start = std::time::Instant::now();
        platform.post_text("Test", false).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_mock_quota_lookups() {
        let platform = MockPlatform::with_quota("test", 42);
        assert_eq!(platform.remaining_quota().await.unwrap(), 42);
        assert_eq!(platform.media_reservation().await.unwrap(), 23);

        let failing = MockPlatform::new(MockConfig {
            remaining_quota: None,
            media_reservation: None,
            ..Default::default()
        });
        assert!(failing.remaining_quota().await.is_err());
        assert!(failing.media_reservation().await.is_err());
    }
}
