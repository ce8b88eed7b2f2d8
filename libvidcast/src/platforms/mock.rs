//! Mock platform adapter for testing
//!
//! A configurable adapter that simulates the upload contract without
//! touching the network or external tools: scripted success and failure,
//! optional failure at a specific chunk, simulated chunked progress
//! reporting, and call recording for verification. Available in all builds
//! so integration tests can drive the orchestrator with it.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;

use crate::error::{PlatformError, Result};
use crate::media::{AspectRatio, MediaInfo, PlatformConstraints, PreparedMedia};
use crate::transfer::ProgressFn;
use crate::types::{Platform, PlatformContent};

use super::{PlatformAdapter, PublishedMedia, UploadRequest};

static MOCK_CONSTRAINTS: PlatformConstraints = PlatformConstraints {
    max_duration_secs: 600.0,
    max_file_size: u64::MAX,
    allowed_aspect_ratios: &[
        AspectRatio::new(9, 16),
        AspectRatio::new(1, 1),
        AspectRatio::new(16, 9),
    ],
    min_width: None,
    max_width: None,
    min_height: None,
    max_height: None,
    supported_formats: &["mp4", "mov"],
    video_bitrate: "6000k",
    audio_bitrate: "128k",
    fallback_video_bitrate: "4000k",
    fallback_audio_bitrate: "96k",
};

/// Configuration for mock adapter behavior
#[derive(Clone)]
pub struct MockConfig {
    /// Which platform this mock stands in for
    pub platform: Platform,

    /// Error returned by upload, if any
    pub upload_error: Option<PlatformError>,

    /// Number of chunks the simulated transfer reports
    pub chunk_count: usize,

    /// Fail (with `upload_error`) after this many chunks have reported
    pub fail_after_chunk: Option<usize>,

    /// Delay before completing operations (simulates network latency)
    pub delay: Duration,

    /// Snapshot returned by get_status
    pub status_snapshot: serde_json::Value,

    /// Number of times upload has been called
    pub upload_call_count: Arc<Mutex<usize>>,

    /// Content passed to each upload call (for verification)
    pub uploaded_content: Arc<Mutex<Vec<PlatformContent>>>,

    /// Every progress value reported across upload calls
    pub reported_progress: Arc<Mutex<Vec<u8>>>,
}

impl MockConfig {
    fn new(platform: Platform) -> Self {
        Self {
            platform,
            upload_error: None,
            chunk_count: 3,
            fail_after_chunk: None,
            delay: Duration::from_millis(0),
            status_snapshot: serde_json::json!({"state": "processed"}),
            upload_call_count: Arc::new(Mutex::new(0)),
            uploaded_content: Arc::new(Mutex::new(Vec::new())),
            reported_progress: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

/// Mock platform adapter for testing
pub struct MockAdapter {
    config: MockConfig,
}

impl MockAdapter {
    pub fn new(config: MockConfig) -> Self {
        Self { config }
    }

    /// A mock that uploads successfully
    pub fn success(platform: Platform) -> Self {
        Self::new(MockConfig::new(platform))
    }

    /// A mock whose upload fails immediately with the given error
    pub fn failing(platform: Platform, error: PlatformError) -> Self {
        let mut config = MockConfig::new(platform);
        config.upload_error = Some(error);
        Self::new(config)
    }

    /// A mock that reports progress for `chunk` chunks and then fails
    pub fn failing_after_chunk(platform: Platform, chunk: usize, error: PlatformError) -> Self {
        let mut config = MockConfig::new(platform);
        config.upload_error = Some(error);
        config.fail_after_chunk = Some(chunk);
        Self::new(config)
    }

    /// A mock with simulated latency per operation
    pub fn with_delay(platform: Platform, delay: Duration) -> Self {
        let mut config = MockConfig::new(platform);
        config.delay = delay;
        Self::new(config)
    }

    pub fn upload_call_count(&self) -> usize {
        *self.config.upload_call_count.lock().unwrap()
    }

    pub fn uploaded_content(&self) -> Vec<PlatformContent> {
        self.config.uploaded_content.lock().unwrap().clone()
    }

    pub fn reported_progress(&self) -> Vec<u8> {
        self.config.reported_progress.lock().unwrap().clone()
    }
}

#[async_trait]
impl PlatformAdapter for MockAdapter {
    fn platform(&self) -> Platform {
        self.config.platform
    }

    fn constraints(&self) -> &PlatformConstraints {
        &MOCK_CONSTRAINTS
    }

    async fn prepare_media(&self, path: &Path) -> Result<PreparedMedia> {
        // Passthrough with synthetic probe data; no external tools in tests
        Ok(PreparedMedia::passthrough(
            path,
            MediaInfo {
                duration_secs: 30.0,
                width: 1080,
                height: 1920,
                size_bytes: 12 * 1024 * 1024,
                has_audio: true,
            },
        ))
    }

    async fn upload(
        &self,
        _media: &PreparedMedia,
        request: &UploadRequest<'_>,
        progress: ProgressFn<'_>,
    ) -> Result<PublishedMedia> {
        *self.config.upload_call_count.lock().unwrap() += 1;
        self.config
            .uploaded_content
            .lock()
            .unwrap()
            .push(request.content.clone());

        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }

        // Immediate failures never report progress
        if self.config.fail_after_chunk.is_none() {
            if let Some(error) = &self.config.upload_error {
                return Err(error.clone().into());
            }
        }

        for chunk in 1..=self.config.chunk_count {
            if self.config.fail_after_chunk == Some(chunk.saturating_sub(1)) {
                let error = self
                    .config
                    .upload_error
                    .clone()
                    .unwrap_or_else(|| PlatformError::Network("mock chunk failure".to_string()));
                return Err(error.into());
            }

            let pct = (chunk * 100 / self.config.chunk_count) as u8;
            self.config.reported_progress.lock().unwrap().push(pct);
            progress(pct);
        }

        Ok(PublishedMedia {
            remote_id: format!("{}-mock-id", self.config.platform),
            url: format!(
                "https://{}.example.com/video/{}",
                self.config.platform,
                uuid::Uuid::new_v4()
            ),
        })
    }

    async fn get_status(&self, _account: &str, _remote_id: &str) -> Result<serde_json::Value> {
        Ok(self.config.status_snapshot.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::UploadOptions;

    fn request_fixture<'a>(
        content: &'a PlatformContent,
        options: &'a UploadOptions,
    ) -> UploadRequest<'a> {
        UploadRequest {
            content,
            account: "personal",
            options,
        }
    }

    async fn passthrough(adapter: &MockAdapter) -> PreparedMedia {
        adapter.prepare_media(Path::new("/v/clip.mp4")).await.unwrap()
    }

    #[tokio::test]
    async fn test_mock_success_reports_full_progress() {
        let adapter = MockAdapter::success(Platform::Tiktok);
        let content = PlatformContent::default();
        let options = UploadOptions::default();
        let media = passthrough(&adapter).await;

        let progress = |_: u8| {};
        let published = adapter
            .upload(&media, &request_fixture(&content, &options), &progress)
            .await
            .unwrap();

        assert!(published.url.contains("tiktok"));
        assert_eq!(adapter.upload_call_count(), 1);
        assert_eq!(adapter.reported_progress(), vec![33, 66, 100]);
    }

    #[tokio::test]
    async fn test_mock_failure_before_first_chunk() {
        let adapter = MockAdapter::failing(
            Platform::Youtube,
            PlatformError::Authentication("bad token".to_string()),
        );
        let content = PlatformContent::default();
        let options = UploadOptions::default();
        let media = passthrough(&adapter).await;

        let progress = |_: u8| {};
        let result = adapter
            .upload(&media, &request_fixture(&content, &options), &progress)
            .await;

        assert!(result.is_err());
        assert!(adapter.reported_progress().is_empty());
    }

    #[tokio::test]
    async fn test_mock_failure_mid_transfer_keeps_reported_progress() {
        let adapter = MockAdapter::failing_after_chunk(
            Platform::Instagram,
            1,
            PlatformError::Rejection("chunk 2 refused".to_string()),
        );
        let content = PlatformContent::default();
        let options = UploadOptions::default();
        let media = passthrough(&adapter).await;

        let progress = |_: u8| {};
        let result = adapter
            .upload(&media, &request_fixture(&content, &options), &progress)
            .await;

        assert!(result.is_err());
        assert_eq!(adapter.reported_progress(), vec![33]);
    }

    #[tokio::test]
    async fn test_mock_records_uploaded_content() {
        let adapter = MockAdapter::success(Platform::Tiktok);
        let content = PlatformContent {
            title: "Recorded".to_string(),
            description: String::new(),
            hashtags: vec![],
        };
        let options = UploadOptions::default();
        let media = passthrough(&adapter).await;

        let progress = |_: u8| {};
        adapter
            .upload(&media, &request_fixture(&content, &options), &progress)
            .await
            .unwrap();

        assert_eq!(adapter.uploaded_content(), vec![content]);
    }

    #[tokio::test]
    async fn test_mock_status_snapshot() {
        let adapter = MockAdapter::success(Platform::Youtube);
        let snapshot = adapter.get_status("personal", "some-id").await.unwrap();
        assert_eq!(snapshot["state"], "processed");
    }
}
