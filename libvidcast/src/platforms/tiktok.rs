//! TikTok platform adapter
//!
//! Publishes through the open API's three-step flow: open an upload session,
//! PUT the chunks against the returned upload URL, then publish with the
//! caption and permission flags.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::PlatformConfig;
use crate::credentials::CredentialProvider;
use crate::error::{PlatformError, Result};
use crate::media::{AspectRatio, MediaProcessor, PlatformConstraints, PreparedMedia};
use crate::transfer::{
    check_response, map_request_error, transfer_file, with_retry, ByteRange, ChunkSink,
    ProgressFn,
};
use crate::types::Platform;

use super::{PlatformAdapter, PublishedMedia, UploadRequest};

const DEFAULT_API_BASE: &str = "https://open.tiktokapis.com/v2";

const PRIVACY_OPTIONS: &[&str] = &["public", "private", "friends"];

static CONSTRAINTS: PlatformConstraints = PlatformConstraints {
    max_duration_secs: 180.0,
    max_file_size: 512 * 1024 * 1024,
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

#[derive(Debug, Deserialize)]
struct InitResponse {
    data: InitData,
}

#[derive(Debug, Deserialize)]
struct InitData {
    upload_id: String,
    upload_url: String,
}

#[derive(Debug, Deserialize)]
struct PublishResponse {
    data: PublishData,
}

#[derive(Debug, Deserialize)]
struct PublishData {
    video_id: String,
    creator_username: String,
}

pub struct TiktokAdapter {
    client: reqwest::Client,
    api_base: String,
    credentials: Arc<dyn CredentialProvider>,
    media: MediaProcessor,
}

impl TiktokAdapter {
    pub fn new(
        config: &PlatformConfig,
        credentials: Arc<dyn CredentialProvider>,
        media: MediaProcessor,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: config
                .api_base
                .clone()
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            credentials,
            media,
        }
    }

    async fn perform_upload(
        &self,
        media: &PreparedMedia,
        request: &UploadRequest<'_>,
        progress: ProgressFn<'_>,
    ) -> Result<PublishedMedia> {
        if !PRIVACY_OPTIONS.contains(&request.options.privacy.as_str()) {
            return Err(PlatformError::Validation(format!(
                "Invalid privacy setting '{}'. Must be one of: {}",
                request.options.privacy,
                PRIVACY_OPTIONS.join(", ")
            ))
            .into());
        }

        let credential = self
            .credentials
            .get_credentials(Platform::Tiktok, request.account)
            .await?;

        let client = &self.client;
        let api_base = self.api_base.as_str();
        let token = credential.access_token.as_str();

        // Step 1: open the upload session
        let init: InitResponse = with_retry("TikTok session init", || async move {
            let response = client
                .post(format!("{}/video/upload/", api_base))
                .bearer_auth(token)
                .send()
                .await
                .map_err(|e| map_request_error(e, "TikTok session init"))?;

            check_response(response, "TikTok session init")
                .await?
                .json()
                .await
                .map_err(|e| {
                    PlatformError::Network(format!("TikTok session init response: {}", e)).into()
                })
        })
        .await?;

        // Step 2: chunked transfer against the session upload URL
        let sink = TiktokChunkSink {
            client: &self.client,
            upload_url: &init.data.upload_url,
        };
        transfer_file(&media.path, &sink, progress).await?;

        // Step 3: publish with caption and permission flags
        let options = request.options;
        let mut payload = serde_json::json!({
            "upload_id": init.data.upload_id,
            "title": request.content.title,
            "hashtags": request.content.hashtags,
            "privacy_level": options.privacy.to_uppercase(),
            "disable_comments": !options.allow_comments,
            "disable_duet": !options.allow_duets,
            "disable_stitch": !options.allow_stitch,
        });
        let body = payload.as_object_mut().expect("payload is an object");
        if let Some(publish_at) = options.publish_at {
            body.insert("schedule_time".to_string(), publish_at.into());
        }
        if !options.mentions.is_empty() {
            body.insert(
                "mentions".to_string(),
                serde_json::json!(options.mentions),
            );
        }
        if let Some(partner) = &options.branded_content {
            body.insert(
                "brand_content_info".to_string(),
                serde_json::json!({ "partner": partner }),
            );
        }
        for (key, value) in &options.extra {
            body.insert(key.clone(), value.clone());
        }

        let payload = &payload;
        let published: PublishResponse = with_retry("TikTok publish", || async move {
            let response = client
                .post(format!("{}/video/publish/", api_base))
                .bearer_auth(token)
                .json(payload)
                .send()
                .await
                .map_err(|e| map_request_error(e, "TikTok publish"))?;

            check_response(response, "TikTok publish")
                .await?
                .json()
                .await
                .map_err(|e| {
                    PlatformError::Network(format!("TikTok publish response: {}", e)).into()
                })
        })
        .await?;

        Ok(PublishedMedia {
            url: format!(
                "https://tiktok.com/@{}/video/{}",
                published.data.creator_username, published.data.video_id
            ),
            remote_id: published.data.video_id,
        })
    }
}

struct TiktokChunkSink<'a> {
    client: &'a reqwest::Client,
    upload_url: &'a str,
}

#[async_trait]
impl ChunkSink for TiktokChunkSink<'_> {
    async fn send_chunk(&self, chunk: Vec<u8>, range: ByteRange, total: u64) -> Result<()> {
        let response = self
            .client
            .put(self.upload_url)
            .header("Content-Range", range.content_range(total))
            .header("Content-Type", "video/mp4")
            .body(chunk)
            .send()
            .await
            .map_err(|e| map_request_error(e, "TikTok chunk upload"))?;

        check_response(response, "TikTok chunk upload").await?;
        Ok(())
    }
}

#[async_trait]
impl PlatformAdapter for TiktokAdapter {
    fn platform(&self) -> Platform {
        Platform::Tiktok
    }

    fn constraints(&self) -> &PlatformConstraints {
        &CONSTRAINTS
    }

    async fn prepare_media(&self, path: &std::path::Path) -> Result<PreparedMedia> {
        self.media.prepare(path, &CONSTRAINTS).await
    }

    async fn upload(
        &self,
        media: &PreparedMedia,
        request: &UploadRequest<'_>,
        progress: ProgressFn<'_>,
    ) -> Result<PublishedMedia> {
        let result = self.perform_upload(media, request, progress).await;
        media.cleanup().await;
        result
    }

    async fn get_status(&self, account: &str, remote_id: &str) -> Result<serde_json::Value> {
        let credential = self
            .credentials
            .get_credentials(Platform::Tiktok, account)
            .await?;

        let client = &self.client;
        let api_base = self.api_base.as_str();
        let token = credential.access_token.as_str();

        let snapshot: serde_json::Value = with_retry("TikTok status query", || async move {
            let response = client
                .get(format!("{}/video/query/", api_base))
                .bearer_auth(token)
                .query(&[("video_id", remote_id)])
                .send()
                .await
                .map_err(|e| map_request_error(e, "TikTok status query"))?;

            check_response(response, "TikTok status query")
                .await?
                .json()
                .await
                .map_err(|e| {
                    PlatformError::Network(format!("TikTok status response: {}", e)).into()
                })
        })
        .await?;

        Ok(snapshot
            .get("data")
            .cloned()
            .unwrap_or(snapshot))
    }
}
