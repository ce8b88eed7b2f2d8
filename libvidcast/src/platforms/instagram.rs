//! Instagram platform adapter
//!
//! Publishes Reels through the Graph API flow: create a media container for
//! the account, POST the chunks against the container upload URL, then
//! publish the container. The caption is assembled from the generated title,
//! description, and hashtags.

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
use crate::types::{Platform, PlatformContent};

use super::{PlatformAdapter, PublishedMedia, UploadRequest};

const DEFAULT_API_BASE: &str = "https://graph.instagram.com/v18.0";

// Reels only accepts vertical video
static CONSTRAINTS: PlatformConstraints = PlatformConstraints {
    max_duration_secs: 90.0,
    max_file_size: 250 * 1024 * 1024,
    allowed_aspect_ratios: &[AspectRatio::new(9, 16)],
    min_width: Some(720),
    max_width: Some(1080),
    min_height: Some(1280),
    max_height: Some(1920),
    supported_formats: &["mp4", "mov"],
    video_bitrate: "8000k",
    audio_bitrate: "192k",
    fallback_video_bitrate: "4000k",
    fallback_audio_bitrate: "128k",
};

#[derive(Debug, Deserialize)]
struct ContainerResponse {
    id: String,
    upload_url: String,
}

#[derive(Debug, Deserialize)]
struct PublishResponse {
    id: String,
}

pub struct InstagramAdapter {
    client: reqwest::Client,
    api_base: String,
    credentials: Arc<dyn CredentialProvider>,
    media: MediaProcessor,
}

impl InstagramAdapter {
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

    /// Reels carry one caption; title, description, and hashtags fold into it.
    fn build_caption(content: &PlatformContent) -> String {
        let mut parts = Vec::new();
        if !content.title.is_empty() {
            parts.push(content.title.clone());
        }
        if !content.description.is_empty() {
            parts.push(content.description.clone());
        }
        if !content.hashtags.is_empty() {
            parts.push(content.hashtags.join(" "));
        }
        parts.join("\n\n")
    }

    async fn perform_upload(
        &self,
        media: &PreparedMedia,
        request: &UploadRequest<'_>,
        progress: ProgressFn<'_>,
    ) -> Result<PublishedMedia> {
        let credential = self
            .credentials
            .get_credentials(Platform::Instagram, request.account)
            .await?;
        let user_id = credential.user_id.clone().ok_or_else(|| {
            PlatformError::Validation(format!(
                "Instagram account '{}' has no user_id configured",
                request.account
            ))
        })?;

        let caption = Self::build_caption(request.content);

        let client = &self.client;
        let api_base = self.api_base.as_str();
        let token = credential.access_token.as_str();
        let user_id = user_id.as_str();
        let caption = caption.as_str();

        // Step 1: create the media container
        let container: ContainerResponse = with_retry("Instagram container create", || async move {
            let response = client
                .post(format!("{}/{}/media", api_base, user_id))
                .query(&[
                    ("access_token", token),
                    ("media_type", "REELS"),
                    ("caption", caption),
                    ("share_to_feed", "true"),
                ])
                .send()
                .await
                .map_err(|e| map_request_error(e, "Instagram container create"))?;

            check_response(response, "Instagram container create")
                .await?
                .json()
                .await
                .map_err(|e| {
                    PlatformError::Network(format!("Instagram container response: {}", e)).into()
                })
        })
        .await?;

        // Step 2: chunked transfer against the container upload URL
        let sink = InstagramChunkSink {
            client: &self.client,
            upload_url: &container.upload_url,
        };
        transfer_file(&media.path, &sink, progress).await?;

        // Step 3: publish the container
        let options = request.options;
        let mut payload = serde_json::json!({
            "creation_id": container.id,
            "share_to_feed": true,
        });
        let body = payload.as_object_mut().expect("payload is an object");
        if !options.mentions.is_empty() {
            body.insert(
                "user_tags".to_string(),
                serde_json::json!(options.mentions),
            );
        }
        if let Some(partner) = &options.branded_content {
            body.insert(
                "branded_content_partner_id".to_string(),
                serde_json::json!(partner),
            );
        }
        for (key, value) in &options.extra {
            body.insert(key.clone(), value.clone());
        }

        let payload = &payload;
        let published: PublishResponse = with_retry("Instagram publish", || async move {
            let response = client
                .post(format!("{}/{}/media_publish", api_base, user_id))
                .query(&[("access_token", token)])
                .json(payload)
                .send()
                .await
                .map_err(|e| map_request_error(e, "Instagram publish"))?;

            check_response(response, "Instagram publish")
                .await?
                .json()
                .await
                .map_err(|e| {
                    PlatformError::Network(format!("Instagram publish response: {}", e)).into()
                })
        })
        .await?;

        Ok(PublishedMedia {
            url: format!("https://instagram.com/reel/{}", published.id),
            remote_id: published.id,
        })
    }
}

struct InstagramChunkSink<'a> {
    client: &'a reqwest::Client,
    upload_url: &'a str,
}

#[async_trait]
impl ChunkSink for InstagramChunkSink<'_> {
    async fn send_chunk(&self, chunk: Vec<u8>, range: ByteRange, total: u64) -> Result<()> {
        let response = self
            .client
            .post(self.upload_url)
            .header("Content-Range", range.content_range(total))
            .header("Content-Type", "video/mp4")
            .body(chunk)
            .send()
            .await
            .map_err(|e| map_request_error(e, "Instagram chunk upload"))?;

        check_response(response, "Instagram chunk upload").await?;
        Ok(())
    }
}

#[async_trait]
impl PlatformAdapter for InstagramAdapter {
    fn platform(&self) -> Platform {
        Platform::Instagram
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
            .get_credentials(Platform::Instagram, account)
            .await?;

        let client = &self.client;
        let api_base = self.api_base.as_str();
        let token = credential.access_token.as_str();

        with_retry("Instagram status query", || async move {
            let response = client
                .get(format!("{}/{}", api_base, remote_id))
                .query(&[
                    ("access_token", token),
                    (
                        "fields",
                        "id,media_type,media_url,thumbnail_url,permalink,timestamp,caption",
                    ),
                ])
                .send()
                .await
                .map_err(|e| map_request_error(e, "Instagram status query"))?;

            check_response(response, "Instagram status query")
                .await?
                .json()
                .await
                .map_err(|e| {
                    PlatformError::Network(format!("Instagram status response: {}", e)).into()
                })
        })
        .await
    }
}
