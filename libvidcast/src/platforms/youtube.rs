//! YouTube platform adapter
//!
//! Publishes Shorts through the resumable upload protocol: the metadata POST
//! opens a session and returns the upload location, the chunks go PUT
//! against that location with explicit byte ranges, and a final zero-byte
//! `bytes */total` PUT completes the session and returns the video resource.

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

const DEFAULT_API_BASE: &str = "https://www.googleapis.com/upload/youtube/v3";

const PRIVACY_OPTIONS: &[&str] = &["public", "private", "unlisted"];

// Shorts: vertical, at most 60 seconds, at least 1080 wide
static CONSTRAINTS: PlatformConstraints = PlatformConstraints {
    max_duration_secs: 60.0,
    max_file_size: 256 * 1024 * 1024 * 1024,
    allowed_aspect_ratios: &[AspectRatio::new(9, 16)],
    min_width: Some(1080),
    max_width: None,
    min_height: None,
    max_height: None,
    supported_formats: &["mp4", "mov", "avi", "mkv"],
    video_bitrate: "8000k",
    audio_bitrate: "192k",
    fallback_video_bitrate: "4000k",
    fallback_audio_bitrate: "128k",
};

#[derive(Debug, Deserialize)]
struct VideoResource {
    id: String,
}

pub struct YoutubeAdapter {
    client: reqwest::Client,
    api_base: String,
    credentials: Arc<dyn CredentialProvider>,
    media: MediaProcessor,
}

impl YoutubeAdapter {
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

    /// Shorts are surfaced by the #Shorts tag; add it where missing.
    fn shorts_tagged(content: &PlatformContent) -> PlatformContent {
        let mut tagged = content.clone();
        if !tagged.title.contains("#Shorts") {
            tagged.title = format!("{} #Shorts", tagged.title.trim()).trim().to_string();
        }
        if !tagged.description.contains("#Shorts") {
            tagged.description = format!("{}\n\n#Shorts", tagged.description);
        }
        if !tagged.hashtags.iter().any(|t| t == "Shorts" || t == "#Shorts") {
            tagged.hashtags.push("Shorts".to_string());
        }
        tagged
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
            .get_credentials(Platform::Youtube, request.account)
            .await?;

        let content = Self::shorts_tagged(request.content);
        let options = request.options;

        let mut metadata = serde_json::json!({
            "snippet": {
                "title": content.title,
                "description": content.description,
                "tags": content.hashtags,
                "categoryId": "22",
                "defaultLanguage": "en",
            },
            "status": {
                "privacyStatus": options.privacy,
                "selfDeclaredMadeForKids": false,
            },
        });
        if let Some(publish_at) = options.publish_at {
            metadata["status"]["publishAt"] = publish_at.into();
        }
        let body = metadata.as_object_mut().expect("metadata is an object");
        for (key, value) in &options.extra {
            body.insert(key.clone(), value.clone());
        }

        let client = &self.client;
        let api_base = self.api_base.as_str();
        let token = credential.access_token.as_str();
        let metadata = &metadata;

        // Step 1: open the resumable session; the upload location comes back
        // in the Location header
        let upload_url = with_retry("YouTube session init", || async move {
            let response = client
                .post(format!(
                    "{}/videos?uploadType=resumable&part=snippet,status",
                    api_base
                ))
                .bearer_auth(token)
                .json(metadata)
                .send()
                .await
                .map_err(|e| map_request_error(e, "YouTube session init"))?;

            let response = check_response(response, "YouTube session init").await?;
            response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.to_string())
                .ok_or_else(|| {
                    PlatformError::Network(
                        "YouTube session init returned no upload location".to_string(),
                    )
                    .into()
                })
        })
        .await?;

        // Step 2: chunked transfer against the session location
        let sink = YoutubeChunkSink {
            client: &self.client,
            upload_url: &upload_url,
            access_token: &credential.access_token,
        };
        transfer_file(&media.path, &sink, progress).await?;

        // Step 3: a zero-byte range query completes the session and returns
        // the video resource
        let total = tokio::fs::metadata(&media.path)
            .await
            .map_err(|e| {
                PlatformError::Network(format!(
                    "Failed to stat {}: {}",
                    media.path.display(),
                    e
                ))
            })?
            .len();

        let upload_url = upload_url.as_str();
        let video: VideoResource = with_retry("YouTube finalize", || async move {
            let response = client
                .put(upload_url)
                .bearer_auth(token)
                .header("Content-Range", format!("bytes */{}", total))
                .send()
                .await
                .map_err(|e| map_request_error(e, "YouTube finalize"))?;

            check_response(response, "YouTube finalize")
                .await?
                .json()
                .await
                .map_err(|e| {
                    PlatformError::Network(format!("YouTube finalize response: {}", e)).into()
                })
        })
        .await?;

        Ok(PublishedMedia {
            url: format!("https://youtube.com/shorts/{}", video.id),
            remote_id: video.id,
        })
    }
}

struct YoutubeChunkSink<'a> {
    client: &'a reqwest::Client,
    upload_url: &'a str,
    access_token: &'a str,
}

#[async_trait]
impl ChunkSink for YoutubeChunkSink<'_> {
    async fn send_chunk(&self, chunk: Vec<u8>, range: ByteRange, total: u64) -> Result<()> {
        let response = self
            .client
            .put(self.upload_url)
            .bearer_auth(self.access_token)
            .header("Content-Range", range.content_range(total))
            .header("Content-Type", "video/mp4")
            .body(chunk)
            .send()
            .await
            .map_err(|e| map_request_error(e, "YouTube chunk upload"))?;

        check_response(response, "YouTube chunk upload").await?;
        Ok(())
    }
}

#[async_trait]
impl PlatformAdapter for YoutubeAdapter {
    fn platform(&self) -> Platform {
        Platform::Youtube
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
            .get_credentials(Platform::Youtube, account)
            .await?;

        let client = &self.client;
        let api_base = self.api_base.as_str();
        let token = credential.access_token.as_str();

        let snapshot: serde_json::Value = with_retry("YouTube status query", || async move {
            let response = client
                .get(format!("{}/videos", api_base))
                .bearer_auth(token)
                .query(&[
                    ("part", "status,processingDetails,statistics"),
                    ("id", remote_id),
                ])
                .send()
                .await
                .map_err(|e| map_request_error(e, "YouTube status query"))?;

            check_response(response, "YouTube status query")
                .await?
                .json()
                .await
                .map_err(|e| {
                    PlatformError::Network(format!("YouTube status response: {}", e)).into()
                })
        })
        .await?;

        Ok(snapshot
            .get("items")
            .and_then(|items| items.get(0))
            .cloned()
            .unwrap_or(serde_json::Value::Null))
    }
}
