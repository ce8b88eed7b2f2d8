//! Platform abstraction and implementations
//!
//! This module provides a unified adapter trait for publishing one video to
//! different social-media platforms. Every adapter follows the same shape:
//! validate the container format, condition the media against the platform's
//! constraint table, move the bytes in chunks with retry, then finalize with
//! the generated content and platform-specific flags. Only the remote
//! handshake and payload shape differ per platform.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::Config;
use crate::credentials::{CredentialProvider, FileCredentialProvider};
use crate::error::Result;
use crate::media::{validate_container, MediaProcessor, PlatformConstraints, PreparedMedia};
use crate::transfer::ProgressFn;
use crate::types::{Platform, PlatformContent};

pub mod instagram;
pub mod tiktok;
pub mod youtube;

// Mock adapter is available for all builds (not just tests) to support
// integration tests
pub mod mock;

/// Per-upload flags forwarded to the platform on finalize.
///
/// Platforms ignore the flags they have no concept of; anything truly
/// one-off travels in the open-ended `extra` map.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// Privacy selector; each platform validates against its own set.
    pub privacy: String,
    pub allow_comments: bool,
    pub allow_duets: bool,
    pub allow_stitch: bool,
    /// Remote-side publish time hint (Unix timestamp).
    pub publish_at: Option<i64>,
    /// Accounts to mention/tag on platforms that support it.
    pub mentions: Vec<String>,
    /// Branded-content partner identifier.
    pub branded_content: Option<String>,
    /// Open-ended additional metadata merged into the finalize payload.
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            privacy: "private".to_string(),
            allow_comments: true,
            allow_duets: true,
            allow_stitch: true,
            publish_at: None,
            mentions: Vec::new(),
            branded_content: None,
            extra: serde_json::Map::new(),
        }
    }
}

/// One platform upload request: generated content plus account and flags.
#[derive(Debug, Clone)]
pub struct UploadRequest<'a> {
    pub content: &'a PlatformContent,
    pub account: &'a str,
    pub options: &'a UploadOptions,
}

/// A successfully published video.
#[derive(Debug, Clone)]
pub struct PublishedMedia {
    /// Platform-side identifier of the published media.
    pub remote_id: String,
    /// Public location of the published video.
    pub url: String,
}

/// Adapter trait implemented once per platform.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    /// Which platform this adapter publishes to.
    fn platform(&self) -> Platform;

    /// The platform's fixed format constraints.
    fn constraints(&self) -> &PlatformConstraints;

    /// Reject containers the platform does not accept.
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::Validation` when the file extension is not in
    /// the platform's supported set.
    fn validate_format(&self, path: &Path) -> Result<()> {
        validate_container(path, self.constraints())
    }

    /// Condition the source file against the platform constraints.
    ///
    /// Returns the path actually used (the original for conforming files)
    /// plus the audit list of modifications applied.
    async fn prepare_media(&self, path: &Path) -> Result<PreparedMedia>;

    /// Transfer and publish the prepared media.
    ///
    /// Performs the platform handshake, moves the file in 5 MiB chunks with
    /// per-chunk retry (reporting progress after each chunk), finalizes with
    /// the request content and flags, and removes any temporary conditioned
    /// file before returning, on success and on error alike.
    ///
    /// # Errors
    ///
    /// `Rejection` for 4xx platform responses (never retried, platform
    /// payload preserved), `Network` once transient retries are exhausted,
    /// `Validation`/`Authentication` for bad selectors or credentials.
    async fn upload(
        &self,
        media: &PreparedMedia,
        request: &UploadRequest<'_>,
        progress: ProgressFn<'_>,
    ) -> Result<PublishedMedia>;

    /// Read-only status snapshot of previously published media, for
    /// out-of-band reconciliation. Not called on the normal upload path.
    async fn get_status(&self, account: &str, remote_id: &str) -> Result<serde_json::Value>;
}

/// Create adapter instances for all enabled platforms in the configuration.
///
/// # Errors
///
/// Returns an error when an enabled platform section is unusable (e.g. an
/// invalid API base URL).
pub async fn create_adapters(config: &Config) -> Result<Vec<Arc<dyn PlatformAdapter>>> {
    let mut adapters: Vec<Arc<dyn PlatformAdapter>> = Vec::new();

    let credentials: Arc<dyn CredentialProvider> =
        Arc::new(FileCredentialProvider::from_config(config));
    let media = MediaProcessor::new(config.media.clone());

    if let Some(youtube_config) = &config.youtube {
        if youtube_config.enabled {
            info!("Creating YouTube platform adapter");
            adapters.push(Arc::new(youtube::YoutubeAdapter::new(
                youtube_config,
                credentials.clone(),
                media.clone(),
            )));
        }
    }

    if let Some(instagram_config) = &config.instagram {
        if instagram_config.enabled {
            info!("Creating Instagram platform adapter");
            adapters.push(Arc::new(instagram::InstagramAdapter::new(
                instagram_config,
                credentials.clone(),
                media.clone(),
            )));
        }
    }

    if let Some(tiktok_config) = &config.tiktok {
        if tiktok_config.enabled {
            info!("Creating TikTok platform adapter");
            adapters.push(Arc::new(tiktok::TiktokAdapter::new(
                tiktok_config,
                credentials.clone(),
                media.clone(),
            )));
        }
    }

    if adapters.is_empty() {
        warn!("No platforms are enabled in configuration");
    } else {
        info!("Created {} platform adapter(s)", adapters.len());
    }

    Ok(adapters)
}
