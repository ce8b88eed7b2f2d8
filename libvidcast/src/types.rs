//! Core types for Vidcast

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state shared by uploads and their per-platform children.
///
/// An upload moves `Draft -> {Queued, Scheduled, Uploading} -> {Completed,
/// Failed}`. A platform child moves `Draft -> Uploading -> {Completed,
/// Failed}`. Both terminal states are terminal for one attempt only; a
/// failed upload may be sent back to the start externally.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Draft,
    Queued,
    Scheduled,
    Uploading,
    Completed,
    Failed,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Queued => "queued",
            Self::Scheduled => "scheduled",
            Self::Uploading => "uploading",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// True once this attempt can no longer make progress.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PostStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "queued" => Ok(Self::Queued),
            "scheduled" => Ok(Self::Scheduled),
            "uploading" => Ok(Self::Uploading),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Unknown post status: '{}'", s)),
        }
    }
}

/// The platforms a video can be published to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Youtube,
    Instagram,
    Tiktok,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Youtube => "youtube",
            Self::Instagram => "instagram",
            Self::Tiktok => "tiktok",
        }
    }

    pub const ALL: [Platform; 3] = [Platform::Youtube, Platform::Instagram, Platform::Tiktok];
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "youtube" => Ok(Self::Youtube),
            "instagram" => Ok(Self::Instagram),
            "tiktok" => Ok(Self::Tiktok),
            _ => Err(format!("Unknown platform: '{}'", s)),
        }
    }
}

/// Generated text for one platform, produced by the content generation
/// collaborator before submission.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlatformContent {
    pub title: String,
    pub description: String,
    pub hashtags: Vec<String>,
}

/// One submitted video destined for zero or more platforms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Upload {
    pub id: String,
    pub video_path: String,
    /// Opaque analysis result from the video analysis collaborator.
    pub analysis: Option<serde_json::Value>,
    pub created_at: i64,
    /// Set when the upload is scheduled; mutually exclusive with
    /// `queue_position`.
    pub scheduled_time: Option<i64>,
    /// Set when the upload sits in the manual queue; mutually exclusive with
    /// `scheduled_time`.
    pub queue_position: Option<i64>,
    pub status: PostStatus,
    /// Per-platform generated content, keyed by platform name.
    pub content: HashMap<Platform, PlatformContent>,
    /// Last orchestration-level error. Platform failures live on the
    /// platform rows, not here.
    pub error: Option<String>,
}

impl Upload {
    pub fn new(video_path: String, analysis: Option<serde_json::Value>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            video_path,
            analysis,
            created_at: chrono::Utc::now().timestamp(),
            scheduled_time: None,
            queue_position: None,
            status: PostStatus::Draft,
            content: HashMap::new(),
            error: None,
        }
    }
}

/// One platform's publication attempt and outcome.
///
/// Exactly one orchestrator task writes to a given row during a run, so the
/// row needs no locking beyond SQLite's per-write atomicity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformStatus {
    /// Database row ID (None for records not yet inserted)
    pub id: Option<i64>,
    pub upload_id: String,
    pub platform: Platform,
    /// Logical account selector, e.g. "personal" or "charity".
    pub account: String,
    pub status: PostStatus,
    /// 0-100, non-decreasing while uploading; 100 on completed, reset to 0
    /// on failed.
    pub progress: i64,
    /// Published location, set only on success.
    pub url: Option<String>,
    pub error: Option<String>,
    /// The platform-specific slice of `Upload.content`.
    pub content: Option<PlatformContent>,
}

impl PlatformStatus {
    /// Create a fresh draft row for a platform selected on an upload.
    pub fn new_draft(
        upload_id: String,
        platform: Platform,
        account: String,
        content: Option<PlatformContent>,
    ) -> Self {
        Self {
            id: None,
            upload_id,
            platform,
            account,
            status: PostStatus::Draft,
            progress: 0,
            url: None,
            error: None,
            content,
        }
    }
}
