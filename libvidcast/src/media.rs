//! Media probing and conditioning
//!
//! Each platform declares its constraints (duration, aspect ratios, size,
//! dimension envelope, containers) in a [`PlatformConstraints`] table; one
//! shared algorithm inspects the source with ffprobe and, when a constraint
//! is violated, produces a single re-encoded copy: center-crop to the
//! nearest allowed aspect ratio, scale into the dimension envelope, trim to
//! the maximum duration, encode at the platform's target bitrate. If the
//! result still exceeds the size cap it is re-encoded once more at a reduced
//! bitrate. A file already within constraints passes through untouched.
//!
//! Planning is pure and fully testable; only [`MediaProcessor`] shells out
//! to ffprobe/ffmpeg.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::MediaConfig;
use crate::error::{PlatformError, Result};

/// How far a source ratio may drift from an allowed ratio before cropping.
pub const ASPECT_TOLERANCE: f64 = 0.1;

/// A width:height aspect ratio, e.g. 9:16 for vertical video.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AspectRatio {
    pub width: u32,
    pub height: u32,
}

impl AspectRatio {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn value(&self) -> f64 {
        self.width as f64 / self.height as f64
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.width, self.height)
    }
}

/// Fixed format constraints for one platform variant.
#[derive(Debug, Clone)]
pub struct PlatformConstraints {
    pub max_duration_secs: f64,
    pub max_file_size: u64,
    pub allowed_aspect_ratios: &'static [AspectRatio],
    pub min_width: Option<u32>,
    pub max_width: Option<u32>,
    pub min_height: Option<u32>,
    pub max_height: Option<u32>,
    pub supported_formats: &'static [&'static str],
    pub video_bitrate: &'static str,
    pub audio_bitrate: &'static str,
    pub fallback_video_bitrate: &'static str,
    pub fallback_audio_bitrate: &'static str,
}

impl PlatformConstraints {
    /// The allowed ratio nearest to the source, or None when the source is
    /// already within tolerance of one.
    pub fn nearest_aspect(&self, width: u32, height: u32) -> Option<AspectRatio> {
        let current = width as f64 / height as f64;

        if self
            .allowed_aspect_ratios
            .iter()
            .any(|r| (current - r.value()).abs() <= ASPECT_TOLERANCE)
        {
            return None;
        }

        self.allowed_aspect_ratios
            .iter()
            .min_by(|a, b| {
                let da = (current - a.value()).abs();
                let db = (current - b.value()).abs();
                da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
            })
            .copied()
    }
}

/// Container-extension check against a platform's supported set.
pub fn validate_container(path: &Path, constraints: &PlatformConstraints) -> Result<()> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    if !constraints.supported_formats.contains(&extension.as_str()) {
        return Err(PlatformError::Validation(format!(
            "Unsupported video format: .{}. Supported formats: {}",
            extension,
            constraints
                .supported_formats
                .iter()
                .map(|f| format!(".{}", f))
                .collect::<Vec<_>>()
                .join(", ")
        ))
        .into());
    }

    Ok(())
}

/// What ffprobe reports about a source file.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    pub duration_secs: f64,
    pub width: u32,
    pub height: u32,
    pub size_bytes: u64,
    pub has_audio: bool,
}

/// The transformations one conditioning pass will apply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConditioningPlan {
    /// Center-crop target dimensions.
    pub crop: Option<(u32, u32)>,
    /// Scale target dimensions (applied after the crop).
    pub scale: Option<(u32, u32)>,
    /// Trim to this many seconds from the start.
    pub trim_to: Option<f64>,
    /// Source exceeds the size cap, so a re-encode is required even without
    /// geometric changes.
    pub oversized: bool,
}

impl ConditioningPlan {
    pub fn requires_encode(&self) -> bool {
        self.crop.is_some() || self.scale.is_some() || self.trim_to.is_some() || self.oversized
    }
}

// libx264 requires even dimensions
fn even(value: f64) -> u32 {
    let rounded = value.round() as u32;
    (rounded - rounded % 2).max(2)
}

/// Compute the conditioning needed to bring `info` within `constraints`.
pub fn plan_conditioning(info: &MediaInfo, constraints: &PlatformConstraints) -> ConditioningPlan {
    let mut plan = ConditioningPlan::default();

    let (mut width, mut height) = (info.width, info.height);

    if let Some(target) = constraints.nearest_aspect(width, height) {
        let current = width as f64 / height as f64;
        if current > target.value() {
            // Too wide: crop the width, keep the height
            width = even(height as f64 * target.value());
        } else {
            // Too tall: crop the height, keep the width
            height = even(width as f64 / target.value());
        }
        plan.crop = Some((width, height));
    }

    if let Some(scaled) = scale_into_bounds(width, height, constraints) {
        plan.scale = Some(scaled);
    }

    if info.duration_secs > constraints.max_duration_secs {
        plan.trim_to = Some(constraints.max_duration_secs);
    }

    if info.size_bytes > constraints.max_file_size {
        plan.oversized = true;
    }

    plan
}

/// Scale `width`x`height` into the constraint envelope preserving aspect
/// ratio. Returns None when the dimensions already fit.
fn scale_into_bounds(
    width: u32,
    height: u32,
    constraints: &PlatformConstraints,
) -> Option<(u32, u32)> {
    let mut scale = 1.0;

    if let Some(min_width) = constraints.min_width {
        if width < min_width {
            scale = min_width as f64 / width as f64;
        }
    }
    if let Some(max_width) = constraints.max_width {
        if width > max_width {
            scale = max_width as f64 / width as f64;
        }
    }

    let mut new_width = width as f64 * scale;
    let mut new_height = height as f64 * scale;

    if let Some(max_height) = constraints.max_height {
        if new_height > max_height as f64 {
            let correction = max_height as f64 / new_height;
            new_width *= correction;
            new_height *= correction;
        }
    }
    if let Some(min_height) = constraints.min_height {
        if new_height < min_height as f64 {
            let correction = min_height as f64 / new_height;
            new_width *= correction;
            new_height *= correction;
        }
    }

    let result = (even(new_width), even(new_height));
    if result == (width, height) {
        None
    } else {
        Some(result)
    }
}

/// A source file conditioned (or passed through) for one platform.
#[derive(Debug, Clone)]
pub struct PreparedMedia {
    /// The file to transfer: the original path when no conditioning was
    /// needed, otherwise a temporary re-encoded copy.
    pub path: PathBuf,
    pub source: PathBuf,
    /// Audit trail of every modification applied; empty for a passthrough.
    pub modifications: Vec<String>,
    pub info: MediaInfo,
}

impl PreparedMedia {
    /// Passthrough for a file already within constraints.
    pub fn passthrough(path: &Path, info: MediaInfo) -> Self {
        Self {
            path: path.to_path_buf(),
            source: path.to_path_buf(),
            modifications: Vec::new(),
            info,
        }
    }

    pub fn is_conditioned(&self) -> bool {
        self.path != self.source
    }

    /// Remove the temporary conditioned copy, if one was created.
    ///
    /// Called by adapters on both the success and the error path so failed
    /// uploads never leak local disk state.
    pub async fn cleanup(&self) {
        if !self.is_conditioned() {
            return;
        }
        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            warn!(
                "Failed to remove conditioned file {}: {}",
                self.path.display(),
                e
            );
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: ProbeFormat,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
    size: Option<String>,
}

/// Drives the external ffprobe/ffmpeg binaries.
#[derive(Debug, Clone)]
pub struct MediaProcessor {
    config: MediaConfig,
}

impl MediaProcessor {
    pub fn new(config: MediaConfig) -> Self {
        Self { config }
    }

    /// Inspect duration, dimensions, size, and audio presence.
    pub async fn probe(&self, path: &Path) -> Result<MediaInfo> {
        let output = Command::new(&self.config.ffprobe)
            .arg("-v")
            .arg("error")
            .arg("-print_format")
            .arg("json")
            .arg("-show_format")
            .arg("-show_streams")
            .arg(path)
            .output()
            .await
            .map_err(|e| {
                PlatformError::Conditioning(format!("Failed to run ffprobe: {}", e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PlatformError::Conditioning(format!(
                "ffprobe failed for {}: {}",
                path.display(),
                stderr.trim()
            ))
            .into());
        }

        let probe: ProbeOutput = serde_json::from_slice(&output.stdout).map_err(|e| {
            PlatformError::Conditioning(format!("Failed to parse ffprobe output: {}", e))
        })?;

        let video = probe
            .streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some("video"))
            .ok_or_else(|| {
                PlatformError::Conditioning(format!(
                    "No video stream found in {}",
                    path.display()
                ))
            })?;

        let has_audio = probe
            .streams
            .iter()
            .any(|s| s.codec_type.as_deref() == Some("audio"));

        let size_bytes = match probe.format.size.as_deref().and_then(|s| s.parse().ok()) {
            Some(size) => size,
            None => tokio::fs::metadata(path)
                .await
                .map_err(|e| {
                    PlatformError::Conditioning(format!(
                        "Failed to stat {}: {}",
                        path.display(),
                        e
                    ))
                })?
                .len(),
        };

        Ok(MediaInfo {
            duration_secs: probe
                .format
                .duration
                .as_deref()
                .and_then(|d| d.parse().ok())
                .unwrap_or(0.0),
            width: video.width.unwrap_or(0),
            height: video.height.unwrap_or(0),
            size_bytes,
            has_audio,
        })
    }

    /// Condition `path` for a platform, returning the file to transfer plus
    /// the list of modifications applied.
    ///
    /// Idempotent for conforming files: the original path comes back with an
    /// empty modification list and no temporary file is created.
    pub async fn prepare(
        &self,
        path: &Path,
        constraints: &PlatformConstraints,
    ) -> Result<PreparedMedia> {
        let info = self.probe(path).await?;
        let plan = plan_conditioning(&info, constraints);

        if !plan.requires_encode() {
            debug!("{} already satisfies constraints", path.display());
            return Ok(PreparedMedia::passthrough(path, info));
        }

        let output = std::env::temp_dir().join(format!("vidcast-{}.mp4", Uuid::new_v4()));
        let mut modifications = Vec::new();

        if let Some((w, h)) = plan.crop {
            modifications.push(format!("cropped to {}x{}", w, h));
        }
        if let Some((w, h)) = plan.scale {
            modifications.push(format!("scaled to {}x{}", w, h));
        }
        if let Some(t) = plan.trim_to {
            modifications.push(format!("trimmed to {}s", t));
        }
        modifications.push(format!("re-encoded at {}", constraints.video_bitrate));

        self.encode(
            path,
            &output,
            &plan,
            constraints.video_bitrate,
            constraints.audio_bitrate,
        )
        .await?;

        let encoded_size = tokio::fs::metadata(&output)
            .await
            .map_err(|e| {
                PlatformError::Conditioning(format!(
                    "Failed to stat encoded file {}: {}",
                    output.display(),
                    e
                ))
            })?
            .len();

        // One more pass at reduced bitrate when the first encode is still
        // over the cap; after that the file is used as-is.
        if encoded_size > constraints.max_file_size {
            self.encode(
                path,
                &output,
                &plan,
                constraints.fallback_video_bitrate,
                constraints.fallback_audio_bitrate,
            )
            .await?;
            modifications.push(format!(
                "re-encoded at reduced bitrate {} to meet the size limit",
                constraints.fallback_video_bitrate
            ));
        }

        Ok(PreparedMedia {
            path: output,
            source: path.to_path_buf(),
            modifications,
            info,
        })
    }

    async fn encode(
        &self,
        input: &Path,
        output: &Path,
        plan: &ConditioningPlan,
        video_bitrate: &str,
        audio_bitrate: &str,
    ) -> Result<()> {
        let mut cmd = Command::new(&self.config.ffmpeg);
        cmd.arg("-y").arg("-i").arg(input);

        let mut filters = Vec::new();
        if let Some((w, h)) = plan.crop {
            filters.push(format!("crop={}:{}", w, h));
        }
        if let Some((w, h)) = plan.scale {
            filters.push(format!("scale={}:{}", w, h));
        }
        if !filters.is_empty() {
            cmd.arg("-vf").arg(filters.join(","));
        }

        if let Some(trim_to) = plan.trim_to {
            cmd.arg("-t").arg(trim_to.to_string());
        }

        cmd.arg("-c:v")
            .arg("libx264")
            .arg("-b:v")
            .arg(video_bitrate)
            .arg("-c:a")
            .arg("aac")
            .arg("-b:a")
            .arg(audio_bitrate)
            .arg("-r")
            .arg("30")
            .arg(output);

        debug!("Encoding {} -> {}", input.display(), output.display());

        let result = cmd.output().await.map_err(|e| {
            PlatformError::Conditioning(format!("Failed to run ffmpeg: {}", e))
        })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(PlatformError::Conditioning(format!(
                "ffmpeg failed (code {:?}): {}",
                result.status.code(),
                stderr.trim()
            ))
            .into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERTICAL_ONLY: &[AspectRatio] = &[AspectRatio::new(9, 16)];
    const FLEXIBLE: &[AspectRatio] = &[
        AspectRatio::new(9, 16),
        AspectRatio::new(1, 1),
        AspectRatio::new(16, 9),
    ];

    fn reels_constraints() -> PlatformConstraints {
        PlatformConstraints {
            max_duration_secs: 90.0,
            max_file_size: 250 * 1024 * 1024,
            allowed_aspect_ratios: VERTICAL_ONLY,
            min_width: Some(720),
            max_width: Some(1080),
            min_height: Some(1280),
            max_height: Some(1920),
            supported_formats: &["mp4", "mov"],
            video_bitrate: "8000k",
            audio_bitrate: "192k",
            fallback_video_bitrate: "4000k",
            fallback_audio_bitrate: "128k",
        }
    }

    fn flexible_constraints() -> PlatformConstraints {
        PlatformConstraints {
            max_duration_secs: 180.0,
            max_file_size: 512 * 1024 * 1024,
            allowed_aspect_ratios: FLEXIBLE,
            min_width: None,
            max_width: None,
            min_height: None,
            max_height: None,
            supported_formats: &["mp4", "mov"],
            video_bitrate: "6000k",
            audio_bitrate: "128k",
            fallback_video_bitrate: "4000k",
            fallback_audio_bitrate: "96k",
        }
    }

    fn conforming_reel() -> MediaInfo {
        MediaInfo {
            duration_secs: 45.0,
            width: 1080,
            height: 1920,
            size_bytes: 40 * 1024 * 1024,
            has_audio: true,
        }
    }

    #[test]
    fn test_aspect_ratio_value() {
        assert!((AspectRatio::new(9, 16).value() - 0.5625).abs() < 1e-9);
        assert!((AspectRatio::new(16, 9).value() - 1.7777).abs() < 1e-3);
        assert!((AspectRatio::new(1, 1).value() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_validate_container_accepts_supported() {
        let constraints = reels_constraints();
        assert!(validate_container(Path::new("/videos/clip.mp4"), &constraints).is_ok());
        assert!(validate_container(Path::new("/videos/CLIP.MOV"), &constraints).is_ok());
    }

    #[test]
    fn test_validate_container_rejects_unsupported() {
        let constraints = reels_constraints();
        let result = validate_container(Path::new("/videos/clip.webm"), &constraints);

        match result {
            Err(crate::error::VidcastError::Platform(PlatformError::Validation(msg))) => {
                assert!(msg.contains(".webm"));
                assert!(msg.contains(".mp4"));
            }
            _ => panic!("Expected validation error"),
        }
    }

    #[test]
    fn test_validate_container_rejects_missing_extension() {
        let constraints = reels_constraints();
        assert!(validate_container(Path::new("/videos/clip"), &constraints).is_err());
    }

    #[test]
    fn test_plan_noop_for_conforming_file() {
        let plan = plan_conditioning(&conforming_reel(), &reels_constraints());

        assert_eq!(plan, ConditioningPlan::default());
        assert!(!plan.requires_encode());
    }

    #[test]
    fn test_plan_trims_long_video() {
        let mut info = conforming_reel();
        info.duration_secs = 120.0;

        let plan = plan_conditioning(&info, &reels_constraints());

        assert_eq!(plan.trim_to, Some(90.0));
        assert_eq!(plan.crop, None);
        assert_eq!(plan.scale, None);
        assert!(plan.requires_encode());
    }

    #[test]
    fn test_plan_crops_landscape_to_vertical() {
        let info = MediaInfo {
            duration_secs: 30.0,
            width: 1920,
            height: 1080,
            size_bytes: 10 * 1024 * 1024,
            has_audio: true,
        };

        let plan = plan_conditioning(&info, &reels_constraints());

        // 1920x1080 is wider than 9:16: crop the width to 1080 * 9/16 ~ 608
        let (crop_w, crop_h) = plan.crop.unwrap();
        assert_eq!(crop_h, 1080);
        assert_eq!(crop_w, 608);

        // Cropped 608x1080 is below the Reels envelope, so it scales up
        let (scale_w, scale_h) = plan.scale.unwrap();
        assert!(scale_w >= 720);
        assert!(scale_h >= 1280);
        // Aspect ratio preserved through the scale
        let cropped = crop_w as f64 / crop_h as f64;
        let scaled = scale_w as f64 / scale_h as f64;
        assert!((cropped - scaled).abs() < 0.05);
    }

    #[test]
    fn test_plan_keeps_square_video_on_flexible_platform() {
        let info = MediaInfo {
            duration_secs: 30.0,
            width: 1080,
            height: 1080,
            size_bytes: 10 * 1024 * 1024,
            has_audio: true,
        };

        let plan = plan_conditioning(&info, &flexible_constraints());
        assert!(!plan.requires_encode());
    }

    #[test]
    fn test_plan_crops_to_nearest_allowed_ratio() {
        // 4:3 (1.33) sits between 1:1 (1.0) and 16:9 (1.78); 1:1 wins on
        // crop distance
        let info = MediaInfo {
            duration_secs: 30.0,
            width: 1600,
            height: 1200,
            size_bytes: 10 * 1024 * 1024,
            has_audio: true,
        };

        let plan = plan_conditioning(&info, &flexible_constraints());

        let (crop_w, crop_h) = plan.crop.unwrap();
        assert_eq!((crop_w, crop_h), (1200, 1200));
    }

    #[test]
    fn test_plan_scales_undersized_video() {
        let info = MediaInfo {
            duration_secs: 30.0,
            width: 540,
            height: 960,
            size_bytes: 5 * 1024 * 1024,
            has_audio: true,
        };

        let plan = plan_conditioning(&info, &reels_constraints());

        assert_eq!(plan.crop, None);
        let (w, h) = plan.scale.unwrap();
        assert_eq!((w, h), (720, 1280));
    }

    #[test]
    fn test_plan_scales_oversized_dimensions_down() {
        let info = MediaInfo {
            duration_secs: 30.0,
            width: 2160,
            height: 3840,
            size_bytes: 5 * 1024 * 1024,
            has_audio: true,
        };

        let plan = plan_conditioning(&info, &reels_constraints());

        let (w, h) = plan.scale.unwrap();
        assert_eq!((w, h), (1080, 1920));
    }

    #[test]
    fn test_plan_flags_oversized_file() {
        let mut info = conforming_reel();
        info.size_bytes = 300 * 1024 * 1024;

        let plan = plan_conditioning(&info, &reels_constraints());

        assert!(plan.oversized);
        assert_eq!(plan.crop, None);
        assert_eq!(plan.trim_to, None);
        assert!(plan.requires_encode());
    }

    #[test]
    fn test_nearest_aspect_within_tolerance() {
        let constraints = flexible_constraints();

        // 1088x1920 is within 0.1 of 9:16
        assert_eq!(constraints.nearest_aspect(1088, 1920), None);
        // Square exactly
        assert_eq!(constraints.nearest_aspect(720, 720), None);
    }

    #[test]
    fn test_even_dimension_rounding() {
        assert_eq!(even(607.5), 608);
        assert_eq!(even(607.4), 606);
        assert_eq!(even(1.0), 2);
    }

    #[test]
    fn test_prepared_media_passthrough() {
        let prepared = PreparedMedia::passthrough(Path::new("/videos/clip.mp4"), conforming_reel());

        assert!(!prepared.is_conditioned());
        assert!(prepared.modifications.is_empty());
        assert_eq!(prepared.path, prepared.source);
    }

    #[tokio::test]
    async fn test_prepared_media_cleanup_removes_temp_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let temp = dir.path().join("conditioned.mp4");
        tokio::fs::write(&temp, b"encoded").await.unwrap();

        let prepared = PreparedMedia {
            path: temp.clone(),
            source: PathBuf::from("/videos/original.mp4"),
            modifications: vec!["trimmed to 60s".to_string()],
            info: conforming_reel(),
        };

        prepared.cleanup().await;
        assert!(!temp.exists());
    }

    #[tokio::test]
    async fn test_prepared_media_cleanup_keeps_original() {
        let dir = tempfile::TempDir::new().unwrap();
        let original = dir.path().join("original.mp4");
        tokio::fs::write(&original, b"source").await.unwrap();

        let prepared = PreparedMedia::passthrough(
            &original,
            conforming_reel(),
        );

        prepared.cleanup().await;
        assert!(original.exists());
    }

    #[test]
    fn test_probe_output_parsing() {
        let json = r#"{
            "streams": [
                {"codec_type": "video", "width": 1080, "height": 1920},
                {"codec_type": "audio"}
            ],
            "format": {"duration": "52.48", "size": "10485760"}
        }"#;

        let probe: ProbeOutput = serde_json::from_str(json).unwrap();
        let video = probe
            .streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some("video"))
            .unwrap();

        assert_eq!(video.width, Some(1080));
        assert_eq!(video.height, Some(1920));
        assert_eq!(probe.format.duration.as_deref(), Some("52.48"));
        assert_eq!(probe.format.size.as_deref(), Some("10485760"));
    }
}
