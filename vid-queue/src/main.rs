//! vid-queue - Manage the upload queue and schedule
//!
//! Unix-style tool for inspecting and managing Vidcast uploads.

use std::str::FromStr;

use clap::{Parser, Subcommand};
use libvidcast::types::{Platform, PlatformContent, PlatformStatus, PostStatus, Upload};
use libvidcast::{scheduling, Config, Database, Result, VidcastError};

#[derive(Parser, Debug)]
#[command(name = "vid-queue")]
#[command(version)]
#[command(about = "Manage the upload queue and schedule")]
#[command(long_about = "\
vid-queue - Manage the upload queue and schedule

DESCRIPTION:
    vid-queue is a Unix-style tool for managing Vidcast uploads. Use it to
    add uploads, put them in the queue or on the schedule, inspect
    per-platform progress, retry failures, and clear pending work.

COMMANDS:
    list            List uploads
    status          Show per-platform status for one upload
    add             Register a video for publishing
    schedule        Schedule an upload for a point in time
    enqueue         Put an upload in the manual queue
    retry           Reset failed platforms and re-enqueue a failed upload
    clear-queue     Force all queued uploads back to draft
    clear-schedule  Force all scheduled uploads back to draft

USAGE EXAMPLES:
    # Register a video for two platforms
    vid-queue add demo.mp4 --platforms youtube,tiktok --title \"Demo\"

    # Schedule it for tomorrow afternoon
    vid-queue schedule <UPLOAD_ID> \"tomorrow 3pm\"

    # Or post it next via the queue
    vid-queue enqueue <UPLOAD_ID>

    # Watch per-platform progress
    vid-queue status <UPLOAD_ID>

    # Retry a failed upload on the platforms that failed
    vid-queue retry <UPLOAD_ID>

CONFIGURATION:
    Configuration file: ~/.config/vidcast/config.toml
    Database location: ~/.local/share/vidcast/uploads.db

    Override with the VIDCAST_CONFIG environment variable.

EXIT CODES:
    0 - Success
    1 - Operation failed
    2 - Authentication error
    3 - Invalid input (bad upload ID, time format, etc.)
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List uploads
    List {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,

        /// Maximum number of uploads to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show per-platform status for one upload
    Status {
        /// Upload ID to inspect
        upload_id: String,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Register a video for publishing
    Add {
        /// Path to the video file
        video: String,

        /// Comma-separated platforms (youtube, instagram, tiktok)
        #[arg(short, long)]
        platforms: String,

        /// Account selector used on every platform
        #[arg(short, long, default_value = "personal")]
        account: String,

        /// Title used for every platform
        #[arg(short, long, default_value = "")]
        title: String,

        /// Description used for every platform
        #[arg(short, long, default_value = "")]
        description: String,

        /// Comma-separated hashtags
        #[arg(long, default_value = "")]
        hashtags: String,
    },

    /// Schedule an upload for a point in time
    Schedule {
        /// Upload ID to schedule
        upload_id: String,

        /// Schedule time (e.g. "2h", "tomorrow 3pm")
        time: String,
    },

    /// Put an upload in the manual queue
    Enqueue {
        /// Upload ID to enqueue
        upload_id: String,

        /// Explicit queue position; defaults to the back of the queue
        #[arg(short, long)]
        position: Option<i64>,
    },

    /// Reset failed platforms and re-enqueue a failed upload
    Retry {
        /// Upload ID to retry
        upload_id: String,
    },

    /// Force all queued uploads back to draft
    ClearQueue,

    /// Force all scheduled uploads back to draft
    ClearSchedule,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("debug")
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter("error")
            .with_writer(std::io::stderr)
            .init();
    }

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let db = Database::new(&config.database.path).await?;

    match cli.command {
        Commands::List { format, limit } => list_uploads(&db, &format, limit).await,
        Commands::Status { upload_id, format } => show_status(&db, &upload_id, &format).await,
        Commands::Add {
            video,
            platforms,
            account,
            title,
            description,
            hashtags,
        } => {
            add_upload(
                &db,
                &video,
                &platforms,
                &account,
                &title,
                &description,
                &hashtags,
            )
            .await
        }
        Commands::Schedule { upload_id, time } => schedule_upload(&db, &upload_id, &time).await,
        Commands::Enqueue {
            upload_id,
            position,
        } => enqueue_upload(&db, &upload_id, position).await,
        Commands::Retry { upload_id } => retry_upload(&db, &upload_id).await,
        Commands::ClearQueue => {
            let cleared = db.clear_queue().await?;
            println!("Cleared {} queued upload(s)", cleared);
            Ok(())
        }
        Commands::ClearSchedule => {
            let cleared = db.clear_schedule().await?;
            println!("Cleared {} scheduled upload(s)", cleared);
            Ok(())
        }
    }
}

async fn require_upload(db: &Database, upload_id: &str) -> Result<Upload> {
    db.get_upload(upload_id)
        .await?
        .ok_or_else(|| VidcastError::InvalidInput(format!("Unknown upload: {}", upload_id)))
}

async fn list_uploads(db: &Database, format: &str, limit: usize) -> Result<()> {
    let uploads = db.list_uploads(limit).await?;

    if format == "json" {
        println!(
            "{}",
            serde_json::to_string_pretty(&uploads)
                .map_err(|e| VidcastError::InvalidInput(e.to_string()))?
        );
        return Ok(());
    }

    if uploads.is_empty() {
        println!("No uploads");
        return Ok(());
    }

    for upload in uploads {
        let when = match (upload.scheduled_time, upload.queue_position) {
            (Some(at), _) => format!(
                "scheduled {}",
                chrono::DateTime::from_timestamp(at, 0)
                    .map(|dt| dt.to_rfc3339())
                    .unwrap_or_else(|| at.to_string())
            ),
            (_, Some(position)) => format!("queue #{}", position),
            _ => String::new(),
        };
        println!(
            "{}  {:<10} {}  {}",
            upload.id, upload.status, upload.video_path, when
        );
    }

    Ok(())
}

async fn show_status(db: &Database, upload_id: &str, format: &str) -> Result<()> {
    let upload = require_upload(db, upload_id).await?;
    let children = db.platform_statuses(upload_id).await?;

    if format == "json" {
        let snapshot = serde_json::json!({
            "upload": upload,
            "platforms": children,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&snapshot)
                .map_err(|e| VidcastError::InvalidInput(e.to_string()))?
        );
        return Ok(());
    }

    println!("Upload {}: {}", upload.id, upload.status);
    if let Some(error) = &upload.error {
        println!("  error: {}", error);
    }
    for child in children {
        let detail = match child.status {
            PostStatus::Completed => child.url.clone().unwrap_or_default(),
            PostStatus::Failed => child.error.clone().unwrap_or_default(),
            PostStatus::Uploading => format!("{}%", child.progress),
            _ => String::new(),
        };
        println!(
            "  {:<10} {:<10} {:<10} {}",
            child.platform, child.account, child.status, detail
        );
    }

    Ok(())
}

async fn add_upload(
    db: &Database,
    video: &str,
    platforms: &str,
    account: &str,
    title: &str,
    description: &str,
    hashtags: &str,
) -> Result<()> {
    if !std::path::Path::new(video).exists() {
        return Err(VidcastError::InvalidInput(format!(
            "Video file not found: {}",
            video
        )));
    }

    let platforms: Vec<Platform> = platforms
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| Platform::from_str(p).map_err(VidcastError::InvalidInput))
        .collect::<std::result::Result<_, _>>()?;

    if platforms.is_empty() {
        return Err(VidcastError::InvalidInput(
            "At least one platform is required".to_string(),
        ));
    }

    let content = PlatformContent {
        title: title.to_string(),
        description: description.to_string(),
        hashtags: hashtags
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect(),
    };

    let mut upload = Upload::new(video.to_string(), None);
    for platform in &platforms {
        upload.content.insert(*platform, content.clone());
    }
    db.create_upload(&upload).await?;

    for platform in &platforms {
        let child = PlatformStatus::new_draft(
            upload.id.clone(),
            *platform,
            account.to_string(),
            Some(content.clone()),
        );
        db.create_platform_status(&child).await?;
    }

    println!("{}", upload.id);
    Ok(())
}

async fn schedule_upload(db: &Database, upload_id: &str, time: &str) -> Result<()> {
    require_upload(db, upload_id).await?;

    let at = scheduling::parse_schedule(time)?;
    db.schedule_upload(upload_id, at.timestamp()).await?;

    println!("Scheduled {} for {}", upload_id, at.to_rfc3339());
    Ok(())
}

async fn enqueue_upload(db: &Database, upload_id: &str, position: Option<i64>) -> Result<()> {
    require_upload(db, upload_id).await?;

    let position = db.enqueue_upload(upload_id, position).await?;

    println!("Enqueued {} at position {}", upload_id, position);
    Ok(())
}

async fn retry_upload(db: &Database, upload_id: &str) -> Result<()> {
    let upload = require_upload(db, upload_id).await?;

    if upload.status != PostStatus::Failed {
        return Err(VidcastError::InvalidInput(format!(
            "Upload {} is {}, only failed uploads can be retried",
            upload_id, upload.status
        )));
    }

    let reset = db.reset_failed_platforms(upload_id).await?;
    let position = db.enqueue_upload(upload_id, None).await?;

    println!(
        "Reset {} failed platform(s), enqueued {} at position {}",
        reset, upload_id, position
    );
    Ok(())
}
