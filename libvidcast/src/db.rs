//! Database operations for Vidcast

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use sqlx::sqlite::SqlitePool;
use sqlx::Row;

use crate::error::{DbError, Result};
use crate::types::{Platform, PlatformContent, PlatformStatus, PostStatus, Upload};

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection
    pub async fn new(db_path: &str) -> Result<Self> {
        // Expand path and create parent directories
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
        }

        // Forward slashes work for SQLite URLs on all platforms; mode=rwc
        // creates the file when missing. Foreign keys are set per-connection
        // through the options so every pooled connection enforces them.
        let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));
        let options = sqlx::sqlite::SqliteConnectOptions::from_str(&db_url)
            .map_err(DbError::SqlxError)?
            .foreign_keys(true);

        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(DbError::SqlxError)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        Ok(Self { pool })
    }

    // ========================================================================
    // Uploads
    // ========================================================================

    /// Create a new upload
    pub async fn create_upload(&self, upload: &Upload) -> Result<()> {
        let analysis = upload
            .analysis
            .as_ref()
            .map(|a| a.to_string());
        let content = serde_json::to_string(&upload.content).map_err(DbError::EncodingError)?;

        sqlx::query(
            r#"
            INSERT INTO uploads (id, video_path, analysis, created_at, scheduled_time, queue_position, status, content, error)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&upload.id)
        .bind(&upload.video_path)
        .bind(analysis)
        .bind(upload.created_at)
        .bind(upload.scheduled_time)
        .bind(upload.queue_position)
        .bind(upload.status.as_str())
        .bind(content)
        .bind(&upload.error)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Get an upload by ID
    pub async fn get_upload(&self, upload_id: &str) -> Result<Option<Upload>> {
        let row = sqlx::query(
            r#"
            SELECT id, video_path, analysis, created_at, scheduled_time, queue_position, status, content, error
            FROM uploads WHERE id = ?
            "#,
        )
        .bind(upload_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(row.map(|r| read_upload(&r)))
    }

    /// List uploads, newest first
    pub async fn list_uploads(&self, limit: usize) -> Result<Vec<Upload>> {
        let rows = sqlx::query(
            r#"
            SELECT id, video_path, analysis, created_at, scheduled_time, queue_position, status, content, error
            FROM uploads ORDER BY created_at DESC LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows.iter().map(read_upload).collect())
    }

    /// Update upload status
    pub async fn update_upload_status(&self, upload_id: &str, status: PostStatus) -> Result<()> {
        sqlx::query("UPDATE uploads SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(upload_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Record an orchestration-level error on the upload
    pub async fn update_upload_error(&self, upload_id: &str, error: Option<&str>) -> Result<()> {
        sqlx::query("UPDATE uploads SET error = ? WHERE id = ?")
            .bind(error)
            .bind(upload_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Replace the generated content mapping on an upload
    pub async fn update_upload_content(
        &self,
        upload_id: &str,
        content: &HashMap<Platform, PlatformContent>,
    ) -> Result<()> {
        let json = serde_json::to_string(content).map_err(DbError::EncodingError)?;

        sqlx::query("UPDATE uploads SET content = ? WHERE id = ?")
            .bind(json)
            .bind(upload_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(())
    }

    // ========================================================================
    // Scheduling
    // ========================================================================

    /// Schedule an upload for a point in time.
    ///
    /// Clears any queue position: `scheduled_time` and `queue_position` are
    /// never both set.
    pub async fn schedule_upload(&self, upload_id: &str, at: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE uploads SET status = 'scheduled', scheduled_time = ?, queue_position = NULL
            WHERE id = ?
            "#,
        )
        .bind(at)
        .bind(upload_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Put an upload into the manual queue.
    ///
    /// With no explicit position the upload lands at the back of the queue.
    /// Clears any scheduled time.
    pub async fn enqueue_upload(&self, upload_id: &str, position: Option<i64>) -> Result<i64> {
        let position = match position {
            Some(p) => p,
            None => self.next_queue_position().await?,
        };

        sqlx::query(
            r#"
            UPDATE uploads SET status = 'queued', queue_position = ?, scheduled_time = NULL
            WHERE id = ?
            "#,
        )
        .bind(position)
        .bind(upload_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(position)
    }

    async fn next_queue_position(&self) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COALESCE(MAX(queue_position), 0) + 1 AS next FROM uploads WHERE status = 'queued'",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(row.get("next"))
    }

    /// Force all queued uploads back to draft. Returns the number of uploads
    /// affected. Uploading and terminal uploads are untouched.
    pub async fn clear_queue(&self) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE uploads SET status = 'draft', queue_position = NULL WHERE status = 'queued'",
        )
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected())
    }

    /// Force all scheduled uploads back to draft. Returns the number of
    /// uploads affected.
    pub async fn clear_schedule(&self) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE uploads SET status = 'draft', scheduled_time = NULL WHERE status = 'scheduled'",
        )
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected())
    }

    /// Scheduled uploads whose time has arrived
    pub async fn due_scheduled(&self, now: i64) -> Result<Vec<Upload>> {
        let rows = sqlx::query(
            r#"
            SELECT id, video_path, analysis, created_at, scheduled_time, queue_position, status, content, error
            FROM uploads WHERE status = 'scheduled' AND scheduled_time <= ?
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows.iter().map(read_upload).collect())
    }

    /// Queued uploads in queue order
    pub async fn queued_uploads(&self) -> Result<Vec<Upload>> {
        let rows = sqlx::query(
            r#"
            SELECT id, video_path, analysis, created_at, scheduled_time, queue_position, status, content, error
            FROM uploads WHERE status = 'queued' ORDER BY queue_position ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows.iter().map(read_upload).collect())
    }

    /// Claim an upload for processing.
    ///
    /// Compare-and-swaps the status into `uploading`; returns false when the
    /// upload is already uploading or terminal, which keeps two orchestrator
    /// runs from racing over the same upload.
    pub async fn begin_upload(&self, upload_id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE uploads SET status = 'uploading', error = NULL
            WHERE id = ? AND status IN ('draft', 'queued', 'scheduled')
            "#,
        )
        .bind(upload_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    // ========================================================================
    // Platform statuses
    // ========================================================================

    /// Create a platform status row, returning its ID
    pub async fn create_platform_status(&self, status: &PlatformStatus) -> Result<i64> {
        let content = match &status.content {
            Some(c) => Some(serde_json::to_string(c).map_err(DbError::EncodingError)?),
            None => None,
        };

        let result = sqlx::query(
            r#"
            INSERT INTO platform_statuses (upload_id, platform, account, status, progress, url, error, content)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&status.upload_id)
        .bind(status.platform.as_str())
        .bind(&status.account)
        .bind(status.status.as_str())
        .bind(status.progress)
        .bind(&status.url)
        .bind(&status.error)
        .bind(content)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.last_insert_rowid())
    }

    /// All platform status rows for an upload
    pub async fn platform_statuses(&self, upload_id: &str) -> Result<Vec<PlatformStatus>> {
        let rows = sqlx::query(
            r#"
            SELECT id, upload_id, platform, account, status, progress, url, error, content
            FROM platform_statuses WHERE upload_id = ? ORDER BY id ASC
            "#,
        )
        .bind(upload_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows.iter().map(read_platform_status).collect())
    }

    /// Mark a platform attempt as started
    pub async fn mark_platform_uploading(&self, id: i64) -> Result<()> {
        sqlx::query(
            "UPDATE platform_statuses SET status = 'uploading', error = NULL WHERE id = ?",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Persist transfer progress for a platform attempt
    pub async fn update_platform_progress(&self, id: i64, progress: u8) -> Result<()> {
        sqlx::query("UPDATE platform_statuses SET progress = ? WHERE id = ?")
            .bind(progress as i64)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Mark a platform attempt as published
    pub async fn mark_platform_completed(&self, id: i64, url: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE platform_statuses SET status = 'completed', url = ?, progress = 100, error = NULL
            WHERE id = ?
            "#,
        )
        .bind(url)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Mark a platform attempt as failed, resetting progress
    pub async fn mark_platform_failed(&self, id: i64, error: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE platform_statuses SET status = 'failed', error = ?, progress = 0
            WHERE id = ?
            "#,
        )
        .bind(error)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Reset failed platform attempts on an upload back to draft so a
    /// resubmission retries exactly the platforms that failed.
    pub async fn reset_failed_platforms(&self, upload_id: &str) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE platform_statuses SET status = 'draft', error = NULL, progress = 0
            WHERE upload_id = ? AND status = 'failed'
            "#,
        )
        .bind(upload_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected())
    }
}

fn read_upload(row: &sqlx::sqlite::SqliteRow) -> Upload {
    let analysis: Option<String> = row.get("analysis");
    let content: Option<String> = row.get("content");

    Upload {
        id: row.get("id"),
        video_path: row.get("video_path"),
        analysis: analysis.and_then(|a| serde_json::from_str(&a).ok()),
        created_at: row.get("created_at"),
        scheduled_time: row.get("scheduled_time"),
        queue_position: row.get("queue_position"),
        status: PostStatus::from_str(row.get::<String, _>("status").as_str())
            .unwrap_or(PostStatus::Draft),
        content: content
            .and_then(|c| serde_json::from_str(&c).ok())
            .unwrap_or_default(),
        error: row.get("error"),
    }
}

fn read_platform_status(row: &sqlx::sqlite::SqliteRow) -> PlatformStatus {
    let content: Option<String> = row.get("content");

    PlatformStatus {
        id: row.get("id"),
        upload_id: row.get("upload_id"),
        platform: Platform::from_str(row.get::<String, _>("platform").as_str())
            .unwrap_or(Platform::Youtube),
        account: row.get("account"),
        status: PostStatus::from_str(row.get::<String, _>("status").as_str())
            .unwrap_or(PostStatus::Draft),
        progress: row.get("progress"),
        url: row.get("url"),
        error: row.get("error"),
        content: content.and_then(|c| serde_json::from_str(&c).ok()),
    }
}
