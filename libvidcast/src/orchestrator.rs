//! Upload orchestration
//!
//! One orchestrator run drives every platform target of a single upload
//! concurrently and folds the outcomes into the aggregate post status.
//! Platform failures stay on their own `PlatformStatus` row; nothing a
//! platform task does can abort a sibling or the fan-in.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::db::Database;
use crate::error::{PlatformError, Result, VidcastError};
use crate::platforms::{PlatformAdapter, PublishedMedia, UploadOptions, UploadRequest};
use crate::types::{Platform, PlatformStatus, PostStatus, Upload};

pub struct Orchestrator {
    db: Database,
    adapters: HashMap<Platform, Arc<dyn PlatformAdapter>>,
}

impl Orchestrator {
    pub fn new(db: Database, adapters: Vec<Arc<dyn PlatformAdapter>>) -> Self {
        let adapters = adapters
            .into_iter()
            .map(|adapter| (adapter.platform(), adapter))
            .collect();

        Self { db, adapters }
    }

    /// Process one upload across all of its platform targets.
    ///
    /// Claims the upload by compare-and-swapping its status into
    /// `uploading` (a second concurrent run over the same upload finds the
    /// claim taken and backs off), fans out one task per non-terminal
    /// platform child, waits for all of them, then recomputes the aggregate
    /// status exactly once: completed iff every child completed.
    ///
    /// # Errors
    ///
    /// Returns an error only for failures before fan-out (unknown upload,
    /// database unavailable). Platform failures are recorded per child row
    /// and reflected in the aggregate status instead.
    pub async fn process_upload(&self, upload_id: &str) -> Result<()> {
        let upload = self
            .db
            .get_upload(upload_id)
            .await?
            .ok_or_else(|| VidcastError::InvalidInput(format!("Unknown upload: {}", upload_id)))?;

        if !self.db.begin_upload(upload_id).await? {
            info!(
                "Upload {} is already uploading or terminal, skipping",
                upload_id
            );
            return Ok(());
        }

        let children = self.db.platform_statuses(upload_id).await?;

        // Children that already reached a terminal state in a prior attempt
        // are skipped: failed ones are retried only through an explicit
        // reset, completed ones would double-post.
        let tasks: Vec<_> = children
            .into_iter()
            .filter(|child| !child.status.is_terminal())
            .map(|child| {
                let db = self.db.clone();
                let adapter = self.adapters.get(&child.platform).cloned();
                let upload = upload.clone();
                async move {
                    run_platform_task(db, adapter, upload, child).await;
                }
            })
            .collect();

        info!(
            "Uploading {} to {} platform(s)",
            upload_id,
            tasks.len()
        );

        join_all(tasks).await;

        if let Err(e) = self.finalize(upload_id).await {
            error!("Failed to finalize upload {}: {}", upload_id, e);
            if let Err(db_err) = self
                .db
                .update_upload_status(upload_id, PostStatus::Failed)
                .await
            {
                error!("Failed to mark upload {} failed: {}", upload_id, db_err);
            }
            if let Err(db_err) = self
                .db
                .update_upload_error(upload_id, Some(&e.to_string()))
                .await
            {
                error!("Failed to record error on upload {}: {}", upload_id, db_err);
            }
        }

        Ok(())
    }

    /// Recompute the aggregate status from the child rows.
    async fn finalize(&self, upload_id: &str) -> Result<()> {
        let children = self.db.platform_statuses(upload_id).await?;
        let all_completed = children.iter().all(|c| c.status == PostStatus::Completed);

        let status = if all_completed {
            PostStatus::Completed
        } else {
            PostStatus::Failed
        };

        info!("Upload {} finished: {}", upload_id, status);
        self.db.update_upload_status(upload_id, status).await
    }
}

/// Drive one platform target to a terminal state.
///
/// Every error is absorbed here: it lands on this child's row and goes no
/// further.
async fn run_platform_task(
    db: Database,
    adapter: Option<Arc<dyn PlatformAdapter>>,
    upload: Upload,
    child: PlatformStatus,
) {
    let Some(row_id) = child.id else {
        warn!(
            "Platform status for {} on upload {} has no row id, skipping",
            child.platform, upload.id
        );
        return;
    };

    if let Err(e) = db.mark_platform_uploading(row_id).await {
        warn!(
            "Failed to mark {} uploading for upload {}: {}",
            child.platform, upload.id, e
        );
        return;
    }

    match upload_one_platform(&db, adapter, &upload, &child, row_id).await {
        Ok(published) => {
            info!(
                "Published upload {} to {}: {}",
                upload.id, child.platform, published.url
            );
            if let Err(e) = db.mark_platform_completed(row_id, &published.url).await {
                warn!(
                    "Failed to record completion for {} on upload {}: {}",
                    child.platform, upload.id, e
                );
            }
        }
        Err(e) => {
            warn!("Upload {} failed on {}: {}", upload.id, child.platform, e);
            if let Err(db_err) = db.mark_platform_failed(row_id, &e.to_string()).await {
                warn!(
                    "Failed to record failure for {} on upload {}: {}",
                    child.platform, upload.id, db_err
                );
            }
        }
    }
}

async fn upload_one_platform(
    db: &Database,
    adapter: Option<Arc<dyn PlatformAdapter>>,
    upload: &Upload,
    child: &PlatformStatus,
    row_id: i64,
) -> Result<PublishedMedia> {
    let adapter = adapter.ok_or_else(|| {
        PlatformError::Validation(format!(
            "No adapter configured for platform {}",
            child.platform
        ))
    })?;

    let content = upload
        .content
        .get(&child.platform)
        .cloned()
        .or_else(|| child.content.clone())
        .ok_or_else(|| {
            PlatformError::Validation(format!(
                "No content generated for platform {}",
                child.platform
            ))
        })?;

    let path = Path::new(&upload.video_path);
    adapter.validate_format(path)?;
    let prepared = adapter.prepare_media(path).await?;
    if !prepared.modifications.is_empty() {
        info!(
            "Conditioned {} for {}: {}",
            upload.video_path,
            child.platform,
            prepared.modifications.join(", ")
        );
    }

    // Progress writes go through a channel drained by a single writer task,
    // so persisted values keep callback order.
    let (tx, mut rx) = mpsc::unbounded_channel::<u8>();
    let writer_db = db.clone();
    let writer = tokio::spawn(async move {
        while let Some(pct) = rx.recv().await {
            if let Err(e) = writer_db.update_platform_progress(row_id, pct).await {
                warn!("Failed to persist progress for row {}: {}", row_id, e);
            }
        }
    });

    let progress = move |pct: u8| {
        let _ = tx.send(pct);
    };

    let options = UploadOptions::default();
    let request = UploadRequest {
        content: &content,
        account: &child.account,
        options: &options,
    };

    let result = adapter.upload(&prepared, &request, &progress).await;

    // Dropping the callback closes the channel; wait for the writer to
    // flush the remaining progress updates before the terminal write.
    drop(progress);
    if let Err(e) = writer.await {
        warn!("Progress writer for row {} panicked: {}", row_id, e);
    }

    result
}
