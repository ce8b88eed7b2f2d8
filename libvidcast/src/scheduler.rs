//! Scheduler/queue processor
//!
//! A single periodic loop that finds uploads whose scheduled time has
//! arrived or that sit in the manual queue, and hands each to the
//! orchestrator. One upload failing never stops the rest of the cycle, and
//! a cycle failing never stops the loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::db::Database;
use crate::error::Result;
use crate::orchestrator::Orchestrator;
use crate::types::Upload;

pub struct Scheduler {
    db: Database,
    orchestrator: Arc<Orchestrator>,
    poll_interval: Duration,
}

impl Scheduler {
    pub fn new(db: Database, orchestrator: Arc<Orchestrator>, poll_interval: Duration) -> Self {
        Self {
            db,
            orchestrator,
            poll_interval,
        }
    }

    /// Run the polling loop until `shutdown` flips.
    ///
    /// Cycle errors are logged and the loop sleeps normally; the shutdown
    /// flag is checked every second of the sleep so signals take effect
    /// promptly.
    pub async fn run(&self, shutdown: Arc<AtomicBool>) {
        info!(
            "Scheduler running with a {}s poll interval",
            self.poll_interval.as_secs()
        );

        loop {
            if shutdown.load(Ordering::Relaxed) {
                info!("Shutdown requested, stopping scheduler loop");
                break;
            }

            if let Err(e) = self.run_cycle().await {
                error!("Scheduler cycle failed: {}", e);
            }

            for _ in 0..self.poll_interval.as_secs() {
                if shutdown.load(Ordering::Relaxed) {
                    break;
                }
                sleep(Duration::from_secs(1)).await;
            }
        }
    }

    /// One scheduler cycle: due scheduled uploads first (no ordering
    /// guarantee between them), then the manual queue in position order.
    pub async fn run_cycle(&self) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        let due = self.db.due_scheduled(now).await?;
        if !due.is_empty() {
            info!("Found {} scheduled upload(s) due", due.len());
        }
        self.process_batch(&due).await;

        let queued = self.db.queued_uploads().await?;
        if !queued.is_empty() {
            info!("Found {} queued upload(s)", queued.len());
        }
        self.process_batch(&queued).await;

        Ok(())
    }

    /// Process uploads sequentially; a failure on one never aborts the rest.
    async fn process_batch(&self, uploads: &[Upload]) {
        for upload in uploads {
            debug!("Processing upload: {}", upload.id);
            if let Err(e) = self.orchestrator.process_upload(&upload.id).await {
                error!("Error processing upload {}: {}", upload.id, e);
            }
        }
    }
}
