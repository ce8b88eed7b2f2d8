//! Chunked transfer and retry policy shared by all platform adapters
//!
//! Every adapter moves bytes the same way: the file is split into fixed
//! 5 MiB chunks, each chunk is sent with an explicit `bytes start-end/total`
//! range and retried independently with exponential backoff, and the
//! progress callback fires after each chunk. Only the handshake and payload
//! shape differ per platform, so those stay behind the small `ChunkSink`
//! trait each adapter implements.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::time::sleep;
use tracing::warn;

use crate::error::{PlatformError, Result, VidcastError};

/// Fixed transfer chunk size (5 MiB)
pub const CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Attempt ceiling shared by chunk transfers and outer API calls
pub const MAX_ATTEMPTS: u32 = 3;

/// Callback reporting transfer progress as a 0-100 percentage.
pub type ProgressFn<'a> = &'a (dyn Fn(u8) + Send + Sync);

/// An inclusive byte range within a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Number of bytes covered; ranges are inclusive so this is never zero.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `Content-Range` header value: `bytes start-end/total`
    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, total)
    }
}

/// Split a transfer of `total_size` bytes into fixed-size chunks.
pub fn chunk_ranges(total_size: u64, chunk_size: u64) -> Vec<ByteRange> {
    let mut ranges = Vec::new();
    let mut start = 0;

    while start < total_size {
        let end = (start + chunk_size - 1).min(total_size - 1);
        ranges.push(ByteRange { start, end });
        start = end + 1;
    }

    ranges
}

/// Check if an error is transient and should be retried.
///
/// Only transport-level failures retry; authentication, validation,
/// conditioning, and remote rejections surface immediately.
pub fn is_transient(error: &VidcastError) -> bool {
    matches!(
        error,
        VidcastError::Platform(PlatformError::Network(_))
    )
}

/// Run an operation with up to [`MAX_ATTEMPTS`] attempts and exponential
/// backoff (1s, 2s) between transient failures.
pub async fn with_retry<T, F, Fut>(label: &str, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if is_transient(&e) && attempt < MAX_ATTEMPTS => {
                let delay_secs = 2_u64.pow(attempt - 1);
                warn!(
                    "Transient error in {} (attempt {}/{}): {}. Retrying in {}s...",
                    label, attempt, MAX_ATTEMPTS, e, delay_secs
                );
                sleep(Duration::from_secs(delay_secs)).await;
                attempt += 1;
            }
            Err(e) => {
                if attempt == MAX_ATTEMPTS {
                    warn!("{} failed after {} attempts: {}", label, MAX_ATTEMPTS, e);
                }
                return Err(e);
            }
        }
    }
}

/// Map a reqwest transport error into the platform error taxonomy.
pub fn map_request_error(error: reqwest::Error, context: &str) -> PlatformError {
    PlatformError::Network(format!("{}: {}", context, error))
}

/// Classify an HTTP response per the retry policy.
///
/// 4xx responses are remote rejections carrying the platform's own error
/// payload and are never retried; 5xx responses are transient. Success
/// responses pass through untouched.
pub async fn check_response(
    response: reqwest::Response,
    context: &str,
) -> Result<reqwest::Response> {
    let status = response.status();

    if status.is_client_error() {
        let body = response.text().await.unwrap_or_default();
        return Err(PlatformError::Rejection(format!(
            "{} failed with {}: {}",
            context,
            status,
            body.trim()
        ))
        .into());
    }

    if status.is_server_error() {
        return Err(PlatformError::Network(format!(
            "{} failed with {}",
            context, status
        ))
        .into());
    }

    Ok(response)
}

/// Variant-specific side of a chunked transfer: how one chunk reaches the
/// remote session.
#[async_trait]
pub trait ChunkSink: Send + Sync {
    async fn send_chunk(&self, chunk: Vec<u8>, range: ByteRange, total: u64) -> Result<()>;
}

/// Transfer a file to `sink` in [`CHUNK_SIZE`] chunks.
///
/// Each chunk is retried independently through [`with_retry`]; the progress
/// callback fires with `(chunks_sent / total_chunks) * 100` after every
/// successfully transferred chunk and never reports a lower value than a
/// previous call.
pub async fn transfer_file(
    path: &Path,
    sink: &dyn ChunkSink,
    progress: ProgressFn<'_>,
) -> Result<()> {
    let metadata = tokio::fs::metadata(path).await.map_err(|e| {
        PlatformError::Network(format!("Failed to stat {}: {}", path.display(), e))
    })?;
    let total = metadata.len();
    let ranges = chunk_ranges(total, CHUNK_SIZE);

    if ranges.is_empty() {
        progress(100);
        return Ok(());
    }

    let mut file = tokio::fs::File::open(path).await.map_err(|e| {
        PlatformError::Network(format!("Failed to open {}: {}", path.display(), e))
    })?;

    let total_chunks = ranges.len();
    for (index, range) in ranges.iter().enumerate() {
        let mut buffer = vec![0u8; range.len() as usize];
        file.read_exact(&mut buffer).await.map_err(|e| {
            PlatformError::Network(format!("Failed to read chunk from {}: {}", path.display(), e))
        })?;

        with_retry("chunk transfer", || {
            sink.send_chunk(buffer.clone(), *range, total)
        })
        .await?;

        progress(((index + 1) * 100 / total_chunks) as u8);
    }

    Ok(())
}
