//! Sequential chunked upload.

use reqwest::multipart;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::UploadSession;
use crate::transfer::client::OcrClient;
use crate::transfer::request::CORRELATION_HEADER;
use crate::utils::{CorrelationId, PipelineError, PipelineResult, ValidationError};

/// How a file splits into chunks under a negotiated session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    pub chunk_size: u64,
    pub total_bytes: u64,
    pub total_chunks: u32,
}

impl ChunkPlan {
    /// `chunk_size` must be nonzero.
    pub fn new(total_bytes: u64, chunk_size: u64) -> Self {
        Self { chunk_size, total_bytes, total_chunks: total_bytes.div_ceil(chunk_size) as u32 }
    }

    /// Byte range of chunk `index`; the final chunk may run short.
    pub fn range(&self, index: u32) -> std::ops::Range<usize> {
        let start = index as u64 * self.chunk_size;
        let end = (start + self.chunk_size).min(self.total_bytes);
        start as usize..end as usize
    }

    /// Cumulative bytes delivered once chunk `index` has been accepted.
    pub fn bytes_through(&self, index: u32) -> u64 {
        ((index as u64 + 1) * self.chunk_size).min(self.total_bytes)
    }
}

impl OcrClient {
    /// Uploads a file chunk by chunk, strictly in index order.
    ///
    /// The chunk budget is checked against the session before any bytes
    /// move. `on_progress` fires with `(bytes_sent, total_bytes)` after
    /// each accepted chunk, never for a failed or retried one.
    pub async fn upload_chunked<F>(
        &self,
        path: &str,
        session: &UploadSession,
        correlation: &CorrelationId,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> PipelineResult<()>
    where
        F: FnMut(u64, u64),
    {
        if session.chunk_size == 0 {
            return Err(PipelineError::upload("session negotiated a zero chunk size"));
        }

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| PipelineError::upload(format!("failed to read optimized file: {e}")))?;
        let plan = ChunkPlan::new(bytes.len() as u64, session.chunk_size);
        if plan.total_chunks > session.max_chunks {
            return Err(ValidationError::ChunkBudgetExceeded {
                needed: plan.total_chunks,
                allowed: session.max_chunks,
            }
            .into());
        }

        debug!(
            upload_id = %session.upload_id,
            total_bytes = plan.total_bytes,
            chunk_size = plan.chunk_size,
            total_chunks = plan.total_chunks,
            "starting chunked upload"
        );

        let url = self.url("api/ocr/chunk");
        for index in 0..plan.total_chunks {
            let chunk = &bytes[plan.range(index)];
            self.policy
                .execute("upload_chunk", cancel, || {
                    let part = multipart::Part::bytes(chunk.to_vec())
                        .file_name(format!("chunk-{index}"));
                    let form = multipart::Form::new()
                        .text("uploadId", session.upload_id.clone())
                        .text("chunkIndex", index.to_string())
                        .text("totalChunks", plan.total_chunks.to_string())
                        .part("chunk", part);
                    self.http
                        .post(&url)
                        .header(CORRELATION_HEADER, correlation.to_string())
                        .multipart(form)
                })
                .await?;
            on_progress(plan.bytes_through(index), plan.total_bytes);
        }

        debug!(upload_id = %session.upload_id, "chunked upload complete");
        Ok(())
    }
}
