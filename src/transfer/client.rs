//! Client for the OCR service's upload and job endpoints.

use reqwest::Client;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::TransferConfig;
use crate::core::{JobRef, JobStatusReport, UploadSession};
use crate::transfer::request::{CORRELATION_HEADER, RetryPolicy};
use crate::utils::{CorrelationId, PipelineError, PipelineResult};

/// HTTP client for the OCR service.
///
/// All requests share one connection pool, one per-request timeout and one
/// retry policy; every method tags its requests with the caller's
/// correlation id.
#[derive(Debug, Clone)]
pub struct OcrClient {
    pub(super) http: Client,
    pub(super) config: TransferConfig,
    pub(super) policy: RetryPolicy,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateUploadRequest<'a> {
    filename: &'a str,
    file_size: u64,
    /// Chunk size the client would prefer; the server has the last word
    chunk_size: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StartProcessingRequest<'a> {
    upload_id: &'a str,
}

impl OcrClient {
    pub fn new(config: TransferConfig) -> PipelineResult<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| PipelineError::network(format!("failed to build http client: {e}")))?;
        let policy = RetryPolicy::from_config(&config);
        Ok(Self { http, config, policy })
    }

    pub(super) fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Negotiates an upload session for a file of `file_size` bytes.
    pub async fn create_upload_session(
        &self,
        filename: &str,
        file_size: u64,
        correlation: &CorrelationId,
        cancel: &CancellationToken,
    ) -> PipelineResult<UploadSession> {
        let url = self.url("api/ocr/upload");
        let response = self
            .policy
            .execute("create_upload_session", cancel, || {
                self.http
                    .post(&url)
                    .header(CORRELATION_HEADER, correlation.to_string())
                    .json(&CreateUploadRequest {
                        filename,
                        file_size,
                        chunk_size: self.config.chunk_size,
                    })
            })
            .await?;

        let session: UploadSession = response
            .json()
            .await
            .map_err(|e| PipelineError::network(format!("invalid upload session response: {e}")))?;
        debug!(
            upload_id = %session.upload_id,
            chunk_size = session.chunk_size,
            max_chunks = session.max_chunks,
            "upload session created"
        );
        Ok(session)
    }

    /// Starts OCR processing for a fully uploaded session.
    pub async fn start_processing(
        &self,
        upload_id: &str,
        correlation: &CorrelationId,
        cancel: &CancellationToken,
    ) -> PipelineResult<JobRef> {
        let url = self.url("api/ocr/process");
        let response = self
            .policy
            .execute("start_processing", cancel, || {
                self.http
                    .post(&url)
                    .header(CORRELATION_HEADER, correlation.to_string())
                    .json(&StartProcessingRequest { upload_id })
            })
            .await?;

        response
            .json()
            .await
            .map_err(|e| PipelineError::network(format!("invalid process response: {e}")))
    }

    /// Fetches the current status snapshot of a job.
    pub async fn fetch_job_status(
        &self,
        job_id: &str,
        correlation: &CorrelationId,
        cancel: &CancellationToken,
    ) -> PipelineResult<JobStatusReport> {
        let url = self.url(&format!("api/ocr/status/{job_id}"));
        let response = self
            .policy
            .execute("fetch_job_status", cancel, || {
                self.http.get(&url).header(CORRELATION_HEADER, correlation.to_string())
            })
            .await?;

        response
            .json()
            .await
            .map_err(|e| PipelineError::network(format!("invalid status response: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joining_tolerates_slashes() {
        let config = TransferConfig {
            base_url: "http://ocr.local:8080/".to_string(),
            ..TransferConfig::default()
        };
        let client = OcrClient::new(config).unwrap();
        assert_eq!(client.url("/api/ocr/upload"), "http://ocr.local:8080/api/ocr/upload");
        assert_eq!(client.url("api/ocr/status/j-1"), "http://ocr.local:8080/api/ocr/status/j-1");
    }
}
