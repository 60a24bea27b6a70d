//! End-to-end orchestration of a single receipt run.
//!
//! One run walks four phases: optimize the capture, negotiate an upload
//! session and push chunks, start the remote OCR job, then poll it to a
//! terminal state. Progress events trace the whole run on one 0-100 scale.

use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{PipelineConfig, PollConfig};
use crate::core::{
    JobResult, JobState, OptimizationOutcome, PROCESS_PHASE_START, PipelineEvent, ProcessedReceipt,
    ProgressSender, UPLOAD_PHASE_START, poll_percent, upload_percent,
};
use crate::pipeline::poll::StageTracker;
use crate::processing::{self, ReceiptOptimizer};
use crate::transfer::OcrClient;
use crate::utils::{CorrelationId, PipelineError, PipelineResult};

/// Runs the capture-to-receipt pipeline.
///
/// One processor handles one run at a time from the caller's point of
/// view; `cancel` aborts whatever run is currently in flight and the next
/// run starts with a fresh token.
pub struct ReceiptProcessor {
    optimizer: ReceiptOptimizer,
    client: OcrClient,
    poll: PollConfig,
    cancel: Mutex<CancellationToken>,
}

impl ReceiptProcessor {
    pub fn new(config: PipelineConfig) -> PipelineResult<Self> {
        Ok(Self {
            optimizer: ReceiptOptimizer::new(config.optimizer),
            client: OcrClient::new(config.transfer)?,
            poll: config.poll,
            cancel: Mutex::new(CancellationToken::new()),
        })
    }

    /// Cancels the in-flight run, if any. Idempotent.
    pub fn cancel(&self) {
        // Lock invariant: held only to reach the token, never across await.
        self.cancel.lock().expect("cancel token lock poisoned").cancel();
    }

    /// Replaces the token so an earlier cancel cannot leak into this run.
    fn arm_cancel(&self) -> CancellationToken {
        let mut guard = self.cancel.lock().expect("cancel token lock poisoned");
        *guard = CancellationToken::new();
        guard.clone()
    }

    /// Processes one receipt capture end to end.
    ///
    /// Emits progress on `progress` throughout; terminal events are
    /// `Complete` on success and `Error` on failure. A cancelled run emits
    /// neither and returns [`PipelineError::Cancelled`].
    pub async fn process(
        &self,
        image_uri: &str,
        progress: &ProgressSender,
        correlation: Option<CorrelationId>,
    ) -> PipelineResult<ProcessedReceipt> {
        let correlation = correlation.unwrap_or_default();
        let cancel = self.arm_cancel();
        info!(image_uri, correlation = %correlation, "starting receipt pipeline run");

        match self.run(image_uri, progress, &correlation, &cancel).await {
            Ok(receipt) => {
                progress.emit(PipelineEvent::Complete { percent: 100, receipt: receipt.clone() });
                info!(correlation = %correlation, "receipt pipeline run complete");
                Ok(receipt)
            }
            Err(PipelineError::Cancelled) => {
                debug!(correlation = %correlation, "receipt pipeline run cancelled");
                Err(PipelineError::Cancelled)
            }
            Err(err) => {
                warn!(correlation = %correlation, "receipt pipeline run failed: {err}");
                progress.emit(PipelineEvent::Error { error: err.details() });
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        image_uri: &str,
        progress: &ProgressSender,
        correlation: &CorrelationId,
        cancel: &CancellationToken,
    ) -> PipelineResult<ProcessedReceipt> {
        progress.emit(PipelineEvent::OptimizeStart { percent: 0 });
        let outcome = self.optimizer.optimize(image_uri).await?;
        progress.emit(PipelineEvent::OptimizeComplete {
            percent: UPLOAD_PHASE_START,
            metrics: outcome.metrics.clone(),
        });

        if cancel.is_cancelled() {
            processing::cleanup(&outcome.optimized_path).await;
            return Err(PipelineError::Cancelled);
        }

        match self.transfer_and_poll(image_uri, &outcome, progress, correlation, cancel).await {
            Ok(receipt) => Ok(receipt),
            Err(err) => {
                // no receipt materialized, so nothing references the temp file
                processing::cleanup(&outcome.optimized_path).await;
                Err(err)
            }
        }
    }

    async fn transfer_and_poll(
        &self,
        image_uri: &str,
        outcome: &OptimizationOutcome,
        progress: &ProgressSender,
        correlation: &CorrelationId,
        cancel: &CancellationToken,
    ) -> PipelineResult<ProcessedReceipt> {
        let total_bytes = outcome.metrics.optimized_size;
        let filename = Path::new(&outcome.optimized_path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("receipt.jpg");

        let session = self
            .client
            .create_upload_session(filename, total_bytes, correlation, cancel)
            .await
            .map_err(wrap_upload)?;
        progress.emit(PipelineEvent::UploadStart { percent: UPLOAD_PHASE_START, total_bytes });

        self.client
            .upload_chunked(
                &outcome.optimized_path,
                &session,
                correlation,
                cancel,
                |bytes_sent, total| {
                    progress.emit(PipelineEvent::UploadProgress {
                        percent: upload_percent(bytes_sent, total),
                        bytes_sent,
                        total_bytes: total,
                    });
                },
            )
            .await
            .map_err(wrap_upload)?;
        progress.emit(PipelineEvent::UploadComplete { percent: PROCESS_PHASE_START });

        let job = self
            .client
            .start_processing(&session.upload_id, correlation, cancel)
            .await
            .map_err(wrap_process_start)?;
        progress.emit(PipelineEvent::ProcessStart {
            percent: PROCESS_PHASE_START,
            job_id: job.job_id.clone(),
        });

        let result = tokio::time::timeout(
            self.poll.timeout(),
            self.poll_until_terminal(&job.job_id, progress, correlation, cancel),
        )
        .await
        .map_err(|_| {
            PipelineError::timeout(format!(
                "job {} did not finish within {}ms",
                job.job_id, self.poll.timeout_ms
            ))
        })??;

        Ok(ProcessedReceipt {
            original_uri: image_uri.to_string(),
            optimized_uri: outcome.optimized_path.clone(),
            text: result.text,
            confidence: result.confidence,
            classification: result.classification,
            optimization: outcome.metrics.clone(),
            processed_at: Utc::now(),
        })
    }

    /// Polls job status until the server reports a terminal state.
    ///
    /// Failed fetches are logged and retried on the next tick; only
    /// cancellation ends the loop early. The caller bounds the whole loop
    /// with the poll timeout.
    async fn poll_until_terminal(
        &self,
        job_id: &str,
        progress: &ProgressSender,
        correlation: &CorrelationId,
        cancel: &CancellationToken,
    ) -> PipelineResult<JobResult> {
        let mut ticker = tokio::time::interval(self.poll.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut stages = StageTracker::default();
        let mut last_progress: Option<u8> = None;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
                _ = ticker.tick() => {}
            }

            let report = match self.client.fetch_job_status(job_id, correlation, cancel).await {
                Ok(report) => report,
                Err(PipelineError::Cancelled) => return Err(PipelineError::Cancelled),
                Err(err) => {
                    debug!(job_id, "status fetch failed, will poll again: {err}");
                    continue;
                }
            };

            if let Some(stage) = stages.observe(report.stage) {
                debug!(job_id, stage = stage.as_str(), "job stage changed");
                progress.emit(PipelineEvent::StageChange {
                    percent: poll_percent(report.progress),
                    stage,
                });
            }
            if last_progress != Some(report.progress) {
                last_progress = Some(report.progress);
                progress
                    .emit(PipelineEvent::JobProgress { percent: poll_percent(report.progress) });
            }

            match report.status {
                JobState::Completed => {
                    return report.result.ok_or_else(|| PipelineError::Ocr {
                        code: None,
                        message: "job completed without a result".to_string(),
                    });
                }
                JobState::Failed => {
                    let error = report.error.unwrap_or_default();
                    return Err(PipelineError::Ocr {
                        code: error.code,
                        message: error
                            .message
                            .unwrap_or_else(|| "job failed without detail".to_string()),
                    });
                }
                JobState::Pending | JobState::Active => {}
            }
        }
    }
}

/// Folds transient failures of the upload phase into its phase code.
/// Deterministic rejections keep their own identity so their codes (and
/// non-retryable flags) survive.
fn wrap_upload(err: PipelineError) -> PipelineError {
    match err {
        PipelineError::Cancelled
        | PipelineError::Validation(_)
        | PipelineError::Rejected { .. }
        | PipelineError::NotFound(_)
        | PipelineError::Upload(_) => err,
        other => PipelineError::upload(other.to_string()),
    }
}

fn wrap_process_start(err: PipelineError) -> PipelineError {
    match err {
        PipelineError::Cancelled
        | PipelineError::Validation(_)
        | PipelineError::Rejected { .. }
        | PipelineError::NotFound(_)
        | PipelineError::ProcessStart(_) => err,
        other => PipelineError::ProcessStart(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_wrapping_keeps_deterministic_errors_intact() {
        let wrapped = wrap_upload(PipelineError::Server { status: 503, message: "busy".into() });
        assert!(matches!(wrapped, PipelineError::Upload(_)));
        assert!(wrapped.is_retryable());

        let rejected = wrap_upload(PipelineError::Rejected { status: 400, message: "bad".into() });
        assert!(matches!(rejected, PipelineError::Rejected { status: 400, .. }));
        assert!(!rejected.is_retryable());

        assert!(matches!(wrap_process_start(PipelineError::Cancelled), PipelineError::Cancelled));
        let started = wrap_process_start(PipelineError::network("refused"));
        assert!(matches!(started, PipelineError::ProcessStart(_)));
    }

    #[tokio::test]
    async fn cancel_is_idempotent_and_rearmed_per_run() {
        let processor = ReceiptProcessor::new(PipelineConfig::default()).unwrap();
        processor.cancel();
        processor.cancel();

        let token = processor.arm_cancel();
        assert!(!token.is_cancelled());
        processor.cancel();
        assert!(token.is_cancelled());
    }
}
