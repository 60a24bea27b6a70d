//! Progress event stream for a pipeline run.
//!
//! Events form one contiguous 0-100 percent timeline across the phases:
//! optimization owns 0-20, upload 20-50, remote processing 50-100.

use tokio::sync::mpsc;
use tracing::debug;

use crate::core::types::{JobStage, OptimizationMetrics, ProcessedReceipt};
use crate::utils::ErrorDetails;

/// Percent at which the upload phase begins.
pub const UPLOAD_PHASE_START: u8 = 20;
/// Percent at which the remote processing phase begins.
pub const PROCESS_PHASE_START: u8 = 50;

/// One event on the pipeline progress stream.
///
/// Serialized with a `type` tag so consumers can switch on it, e.g.
/// `{"type": "UPLOAD_PROGRESS", "percent": 35, ...}`.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE", rename_all_fields = "camelCase")]
pub enum PipelineEvent {
    /// Optimization began
    OptimizeStart { percent: u8 },
    /// Optimization finished, with before/after statistics
    OptimizeComplete { percent: u8, metrics: OptimizationMetrics },
    /// Upload session created, chunked transfer about to begin
    UploadStart { percent: u8, total_bytes: u64 },
    /// A chunk landed; `bytes_sent` is cumulative
    UploadProgress { percent: u8, bytes_sent: u64, total_bytes: u64 },
    /// All chunks accepted
    UploadComplete { percent: u8 },
    /// Remote job started
    ProcessStart { percent: u8, job_id: String },
    /// Job moved to a different stage (emitted once per distinct stage)
    StageChange { percent: u8, stage: JobStage },
    /// Server-side progress moved
    JobProgress { percent: u8 },
    /// Terminal success
    Complete { percent: u8, receipt: ProcessedReceipt },
    /// Terminal failure
    Error { error: ErrorDetails },
}

/// Maps cumulative uploaded bytes into the upload phase's 20-50 band.
pub fn upload_percent(bytes_sent: u64, total_bytes: u64) -> u8 {
    if total_bytes == 0 {
        return PROCESS_PHASE_START;
    }
    let span = (PROCESS_PHASE_START - UPLOAD_PHASE_START) as u64;
    (UPLOAD_PHASE_START as u64 + bytes_sent.min(total_bytes) * span / total_bytes) as u8
}

/// Maps server-reported job progress (0-100) into the poll phase's 50-100 band.
pub fn poll_percent(job_progress: u8) -> u8 {
    PROCESS_PHASE_START + job_progress.min(100) / 2
}

/// Cloneable sending half of the progress stream.
///
/// The channel is unbounded; the pipeline emits at most a few events per
/// second and must never block on a slow consumer.
#[derive(Debug, Clone)]
pub struct ProgressSender {
    tx: mpsc::UnboundedSender<PipelineEvent>,
}

impl ProgressSender {
    /// Creates a connected sender/receiver pair.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PipelineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Emits an event. A dropped receiver is not an error; the run keeps
    /// going and the event is logged instead.
    pub fn emit(&self, event: PipelineEvent) {
        if let Err(err) = self.tx.send(event) {
            debug!("progress receiver dropped, event discarded: {:?}", err.0);
        }
    }
}
