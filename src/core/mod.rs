//! Core pipeline types and the progress event stream.
//!
//! This module contains the fundamental types used throughout the pipeline:
//! - [`UploadSession`] / [`JobRef`] / [`JobStatusReport`]: the OCR service contract
//! - [`ProcessedReceipt`]: the end-to-end result of one run
//! - [`PipelineEvent`] / [`ProgressSender`]: the progress event stream

mod progress;
mod types;

pub use progress::{
    PipelineEvent, ProgressSender, PROCESS_PHASE_START, UPLOAD_PHASE_START, poll_percent,
    upload_percent,
};
pub use types::{
    JobError, JobRef, JobResult, JobStage, JobState, JobStatusReport, OptimizationMetrics,
    OptimizationOutcome, ProcessedReceipt, ReceiptClassification, ReceiptDraft, UploadSession,
};
