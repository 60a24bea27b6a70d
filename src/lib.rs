// Module declarations in dependency order
pub mod utils;
pub mod config;
pub mod core;
pub mod processing;
pub mod transfer;
pub mod pipeline;
pub mod flow;

// Public exports for external consumers
pub use crate::config::{OptimizerOptions, PipelineConfig, PollConfig, TransferConfig};
pub use crate::core::{
    JobRef, JobStage, JobState, JobStatusReport, OptimizationMetrics, PipelineEvent,
    ProcessedReceipt, ProgressSender, ReceiptClassification, ReceiptDraft, UploadSession,
};
pub use crate::flow::{Flow, FlowId, FlowMachine, FlowStateError, FlowStep, FlowSummary, FlowUpdate};
pub use crate::pipeline::ReceiptProcessor;
pub use crate::transfer::OcrClient;
pub use crate::utils::{
    CorrelationId, ErrorCode, ErrorDetails, PipelineError, PipelineResult, ValidationError,
};

// This crate is consumed as a library; the hosting application wires the
// progress stream and flow machine into its own UI layer.
