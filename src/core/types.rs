//! Core types for upload sessions, OCR jobs and processed receipts.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Upload session negotiated with the OCR service.
///
/// The server decides the effective chunk size and how many chunks it will
/// accept; the client must honor both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    /// Session identifier to tag every chunk with
    pub upload_id: String,
    /// Server-negotiated chunk size in bytes
    pub chunk_size: u64,
    /// Maximum number of chunks the session accepts
    pub max_chunks: u32,
}

/// Handle to a started OCR job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRef {
    pub job_id: String,
}

/// Lifecycle state of an OCR job as reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Active,
    Completed,
    Failed,
}

impl JobState {
    /// Terminal states end the poll loop.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Coarse processing stage the job is currently in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStage {
    Uploading,
    Processing,
    Extracting,
    Classifying,
}

impl JobStage {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uploading => "uploading",
            Self::Processing => "processing",
            Self::Extracting => "extracting",
            Self::Classifying => "classifying",
        }
    }
}

/// Error block attached to a failed job status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct JobError {
    /// Server-side failure code, e.g. `RECEIPT_UNREADABLE`
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// One status snapshot from the OCR service.
///
/// Unknown stages or a missing progress field must not break the poll loop,
/// hence the defaults and optionals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusReport {
    pub status: JobState,
    /// Server-reported progress 0-100
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub stage: Option<JobStage>,
    #[serde(default)]
    pub result: Option<JobResult>,
    #[serde(default)]
    pub error: Option<JobError>,
}

/// Payload of a completed OCR job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    /// Full extracted text
    #[serde(default)]
    pub text: String,
    /// Extraction confidence 0.0-1.0
    #[serde(default)]
    pub confidence: f32,
    #[serde(default)]
    pub classification: Option<ReceiptClassification>,
}

/// Structured fields the OCR service extracted from the receipt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptClassification {
    #[serde(default)]
    pub merchant: Option<String>,
    /// Purchase date as the server reported it, not normalized
    #[serde(default)]
    pub purchase_date: Option<String>,
    #[serde(default)]
    pub total: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    /// Any extra fields newer server versions add
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Before/after statistics for one optimization pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationMetrics {
    pub original_width: u32,
    pub original_height: u32,
    pub optimized_width: u32,
    pub optimized_height: u32,
    /// Input file size in bytes
    pub original_size: u64,
    /// Output file size in bytes
    pub optimized_size: u64,
    /// Size reduction as a percentage, clamped to zero when the file grew
    pub reduction_percentage: f64,
    pub duration_ms: u64,
    /// Output format name, currently always "jpeg"
    pub format: String,
}

/// Output of the local optimization pass.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationOutcome {
    /// Path of the optimized temp file
    pub optimized_path: String,
    pub metrics: OptimizationMetrics,
}

/// Everything the pipeline produced for one receipt, end to end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedReceipt {
    /// Original capture the user provided
    pub original_uri: String,
    /// Optimized temp file that was actually uploaded
    pub optimized_uri: String,
    pub text: String,
    pub confidence: f32,
    #[serde(default)]
    pub classification: Option<ReceiptClassification>,
    pub optimization: OptimizationMetrics,
    pub processed_at: DateTime<Utc>,
}

/// User-editable draft built from OCR output, confirmed during review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptDraft {
    #[serde(default)]
    pub merchant: Option<String>,
    #[serde(default)]
    pub purchase_date: Option<String>,
    #[serde(default)]
    pub total: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    /// Free-text notes the user adds during review
    #[serde(default)]
    pub notes: Option<String>,
    /// Raw OCR text kept for reference during editing
    #[serde(default)]
    pub text: String,
}

impl ReceiptDraft {
    /// Seeds a draft from a processed receipt, copying over whatever the
    /// classifier managed to extract.
    pub fn from_processed(receipt: &ProcessedReceipt) -> Self {
        let classification = receipt.classification.clone().unwrap_or_default();
        Self {
            merchant: classification.merchant,
            purchase_date: classification.purchase_date,
            total: classification.total,
            currency: classification.currency,
            category: classification.category,
            notes: None,
            text: receipt.text.clone(),
        }
    }
}
