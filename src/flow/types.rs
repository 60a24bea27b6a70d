//! Flow state: steps, transitions, errors and per-flow metrics.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::{ProcessedReceipt, ReceiptDraft};
use crate::utils::PipelineError;

/// Steps of the receipt capture flow, in their forward order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowStep {
    Capture,
    Processing,
    Review,
    Verification,
    Report,
}

impl FlowStep {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Capture => "capture",
            Self::Processing => "processing",
            Self::Review => "review",
            Self::Verification => "verification",
            Self::Report => "report",
        }
    }
}

impl fmt::Display for FlowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flow identifier. Time-ordered, so sorting ids sorts flows by creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlowId(Uuid);

impl FlowId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for FlowId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One recorded step change.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepTransition {
    pub from: FlowStep,
    pub to: FlowStep,
    /// Why the step changed, e.g. "ocr_complete" or "user_back"
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Timing and failure counters for one flow.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct FlowMetrics {
    /// Milliseconds spent in each step, accumulated across revisits
    pub step_durations: HashMap<FlowStep, u64>,
    /// Milliseconds since the flow was created
    pub total_duration_ms: u64,
    pub retry_count: u32,
    pub error_count: u32,
}

/// An error as the flow experienced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowError {
    /// Step the flow was in when the error hit
    pub step: FlowStep,
    pub code: String,
    pub message: String,
    pub user_message: String,
    pub timestamp: DateTime<Utc>,
    pub retryable: bool,
}

impl FlowError {
    pub fn from_pipeline(step: FlowStep, err: &PipelineError) -> Self {
        let details = err.details();
        Self {
            step,
            code: details.code,
            message: details.message,
            user_message: details.user_message,
            timestamp: Utc::now(),
            retryable: details.retryable,
        }
    }
}

/// Full state of one receipt capture flow.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Flow {
    pub id: FlowId,
    /// Source image the flow works on; empty until a capture is taken
    pub image_uri: String,
    pub current_step: FlowStep,
    /// Creation time of the flow
    pub timestamp: DateTime<Utc>,
    /// Every step visited, in order, revisits included
    pub step_history: Vec<FlowStep>,
    pub transitions: Vec<StepTransition>,
    pub ocr_result: Option<ProcessedReceipt>,
    pub receipt_draft: Option<ReceiptDraft>,
    pub error_history: Vec<FlowError>,
    /// Error of the most recent failed attempt, cleared by a retry
    pub last_error: Option<FlowError>,
    pub metrics: FlowMetrics,
    pub is_complete: bool,
    /// When the current step was entered, for duration accounting
    #[serde(skip_serializing)]
    pub(crate) step_entered_at: DateTime<Utc>,
}

impl Flow {
    pub(crate) fn new(image_uri: String) -> Self {
        let now = Utc::now();
        Self {
            id: FlowId::new(),
            image_uri,
            current_step: FlowStep::Capture,
            timestamp: now,
            step_history: vec![FlowStep::Capture],
            transitions: Vec::new(),
            ocr_result: None,
            receipt_draft: None,
            error_history: Vec::new(),
            last_error: None,
            metrics: FlowMetrics::default(),
            is_complete: false,
            step_entered_at: now,
        }
    }
}

/// Compact record of a finished flow, kept in the bounded recent log.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowSummary {
    pub id: FlowId,
    /// Creation time of the flow
    pub timestamp: DateTime<Utc>,
    pub is_complete: bool,
}

impl FlowSummary {
    pub fn of(flow: &Flow) -> Self {
        Self { id: flow.id, timestamp: flow.timestamp, is_complete: flow.is_complete }
    }
}

/// Partial update applied to the active flow. `None` fields are left
/// untouched.
#[derive(Debug, Clone, Default)]
pub struct FlowUpdate {
    pub current_step: Option<FlowStep>,
    /// Recorded on the transition when the step actually changes
    pub step_reason: Option<String>,
    pub image_uri: Option<String>,
    pub ocr_result: Option<ProcessedReceipt>,
    pub receipt_draft: Option<ReceiptDraft>,
}

impl FlowUpdate {
    pub fn step(step: FlowStep) -> Self {
        Self { current_step: Some(step), ..Self::default() }
    }

    pub fn step_with_reason(step: FlowStep, reason: impl Into<String>) -> Self {
        Self { current_step: Some(step), step_reason: Some(reason.into()), ..Self::default() }
    }

    pub fn with_image(mut self, uri: impl Into<String>) -> Self {
        self.image_uri = Some(uri.into());
        self
    }

    pub fn with_ocr_result(mut self, receipt: ProcessedReceipt) -> Self {
        self.ocr_result = Some(receipt);
        self
    }

    pub fn with_draft(mut self, draft: ReceiptDraft) -> Self {
        self.receipt_draft = Some(draft);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flow_ids_sort_by_creation_time() {
        let first = FlowId::new();
        std::thread::sleep(std::time::Duration::from_millis(3));
        let second = FlowId::new();
        assert!(first < second);
    }

    #[test]
    fn flow_serializes_camel_case_without_bookkeeping_fields() {
        let flow = Flow::new("/tmp/capture.jpg".to_string());
        let json = serde_json::to_value(&flow).unwrap();
        assert_eq!(json["currentStep"], "capture");
        assert_eq!(json["imageUri"], "/tmp/capture.jpg");
        assert_eq!(json["isComplete"], false);
        assert_eq!(json["stepHistory"][0], "capture");
        assert!(json.get("stepEnteredAt").is_none());
        assert!(json["metrics"]["stepDurations"].is_object());
    }

    #[test]
    fn flow_error_projects_pipeline_error() {
        let err = PipelineError::Ocr {
            code: Some("RECEIPT_UNREADABLE".into()),
            message: "too dark".into(),
        };
        let flow_error = FlowError::from_pipeline(FlowStep::Processing, &err);
        assert_eq!(flow_error.step, FlowStep::Processing);
        assert_eq!(flow_error.code, "RECEIPT_UNREADABLE");
        assert!(!flow_error.retryable);
        assert!(flow_error.message.contains("too dark"));
    }
}
