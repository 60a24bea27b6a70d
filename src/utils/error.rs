//! Error types for the receipt pipeline.
//!
//! Provides a hierarchy of error types using `thiserror`, plus the code-based
//! taxonomy (`ErrorCode`) from which the `retryable` flag and the user-facing
//! message are derived in exactly one place.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for candidate receipt images.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// File does not exist
    #[error("file not found: {0}")]
    NotFound(String),
    /// Path exists but is not a regular file
    #[error("not a file: {0}")]
    NotAFile(String),
    /// Extension is not one of the accepted capture formats
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),
    /// File is below the minimum useful size
    #[error("file too small ({size} bytes, minimum {min})")]
    TooSmall { size: u64, min: u64 },
    /// File exceeds the maximum accepted size
    #[error("file too large ({size} bytes, maximum {max})")]
    TooLarge { size: u64, max: u64 },
    /// Image is too small for OCR to produce legible output
    #[error("image {width}x{height} below minimum dimension {min}")]
    DimensionsTooSmall { width: u32, height: u32, min: u32 },
    /// Image exceeds the maximum supported dimensions
    #[error("image {width}x{height} exceeds maximum dimension {max}")]
    DimensionsTooLarge { width: u32, height: u32, max: u32 },
    /// The image header could not be read at all
    #[error("unreadable image: {0}")]
    UnreadableImage(String),
    /// Upload would need more chunks than the session permits
    #[error("upload needs {needed} chunks but the session allows {allowed}")]
    ChunkBudgetExceeded { needed: u32, allowed: u32 },
}

/// Main error type for the receipt pipeline.
///
/// Every failure the pipeline can surface is one of these variants; the
/// machine-readable code, the `retryable` flag and the user-facing message
/// all derive from [`PipelineError::code`].
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Input validation failed (local and deterministic, retrying cannot help)
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Image decode/resize/encode failed
    #[error("image optimization failed: {0}")]
    Optimization(String),

    /// Chunked upload failed after exhausting its retry budget
    #[error("upload failed: {0}")]
    Upload(String),

    /// The remote job could not be started
    #[error("processing could not be started: {0}")]
    ProcessStart(String),

    /// Transport-level failure (DNS, connect, reset, ...)
    #[error("network error: {0}")]
    Network(String),

    /// A request or the poll loop exceeded its time budget
    #[error("timed out: {0}")]
    Timeout(String),

    /// Server replied 5xx
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Server replied 429
    #[error("rate limited by server")]
    RateLimited,

    /// Server replied with a non-retryable 4xx
    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Requested resource does not exist on the server
    #[error("not found: {0}")]
    NotFound(String),

    /// The OCR job itself failed, or completed without a usable result.
    /// `code` carries the server-supplied failure code when one was given.
    #[error("ocr processing failed: {message}")]
    Ocr { code: Option<String>, message: String },

    /// The caller cancelled the operation
    #[error("operation cancelled")]
    Cancelled,
}

/// Convenience result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Machine codes for the pipeline error taxonomy.
///
/// The `retryable` flag is a property of the code, never of the call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationFailed,
    OptimizationFailed,
    UploadFailed,
    ProcessStartFailed,
    NetworkError,
    Timeout,
    ServerError,
    RateLimited,
    NotFound,
    OcrFailed,
    Cancelled,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::OptimizationFailed => "OPTIMIZATION_FAILED",
            Self::UploadFailed => "UPLOAD_FAILED",
            Self::ProcessStartFailed => "PROCESS_START_FAILED",
            Self::NetworkError => "NETWORK_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::ServerError => "SERVER_ERROR",
            Self::RateLimited => "RATE_LIMITED",
            Self::NotFound => "NOT_FOUND",
            Self::OcrFailed => "OCR_FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Whether an error with this code is worth retrying.
    ///
    /// Transient transport/server conditions and the phase-wrap codes are;
    /// deterministic ones (validation, not-found, a terminal OCR verdict)
    /// are not. Cancellation is a user decision, not a failure.
    pub const fn is_retryable(self) -> bool {
        match self {
            Self::OptimizationFailed
            | Self::UploadFailed
            | Self::ProcessStartFailed
            | Self::NetworkError
            | Self::Timeout
            | Self::ServerError
            | Self::RateLimited => true,
            Self::ValidationFailed | Self::NotFound | Self::OcrFailed | Self::Cancelled => false,
        }
    }

    /// Short message suitable for directly showing to the end user.
    pub const fn user_message(self) -> &'static str {
        match self {
            Self::ValidationFailed => "This image can't be used. Please take a new photo of the receipt.",
            Self::OptimizationFailed => "We couldn't prepare the image. Please try again.",
            Self::UploadFailed => "The upload didn't finish. Check your connection and try again.",
            Self::ProcessStartFailed => "The receipt couldn't be submitted for processing. Please try again.",
            Self::NetworkError => "We couldn't reach the server. Check your connection and try again.",
            Self::Timeout => "The server took too long to respond. Please try again.",
            Self::ServerError => "Something went wrong on our side. Please try again in a moment.",
            Self::RateLimited => "Too many requests right now. Please wait a moment and try again.",
            Self::NotFound => "The requested item could not be found.",
            Self::OcrFailed => "We couldn't read this receipt. Try a clearer, well-lit photo.",
            Self::Cancelled => "Processing was cancelled.",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serializable projection of a [`PipelineError`], carried by progress events
/// and flow error history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetails {
    /// Machine code. For job failures this is the server-supplied code when
    /// one was present, otherwise the taxonomy code.
    pub code: String,
    /// Technical message for logs and diagnostics
    pub message: String,
    /// Message suitable for the end user
    pub user_message: String,
    /// Whether offering a retry action makes sense
    pub retryable: bool,
}

impl PipelineError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation(_) => ErrorCode::ValidationFailed,
            Self::Optimization(_) => ErrorCode::OptimizationFailed,
            Self::Upload(_) => ErrorCode::UploadFailed,
            Self::ProcessStart(_) => ErrorCode::ProcessStartFailed,
            Self::Network(_) => ErrorCode::NetworkError,
            Self::Timeout(_) => ErrorCode::Timeout,
            Self::Server { .. } => ErrorCode::ServerError,
            Self::RateLimited => ErrorCode::RateLimited,
            // A rejected request is a client-side mistake; retrying replays it.
            Self::Rejected { .. } => ErrorCode::ValidationFailed,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::Ocr { .. } => ErrorCode::OcrFailed,
            Self::Cancelled => ErrorCode::Cancelled,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.code().is_retryable()
    }

    /// Builds the serializable projection, preferring the server-supplied
    /// failure code for job-level errors.
    pub fn details(&self) -> ErrorDetails {
        let code = self.code();
        let code_str = match self {
            Self::Ocr { code: Some(server_code), .. } => server_code.clone(),
            _ => code.as_str().to_string(),
        };
        ErrorDetails {
            code: code_str,
            message: self.to_string(),
            user_message: code.user_message().to_string(),
            retryable: code.is_retryable(),
        }
    }
}

// Helper methods for error creation
impl PipelineError {
    pub fn optimization<T: Into<String>>(msg: T) -> Self {
        Self::Optimization(msg.into())
    }

    pub fn upload<T: Into<String>>(msg: T) -> Self {
        Self::Upload(msg.into())
    }

    pub fn network<T: Into<String>>(msg: T) -> Self {
        Self::Network(msg.into())
    }

    pub fn timeout<T: Into<String>>(msg: T) -> Self {
        Self::Timeout(msg.into())
    }
}
