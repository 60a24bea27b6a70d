//! Pipeline configuration.
//!
//! Every knob has a production default; deserializing a partial JSON object
//! fills the gaps from [`Default`], so callers only override what they need.

use std::time::Duration;

use serde::Deserialize;

/// Tuning for the local image optimization pass.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OptimizerOptions {
    /// Longest edge of the optimized output, width
    pub max_width: u32,
    /// Longest edge of the optimized output, height
    pub max_height: u32,
    /// JPEG quality for the re-encode (1-100)
    pub quality: u8,
    /// Reject files smaller than this (likely truncated captures)
    pub min_file_bytes: u64,
    /// Reject files larger than this
    pub max_file_bytes: u64,
    /// Reject images with either dimension below this
    pub min_dimension: u32,
    /// Reject images with either dimension above this
    pub max_dimension: u32,
    /// Aspect ratios beyond this get flagged, but still processed
    pub max_aspect_ratio: f64,
}

impl Default for OptimizerOptions {
    fn default() -> Self {
        Self {
            max_width: 2048,
            max_height: 2048,
            quality: 80,
            min_file_bytes: 1024,
            max_file_bytes: 50 * 1024 * 1024,
            min_dimension: 100,
            max_dimension: 8000,
            max_aspect_ratio: 10.0,
        }
    }
}

/// Transport settings shared by every request the upload client makes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TransferConfig {
    /// OCR service root, e.g. `https://ocr.example.com`
    pub base_url: String,
    /// Preferred chunk size in bytes; the server may negotiate it down
    pub chunk_size: u64,
    /// Retries per request after the first attempt
    pub max_retries: u32,
    /// Base backoff delay, doubled on each retry
    pub retry_delay_ms: u64,
    /// Per-request timeout
    pub request_timeout_ms: u64,
}

impl TransferConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            chunk_size: 1024 * 1024,
            max_retries: 3,
            retry_delay_ms: 1000,
            request_timeout_ms: 30_000,
        }
    }
}

/// Job status polling cadence and budget.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PollConfig {
    /// Delay between status requests
    pub interval_ms: u64,
    /// Wall-clock budget for the whole poll phase
    pub timeout_ms: u64,
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self { interval_ms: 1000, timeout_ms: 60_000 }
    }
}

/// Everything a [`crate::pipeline::ReceiptProcessor`] needs to run.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PipelineConfig {
    pub optimizer: OptimizerOptions,
    pub transfer: TransferConfig,
    pub poll: PollConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_production_values() {
        let config = PipelineConfig::default();
        assert_eq!(config.optimizer.max_width, 2048);
        assert_eq!(config.optimizer.quality, 80);
        assert_eq!(config.transfer.chunk_size, 1024 * 1024);
        assert_eq!(config.transfer.max_retries, 3);
        assert_eq!(config.transfer.retry_delay(), Duration::from_secs(1));
        assert_eq!(config.poll.interval(), Duration::from_secs(1));
        assert_eq!(config.poll.timeout(), Duration::from_secs(60));
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: PipelineConfig = serde_json::from_str(
            r#"{"transfer": {"baseUrl": "https://ocr.internal", "maxRetries": 5}}"#,
        )
        .unwrap();
        assert_eq!(config.transfer.base_url, "https://ocr.internal");
        assert_eq!(config.transfer.max_retries, 5);
        assert_eq!(config.transfer.chunk_size, 1024 * 1024);
        assert_eq!(config.optimizer.max_height, 2048);
    }
}
