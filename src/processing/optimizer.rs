use std::path::{Path, PathBuf};
use std::time::Instant;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{GenericImageView, ImageReader};
use tracing::debug;

use crate::config::OptimizerOptions;
use crate::core::{OptimizationMetrics, OptimizationOutcome};
use crate::processing::validation::{ValidationReport, validate_source};
use crate::utils::{PipelineError, PipelineResult, fs as pipeline_fs};

/// Optimizes receipt captures for upload: validates the source, downscales
/// it to fit the configured bounds and re-encodes it as JPEG.
#[derive(Debug, Clone)]
pub struct ReceiptOptimizer {
    options: OptimizerOptions,
}

impl ReceiptOptimizer {
    pub fn new(options: OptimizerOptions) -> Self {
        Self { options }
    }

    /// Runs the full optimization pass for one capture.
    ///
    /// Validation failures come back as [`PipelineError::Validation`];
    /// decode/encode problems as [`PipelineError::Optimization`]. The
    /// pixel work runs on the blocking pool.
    pub async fn optimize(&self, source: &str) -> PipelineResult<OptimizationOutcome> {
        let report = validate_source(source, &self.options).await?;
        debug!(
            source,
            width = report.width,
            height = report.height,
            file_size = report.file_size,
            "source validated, optimizing"
        );

        let options = self.options.clone();
        let source_path = PathBuf::from(source);
        let outcome =
            tokio::task::spawn_blocking(move || optimize_blocking(&source_path, &report, &options))
                .await
                .map_err(|e| {
                    PipelineError::optimization(format!("optimization task failed: {e}"))
                })??;

        debug!(
            source,
            optimized = %outcome.optimized_path,
            reduction = outcome.metrics.reduction_percentage,
            duration_ms = outcome.metrics.duration_ms,
            "optimization complete"
        );
        Ok(outcome)
    }
}

fn optimize_blocking(
    source: &Path,
    report: &ValidationReport,
    options: &OptimizerOptions,
) -> PipelineResult<OptimizationOutcome> {
    let started = Instant::now();

    let decoded = ImageReader::open(source)
        .map_err(|e| PipelineError::optimization(format!("failed to open image: {e}")))?
        .with_guessed_format()
        .map_err(|e| PipelineError::optimization(format!("failed to detect format: {e}")))?
        .decode()
        .map_err(|e| PipelineError::optimization(format!("failed to decode image: {e}")))?;

    let (width, height) = decoded.dimensions();
    let (target_width, target_height) =
        target_dimensions(width, height, options.max_width, options.max_height);

    let resized = if (target_width, target_height) == (width, height) {
        decoded
    } else {
        decoded.resize_exact(target_width, target_height, FilterType::Triangle)
    };
    let rgb = resized.to_rgb8();

    let mut encoded = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut encoded, options.quality))
        .map_err(|e| PipelineError::optimization(format!("failed to encode jpeg: {e}")))?;

    let output_path = pipeline_fs::temp_output_path();
    std::fs::write(&output_path, &encoded)
        .map_err(|e| PipelineError::optimization(format!("failed to write output: {e}")))?;

    let metrics = OptimizationMetrics {
        original_width: width,
        original_height: height,
        optimized_width: target_width,
        optimized_height: target_height,
        original_size: report.file_size,
        optimized_size: encoded.len() as u64,
        reduction_percentage: reduction_percentage(report.file_size, encoded.len() as u64),
        duration_ms: started.elapsed().as_millis() as u64,
        format: "jpeg".to_string(),
    };

    Ok(OptimizationOutcome { optimized_path: output_path.display().to_string(), metrics })
}

/// Fits `width` x `height` inside the configured bounds, preserving aspect
/// ratio. Never upscales.
fn target_dimensions(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width <= max_width && height <= max_height {
        return (width, height);
    }
    let scale = (max_width as f64 / width as f64).min(max_height as f64 / height as f64);
    let target_width = ((width as f64 * scale).round() as u32).clamp(1, max_width);
    let target_height = ((height as f64 * scale).round() as u32).clamp(1, max_height);
    (target_width, target_height)
}

/// Size reduction as a percentage, zero when the output grew.
fn reduction_percentage(original_size: u64, optimized_size: u64) -> f64 {
    if original_size == 0 || optimized_size >= original_size {
        return 0.0;
    }
    (original_size - optimized_size) as f64 / original_size as f64 * 100.0
}

/// Removes an optimizer temp file once the pipeline is done with it.
///
/// Refuses to touch paths that are not our own outputs. Best effort; a
/// failed removal is logged and otherwise ignored.
pub async fn cleanup(path: impl AsRef<Path>) {
    let path = path.as_ref();
    if !pipeline_fs::is_temp_output(path) {
        debug!(path = %path.display(), "not an optimizer output, skipping cleanup");
        return;
    }
    if let Err(e) = tokio::fs::remove_file(path).await {
        debug!(path = %path.display(), "temp file cleanup failed: {e}");
    }
}
