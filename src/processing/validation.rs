use std::path::Path;

use tracing::warn;

use crate::config::OptimizerOptions;
use crate::utils::{ValidationError, fs as pipeline_fs};

/// Capture formats the pipeline accepts as input.
const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

/// What validation learned about the source image.
///
/// `issues` holds soft warnings (e.g. an extreme aspect ratio) that do not
/// block processing but are worth surfacing.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    pub width: u32,
    pub height: u32,
    pub file_size: u64,
    pub issues: Vec<String>,
}

/// Validates a candidate receipt image before any work is spent on it.
///
/// Checks existence, format, file size bounds and image dimensions. Only the
/// header is read; the image is not decoded here.
pub async fn validate_source(
    path: impl AsRef<Path>,
    options: &OptimizerOptions,
) -> Result<ValidationReport, ValidationError> {
    let path = path.as_ref();

    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|_| ValidationError::NotFound(path.display().to_string()))?;
    if !metadata.is_file() {
        return Err(ValidationError::NotAFile(path.display().to_string()));
    }

    let extension = pipeline_fs::extension(path)
        .ok_or_else(|| ValidationError::UnsupportedFormat("(no extension)".to_string()))?;
    if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(ValidationError::UnsupportedFormat(extension));
    }

    let file_size = metadata.len();
    if file_size < options.min_file_bytes {
        return Err(ValidationError::TooSmall { size: file_size, min: options.min_file_bytes });
    }
    if file_size > options.max_file_bytes {
        return Err(ValidationError::TooLarge { size: file_size, max: options.max_file_bytes });
    }

    // Header-only dimension read; a full decode happens later, off the
    // async runtime.
    let owned = path.to_path_buf();
    let (width, height) = tokio::task::spawn_blocking(move || image::image_dimensions(&owned))
        .await
        .map_err(|e| ValidationError::UnreadableImage(e.to_string()))?
        .map_err(|e| ValidationError::UnreadableImage(e.to_string()))?;

    if width < options.min_dimension || height < options.min_dimension {
        return Err(ValidationError::DimensionsTooSmall {
            width,
            height,
            min: options.min_dimension,
        });
    }
    if width > options.max_dimension || height > options.max_dimension {
        return Err(ValidationError::DimensionsTooLarge {
            width,
            height,
            max: options.max_dimension,
        });
    }

    let mut issues = Vec::new();
    let ratio = width.max(height) as f64 / width.min(height).max(1) as f64;
    if ratio > options.max_aspect_ratio {
        let issue = format!(
            "unusual aspect ratio {ratio:.1}:1 for {width}x{height}, OCR quality may suffer"
        );
        warn!(path = %path.display(), "{issue}");
        issues.push(issue);
    }

    Ok(ValidationReport { width, height, file_size, issues })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> OptimizerOptions {
        OptimizerOptions { min_file_bytes: 16, ..OptimizerOptions::default() }
    }

    fn write_png(dir: &tempfile::TempDir, name: &str, width: u32, height: u32) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let img = image::RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        });
        img.save(&path).unwrap();
        path
    }

    #[tokio::test]
    async fn accepts_a_normal_capture() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(&dir, "receipt.png", 800, 600);

        let report = validate_source(&path, &options()).await.unwrap();
        assert_eq!((report.width, report.height), (800, 600));
        assert!(report.issues.is_empty());
        assert!(report.file_size >= 16);
    }

    #[tokio::test]
    async fn rejects_missing_file() {
        let err = validate_source("/nonexistent/receipt.jpg", &options()).await.unwrap_err();
        assert!(matches!(err, ValidationError::NotFound(_)));
    }

    #[tokio::test]
    async fn rejects_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("receipt.gif");
        tokio::fs::write(&path, vec![0u8; 64]).await.unwrap();

        let err = validate_source(&path, &options()).await.unwrap_err();
        assert_eq!(err, ValidationError::UnsupportedFormat("gif".to_string()));
    }

    #[tokio::test]
    async fn rejects_truncated_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.jpg");
        tokio::fs::write(&path, b"x").await.unwrap();

        let err = validate_source(&path, &options()).await.unwrap_err();
        assert!(matches!(err, ValidationError::TooSmall { size: 1, .. }));
    }

    #[tokio::test]
    async fn rejects_garbage_bytes_with_image_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.jpg");
        tokio::fs::write(&path, vec![0u8; 2048]).await.unwrap();

        let err = validate_source(&path, &options()).await.unwrap_err();
        assert!(matches!(err, ValidationError::UnreadableImage(_)));
    }

    #[tokio::test]
    async fn rejects_dimensions_below_minimum() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(&dir, "thumb.png", 80, 80);

        let err = validate_source(&path, &options()).await.unwrap_err();
        assert!(matches!(err, ValidationError::DimensionsTooSmall { width: 80, height: 80, .. }));
    }

    #[tokio::test]
    async fn extreme_aspect_ratio_is_a_warning_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        // long thin till roll, 15:1
        let path = write_png(&dir, "roll.png", 1500, 100);

        let report = validate_source(&path, &options()).await.unwrap();
        assert_eq!(report.issues.len(), 1);
        assert!(report.issues[0].contains("aspect ratio"));
    }
}
