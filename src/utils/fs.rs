use std::env;
use std::path::{Path, PathBuf};

use uuid::Uuid;

/// Filename prefix for optimizer output files. Cleanup refuses to touch
/// anything that does not carry it.
pub const TEMP_FILE_PREFIX: &str = "receipt-opt-";

/// Allocates a fresh output path for an optimized receipt in the system
/// temp directory.
pub fn temp_output_path() -> PathBuf {
    env::temp_dir().join(format!("{TEMP_FILE_PREFIX}{}.jpg", Uuid::new_v4()))
}

/// Whether a path looks like one of our own temp outputs.
pub fn is_temp_output(path: impl AsRef<Path>) -> bool {
    path.as_ref()
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(TEMP_FILE_PREFIX))
}

/// Get file extension as lowercase string
pub fn extension(path: impl AsRef<Path>) -> Option<String> {
    path.as_ref()
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}
