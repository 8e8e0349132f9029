//! Portfolio upload checks.
//!
//! Mirrors the backend's acceptance rules so obviously bad files fail
//! without a round trip.

use std::path::Path;

use crate::error::{Error, Result};
use crate::types::MediaKind;

/// Largest file the backend accepts.
pub const MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "webm", "m4v"];

/// Classify a file by extension, falling back to its guessed MIME type.
pub fn media_kind(path: &Path) -> Option<MediaKind> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        return Some(MediaKind::Video);
    }
    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        return Some(MediaKind::Image);
    }
    match mime_guess::from_path(path).first()?.type_().as_str() {
        "video" => Some(MediaKind::Video),
        "image" => Some(MediaKind::Image),
        _ => None,
    }
}

/// Check a file before uploading it.
pub fn validate_upload(path: &Path) -> Result<MediaKind> {
    let failure = |reason: &str| Error::UploadFailure {
        file: path.to_path_buf(),
        reason: reason.to_string(),
    };

    let meta = std::fs::metadata(path).map_err(|e| failure(&e.to_string()))?;
    if !meta.is_file() {
        return Err(failure("Not a file"));
    }
    if meta.len() > MAX_UPLOAD_BYTES {
        return Err(failure("File too large"));
    }
    media_kind(path).ok_or_else(|| failure("Unsupported file type"))
}
