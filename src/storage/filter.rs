//! Decides which file names belong in the media index

use std::path::Path;

use crate::domain::media::MediaType;

const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "flac", "wav", "m4a", "m4b", "ogg", "opus", "aac", "aiff", "aif", "wma", "alac",
];
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "m4v", "mkv", "webm", "mov", "avi"];

/// System artifacts that never appear in the index, matched case-insensitively.
const SKIPPED_NAMES: &[&str] = &[".ds_store", "desktop.ini", "thumbs.db"];

/// True for OS artifacts: macOS resource forks (`._*`), `.DS_Store`,
/// `desktop.ini` and `Thumbs.db`. Applies to files and directories alike.
pub fn is_skipped_name(name: &str) -> bool {
    if name.starts_with("._") {
        return true;
    }
    let lower = name.to_lowercase();
    SKIPPED_NAMES.contains(&lower.as_str())
}

/// True when any `/`-separated segment of `path` is a skipped name.
pub fn has_skipped_segment(path: &str) -> bool {
    path.split('/').any(is_skipped_name)
}

pub fn media_type_for_ext(ext: &str) -> Option<MediaType> {
    let ext = ext.to_lowercase();
    let ext = ext.as_str();
    if AUDIO_EXTENSIONS.contains(&ext) {
        Some(MediaType::Audio)
    } else if IMAGE_EXTENSIONS.contains(&ext) {
        Some(MediaType::Image)
    } else if VIDEO_EXTENSIONS.contains(&ext) {
        Some(MediaType::Video)
    } else {
        None
    }
}

/// Classifies a file name; `None` means the file is excluded from the index.
pub fn classify(name: &str) -> Option<MediaType> {
    if is_skipped_name(name) {
        return None;
    }
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(media_type_for_ext)
}

/// Extension of a `/`-separated key, lowercased, without the dot.
pub fn key_extension(key: &str) -> Option<String> {
    let name = key.rsplit('/').next().unwrap_or(key);
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}
