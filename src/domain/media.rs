use serde::{Deserialize, Serialize};

/// Classification of an indexed file, decided by its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Audio,
    Image,
    Video,
}

/// One indexed media file, produced fresh by every local scan or remote listing.
///
/// Paths use `/` as separator regardless of the host OS. `folder_path` is the
/// parent of `relative_path` and is empty for files at the source root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaEntry {
    /// Absolute local path or full remote object key
    pub source_key: String,
    pub relative_path: String,
    pub file_name: String,
    pub folder_path: String,
    pub media_type: MediaType,
    pub size: u64,
    /// Seconds since unix epoch
    pub modified_at: Option<i64>,
}

impl MediaEntry {
    /// Builds an entry from a `/`-separated path relative to its source root.
    pub fn from_relative(
        source_key: String,
        relative_path: &str,
        media_type: MediaType,
        size: u64,
        modified_at: Option<i64>,
    ) -> Self {
        let relative_path = relative_path.trim_matches('/');
        let (folder_path, file_name) = match relative_path.rsplit_once('/') {
            Some((folder, name)) => (folder.to_string(), name.to_string()),
            None => (String::new(), relative_path.to_string()),
        };

        Self {
            source_key,
            relative_path: relative_path.to_string(),
            file_name,
            folder_path,
            media_type,
            size,
            modified_at,
        }
    }
}

/// Tags and technical properties of a single track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackMetadata {
    pub artist: String,
    pub album: String,
    pub title: String,
    pub duration_seconds: u64,
    /// Base64 encoded first embedded picture, empty when the file has none
    pub artwork: String,
    pub artwork_mime: Option<String>,
    pub bitrate: Option<u32>,
    pub sample_rate: Option<u32>,
    pub codec: Option<String>,
    pub channel_count: Option<u8>,
    pub file_size: Option<u64>,
    pub modified_at: Option<i64>,
}

pub const UNKNOWN_ARTIST: &str = "Unknown Artist";
pub const UNKNOWN_ALBUM: &str = "Unknown Album";
