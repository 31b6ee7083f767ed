//! Tag and artwork extraction for local files and remote objects.
//!
//! Remote objects are never downloaded whole: the first `range_bytes` are
//! fetched (tag headers and embedded artwork sit at the start of the file)
//! and staged in a temporary file, because the tag parser needs a seekable
//! file whose extension selects the format reader. The staging file is a
//! `NamedTempFile`, removed when it goes out of scope on every path.

use std::{
    io::Write,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use base64::prelude::*;
use lofty::{
    file::{AudioFile, TaggedFileExt},
    probe::Probe,
    tag::Accessor,
};
use tempfile::NamedTempFile;

use crate::{
    domain::media::{TrackMetadata, UNKNOWN_ALBUM, UNKNOWN_ARTIST},
    remote::{ByteRange, ObjectStore, error::RemoteError},
    storage::{cache::TtlCache, error::StorageError, filter::key_extension, time::system_time_to_i64},
};

const STAGING_PREFIX: &str = "mediadeck-stage-";

fn non_empty(value: Option<std::borrow::Cow<'_, str>>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parses tags, technical properties and the first embedded picture.
fn read_tags(path: &Path, fallback_title: &str) -> anyhow::Result<TrackMetadata> {
    let tagged = Probe::open(path)
        .context("failed to open file for tag parsing")?
        .guess_file_type()
        .context("failed to detect file type")?
        .read()
        .context("failed to parse tags")?;

    let props = tagged.properties();
    let tag = tagged.primary_tag().or_else(|| tagged.first_tag());

    let artist = tag.and_then(|t| non_empty(t.artist()));
    let album = tag.and_then(|t| non_empty(t.album()));
    let title = tag.and_then(|t| non_empty(t.title()));

    let picture = tagged.tags().iter().find_map(|t| t.pictures().first());
    let (artwork, artwork_mime) = match picture {
        Some(picture) => (
            BASE64_STANDARD.encode(picture.data()),
            picture.mime_type().map(|m| m.as_str().to_string()),
        ),
        None => (String::new(), None),
    };

    Ok(TrackMetadata {
        artist: artist.unwrap_or_else(|| UNKNOWN_ARTIST.to_string()),
        album: album.unwrap_or_else(|| UNKNOWN_ALBUM.to_string()),
        title: title.unwrap_or_else(|| fallback_title.to_string()),
        duration_seconds: props.duration().as_secs_f64().round() as u64,
        artwork,
        artwork_mime,
        bitrate: props.audio_bitrate().or(props.overall_bitrate()),
        sample_rate: props.sample_rate(),
        codec: Some(format!("{:?}", tagged.file_type())),
        channel_count: props.channels(),
        file_size: None,
        modified_at: None,
    })
}

/// File name without extension, used as title when the tags have none.
fn stem_of(name: &str) -> String {
    let name = name.rsplit('/').next().unwrap_or(name);
    Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string())
}

fn extraction_failed(key: &str, reason: impl std::fmt::Display) -> StorageError {
    StorageError::MetadataExtractionFailed {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

pub struct MetadataExtractor {
    cache: TtlCache<String, TrackMetadata>,
    range_bytes: u64,
    staging_dir: PathBuf,
}

impl MetadataExtractor {
    pub fn new(ttl: Duration, range_bytes: u64, staging_dir: Option<PathBuf>) -> Self {
        Self {
            cache: TtlCache::new(ttl),
            range_bytes,
            staging_dir: staging_dir.unwrap_or_else(std::env::temp_dir),
        }
    }

    /// Reads a local file directly. Not cached: local reads are cheap and
    /// always reflect the current file.
    pub fn extract_local(&self, path: &Path) -> Result<TrackMetadata, StorageError> {
        let key = path.to_string_lossy();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut metadata = read_tags(path, &stem_of(&name)).map_err(|e| extraction_failed(&key, format!("{e:#}")))?;

        if let Ok(fs_meta) = std::fs::metadata(path) {
            metadata.file_size = Some(fs_meta.len());
            metadata.modified_at = fs_meta
                .modified()
                .ok()
                .and_then(|t| system_time_to_i64(t).ok());
        }
        Ok(metadata)
    }

    /// Cached descriptor for a remote key, if still fresh.
    pub fn cached(&self, key: &str) -> Option<TrackMetadata> {
        self.cache.get(&key.to_string())
    }

    /// Fetches the head of a remote object, parses it from a staging file and
    /// caches the result. Failures leave the cache untouched.
    pub fn extract_remote(&self, store: &dyn ObjectStore, key: &str) -> Result<TrackMetadata, StorageError> {
        let ext = key_extension(key).ok_or_else(|| StorageError::InvalidKey(key.to_string()))?;

        let ranged = store
            .download_range(key, ByteRange::prefix(self.range_bytes))
            .map_err(|e| match e {
                RemoteError::NotFound(_) => StorageError::MediaNotFound(key.to_string()),
                e => extraction_failed(key, e),
            })?;
        log::debug!("fetched {} header bytes of {key}", ranged.bytes.len());

        let staged = self.stage(&ext, &ranged.bytes).map_err(|e| extraction_failed(key, format!("{e:#}")))?;
        let parsed = read_tags(staged.path(), &stem_of(key));
        if let Err(e) = staged.close() {
            log::warn!("failed to remove staging file for {key}: {e}");
        }

        let mut metadata = parsed.map_err(|e| extraction_failed(key, format!("{e:#}")))?;
        metadata.file_size = ranged.total_size;
        metadata.modified_at = ranged.uploaded_at_ms.map(|ms| ms / 1000);

        self.cache.insert(key.to_string(), metadata.clone());
        log::debug!("metadata cache holds {} records", self.cache.record_count());
        Ok(metadata)
    }

    /// Writes `bytes` to a uniquely named file ending in `.{ext}`.
    fn stage(&self, ext: &str, bytes: &[u8]) -> anyhow::Result<NamedTempFile> {
        let mut file = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .suffix(&format!(".{ext}"))
            .tempfile_in(&self.staging_dir)
            .with_context(|| format!("failed to create staging file in {}", self.staging_dir.display()))?;
        file.write_all(bytes).context("failed to write staging file")?;
        file.flush().context("failed to flush staging file")?;
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, sync::Arc};

    use tempfile::TempDir;

    use super::*;
    use crate::remote::mock::{MockStore, UPLOADED_AT_MS, wav_bytes};
    use lofty::{
        config::WriteOptions,
        picture::{MimeType, Picture, PictureType},
        tag::{Tag, TagExt, TagType},
    };

    const COVER: &[u8] = b"\x89PNG\r\n\x1a\ncover-art";

    /// Writes a WAV file carrying an ID3v2 tag with one front cover.
    fn write_tagged_wav(path: &Path) {
        fs::write(path, wav_bytes(8000)).unwrap();

        let mut tag = Tag::new(TagType::Id3v2);
        tag.set_artist("The Testers".to_string());
        tag.set_album("Fixtures".to_string());
        tag.set_title("Covered".to_string());
        tag.push_picture(Picture::new_unchecked(
            PictureType::CoverFront,
            Some(MimeType::Png),
            None,
            COVER.to_vec(),
        ));
        tag.save_to_path(path, WriteOptions::default()).unwrap();
    }

    fn assert_cover(meta: &TrackMetadata) {
        assert_eq!(meta.artwork, BASE64_STANDARD.encode(COVER));
        assert_eq!(meta.artwork, "iVBORw0KGgpjb3Zlci1hcnQ=");
        assert_eq!(meta.artwork_mime.as_deref(), Some("image/png"));
        assert_eq!(meta.artist, "The Testers");
        assert_eq!(meta.album, "Fixtures");
        assert_eq!(meta.title, "Covered");
    }

    fn extractor(staging: &Path) -> MetadataExtractor {
        MetadataExtractor::new(
            Duration::from_secs(60),
            5 * 1024 * 1024,
            Some(staging.to_path_buf()),
        )
    }

    fn staged_files(dir: &Path) -> usize {
        fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn local_file_without_picture_has_empty_artwork() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("First Light.wav");
        fs::write(&path, wav_bytes(8000)).unwrap();

        let meta = extractor(tmp.path()).extract_local(&path).unwrap();

        assert_eq!(meta.artwork, "");
        assert_eq!(meta.artwork_mime, None);
        assert_eq!(meta.title, "First Light");
        assert_eq!(meta.artist, UNKNOWN_ARTIST);
        assert_eq!(meta.album, UNKNOWN_ALBUM);
        assert_eq!(meta.sample_rate, Some(8000));
        assert_eq!(meta.channel_count, Some(1));
        assert_eq!(meta.duration_seconds, 1);
        assert_eq!(meta.file_size, Some(wav_bytes(8000).len() as u64));
        assert!(meta.modified_at.is_some());
    }

    #[test]
    fn local_file_with_picture_has_base64_artwork() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cover.wav");
        write_tagged_wav(&path);

        let meta = extractor(tmp.path()).extract_local(&path).unwrap();
        assert_cover(&meta);
        assert_eq!(meta.duration_seconds, 1);
    }

    #[test]
    fn remote_file_with_picture_has_base64_artwork() {
        let staging = TempDir::new().unwrap();
        let source = TempDir::new().unwrap();
        let path = source.path().join("cover.wav");
        write_tagged_wav(&path);
        let bytes = fs::read(&path).unwrap();

        let store = Arc::new(MockStore::with_objects([("analog/cover.wav", bytes.clone())]));
        let meta = extractor(staging.path())
            .extract_remote(store.as_ref(), "analog/cover.wav")
            .unwrap();

        assert_cover(&meta);
        assert_eq!(meta.file_size, Some(bytes.len() as u64));
        assert_eq!(meta.modified_at, Some(UPLOADED_AT_MS / 1000));
        assert_eq!(staged_files(staging.path()), 0);
    }

    #[test]
    fn local_garbage_is_an_extraction_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("broken.flac");
        fs::write(&path, b"definitely not audio").unwrap();

        let result = extractor(tmp.path()).extract_local(&path);
        assert!(matches!(result, Err(StorageError::MetadataExtractionFailed { .. })));
    }

    #[test]
    fn remote_extraction_caches_and_cleans_up() {
        let staging = TempDir::new().unwrap();
        let bytes = wav_bytes(16000);
        let store = Arc::new(MockStore::with_objects([("analog/song.wav", bytes.clone())]));
        let extractor = extractor(staging.path());

        let meta = extractor.extract_remote(store.as_ref(), "analog/song.wav").unwrap();
        assert_eq!(meta.title, "song");
        assert_eq!(meta.artwork, "");
        assert_eq!(meta.file_size, Some(bytes.len() as u64));
        assert_eq!(staged_files(staging.path()), 0);

        assert_eq!(extractor.cached("analog/song.wav"), Some(meta));
        assert_eq!(extractor.cached("analog/other.wav"), None);
    }

    #[test]
    fn remote_parse_failure_cleans_up_and_skips_cache() {
        let staging = TempDir::new().unwrap();
        let store = Arc::new(MockStore::with_objects([(
            "analog/broken.flac",
            b"definitely not audio".to_vec(),
        )]));
        let extractor = extractor(staging.path());

        let result = extractor.extract_remote(store.as_ref(), "analog/broken.flac");
        assert!(matches!(result, Err(StorageError::MetadataExtractionFailed { .. })));
        assert_eq!(staged_files(staging.path()), 0);
        assert_eq!(extractor.cached("analog/broken.flac"), None);
    }

    #[test]
    fn remote_download_failure_is_not_cached_and_retried() {
        let staging = TempDir::new().unwrap();
        let store = Arc::new(MockStore::with_objects([("analog/song.wav", wav_bytes(800))]));
        store.fail_downloads(Some(|| RemoteError::Transport("connection reset".into())));
        let extractor = extractor(staging.path());

        assert!(extractor.extract_remote(store.as_ref(), "analog/song.wav").is_err());
        assert_eq!(extractor.cached("analog/song.wav"), None);
        assert_eq!(staged_files(staging.path()), 0);

        store.fail_downloads(None);
        assert!(extractor.extract_remote(store.as_ref(), "analog/song.wav").is_ok());
        assert_eq!(MockStore::count(&store.range_calls), 2);
    }

    #[test]
    fn remote_missing_object_is_not_found() {
        let staging = TempDir::new().unwrap();
        let store = Arc::new(MockStore::default());
        let result = extractor(staging.path()).extract_remote(store.as_ref(), "analog/gone.mp3");
        assert!(matches!(result, Err(StorageError::MediaNotFound(_))));
        assert_eq!(staged_files(staging.path()), 0);
    }

    #[test]
    fn remote_key_without_extension_is_rejected() {
        let staging = TempDir::new().unwrap();
        let store = Arc::new(MockStore::default());
        let result = extractor(staging.path()).extract_remote(store.as_ref(), "analog/noext");
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));
        assert_eq!(MockStore::count(&store.range_calls), 0);
    }

    #[test]
    fn stem_handles_nested_keys() {
        assert_eq!(stem_of("a/b/Track 01.mp3"), "Track 01");
        assert_eq!(stem_of("plain"), "plain");
    }
}
