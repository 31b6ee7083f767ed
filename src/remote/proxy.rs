//! Forwards remote object bytes to a client without buffering whole files.

use std::{io::Read, path::Path, sync::Arc, time::Duration};

use crate::{
    remote::{ByteRange, ObjectStore, error::RemoteError},
    storage::error::StorageError,
};

pub const CACHE_CONTROL: &str = "public, max-age=3600";

/// Map file extension (without dot) to proper MIME type for browser playback.
/// Returns None if the extension is not recognized.
pub fn mime_from_ext(ext: &str) -> Option<&'static str> {
    match ext {
        "m4a" | "m4b" => Some("audio/x-m4a"), // Safari iOS compatible
        "aac" => Some("audio/aac"),
        "mp3" => Some("audio/mpeg"),
        "wav" => Some("audio/wav"),
        "ogg" | "opus" => Some("audio/ogg"),
        "flac" => Some("audio/flac"),
        _ => None,
    }
}

pub fn content_type_for(name: &str) -> String {
    let path = Path::new(name);
    let ext = path
        .extension()
        .map(|ext| ext.to_string_lossy())
        .map(|s| s.to_lowercase());
    let default = || {
        mime_guess::from_path(path)
            .first_or_octet_stream()
            .to_string()
    };
    ext.and_then(|ext| mime_from_ext(ext.as_str()).map(str::to_string))
        .unwrap_or_else(default)
}

/// Resolves a `Range` request header against an object of `size` bytes.
///
/// Headers that are malformed or ask for several ranges are ignored and the
/// whole object is served; a well formed range outside the object is an error.
pub fn resolve_range(header: Option<&str>, size: u64) -> Result<Option<(u64, u64)>, StorageError> {
    let Some(ranges) = header.and_then(|h| h.trim().strip_prefix("bytes=")) else {
        return Ok(None);
    };
    if ranges.contains(',') {
        return Ok(None);
    }
    let Some((start, end)) = ranges.split_once('-') else {
        return Ok(None);
    };
    let (start, end) = (start.trim(), end.trim());
    let unsatisfiable = || StorageError::RangeNotSatisfiable { size };

    let range = match (start.is_empty(), end.is_empty()) {
        // suffix: last n bytes
        (true, false) => {
            let Ok(n) = end.parse::<u64>() else {
                return Ok(None);
            };
            if n == 0 || size == 0 {
                return Err(unsatisfiable());
            }
            (size - n.min(size), size - 1)
        }
        (false, _) => {
            let Ok(start) = start.parse::<u64>() else {
                return Ok(None);
            };
            let end = if end.is_empty() {
                None
            } else {
                match end.parse::<u64>() {
                    Ok(end) if end >= start => Some(end),
                    _ => return Ok(None),
                }
            };
            if start >= size {
                return Err(unsatisfiable());
            }
            (start, end.map_or(size - 1, |e| e.min(size - 1)))
        }
        (true, true) => return Ok(None),
    };
    Ok(Some(range))
}

/// An opened upstream stream plus what the caller needs for its headers.
pub struct ProxiedStream {
    pub key: String,
    pub content_type: String,
    pub total_size: u64,
    /// Inclusive byte range being served, `None` for the whole object
    pub range: Option<(u64, u64)>,
    pub body: Box<dyn Read + Send>,
}

impl ProxiedStream {
    pub fn content_length(&self) -> u64 {
        match self.range {
            Some((start, end)) => end - start + 1,
            None => self.total_size,
        }
    }

    pub fn status_code(&self) -> u16 {
        if self.range.is_some() { 206 } else { 200 }
    }

    pub fn headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![
            ("Content-Type".to_string(), self.content_type.clone()),
            ("Content-Length".to_string(), self.content_length().to_string()),
            ("Accept-Ranges".to_string(), "bytes".to_string()),
            ("Cache-Control".to_string(), CACHE_CONTROL.to_string()),
            ("Access-Control-Allow-Origin".to_string(), "*".to_string()),
        ];
        if let Some((start, end)) = self.range {
            headers.push((
                "Content-Range".to_string(),
                format!("bytes {start}-{end}/{}", self.total_size),
            ));
        }
        headers
    }
}

/// Logs an upstream failure once headers are out; the client then sees a
/// truncated body.
struct LoggedBody {
    key: String,
    inner: Box<dyn Read + Send>,
    sent: u64,
}

impl Read for LoggedBody {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self.inner.read(buf) {
            Ok(n) => {
                self.sent += n as u64;
                Ok(n)
            }
            Err(e) => {
                log::warn!(
                    "stream of {} truncated after {} bytes: {e}",
                    self.key,
                    self.sent
                );
                Err(e)
            }
        }
    }
}

pub struct StreamProxy {
    store: Arc<dyn ObjectStore>,
    auth_timeout: Duration,
}

impl StreamProxy {
    pub fn new(store: Arc<dyn ObjectStore>, auth_timeout: Duration) -> Self {
        Self {
            store,
            auth_timeout,
        }
    }

    /// Authorizes, resolves the object's size from a single-key listing and
    /// opens the upstream byte stream. Every failure here happens before any
    /// response header is written.
    pub fn open(&self, key: &str, range_header: Option<&str>) -> Result<ProxiedStream, StorageError> {
        self.store
            .authorize(self.auth_timeout)
            .map_err(|e| StorageError::RemoteUnreachable {
                network: e.is_network(),
                message: e.to_string(),
            })?;

        let bucket = self.store.resolve_bucket()?;
        let size = self
            .store
            .list_objects(&bucket, key, 1)?
            .into_iter()
            .find(|o| o.key == key)
            .map(|o| o.size)
            .ok_or_else(|| StorageError::MediaNotFound(key.to_string()))?;

        let range = resolve_range(range_header, size)?;
        let upstream_range = range.map(|(start, end)| ByteRange {
            start,
            end: Some(end),
        });

        let body = self
            .store
            .download_stream(key, upstream_range)
            .map_err(|e| match e {
                RemoteError::NotFound(_) => StorageError::MediaNotFound(key.to_string()),
                e => StorageError::ProxyStreamFailed {
                    key: key.to_string(),
                    reason: e.to_string(),
                },
            })?;

        log::debug!("PROXY {key} size {size} range {range:?}");
        Ok(ProxiedStream {
            key: key.to_string(),
            content_type: content_type_for(key),
            total_size: size,
            range,
            body: Box::new(LoggedBody {
                key: key.to_string(),
                inner: body,
                sent: 0,
            }),
        })
    }
}
