//! Remote object storage: the store boundary and the cached services built on it

use std::{io::Read, time::Duration};

use crate::remote::error::RemoteError;

pub mod b2;
pub mod error;
pub mod listing;
#[cfg(test)]
pub(crate) mod mock;
pub mod probe;
pub mod proxy;

/// Page size for a single prefix listing. Libraries beyond this are truncated.
pub const MAX_LIST_COUNT: u32 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketRef {
    pub id: String,
    pub name: String,
}

/// One object as reported by a prefix listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    pub key: String,
    pub size: u64,
    /// Milliseconds since unix epoch
    pub uploaded_at_ms: i64,
}

/// Inclusive byte range, `end == None` meaning "to the end of the object".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: Option<u64>,
}

impl ByteRange {
    /// The first `len` bytes of an object.
    pub fn prefix(len: u64) -> Self {
        Self {
            start: 0,
            end: Some(len.saturating_sub(1)),
        }
    }

    pub fn to_header(&self) -> String {
        match self.end {
            Some(end) => format!("bytes={}-{}", self.start, end),
            None => format!("bytes={}-", self.start),
        }
    }
}

/// Buffered result of a ranged download.
#[derive(Debug, Clone)]
pub struct RangedBytes {
    pub bytes: Vec<u8>,
    /// Full object size when the store reported it
    pub total_size: Option<u64>,
    /// Upload time in milliseconds since unix epoch, when reported
    pub uploaded_at_ms: Option<i64>,
}

/// Operations the media core needs from a remote object store.
pub trait ObjectStore: Send + Sync {
    /// Performs the authorization handshake, bounded by `timeout`.
    fn authorize(&self, timeout: Duration) -> Result<(), RemoteError>;

    fn resolve_bucket(&self) -> Result<BucketRef, RemoteError>;

    fn list_objects(
        &self,
        bucket: &BucketRef,
        prefix: &str,
        max_count: u32,
    ) -> Result<Vec<RemoteObject>, RemoteError>;

    fn download_range(&self, key: &str, range: ByteRange) -> Result<RangedBytes, RemoteError>;

    fn download_stream(
        &self,
        key: &str,
        range: Option<ByteRange>,
    ) -> Result<Box<dyn Read + Send>, RemoteError>;
}
