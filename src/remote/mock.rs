//! In-memory object store with call counters and scripted failures.

use std::{
    collections::BTreeMap,
    io::{Cursor, Read},
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use crate::remote::{
    BucketRef, ByteRange, ObjectStore, RangedBytes, RemoteObject, error::RemoteError,
};

type FailureFn = fn() -> RemoteError;

/// Upload time reported for every mock object.
pub const UPLOADED_AT_MS: i64 = 1_700_000_000_000;

#[derive(Default)]
pub struct MockStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    authorize_failure: Mutex<Option<FailureFn>>,
    download_failure: Mutex<Option<FailureFn>>,
    /// Bytes after which streamed bodies fail
    stream_fail_after: Mutex<Option<usize>>,
    pub authorize_calls: AtomicUsize,
    pub bucket_calls: AtomicUsize,
    pub list_calls: AtomicUsize,
    pub range_calls: AtomicUsize,
    pub stream_calls: AtomicUsize,
}

impl MockStore {
    pub fn with_objects<I, K>(objects: I) -> Self
    where
        I: IntoIterator<Item = (K, Vec<u8>)>,
        K: Into<String>,
    {
        let store = Self::default();
        {
            let mut map = store.objects.lock().unwrap();
            for (k, v) in objects {
                map.insert(k.into(), v);
            }
        }
        store
    }

    pub fn put(&self, key: &str, bytes: Vec<u8>) {
        self.objects.lock().unwrap().insert(key.to_string(), bytes);
    }

    pub fn fail_authorize(&self, failure: Option<FailureFn>) {
        *self.authorize_failure.lock().unwrap() = failure;
    }

    pub fn fail_downloads(&self, failure: Option<FailureFn>) {
        *self.download_failure.lock().unwrap() = failure;
    }

    pub fn fail_stream_after(&self, bytes: usize) {
        *self.stream_fail_after.lock().unwrap() = Some(bytes);
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn object(&self, key: &str) -> Result<Vec<u8>, RemoteError> {
        if let Some(fail) = *self.download_failure.lock().unwrap() {
            return Err(fail());
        }
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(key.to_string()))
    }
}

fn slice(bytes: &[u8], range: ByteRange) -> Vec<u8> {
    let start = (range.start as usize).min(bytes.len());
    let end = range
        .end
        .map(|e| (e as usize + 1).min(bytes.len()))
        .unwrap_or(bytes.len());
    bytes[start..end.max(start)].to_vec()
}

struct FailingReader {
    inner: Cursor<Vec<u8>>,
}

impl Read for FailingReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "upstream reset",
            ));
        }
        Ok(n)
    }
}

impl ObjectStore for MockStore {
    fn authorize(&self, _timeout: Duration) -> Result<(), RemoteError> {
        self.authorize_calls.fetch_add(1, Ordering::SeqCst);
        match *self.authorize_failure.lock().unwrap() {
            Some(fail) => Err(fail()),
            None => Ok(()),
        }
    }

    fn resolve_bucket(&self) -> Result<BucketRef, RemoteError> {
        self.bucket_calls.fetch_add(1, Ordering::SeqCst);
        Ok(BucketRef {
            id: "bucket-id".into(),
            name: "bucket".into(),
        })
    }

    fn list_objects(
        &self,
        _bucket: &BucketRef,
        prefix: &str,
        max_count: u32,
    ) -> Result<Vec<RemoteObject>, RemoteError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .take(max_count as usize)
            .map(|(k, v)| RemoteObject {
                key: k.clone(),
                size: v.len() as u64,
                uploaded_at_ms: UPLOADED_AT_MS,
            })
            .collect())
    }

    fn download_range(&self, key: &str, range: ByteRange) -> Result<RangedBytes, RemoteError> {
        self.range_calls.fetch_add(1, Ordering::SeqCst);
        let bytes = self.object(key)?;
        Ok(RangedBytes {
            total_size: Some(bytes.len() as u64),
            uploaded_at_ms: Some(UPLOADED_AT_MS),
            bytes: slice(&bytes, range),
        })
    }

    fn download_stream(
        &self,
        key: &str,
        range: Option<ByteRange>,
    ) -> Result<Box<dyn Read + Send>, RemoteError> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        let bytes = self.object(key)?;
        let body = match range {
            Some(range) => slice(&bytes, range),
            None => bytes,
        };
        match *self.stream_fail_after.lock().unwrap() {
            Some(n) => Ok(Box::new(FailingReader {
                inner: Cursor::new(body[..n.min(body.len())].to_vec()),
            })),
            None => Ok(Box::new(Cursor::new(body))),
        }
    }
}

/// Minimal PCM WAV file without tags.
pub fn wav_bytes(samples: usize) -> Vec<u8> {
    let channels: u16 = 1;
    let sample_rate: u32 = 8000;
    let bits: u16 = 16;
    let data_len = (samples * 2) as u32;

    let mut out = Vec::new();
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&(sample_rate * 2).to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&bits.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    out.extend(std::iter::repeat_n(0u8, data_len as usize));
    out
}
