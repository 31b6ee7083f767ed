use std::path::PathBuf;

use thiserror::Error;

use crate::remote::error::RemoteError;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("library root {} is unavailable: {source}", path.display())]
    ScanUnavailable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("remote storage is not configured")]
    RemoteNotConfigured,

    #[error("remote storage is unreachable: {message}")]
    RemoteUnreachable { network: bool, message: String },

    #[error("failed to extract metadata for {key}: {reason}")]
    MetadataExtractionFailed { key: String, reason: String },

    #[error("failed to proxy {key}: {reason}")]
    ProxyStreamFailed { key: String, reason: String },

    #[error("media {0} not found")]
    MediaNotFound(String),

    #[error("invalid media key {0}")]
    InvalidKey(String),

    #[error("unknown remote folder {0}")]
    UnknownFolder(String),

    #[error("range not satisfiable for object of {size} bytes")]
    RangeNotSatisfiable { size: u64 },

    #[error("remote storage error: {0}")]
    Remote(#[from] RemoteError),

    #[error("filesystem error: {0}")]
    Fs(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
