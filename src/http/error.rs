use rouille::Response;
use serde_json::json;

use crate::storage::error::StorageError;

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    /// Remote store is unreachable; rendered as a successful response that
    /// explains the situation instead of a server error
    Offline(String),
    Misconfigured(String),
    /// Remote store is unreachable on a route whose clients expect media
    /// bytes, so the offline page would be mistaken for content
    Unavailable(String),
    RangeNotSatisfiable { size: u64 },
    BadGateway(String),
    Internal(String),
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::MediaNotFound(_) | StorageError::UnknownFolder(_) => {
                ApiError::NotFound(err.to_string())
            }

            StorageError::InvalidKey(_) => ApiError::BadRequest(err.to_string()),

            StorageError::RemoteNotConfigured => ApiError::Misconfigured(err.to_string()),

            StorageError::RemoteUnreachable { network: true, message } => {
                ApiError::Offline(message)
            }

            StorageError::RemoteUnreachable { network: false, message } => {
                ApiError::Misconfigured(format!("remote storage rejected the configured credentials: {message}"))
            }

            StorageError::RangeNotSatisfiable { size } => ApiError::RangeNotSatisfiable { size },

            StorageError::Remote(e) if e.is_network() => ApiError::Offline(e.to_string()),

            StorageError::Remote(_)
            | StorageError::MetadataExtractionFailed { .. }
            | StorageError::ProxyStreamFailed { .. } => ApiError::BadGateway(err.to_string()),

            StorageError::ScanUnavailable { .. } | StorageError::Fs(_) | StorageError::Internal(_) => {
                log::error!("{err}");
                ApiError::Internal("internal server error".into())
            }
        }
    }
}

impl ApiError {
    /// Same mapping as `From<StorageError>`, except that an offline store
    /// is an error status instead of the offline page.
    pub fn for_media(err: StorageError) -> Self {
        match ApiError::from(err) {
            ApiError::Offline(msg) => ApiError::Unavailable(msg),
            other => other,
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::NotFound(_) => 404,
            ApiError::BadRequest(_) => 400,
            ApiError::Offline(_) => 200,
            ApiError::Misconfigured(_) | ApiError::Unavailable(_) => 503,
            ApiError::RangeNotSatisfiable { .. } => 416,
            ApiError::BadGateway(_) => 502,
            ApiError::Internal(_) => 500,
        }
    }

    pub fn into_response(self) -> Response {
        let status = self.status_code();
        match self {
            ApiError::Offline(msg) => Response::json(&json!({
                "offline": true,
                "message": "The remote library is currently offline. Please try again later.",
                "detail": msg,
            })),

            ApiError::Misconfigured(msg) => Response::json(&json!({
                "offline": false,
                "error": "configuration",
                "message": msg,
            }))
            .with_status_code(status),

            ApiError::RangeNotSatisfiable { size } => Response::text("range not satisfiable")
                .with_status_code(status)
                .with_additional_header("Content-Range", format!("bytes */{size}")),

            ApiError::Unavailable(msg) => {
                Response::text(format!("remote library is offline: {msg}")).with_status_code(status)
            }

            ApiError::NotFound(msg)
            | ApiError::BadRequest(msg)
            | ApiError::BadGateway(msg)
            | ApiError::Internal(msg) => Response::text(msg).with_status_code(status),
        }
    }
}
