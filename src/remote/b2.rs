//! Backblaze B2 native API client.

use std::{
    io::Read,
    sync::{Mutex, PoisonError},
    time::Duration,
};

use reqwest::{
    StatusCode, Url,
    blocking::{Client, RequestBuilder, Response},
    header::{AUTHORIZATION, CONTENT_RANGE, RANGE},
};
use serde::{Deserialize, Serialize};

use crate::remote::{
    BucketRef, ByteRange, ObjectStore, RangedBytes, RemoteObject, error::RemoteError,
};

pub const DEFAULT_AUTH_URL: &str = "https://api.backblazeb2.com";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Bound for API calls other than authorization and streamed downloads.
const API_TIMEOUT: Duration = Duration::from_secs(60);
/// Download response header carrying the upload time in milliseconds.
const UPLOAD_TIMESTAMP: &str = "X-Bz-Upload-Timestamp";

#[derive(Debug, Clone)]
pub struct B2Credentials {
    pub key_id: String,
    pub application_key: String,
    pub bucket: String,
    pub auth_url: String,
}

#[derive(Debug, Clone)]
struct Session {
    account_id: String,
    token: String,
    api_url: String,
    download_url: String,
    /// Present when the key is restricted to a single bucket
    allowed_bucket: Option<BucketRef>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthorizeResponse {
    account_id: String,
    authorization_token: String,
    api_url: String,
    download_url: String,
    #[serde(default)]
    allowed: Option<Allowed>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Allowed {
    bucket_id: Option<String>,
    bucket_name: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ListBucketsRequest<'a> {
    account_id: &'a str,
    bucket_name: &'a str,
}

#[derive(Deserialize)]
struct ListBucketsResponse {
    buckets: Vec<BucketInfo>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BucketInfo {
    bucket_id: String,
    bucket_name: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ListFileNamesRequest<'a> {
    bucket_id: &'a str,
    prefix: &'a str,
    max_file_count: u32,
}

#[derive(Deserialize)]
struct ListFileNamesResponse {
    files: Vec<FileInfo>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileInfo {
    file_name: String,
    #[serde(default)]
    content_length: u64,
    #[serde(default)]
    upload_timestamp: i64,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

pub struct B2Client {
    http: Client,
    credentials: B2Credentials,
    session: Mutex<Option<Session>>,
}

impl B2Client {
    pub fn new(credentials: B2Credentials) -> Result<Self, RemoteError> {
        // no client-wide timeout: it would cut long streamed downloads
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(None::<Duration>)
            .build()?;
        Ok(Self {
            http,
            credentials,
            session: Mutex::new(None),
        })
    }

    fn authorize_account(&self, timeout: Duration) -> Result<Session, RemoteError> {
        let url = format!(
            "{}/b2api/v2/b2_authorize_account",
            self.credentials.auth_url.trim_end_matches('/')
        );
        log::debug!("B2 authorize at {url}");

        let response = self
            .http
            .get(&url)
            .basic_auth(
                &self.credentials.key_id,
                Some(&self.credentials.application_key),
            )
            .timeout(timeout)
            .send()?;
        let body: AuthorizeResponse = check_status(response, "authorization")?.json()?;

        let allowed_bucket = body.allowed.and_then(|a| match (a.bucket_id, a.bucket_name) {
            (Some(id), Some(name)) => Some(BucketRef { id, name }),
            _ => None,
        });

        let session = Session {
            account_id: body.account_id,
            token: body.authorization_token,
            api_url: body.api_url,
            download_url: body.download_url,
            allowed_bucket,
        };
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = Some(session.clone());
        Ok(session)
    }

    fn session(&self) -> Result<Session, RemoteError> {
        let cached = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match cached {
            Some(session) => Ok(session),
            None => self.authorize_account(API_TIMEOUT),
        }
    }

    fn drop_session(&self) {
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Runs `call` with the current session; an expired token is refreshed
    /// once and the call retried.
    fn with_session<T>(
        &self,
        call: impl Fn(&Session) -> Result<T, RemoteError>,
    ) -> Result<T, RemoteError> {
        let session = self.session()?;
        match call(&session) {
            Err(RemoteError::Unauthorized(reason)) => {
                log::info!("B2 session rejected ({reason}), re-authorizing");
                self.drop_session();
                let session = self.authorize_account(API_TIMEOUT)?;
                call(&session)
            }
            other => other,
        }
    }

    fn api_post<B: Serialize>(&self, session: &Session, method: &str, body: &B) -> RequestBuilder {
        self.http
            .post(format!("{}/b2api/v2/{method}", session.api_url))
            .header(AUTHORIZATION, &session.token)
            .timeout(API_TIMEOUT)
            .json(body)
    }

    fn download_request(
        &self,
        session: &Session,
        key: &str,
        range: Option<ByteRange>,
    ) -> Result<Response, RemoteError> {
        let url = download_url(&session.download_url, &self.credentials.bucket, key)?;
        let mut request = self.http.get(url).header(AUTHORIZATION, &session.token);
        if let Some(range) = range {
            request = request.header(RANGE, range.to_header());
        }
        let response = request.send()?;
        check_status(response, key)
    }
}

/// `{download_url}/file/{bucket}/{key}` with every key segment percent-encoded
fn download_url(base: &str, bucket: &str, key: &str) -> Result<Url, RemoteError> {
    let mut url = Url::parse(base).map_err(|e| RemoteError::Decode(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| RemoteError::Decode(format!("download url {base} cannot be a base")))?
        .pop_if_empty()
        .push("file")
        .push(bucket)
        .extend(key.split('/'));
    Ok(url)
}

/// Turns a non-success response into a typed error.
fn check_status(response: Response, what: &str) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body: Option<ApiErrorBody> = response.json().ok();
    let (code, message) = body
        .map(|b| (b.code, b.message))
        .unwrap_or_else(|| (String::new(), String::new()));

    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            RemoteError::Unauthorized(format!("{what}: {code} {message}"))
        }
        StatusCode::NOT_FOUND => RemoteError::NotFound(what.to_string()),
        _ => RemoteError::Api {
            status: status.as_u16(),
            code,
            message,
        },
    })
}

/// Total object size from a `Content-Range: bytes a-b/total` header.
fn total_from_content_range(value: &str) -> Option<u64> {
    value.rsplit_once('/')?.1.trim().parse().ok()
}

impl ObjectStore for B2Client {
    fn authorize(&self, timeout: Duration) -> Result<(), RemoteError> {
        self.authorize_account(timeout).map(|_| ())
    }

    fn resolve_bucket(&self) -> Result<BucketRef, RemoteError> {
        let bucket_name = self.credentials.bucket.as_str();
        self.with_session(|session| {
            if let Some(allowed) = &session.allowed_bucket {
                if allowed.name == bucket_name {
                    return Ok(allowed.clone());
                }
            }

            let request = ListBucketsRequest {
                account_id: &session.account_id,
                bucket_name,
            };
            let response = self.api_post(session, "b2_list_buckets", &request).send()?;
            let body: ListBucketsResponse = check_status(response, "bucket list")?.json()?;

            body.buckets
                .into_iter()
                .find(|b| b.bucket_name == bucket_name)
                .map(|b| BucketRef {
                    id: b.bucket_id,
                    name: b.bucket_name,
                })
                .ok_or_else(|| RemoteError::NotFound(format!("bucket {bucket_name}")))
        })
    }

    fn list_objects(
        &self,
        bucket: &BucketRef,
        prefix: &str,
        max_count: u32,
    ) -> Result<Vec<RemoteObject>, RemoteError> {
        self.with_session(|session| {
            let request = ListFileNamesRequest {
                bucket_id: &bucket.id,
                prefix,
                max_file_count: max_count,
            };
            let response = self.api_post(session, "b2_list_file_names", &request).send()?;
            let body: ListFileNamesResponse = check_status(response, "file list")?.json()?;

            Ok(body
                .files
                .into_iter()
                .map(|f| RemoteObject {
                    key: f.file_name,
                    size: f.content_length,
                    uploaded_at_ms: f.upload_timestamp,
                })
                .collect())
        })
    }

    fn download_range(&self, key: &str, range: ByteRange) -> Result<RangedBytes, RemoteError> {
        self.with_session(|session| {
            let response = self.download_request(session, key, Some(range))?;
            let total_size = response
                .headers()
                .get(CONTENT_RANGE)
                .and_then(|v| v.to_str().ok())
                .and_then(total_from_content_range)
                .or(response.content_length());
            let uploaded_at_ms = response
                .headers()
                .get(UPLOAD_TIMESTAMP)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok());

            // guard against stores that ignore the range header
            let limit = range.end.map(|end| end + 1 - range.start).unwrap_or(u64::MAX);
            let mut bytes = Vec::new();
            response
                .take(limit)
                .read_to_end(&mut bytes)
                .map_err(|e| RemoteError::Transport(e.to_string()))?;

            Ok(RangedBytes {
                bytes,
                total_size,
                uploaded_at_ms,
            })
        })
    }

    fn download_stream(
        &self,
        key: &str,
        range: Option<ByteRange>,
    ) -> Result<Box<dyn Read + Send>, RemoteError> {
        self.with_session(|session| {
            let response = self.download_request(session, key, range)?;
            Ok(Box::new(response) as Box<dyn Read + Send>)
        })
    }
}
