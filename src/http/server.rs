use log::info;
use rouille::{Request, Response, ResponseBody};
use serde::Serialize;
use std::sync::Arc;

use crate::{
    config::HttpConfig,
    domain::{
        media::MediaEntry,
        tree::{DirectoryNode, DirectoryTree, normalize_folder_path},
    },
    http::error::ApiError,
    remote::proxy::{ProxiedStream, content_type_for},
    storage::{error::StorageError, operations::MediaLibrary, time::system_time_to_i64},
};

pub struct HttpServer {
    library: Arc<MediaLibrary>,
    pub config: HttpConfig,
}

impl HttpServer {
    pub fn new(library: MediaLibrary, config: HttpConfig) -> Self {
        Self {
            library: Arc::new(library),
            config,
        }
    }

    pub fn run(self) {
        let addr = format!("{}:{}", self.config.bind_addr, self.config.port);
        rouille::start_server(addr, move |request| self.handle_request(request));
    }

    fn handle_request(&self, request: &Request) -> Response {
        Self::log_request(request);

        let response = rouille::router!(request,
            (GET) (/api/local) => {
                self.handle_local_listing(request)
            },
            (POST) (/api/local/rescan) => {
                self.handle_local_rescan()
            },
            (GET) (/api/metadata/local) => {
                Self::respond(self.get_local_metadata(request))
            },
            (GET) (/media/local) => {
                Self::respond(self.get_local_file(request))
            },
            (GET) (/api/status) => {
                Self::respond(self.get_status())
            },
            (GET) (/api/remote) => {
                self.handle_remote_folders()
            },
            (GET) (/api/metadata/remote) => {
                Self::respond(self.get_remote_metadata(request))
            },
            (GET) (/api/remote/{folder: String}) => {
                Self::respond(self.get_remote_listing(&folder, request))
            },
            (POST) (/api/remote/{folder: String}/clear-cache) => {
                Self::respond(self.clear_remote_folder(&folder))
            },
            (GET) (/stream) => {
                Self::respond(self.get_stream(request))
            },
            _ => Response::empty_404()
        );

        info!("Response: {} {}", request.method(), response.status_code);
        response
    }

    fn log_request(request: &Request) {
        info!("{} {}", request.method(), request.url());
    }

    fn respond(result: Result<Response, ApiError>) -> Response {
        match result {
            Ok(r) => r,
            Err(e) => e.into_response(),
        }
    }

    fn required_param(request: &Request, name: &str) -> Result<String, ApiError> {
        request
            .get_param(name)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ApiError::BadRequest(format!("missing query parameter '{name}'")))
    }

    fn listing_response(
        source: &str,
        entries: &[MediaEntry],
        request: &Request,
    ) -> Result<Response, ApiError> {
        let path = normalize_folder_path(&request.get_param("path").unwrap_or_default());
        let tree = DirectoryTree::build(entries);
        let node = tree
            .node(&path)
            .ok_or_else(|| ApiError::NotFound(format!("folder '{path}' not found in {source}")))?;

        Ok(Response::json(&ListingResponse {
            source,
            path: &path,
            total_entries: entries.len(),
            node,
        }))
    }

    // ---------------- local ----------------

    fn handle_local_listing(&self, request: &Request) -> Response {
        let snapshot = self.library.local_snapshot();
        Self::respond(Self::listing_response("local", &snapshot.entries, request))
    }

    fn handle_local_rescan(&self) -> Response {
        let snapshot = self.library.rescan_local();
        Response::json(&RescanResponse {
            entries: snapshot.entries.len(),
            scanned_at: system_time_to_i64(snapshot.scanned_at).ok(),
            unavailable: snapshot.unavailable.clone(),
        })
    }

    fn get_local_metadata(&self, request: &Request) -> Result<Response, ApiError> {
        let key = Self::required_param(request, "key")?;
        let metadata = self.library.local_metadata(&key)?;
        Ok(Response::json(&metadata))
    }

    fn get_local_file(&self, request: &Request) -> Result<Response, ApiError> {
        let key = Self::required_param(request, "key")?;
        let path = self.library.local_file(&key)?;
        let file = std::fs::File::open(&path).map_err(StorageError::Fs)?;
        let mime = content_type_for(&key);
        log::debug!("LOCAL {} -> {}, MIME type: {}", key, path.to_string_lossy(), mime);
        Ok(Response::from_file(mime, file))
    }

    // ---------------- remote ----------------

    fn get_status(&self) -> Result<Response, ApiError> {
        let connectivity = self.library.connectivity()?;
        Ok(Response::json(&connectivity))
    }

    fn handle_remote_folders(&self) -> Response {
        Response::json(&RemoteFoldersResponse {
            configured: self.library.is_remote_configured(),
            folders: self.library.remote_folders(),
        })
    }

    fn get_remote_listing(&self, folder: &str, request: &Request) -> Result<Response, ApiError> {
        let entries = self.library.remote_listing(folder)?;
        Self::listing_response(folder, &entries, request)
    }

    fn clear_remote_folder(&self, folder: &str) -> Result<Response, ApiError> {
        let was_cached = self.library.clear_remote_folder(folder)?;
        Ok(Response::json(&ClearCacheResponse {
            folder,
            was_cached,
        }))
    }

    fn get_remote_metadata(&self, request: &Request) -> Result<Response, ApiError> {
        let key = Self::required_param(request, "key")?;
        let metadata = self.library.remote_metadata(&key)?;
        Ok(Response::json(&metadata))
    }

    fn get_stream(&self, request: &Request) -> Result<Response, ApiError> {
        let key = Self::required_param(request, "key")?;
        let stream = self
            .library
            .open_stream(&key, request.header("Range"))
            .map_err(ApiError::for_media)?;
        Ok(Self::stream_response(stream))
    }

    /// Headers are final once this returns; later upstream failures only
    /// truncate the body.
    fn stream_response(stream: ProxiedStream) -> Response {
        let status_code = stream.status_code();
        let headers = stream
            .headers()
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let size = stream.content_length() as usize;

        Response {
            status_code,
            headers,
            data: ResponseBody::from_reader_and_size(stream.body, size),
            upgrade: None,
        }
    }
}

#[derive(Serialize)]
struct ListingResponse<'a> {
    source: &'a str,
    path: &'a str,
    total_entries: usize,
    #[serde(flatten)]
    node: &'a DirectoryNode,
}

#[derive(Serialize)]
struct RescanResponse {
    entries: usize,
    scanned_at: Option<i64>,
    unavailable: Option<String>,
}

#[derive(Serialize)]
struct RemoteFoldersResponse {
    configured: bool,
    folders: Vec<String>,
}

#[derive(Serialize)]
struct ClearCacheResponse<'a> {
    folder: &'a str,
    was_cached: bool,
}

#[cfg(test)]
pub fn parse_json_response<T: serde::de::DeserializeOwned>(
    response: rouille::Response,
) -> anyhow::Result<T> {
    Ok(serde_json::from_reader(
        response.data.into_reader_and_size().0,
    )?)
}
