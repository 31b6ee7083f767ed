use std::{path::PathBuf, sync::Arc};

use crate::{
    config::{CacheSettings, Config},
    domain::{
        media::{MediaEntry, TrackMetadata},
        tree::normalize_folder_path,
    },
    remote::{
        ObjectStore,
        b2::B2Client,
        listing::RemoteListingCache,
        probe::{Connectivity, ConnectivityProbe},
        proxy::{ProxiedStream, StreamProxy},
    },
    storage::{
        error::StorageError,
        fs::{LocalIndex, LocalSnapshot},
        metadata::MetadataExtractor,
    },
};

/// Everything that depends on a configured remote store.
struct RemoteServices {
    store: Arc<dyn ObjectStore>,
    folders: Vec<String>,
    listings: RemoteListingCache,
    probe: ConnectivityProbe,
    proxy: StreamProxy,
}

/// Main structure that implements all media indexing and retrieval logic.
///
/// One instance per process, shared by request handlers behind an `Arc`.
/// All caches inside are safe for concurrent use.
pub struct MediaLibrary {
    local: LocalIndex,
    remote: Option<RemoteServices>,
    metadata: MetadataExtractor,
}

impl MediaLibrary {
    /// Builds the library from config and performs the initial local scan.
    pub fn from_config(config: &Config) -> Result<Self, StorageError> {
        let settings = CacheSettings::from(&config.cache);

        let remote = match &config.remote {
            Some(remote) => match remote.credentials() {
                Some(credentials) => {
                    let client = B2Client::new(credentials)?;
                    Some((Arc::new(client) as Arc<dyn ObjectStore>, remote.folders.clone()))
                }
                None => {
                    log::warn!("remote storage credentials are missing, remote folders are disabled");
                    None
                }
            },
            None => None,
        };

        let library = Self::new(
            config.library.root.clone(),
            config.library.follow_symlinks,
            remote,
            settings,
        );
        library.rescan_local();
        Ok(library)
    }

    /// Creates the library without scanning. `remote` is the store plus the
    /// folders allowed for browsing (empty allows any).
    pub fn new(
        root: PathBuf,
        follow_symlinks: bool,
        remote: Option<(Arc<dyn ObjectStore>, Vec<String>)>,
        settings: CacheSettings,
    ) -> Self {
        let remote = remote.map(|(store, folders)| RemoteServices {
            listings: RemoteListingCache::new(Arc::clone(&store), settings.listing_ttl),
            probe: ConnectivityProbe::new(
                Arc::clone(&store),
                settings.connectivity_ttl,
                settings.probe_timeout,
            ),
            proxy: StreamProxy::new(Arc::clone(&store), settings.probe_timeout),
            store,
            folders,
        });

        Self {
            local: LocalIndex::new(root, follow_symlinks),
            remote,
            metadata: MetadataExtractor::new(
                settings.metadata_ttl,
                settings.metadata_range_bytes,
                settings.staging_dir,
            ),
        }
    }

    // ---------------- local ----------------

    pub fn local_snapshot(&self) -> Arc<LocalSnapshot> {
        self.local.snapshot()
    }

    pub fn rescan_local(&self) -> Arc<LocalSnapshot> {
        self.local.rescan()
    }

    pub fn local_file(&self, key: &str) -> Result<PathBuf, StorageError> {
        self.local.resolve(key)
    }

    pub fn local_metadata(&self, key: &str) -> Result<TrackMetadata, StorageError> {
        let path = self.local.resolve(key)?;
        self.metadata.extract_local(&path)
    }

    // ---------------- remote ----------------

    fn remote(&self) -> Result<&RemoteServices, StorageError> {
        self.remote.as_ref().ok_or(StorageError::RemoteNotConfigured)
    }

    pub fn is_remote_configured(&self) -> bool {
        self.remote.is_some()
    }

    pub fn remote_folders(&self) -> Vec<String> {
        self.remote
            .as_ref()
            .map(|r| r.folders.clone())
            .unwrap_or_default()
    }

    pub fn connectivity(&self) -> Result<Connectivity, StorageError> {
        Ok(self.remote()?.probe.check())
    }

    fn ensure_online(remote: &RemoteServices) -> Result<(), StorageError> {
        let status = remote.probe.check();
        if status.connected {
            return Ok(());
        }
        Err(StorageError::RemoteUnreachable {
            network: status.is_network_error,
            message: status.error.unwrap_or_default(),
        })
    }

    fn checked_folder(remote: &RemoteServices, folder: &str) -> Result<String, StorageError> {
        let folder = normalize_folder_path(folder);
        if folder.is_empty() || folder.contains('/') {
            return Err(StorageError::InvalidKey(folder));
        }
        if !remote.folders.is_empty() && !remote.folders.contains(&folder) {
            return Err(StorageError::UnknownFolder(folder));
        }
        Ok(folder)
    }

    /// Checks that a remote key lives inside an allowed folder.
    fn checked_key(remote: &RemoteServices, key: &str) -> Result<String, StorageError> {
        let key = key.trim_start_matches('/');
        let Some((folder, rest)) = key.split_once('/') else {
            return Err(StorageError::InvalidKey(key.to_string()));
        };
        if rest.is_empty() || key.split('/').any(|s| s == "..") {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Self::checked_folder(remote, folder)?;
        Ok(key.to_string())
    }

    /// Entries under one remote top level folder.
    pub fn remote_listing(&self, folder: &str) -> Result<Arc<Vec<MediaEntry>>, StorageError> {
        let remote = self.remote()?;
        let folder = Self::checked_folder(remote, folder)?;
        Self::ensure_online(remote)?;
        Ok(remote.listings.list(&folder)?)
    }

    /// Forces the next listing of `folder` to query the store.
    pub fn clear_remote_folder(&self, folder: &str) -> Result<bool, StorageError> {
        let remote = self.remote()?;
        let folder = Self::checked_folder(remote, folder)?;
        let existed = remote.listings.invalidate(&folder);
        log::info!("cleared listing cache for {folder} (was cached: {existed})");
        Ok(existed)
    }

    pub fn remote_metadata(&self, key: &str) -> Result<TrackMetadata, StorageError> {
        let remote = self.remote()?;
        let key = Self::checked_key(remote, key)?;
        if let Some(metadata) = self.metadata.cached(&key) {
            log::debug!("metadata cache hit for {key}");
            return Ok(metadata);
        }
        Self::ensure_online(remote)?;
        self.metadata.extract_remote(remote.store.as_ref(), &key)
    }

    pub fn open_stream(&self, key: &str, range: Option<&str>) -> Result<ProxiedStream, StorageError> {
        let remote = self.remote()?;
        let key = Self::checked_key(remote, key)?;
        remote.proxy.open(&key, range)
    }
}
