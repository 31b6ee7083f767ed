//! Module to scan the local media directory in the file system

use walkdir::{DirEntry, WalkDir};

use std::{
    path::{Component, Path, PathBuf},
    sync::{Arc, PoisonError, RwLock},
    time::SystemTime,
};

use crate::{
    domain::{media::MediaEntry, tree::DirectoryTree},
    storage::{
        error::StorageError,
        filter::{classify, is_skipped_name},
        time::system_time_to_i64,
    },
};

/// Result of one full walk of the library root.
#[derive(Debug)]
pub struct LocalSnapshot {
    pub scanned_at: SystemTime,
    pub entries: Vec<MediaEntry>,
    /// Set when the root could not be read; the snapshot is then empty
    pub unavailable: Option<String>,
}

impl LocalSnapshot {
    pub fn empty() -> Self {
        Self {
            scanned_at: SystemTime::now(),
            entries: Vec::new(),
            unavailable: None,
        }
    }

    pub fn tree(&self) -> DirectoryTree {
        DirectoryTree::build(&self.entries)
    }
}

fn is_skipped_entry(entry: &DirEntry) -> bool {
    // never filter the root itself, whatever its name
    entry.depth() > 0 && entry.file_name().to_str().is_some_and(is_skipped_name)
}

/// `/`-joined path of `path` relative to `root`
fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts = rel
        .components()
        .map(|c| match c {
            Component::Normal(s) => s.to_str().map(str::to_string),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()?;
    Some(parts.join("/"))
}

/// Recursively scans all media files under `root`.
///
/// Entries that fail to read (permissions, symlink loops when following
/// links) are logged and skipped. Only an unreadable root is an error.
pub fn scan_root(root: &Path, follow_symlinks: bool) -> Result<Vec<MediaEntry>, StorageError> {
    std::fs::read_dir(root).map_err(|source| StorageError::ScanUnavailable {
        path: root.to_path_buf(),
        source,
    })?;

    let root_str = root.to_string_lossy();
    let walker = WalkDir::new(root).follow_links(follow_symlinks);

    let mut entries = walker
        .into_iter()
        .filter_entry(|e| !is_skipped_entry(e))
        .filter_map(|e| match e {
            Ok(e) => Some(e),
            Err(err) => {
                log::warn!("error while scanning dir {root_str}, skipping an entry: {err}");
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            let media_type = classify(e.file_name().to_str()?)?;
            let relative = relative_key(root, e.path())?;
            let meta = e.metadata().ok();
            let size = meta.as_ref().map(|m| m.len()).unwrap_or(0);
            let modified_at = meta
                .and_then(|m| m.modified().ok())
                .and_then(|t| system_time_to_i64(t).ok());

            Some(MediaEntry::from_relative(
                e.path().to_string_lossy().into_owned(),
                &relative,
                media_type,
                size,
                modified_at,
            ))
        })
        .collect::<Vec<_>>();

    entries.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(entries)
}

/// Published local index. Readers get the current snapshot; a rescan builds
/// a new one off-lock and swaps it in with a single write.
#[derive(Debug)]
pub struct LocalIndex {
    root: PathBuf,
    follow_symlinks: bool,
    snapshot: RwLock<Arc<LocalSnapshot>>,
}

impl LocalIndex {
    /// Creates an index with an empty snapshot, without scanning.
    pub fn new(root: PathBuf, follow_symlinks: bool) -> Self {
        Self {
            root,
            follow_symlinks,
            snapshot: RwLock::new(Arc::new(LocalSnapshot::empty())),
        }
    }

    pub fn snapshot(&self) -> Arc<LocalSnapshot> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Walks the root again and publishes the result. A missing or unreadable
    /// root publishes an empty snapshot instead of failing.
    pub fn rescan(&self) -> Arc<LocalSnapshot> {
        log::info!("Scanning local media under {}", self.root.display());
        let scanned_at = SystemTime::now();

        let snapshot = match scan_root(&self.root, self.follow_symlinks) {
            Ok(entries) => {
                log::info!("Local scan found {} media files", entries.len());
                LocalSnapshot {
                    scanned_at,
                    entries,
                    unavailable: None,
                }
            }
            Err(e) => {
                log::warn!("{e}; publishing an empty local index");
                LocalSnapshot {
                    scanned_at,
                    entries: Vec::new(),
                    unavailable: Some(e.to_string()),
                }
            }
        };

        let snapshot = Arc::new(snapshot);
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&snapshot);
        snapshot
    }

    /// Resolves a root-relative media key to a readable file inside the root.
    pub fn resolve(&self, key: &str) -> Result<PathBuf, StorageError> {
        let rel = Path::new(key.trim_start_matches('/'));
        let is_plain = rel.components().count() > 0
            && rel.components().all(|c| matches!(c, Component::Normal(_)));
        if !is_plain {
            return Err(StorageError::InvalidKey(key.to_string()));
        }

        let skipped = rel
            .components()
            .any(|c| c.as_os_str().to_str().is_some_and(is_skipped_name));
        let classified = rel
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(classify)
            .is_some();
        if skipped || !classified {
            return Err(StorageError::InvalidKey(key.to_string()));
        }

        let path = self.root.join(rel);
        if !path.is_file() {
            return Err(StorageError::MediaNotFound(key.to_string()));
        }
        Ok(path)
    }
}
