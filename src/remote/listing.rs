use std::{sync::Arc, time::Duration};

use crate::{
    domain::media::MediaEntry,
    remote::{MAX_LIST_COUNT, ObjectStore, RemoteObject, error::RemoteError},
    storage::{
        cache::TtlCache,
        filter::{classify, has_skipped_segment},
    },
};

/// B2 keeps empty "folders" alive with this placeholder object.
const FOLDER_PLACEHOLDER: &str = ".bzEmpty";

/// Per-folder cache over the store's prefix listing.
pub struct RemoteListingCache {
    store: Arc<dyn ObjectStore>,
    cache: TtlCache<String, Arc<Vec<MediaEntry>>>,
}

impl RemoteListingCache {
    pub fn new(store: Arc<dyn ObjectStore>, ttl: Duration) -> Self {
        Self {
            store,
            cache: TtlCache::new(ttl),
        }
    }

    /// Media entries under the top level `folder`, served from cache while fresh.
    pub fn list(&self, folder: &str) -> Result<Arc<Vec<MediaEntry>>, RemoteError> {
        if let Some(entries) = self.cache.get(&folder.to_string()) {
            log::debug!("listing cache hit for {folder}");
            return Ok(entries);
        }

        log::info!("listing cache miss for {folder}, querying remote store");
        let bucket = self.store.resolve_bucket()?;
        let prefix = format!("{folder}/");
        let objects = self.store.list_objects(&bucket, &prefix, MAX_LIST_COUNT)?;
        if objects.len() as u32 >= MAX_LIST_COUNT {
            log::warn!("listing for {folder} hit the {MAX_LIST_COUNT} object limit, results are truncated");
        }

        let entries = Arc::new(entries_from_objects(&prefix, objects));
        self.cache.insert(folder.to_string(), Arc::clone(&entries));
        log::debug!("listing cache holds {} folders", self.cache.record_count());
        Ok(entries)
    }

    /// Forgets the cached listing of one folder; returns whether one existed.
    pub fn invalidate(&self, folder: &str) -> bool {
        self.cache.invalidate(&folder.to_string())
    }
}

/// Maps listed objects to media entries relative to `prefix`, dropping the
/// prefix marker, folder placeholders, system artifacts and non-media files.
pub fn entries_from_objects(prefix: &str, objects: Vec<RemoteObject>) -> Vec<MediaEntry> {
    let mut entries = objects
        .into_iter()
        .filter_map(|object| {
            let relative = object.key.strip_prefix(prefix)?;
            if relative.is_empty() || relative.ends_with('/') || has_skipped_segment(relative) {
                return None;
            }
            let name = relative.rsplit('/').next()?;
            if name == FOLDER_PLACEHOLDER {
                return None;
            }
            let media_type = classify(name)?;

            Some(MediaEntry::from_relative(
                object.key.clone(),
                relative,
                media_type,
                object.size,
                Some(object.uploaded_at_ms / 1000),
            ))
        })
        .collect::<Vec<_>>();

    entries.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    entries
}
