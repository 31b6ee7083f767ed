//! Turns a flat list of media entries into a folder hierarchy.
//!
//! Local scans and remote listings produce the same `MediaEntry` shape, so a
//! single builder serves both sources.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

use super::media::MediaEntry;

/// Key of the top level node. Folder paths never start with `/`, so it cannot
/// collide with a real folder.
pub const ROOT_KEY: &str = "/";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DirectoryNode {
    pub files: Vec<MediaEntry>,
    pub subdirs: BTreeSet<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DirectoryTree {
    nodes: HashMap<String, DirectoryNode>,
}

impl DirectoryTree {
    pub fn build(entries: &[MediaEntry]) -> Self {
        let mut nodes: HashMap<String, DirectoryNode> = HashMap::new();
        nodes.insert(ROOT_KEY.to_string(), DirectoryNode::default());

        for entry in entries {
            let segments: Vec<&str> = entry
                .folder_path
                .split('/')
                .filter(|s| !s.is_empty())
                .collect();

            if segments.is_empty() {
                nodes
                    .entry(ROOT_KEY.to_string())
                    .or_default()
                    .files
                    .push(entry.clone());
                continue;
            }

            let mut parent = ROOT_KEY.to_string();
            for depth in 0..segments.len() {
                let current = segments[..=depth].join("/");

                nodes
                    .entry(parent)
                    .or_default()
                    .subdirs
                    .insert(segments[depth].to_string());

                let node = nodes.entry(current.clone()).or_default();
                if depth == segments.len() - 1 {
                    node.files.push(entry.clone());
                }
                parent = current;
            }
        }

        Self { nodes }
    }

    pub fn root(&self) -> &DirectoryNode {
        // build() always inserts the root
        &self.nodes[ROOT_KEY]
    }

    /// Looks up a folder by its `/`-separated path; empty or `/` means root.
    pub fn node(&self, path: &str) -> Option<&DirectoryNode> {
        let path = normalize_folder_path(path);
        if path.is_empty() {
            return Some(self.root());
        }
        self.nodes.get(&path)
    }

    pub fn is_empty(&self) -> bool {
        self.root().files.is_empty() && self.root().subdirs.is_empty()
    }
}

/// Strips surrounding and duplicate separators from a requested folder path.
pub fn normalize_folder_path(path: &str) -> String {
    path.split('/')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}
