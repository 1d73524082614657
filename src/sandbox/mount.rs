//! Mount trees: the sandbox's native file-system description.
//!
//! Serialized, a mount tree is a nested map keyed by entry name:
//! `{"src": {"directory": {"index.js": {"file": {"contents": "..."}}}}}`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::tree::{FileTreeNode, NodeKind};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MountTree {
    entries: BTreeMap<String, MountEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountEntry {
    File { contents: String },
    Directory(MountTree),
}

impl MountTree {
    /// Translate file tree nodes into a mount tree.
    pub fn from_nodes(nodes: &[FileTreeNode]) -> Self {
        let entries = nodes
            .iter()
            .map(|node| {
                let entry = match &node.kind {
                    NodeKind::File { content } => MountEntry::File {
                        contents: content.clone(),
                    },
                    NodeKind::Folder { children } => {
                        MountEntry::Directory(MountTree::from_nodes(children))
                    }
                };
                (node.name.clone(), entry)
            })
            .collect();
        Self { entries }
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &MountEntry)> {
        self.entries.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    pub fn get(&self, name: &str) -> Option<&MountEntry> {
        self.entries.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of files at any depth.
    pub fn file_count(&self) -> usize {
        self.entries
            .values()
            .map(|entry| match entry {
                MountEntry::File { .. } => 1,
                MountEntry::Directory(tree) => tree.file_count(),
            })
            .sum()
    }
}
