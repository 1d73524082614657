//! File tree nodes and path handling.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One element of the virtual project file system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTreeNode {
    /// Leaf segment.
    pub name: String,
    /// Full slash-delimited path from the root, unique within a tree.
    pub path: String,
    #[serde(flatten)]
    pub kind: NodeKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    File { content: String },
    Folder { children: Vec<FileTreeNode> },
}

impl FileTreeNode {
    pub fn file(path: &str, content: impl Into<String>) -> Self {
        Self {
            name: leaf_name(path).to_string(),
            path: path.to_string(),
            kind: NodeKind::File {
                content: content.into(),
            },
        }
    }

    pub fn folder(path: &str) -> Self {
        Self {
            name: leaf_name(path).to_string(),
            path: path.to_string(),
            kind: NodeKind::Folder {
                children: Vec::new(),
            },
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self.kind, NodeKind::File { .. })
    }

    pub fn is_folder(&self) -> bool {
        matches!(self.kind, NodeKind::Folder { .. })
    }

    pub fn content(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::File { content } => Some(content),
            NodeKind::Folder { .. } => None,
        }
    }

    pub fn children(&self) -> &[FileTreeNode] {
        match &self.kind {
            NodeKind::Folder { children } => children,
            NodeKind::File { .. } => &[],
        }
    }
}

fn leaf_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Why a path cannot be placed in the tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("path is empty")]
    Empty,

    #[error("path '{0}' escapes the project root")]
    Traversal(String),

    #[error("'{0}' is a file, not a folder")]
    NotAFolder(String),

    #[error("'{0}' is a folder, not a file")]
    NotAFile(String),
}

/// Split a path into its segments, dropping empty and `.` segments.
///
/// `./src//app.js` and `/src/app.js` both become `["src", "app.js"]`.
pub fn normalize_path(path: &str) -> Result<Vec<&str>, TreeError> {
    let segments: Vec<&str> = path
        .trim()
        .split(['/', '\\'])
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();

    if segments.contains(&"..") {
        return Err(TreeError::Traversal(path.to_string()));
    }
    if segments.is_empty() {
        return Err(TreeError::Empty);
    }
    Ok(segments)
}
