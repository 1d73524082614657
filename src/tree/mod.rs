//! The virtual project file tree.
//!
//! Nodes are kept in insertion order; display order is derived on demand by
//! [`sorted`]. Every path appears at most once. Writes go through
//! [`upsert_file`] and [`ensure_folder`], which synthesize missing parent
//! folders and never remove nodes.

mod node;

pub use node::{FileTreeNode, NodeKind, TreeError, normalize_path};

/// What an upsert did to the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Created,
    Updated,
    Unchanged,
}

/// Write `content` at `path`, creating the node and its parents if needed.
///
/// An existing file keeps its node and gets the new content. Conflicts with
/// existing nodes of the other kind leave the tree untouched.
pub fn upsert_file(
    nodes: &mut Vec<FileTreeNode>,
    path: &str,
    content: &str,
) -> Result<Upsert, TreeError> {
    let segments = normalize_path(path)?;
    let full = segments.join("/");
    let (leaf, parents) = segments.split_last().ok_or(TreeError::Empty)?;

    // Check the leaf before synthesizing any parents.
    if find(nodes, &full).is_some_and(FileTreeNode::is_folder) {
        return Err(TreeError::NotAFile(full));
    }

    let siblings = descend(nodes, parents)?;
    match siblings.iter_mut().find(|n| n.name == *leaf) {
        Some(node) => match &mut node.kind {
            NodeKind::File { content: existing } if existing.as_str() == content => {
                Ok(Upsert::Unchanged)
            }
            NodeKind::File { content: existing } => {
                *existing = content.to_string();
                Ok(Upsert::Updated)
            }
            NodeKind::Folder { .. } => Err(TreeError::NotAFile(full)),
        },
        None => {
            siblings.push(FileTreeNode::file(&full, content));
            Ok(Upsert::Created)
        }
    }
}

/// Make sure a folder exists at `path`, creating parents as needed.
pub fn ensure_folder(nodes: &mut Vec<FileTreeNode>, path: &str) -> Result<Upsert, TreeError> {
    let segments = normalize_path(path)?;
    let existed = find(nodes, &segments.join("/")).is_some();
    descend(nodes, &segments)?;
    Ok(if existed {
        Upsert::Unchanged
    } else {
        Upsert::Created
    })
}

/// Walk down `segments`, creating missing folders, and return the children of
/// the last one.
fn descend<'t>(
    nodes: &'t mut Vec<FileTreeNode>,
    segments: &[&str],
) -> Result<&'t mut Vec<FileTreeNode>, TreeError> {
    // Reject conflicts up front so a failed walk creates nothing.
    let mut prefix = String::new();
    for segment in segments {
        if !prefix.is_empty() {
            prefix.push('/');
        }
        prefix.push_str(segment);
        if find(nodes, &prefix).is_some_and(FileTreeNode::is_file) {
            return Err(TreeError::NotAFolder(prefix));
        }
    }

    let mut current = nodes;
    let mut prefix = String::new();
    for segment in segments {
        if !prefix.is_empty() {
            prefix.push('/');
        }
        prefix.push_str(segment);

        let index = match current.iter().position(|n| n.name == *segment) {
            Some(index) => index,
            None => {
                current.push(FileTreeNode::folder(&prefix));
                current.len() - 1
            }
        };
        current = match &mut current[index].kind {
            NodeKind::Folder { children } => children,
            NodeKind::File { .. } => return Err(TreeError::NotAFolder(prefix)),
        };
    }
    Ok(current)
}

/// Look up a node by path.
pub fn find<'t>(nodes: &'t [FileTreeNode], path: &str) -> Option<&'t FileTreeNode> {
    let segments = normalize_path(path).ok()?;
    let mut current = nodes;
    let mut found = None;
    for segment in segments {
        let node = current.iter().find(|n| n.name == segment)?;
        current = node.children();
        found = Some(node);
    }
    found
}

/// All `(path, content)` pairs of file nodes, depth first.
pub fn files(nodes: &[FileTreeNode]) -> Vec<(&str, &str)> {
    let mut out = Vec::new();
    collect_files(nodes, &mut out);
    out
}

fn collect_files<'t>(nodes: &'t [FileTreeNode], out: &mut Vec<(&'t str, &'t str)>) {
    for node in nodes {
        match &node.kind {
            NodeKind::File { content } => out.push((node.path.as_str(), content.as_str())),
            NodeKind::Folder { children } => collect_files(children, out),
        }
    }
}

/// Every node path in the tree, folders included.
pub fn paths(nodes: &[FileTreeNode]) -> Vec<&str> {
    let mut out = Vec::new();
    let mut stack: Vec<&FileTreeNode> = nodes.iter().rev().collect();
    while let Some(node) = stack.pop() {
        out.push(node.path.as_str());
        stack.extend(node.children().iter().rev());
    }
    out
}

pub fn file_count(nodes: &[FileTreeNode]) -> usize {
    files(nodes).len()
}

/// A copy of the tree in display order: folders first, then by name.
pub fn sorted(nodes: &[FileTreeNode]) -> Vec<FileTreeNode> {
    let mut out: Vec<FileTreeNode> = nodes
        .iter()
        .map(|node| match &node.kind {
            NodeKind::Folder { children } => FileTreeNode {
                kind: NodeKind::Folder {
                    children: sorted(children),
                },
                ..node.clone()
            },
            NodeKind::File { .. } => node.clone(),
        })
        .collect();
    out.sort_by(|a, b| b.is_folder().cmp(&a.is_folder()).then_with(|| a.name.cmp(&b.name)));
    out
}

/// Indented text rendering in display order. Folders end with `/`.
pub fn render(nodes: &[FileTreeNode]) -> String {
    let mut out = String::new();
    render_into(&sorted(nodes), 0, &mut out);
    out
}

fn render_into(nodes: &[FileTreeNode], depth: usize, out: &mut String) {
    for node in nodes {
        out.push_str(&"  ".repeat(depth));
        out.push_str(&node.name);
        if node.is_folder() {
            out.push('/');
        }
        out.push('\n');
        render_into(node.children(), depth + 1, out);
    }
}
