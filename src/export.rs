//! Zip export of the generated file tree.

use std::fs::File;
use std::io::{Seek, Write};
use std::path::Path;

use tracing::info;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::errors::ExportError;
use crate::tree::{FileTreeNode, NodeKind};

/// Write `nodes` as a deflated zip archive. Files carry their folders in
/// their paths; only empty folders get a directory entry of their own.
/// Returns the number of files written.
pub fn write_zip<W: Write + Seek>(nodes: &[FileTreeNode], writer: W) -> Result<usize, ExportError> {
    let mut zip = ZipWriter::new(writer);
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    let mut files = 0;
    let mut stack: Vec<&FileTreeNode> = nodes.iter().rev().collect();
    while let Some(node) = stack.pop() {
        match &node.kind {
            NodeKind::File { content } => {
                zip.start_file(node.path.as_str(), options)?;
                zip.write_all(content.as_bytes())?;
                files += 1;
            }
            NodeKind::Folder { children } if children.is_empty() => {
                zip.add_directory(node.path.as_str(), options)?;
            }
            NodeKind::Folder { children } => stack.extend(children.iter().rev()),
        }
    }

    zip.finish()?;
    Ok(files)
}

/// Export to a file on disk, creating parent directories as needed.
pub fn export_to_path(nodes: &[FileTreeNode], path: &Path) -> Result<usize, ExportError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    let files = write_zip(nodes, file)?;
    info!(path = %path.display(), files, "exported project archive");
    Ok(files)
}
