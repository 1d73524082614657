//! Zip export: `scaffold export`.

use std::path::Path;

use anyhow::{Context, Result};
use console::style;

use scaffold::export::export_to_path;
use scaffold::ui::icons::SPARKLE;

use super::inspect::load_workspace;

pub fn cmd_export(project_dir: &Path, input: &str, output: &Path) -> Result<bool> {
    let workspace = load_workspace(project_dir, input)?;
    let files = export_to_path(workspace.tree(), output)
        .with_context(|| format!("Failed to export to {}", output.display()))?;

    println!(
        "{}Wrote {} files to {}",
        SPARKLE,
        style(files).green(),
        style(output.display()).cyan()
    );
    Ok(true)
}
