//! Offline inspection of a response: `scaffold parse` and `scaffold tree`.

use std::path::Path;

use anyhow::{Context, Result};
use console::style;
use serde_json::json;

use scaffold::config::ScaffoldConfig;
use scaffold::reducer::Reducer;
use scaffold::step::parse_response;
use scaffold::tree;
use scaffold::ui::{format_step, format_tree};
use scaffold::workspace::Workspace;

use super::read_input;

pub fn cmd_parse(input: &str, json: bool) -> Result<bool> {
    let text = read_input(input)?;
    let parsed = parse_response(&text);

    if json {
        let out = serde_json::to_string_pretty(&parsed.steps).context("Failed to serialize steps")?;
        println!("{}", out);
        return Ok(true);
    }

    for artifact in &parsed.artifacts {
        println!(
            "{} {} ({} actions)",
            style("Artifact").bold(),
            style(artifact.title.as_deref().unwrap_or("untitled")).cyan(),
            artifact.actions
        );
    }
    if parsed.steps.is_empty() {
        println!("No steps found.");
    }
    for step in &parsed.steps {
        println!("{}", format_step(step, None));
    }
    Ok(true)
}

/// Build a workspace from one response using the project's skip list.
pub fn load_workspace(project_dir: &Path, input: &str) -> Result<Workspace> {
    let config = ScaffoldConfig::new(project_dir.to_path_buf())?;
    let text = read_input(input)?;
    let mut workspace = Workspace::new(Reducer::new(config.command_filter()));
    workspace.ingest(&text);
    Ok(workspace)
}

pub fn cmd_tree(project_dir: &Path, input: &str, json: bool) -> Result<bool> {
    let workspace = load_workspace(project_dir, input)?;

    if json {
        let out = json!({
            "tree": tree::sorted(workspace.tree()),
            "queue": workspace.queue().iter().collect::<Vec<_>>(),
            "steps": workspace.steps(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&out).context("Failed to serialize workspace")?
        );
        return Ok(true);
    }

    if workspace.tree().is_empty() {
        println!("No files.");
    }
    for line in format_tree(workspace.tree()) {
        println!("{}", line);
    }

    if workspace.queue_len() > 0 {
        println!();
        println!("{}", style("Command queue:").bold());
        for entry in workspace.queue().iter() {
            println!("  {:>3} {}", entry.step_id, entry.command);
        }
    }

    let skipped: Vec<_> = workspace
        .steps()
        .iter()
        .filter(|s| workspace.skipped_pattern(s.id).is_some())
        .collect();
    if !skipped.is_empty() {
        println!();
        println!("{}", style("Handled by the session:").bold());
        for step in skipped {
            println!("{}", format_step(step, workspace.skipped_pattern(step.id)));
        }
    }

    let failed: Vec<_> = workspace
        .steps()
        .iter()
        .filter_map(|s| workspace.failure(s.id).map(|reason| (s, reason)))
        .collect();
    if !failed.is_empty() {
        println!();
        println!("{}", style("Failed steps:").red().bold());
        for (step, reason) in &failed {
            println!("{} {}", format_step(step, None), style(reason).red());
        }
    }

    Ok(failed.is_empty())
}
