//! Full pipeline against the local sandbox: `scaffold run`.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use console::style;
use tokio::sync::mpsc;
use tracing::warn;

use scaffold::config::ScaffoldConfig;
use scaffold::executor::CommandExecutor;
use scaffold::reducer::Reducer;
use scaffold::sandbox::{LocalRuntime, SessionManager};
use scaffold::ui::RunUI;
use scaffold::workspace::Workspace;

use super::super::Cli;
use super::read_input;

pub struct RunOptions {
    pub dev_server: bool,
    pub timeout: Option<u64>,
    pub detach: bool,
}

pub async fn cmd_run(
    cli: &Cli,
    project_dir: &Path,
    input: &str,
    options: RunOptions,
) -> Result<bool> {
    let config =
        ScaffoldConfig::with_cli_args(project_dir.to_path_buf(), cli.verbose, options.timeout)?;
    for warning in config.validate() {
        warn!("{}", warning);
    }

    let text = read_input(input)?;
    let mut workspace = Workspace::new(Reducer::new(config.command_filter()));
    let ingest = workspace.ingest(&text);
    for id in &ingest.step_ids {
        if let Some(reason) = workspace.failure(*id) {
            eprintln!("{} step {}: {}", style("error").red().bold(), id, reason);
        }
    }

    let runtime = Arc::new(LocalRuntime::new(config.local_runtime_config()));
    let session = Arc::new(SessionManager::new(runtime, config.session_config()));
    let ui = Arc::new(RunUI::new(workspace.queue_len() as u64, cli.verbose));

    ui.session_status("booting");
    session
        .get_session()
        .await
        .context("Failed to boot the sandbox")?;
    ui.session_status(format!("mounting into {}", config.workdir().display()));
    workspace
        .mount(&session)
        .await
        .context("Failed to mount project files")?;

    let (tx, mut rx) = mpsc::channel(64);
    let executor = CommandExecutor::new(Arc::clone(&session)).with_event_channel(tx);
    let printer = {
        let ui = Arc::clone(&ui);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                ui.handle_event(&event);
            }
        })
    };
    let summary = workspace.run_commands(&executor).await;
    // Closing the channel lets the printer finish.
    drop(executor);
    let _ = printer.await;
    ui.finish_commands(summary.completed, summary.failed);

    if options.dev_server {
        ui.session_status("installing dependencies and starting the dev server");
        match session.start_dev_server().await {
            Ok(Some(url)) => {
                ui.dev_server_ready(&url);
                if !options.detach {
                    ui.print_line(format!("{}", style("Press Ctrl-C to stop.").dim()));
                    tokio::signal::ctrl_c()
                        .await
                        .context("Failed to listen for Ctrl-C")?;
                }
            }
            Ok(None) => ui.dev_server_timed_out(config.ready_timeout()),
            Err(e) => ui.dev_server_failed(&e.to_string()),
        }
    } else {
        ui.finish_session("files mounted");
    }

    session
        .teardown()
        .await
        .context("Failed to tear down the sandbox")?;

    let failed = ingest.failed + summary.failed;
    if failed > 0 {
        eprintln!("{} {} step(s) failed", style("error:").red().bold(), failed);
    }
    Ok(failed == 0)
}
