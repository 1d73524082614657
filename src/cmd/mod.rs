//! CLI command implementations.
//!
//! | Module     | Commands handled |
//! |------------|------------------|
//! | `inspect`  | `Parse`, `Tree`  |
//! | `export`   | `Export`         |
//! | `run`      | `Run`            |
//! | `config`   | `Config`         |
//!
//! Every command returns whether the process should exit successfully.

pub mod config;
pub mod export;
pub mod inspect;
pub mod run;

pub use config::cmd_config;
pub use export::cmd_export;
pub use inspect::{cmd_parse, cmd_tree};
pub use run::{RunOptions, cmd_run};

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;

use scaffold::config::{SCAFFOLD_DIR, ScaffoldToml};
use scaffold::logging::init_tracing;

use super::Cli;

/// Read a response from a file, or from stdin when `input` is `-`.
pub fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read response from stdin")?;
        return Ok(text);
    }
    std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read response file: {}", input))
}

/// Install tracing. File logging is enabled from `[logging] file`; a broken
/// config file is reported later by the command that loads it.
pub fn init_logging(cli: &Cli, project_dir: &Path) -> Option<WorkerGuard> {
    let scaffold_dir = project_dir.join(SCAFFOLD_DIR);
    let file_logging = ScaffoldToml::load_or_default(&scaffold_dir)
        .map(|toml| toml.logging.file)
        .unwrap_or(false);

    let log_dir = scaffold_dir.join("logs");
    let log_dir = (file_logging && std::fs::create_dir_all(&log_dir).is_ok()).then_some(log_dir);
    init_tracing(cli.verbose, cli.log_json, log_dir.as_deref())
}
