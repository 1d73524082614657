use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

mod cmd;

#[derive(Parser)]
#[command(name = "scaffold")]
#[command(version, about = "Turn LLM artifact responses into a runnable project")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse a response and list the steps it contains
    Parse {
        /// Response file, or `-` for stdin
        input: String,
        #[arg(long)]
        json: bool,
    },
    /// Show the file tree and command queue a response produces
    Tree {
        /// Response file, or `-` for stdin
        input: String,
        #[arg(long)]
        json: bool,
    },
    /// Write the generated files to a zip archive
    Export {
        /// Response file, or `-` for stdin
        input: String,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Mount the project into the local sandbox, run its commands and start the dev server
    Run {
        /// Response file, or `-` for stdin
        input: String,

        /// Skip starting the dev server
        #[arg(long)]
        no_dev_server: bool,

        /// Seconds to wait for the dev server URL. Overrides scaffold.toml.
        #[arg(long)]
        timeout: Option<u64>,

        /// Tear down as soon as the dev server is up instead of waiting for Ctrl-C
        #[arg(long)]
        detach: bool,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default scaffold.toml file
    Init {
        /// Overwrite an existing file without asking
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    let _log_guard = cmd::init_logging(&cli, &project_dir);

    let success = match &cli.command {
        Commands::Parse { input, json } => cmd::cmd_parse(input, *json)?,
        Commands::Tree { input, json } => cmd::cmd_tree(&project_dir, input, *json)?,
        Commands::Export { input, output } => cmd::cmd_export(&project_dir, input, output)?,
        Commands::Run {
            input,
            no_dev_server,
            timeout,
            detach,
        } => {
            cmd::cmd_run(
                &cli,
                &project_dir,
                input,
                cmd::RunOptions {
                    dev_server: !*no_dev_server,
                    timeout: *timeout,
                    detach: *detach,
                },
            )
            .await?
        }
        Commands::Config { command } => cmd::cmd_config(&project_dir, command.clone())?,
    };

    Ok(if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
