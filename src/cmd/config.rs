//! Configuration view and validation commands: `scaffold config`.

use anyhow::Result;
use dialoguer::Confirm;

use scaffold::config::{CONFIG_FILE, SCAFFOLD_DIR, ScaffoldConfig, ScaffoldToml};

use super::super::ConfigCommands;

fn print_toml(toml: &ScaffoldToml) {
    println!("[sandbox]");
    println!("  workdir = \"{}\"", toml.sandbox.workdir.display());
    println!("  shell = \"{}\"", toml.sandbox.shell);
    println!("  install_command = \"{}\"", toml.sandbox.install_command);
    println!("  dev_command = \"{}\"", toml.sandbox.dev_command);
    println!("  ready_timeout_secs = {}", toml.sandbox.ready_timeout_secs);
    println!("  preserve = {:?}", toml.sandbox.preserve);
    println!();
    println!("[commands]");
    println!("  skip = {} pattern(s)", toml.commands.skip.len());
    println!();
    println!("[logging]");
    println!("  file = {}", toml.logging.file);
    println!();
}

pub fn cmd_config(project_dir: &std::path::Path, command: Option<ConfigCommands>) -> Result<bool> {
    let scaffold_dir = project_dir.join(SCAFFOLD_DIR);
    let config_path = scaffold_dir.join(CONFIG_FILE);

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Scaffold Configuration");
            println!("======================");
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
                println!();
                print_toml(&ScaffoldToml::load(&config_path)?);
            } else {
                println!("No scaffold.toml found at {}", config_path.display());
                println!();
                println!("Using default configuration:");
                print_toml(&ScaffoldToml::default());
                println!("Run 'scaffold config init' to create a scaffold.toml file.");
                println!();
            }

            println!("Effective values (with env/CLI overrides):");
            let config = ScaffoldConfig::new(project_dir.to_path_buf())?;
            println!("  shell = \"{}\"", config.shell());
            println!("  install_command = \"{}\"", config.install_command());
            println!("  dev_command = \"{}\"", config.dev_command());
            println!("  ready_timeout = {}s", config.ready_timeout().as_secs());
            println!("  workdir = {}", config.workdir().display());
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No scaffold.toml found. Using defaults (valid).");
                return Ok(true);
            }

            let warnings = ScaffoldToml::load(&config_path)?.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in &warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
            return Ok(warnings.is_empty());
        }
        Some(ConfigCommands::Init { force }) => {
            if config_path.exists() && !force {
                let overwrite = console::user_attended()
                    && Confirm::new()
                        .with_prompt(format!(
                            "{} already exists. Overwrite it?",
                            config_path.display()
                        ))
                        .default(false)
                        .interact()?;
                if !overwrite {
                    println!("scaffold.toml already exists at {}", config_path.display());
                    println!("Use --force to recreate it.");
                    return Ok(true);
                }
            }

            std::fs::create_dir_all(&scaffold_dir)?;
            ScaffoldToml::default().save(&config_path)?;

            println!("Created scaffold.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [sandbox] shell, install_command, dev_command, ready_timeout_secs");
            println!("  - [commands] skip, the lifecycle commands the queue never runs");
            println!("  - [logging] file, to also log into .scaffold/logs/");
            println!();
        }
    }

    Ok(true)
}
