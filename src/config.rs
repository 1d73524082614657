//! Project configuration read from `.scaffold/scaffold.toml`.
//!
//! Settings are layered: file, then environment, then CLI flags.
//!
//! # Configuration File Format
//!
//! ```toml
//! [sandbox]
//! workdir = ".scaffold/sandbox"
//! shell = "sh"
//! install_command = "npm install"
//! dev_command = "npm run dev"
//! ready_timeout_secs = 30
//! preserve = ["node_modules"]
//!
//! [commands]
//! skip = ["npm install", "npm run dev"]
//!
//! [logging]
//! file = false
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::reducer::{CommandFilter, DEFAULT_SKIP_PATTERNS};
use crate::sandbox::{LocalRuntimeConfig, SessionConfig};

pub const SCAFFOLD_DIR: &str = ".scaffold";
pub const CONFIG_FILE: &str = "scaffold.toml";

/// Sandbox and dev-server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxSection {
    /// Work directory, relative to the project directory unless absolute
    #[serde(default = "default_workdir")]
    pub workdir: PathBuf,
    #[serde(default = "default_shell")]
    pub shell: String,
    #[serde(default = "default_install_command")]
    pub install_command: String,
    #[serde(default = "default_dev_command")]
    pub dev_command: String,
    /// Seconds to wait for the dev server to print its URL
    #[serde(default = "default_ready_timeout_secs")]
    pub ready_timeout_secs: u64,
    /// Top-level entries a re-mount leaves alone
    #[serde(default = "default_preserve")]
    pub preserve: Vec<String>,
}

fn default_workdir() -> PathBuf {
    PathBuf::from(SCAFFOLD_DIR).join("sandbox")
}

fn default_shell() -> String {
    "sh".to_string()
}

fn default_install_command() -> String {
    "npm install".to_string()
}

fn default_dev_command() -> String {
    "npm run dev".to_string()
}

fn default_ready_timeout_secs() -> u64 {
    30
}

fn default_preserve() -> Vec<String> {
    vec!["node_modules".to_string()]
}

impl Default for SandboxSection {
    fn default() -> Self {
        Self {
            workdir: default_workdir(),
            shell: default_shell(),
            install_command: default_install_command(),
            dev_command: default_dev_command(),
            ready_timeout_secs: default_ready_timeout_secs(),
            preserve: default_preserve(),
        }
    }
}

/// Command queue settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandsSection {
    /// Lifecycle commands acknowledged without running
    #[serde(default = "default_skip")]
    pub skip: Vec<String>,
}

fn default_skip() -> Vec<String> {
    DEFAULT_SKIP_PATTERNS.iter().map(|p| p.to_string()).collect()
}

impl Default for CommandsSection {
    fn default() -> Self {
        Self {
            skip: default_skip(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Also write logs to `.scaffold/logs/`
    #[serde(default)]
    pub file: bool,
}

/// Parsed scaffold.toml.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaffoldToml {
    #[serde(default)]
    pub sandbox: SandboxSection,
    #[serde(default)]
    pub commands: CommandsSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl ScaffoldToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse scaffold.toml")
    }

    /// Load `.scaffold/scaffold.toml`, or defaults when the file is absent.
    pub fn load_or_default(scaffold_dir: &Path) -> Result<Self> {
        let config_path = scaffold_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize scaffold.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.sandbox.shell.trim().is_empty() {
            warnings.push("sandbox.shell is empty".to_string());
        }
        if self.sandbox.dev_command.trim().is_empty() {
            warnings.push("sandbox.dev_command is empty; the dev server cannot start".to_string());
        }
        if self.sandbox.install_command.trim().is_empty() {
            warnings.push(
                "sandbox.install_command is empty; dependencies will not be installed".to_string(),
            );
        }
        if self.sandbox.ready_timeout_secs == 0 {
            warnings.push(
                "sandbox.ready_timeout_secs is 0; the dev server will always time out".to_string(),
            );
        }
        for (i, pattern) in self.commands.skip.iter().enumerate() {
            if pattern.trim().is_empty() {
                warnings.push(format!("commands.skip[{}] is empty and is ignored", i));
            }
        }

        warnings
    }
}

/// Resolved configuration for one project directory.
#[derive(Debug, Clone)]
pub struct ScaffoldConfig {
    pub project_dir: PathBuf,
    pub scaffold_dir: PathBuf,
    /// Parsed scaffold.toml
    pub toml: ScaffoldToml,
    /// CLI override: verbose mode
    pub verbose: bool,
    /// CLI override for the readiness timeout, in seconds
    pub cli_ready_timeout: Option<u64>,
}

impl ScaffoldConfig {
    /// Load configuration for a project directory.
    pub fn new(project_dir: PathBuf) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let scaffold_dir = project_dir.join(SCAFFOLD_DIR);
        let toml = ScaffoldToml::load_or_default(&scaffold_dir)?;

        Ok(Self {
            project_dir,
            scaffold_dir,
            toml,
            verbose: false,
            cli_ready_timeout: None,
        })
    }

    /// Create ScaffoldConfig with CLI overrides.
    pub fn with_cli_args(
        project_dir: PathBuf,
        verbose: bool,
        ready_timeout: Option<u64>,
    ) -> Result<Self> {
        let mut config = Self::new(project_dir)?;
        config.verbose = verbose;
        config.cli_ready_timeout = ready_timeout;
        Ok(config)
    }

    /// Shell (env → file).
    pub fn shell(&self) -> String {
        env_or("SCAFFOLD_SHELL", &self.toml.sandbox.shell)
    }

    /// Install command (env → file).
    pub fn install_command(&self) -> String {
        env_or("SCAFFOLD_INSTALL_COMMAND", &self.toml.sandbox.install_command)
    }

    /// Dev-server command (env → file).
    pub fn dev_command(&self) -> String {
        env_or("SCAFFOLD_DEV_COMMAND", &self.toml.sandbox.dev_command)
    }

    /// Readiness timeout (CLI → env → file).
    pub fn ready_timeout(&self) -> Duration {
        if let Some(secs) = self.cli_ready_timeout {
            return Duration::from_secs(secs);
        }
        if let Ok(value) = std::env::var("SCAFFOLD_READY_TIMEOUT") {
            match value.trim().parse::<u64>() {
                Ok(secs) => return Duration::from_secs(secs),
                Err(_) => warn!(value, "ignoring invalid SCAFFOLD_READY_TIMEOUT"),
            }
        }
        Duration::from_secs(self.toml.sandbox.ready_timeout_secs)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            shell: self.shell(),
            install_command: self.install_command(),
            dev_command: self.dev_command(),
            ready_timeout: self.ready_timeout(),
        }
    }

    pub fn local_runtime_config(&self) -> LocalRuntimeConfig {
        LocalRuntimeConfig {
            root: self.workdir(),
            shell: self.shell(),
            preserve: self.toml.sandbox.preserve.clone(),
        }
    }

    pub fn command_filter(&self) -> CommandFilter {
        CommandFilter::new(&self.toml.commands.skip)
    }

    /// Get path to the sandbox work directory.
    pub fn workdir(&self) -> PathBuf {
        self.project_dir.join(&self.toml.sandbox.workdir)
    }

    /// Get path to scaffold.toml.
    pub fn config_file(&self) -> PathBuf {
        self.scaffold_dir.join(CONFIG_FILE)
    }

    /// Get path to log directory.
    pub fn log_dir(&self) -> PathBuf {
        self.scaffold_dir.join("logs")
    }

    /// Validate configuration and return warnings.
    pub fn validate(&self) -> Vec<String> {
        self.toml.validate()
    }
}

fn env_or(key: &str, fallback: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| fallback.to_string())
}
