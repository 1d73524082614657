//! Step data types.
//!
//! A `Step` is one unit of planned work extracted from a response. What the
//! step does lives in `StepAction`, a tagged variant carrying only the fields
//! relevant to its kind.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sequence number of a step, unique within one step log.
pub type StepId = u32;

/// Lifecycle of a step: `pending -> in_progress -> {completed | error}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Error,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    /// `completed` and `error` are terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    /// Whether moving from `self` to `next` follows the step lifecycle.
    ///
    /// A pending step may jump straight to a terminal state (file steps and
    /// skipped commands complete without ever running).
    pub fn can_transition_to(&self, next: StepStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::InProgress)
                | (Self::Pending, Self::Completed)
                | (Self::Pending, Self::Error)
                | (Self::InProgress, Self::Completed)
                | (Self::InProgress, Self::Error)
        )
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "error" => Ok(Self::Error),
            _ => Err(format!("Invalid step status: {}", s)),
        }
    }
}

/// Discriminant of `StepAction`, for display and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    CreateFile,
    EditFile,
    CreateFolder,
    RunCommand,
    ExecuteCommand,
    InstallPackage,
    DeleteFile,
    MoveFile,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateFile => "create_file",
            Self::EditFile => "edit_file",
            Self::CreateFolder => "create_folder",
            Self::RunCommand => "run_command",
            Self::ExecuteCommand => "execute_command",
            Self::InstallPackage => "install_package",
            Self::DeleteFile => "delete_file",
            Self::MoveFile => "move_file",
        }
    }

    pub fn is_command(&self) -> bool {
        matches!(self, Self::RunCommand | Self::ExecuteCommand)
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create_file" => Ok(Self::CreateFile),
            "edit_file" => Ok(Self::EditFile),
            "create_folder" => Ok(Self::CreateFolder),
            "run_command" => Ok(Self::RunCommand),
            "execute_command" => Ok(Self::ExecuteCommand),
            "install_package" => Ok(Self::InstallPackage),
            "delete_file" => Ok(Self::DeleteFile),
            "move_file" => Ok(Self::MoveFile),
            _ => Err(format!("Invalid step kind: {}", s)),
        }
    }
}

/// The work a step describes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepAction {
    CreateFile { path: String, content: String },
    EditFile { path: String, content: String },
    CreateFolder { path: String },
    RunCommand { command: String },
    ExecuteCommand { command: String },
    InstallPackage { package: String },
    DeleteFile { path: String },
    MoveFile { from: String, to: String },
}

impl StepAction {
    pub fn kind(&self) -> StepKind {
        match self {
            Self::CreateFile { .. } => StepKind::CreateFile,
            Self::EditFile { .. } => StepKind::EditFile,
            Self::CreateFolder { .. } => StepKind::CreateFolder,
            Self::RunCommand { .. } => StepKind::RunCommand,
            Self::ExecuteCommand { .. } => StepKind::ExecuteCommand,
            Self::InstallPackage { .. } => StepKind::InstallPackage,
            Self::DeleteFile { .. } => StepKind::DeleteFile,
            Self::MoveFile { .. } => StepKind::MoveFile,
        }
    }

    /// Target path for file-kind actions. Moves report their destination.
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::CreateFile { path, .. }
            | Self::EditFile { path, .. }
            | Self::CreateFolder { path }
            | Self::DeleteFile { path } => Some(path),
            Self::MoveFile { to, .. } => Some(to),
            Self::RunCommand { .. } | Self::ExecuteCommand { .. } | Self::InstallPackage { .. } => {
                None
            }
        }
    }

    /// Command string for command-kind actions.
    pub fn command(&self) -> Option<&str> {
        match self {
            Self::RunCommand { command } | Self::ExecuteCommand { command } => Some(command),
            _ => None,
        }
    }

    /// Short human-readable summary used as the step title.
    pub fn title(&self) -> String {
        match self {
            Self::CreateFile { path, .. } => format!("Create {}", path),
            Self::EditFile { path, .. } => format!("Edit {}", path),
            Self::CreateFolder { path } => format!("Create folder {}", path),
            Self::RunCommand { command } | Self::ExecuteCommand { command } => {
                format!("Run `{}`", command)
            }
            Self::InstallPackage { package } => format!("Install {}", package),
            Self::DeleteFile { path } => format!("Delete {}", path),
            Self::MoveFile { from, to } => format!("Move {} to {}", from, to),
        }
    }
}

/// One planned unit of work with its lifecycle status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    pub title: String,
    pub status: StepStatus,
    #[serde(flatten)]
    pub action: StepAction,
    /// Creation time, informational only.
    pub timestamp: DateTime<Utc>,
}

impl Step {
    /// Create a pending step.
    pub fn new(id: StepId, action: StepAction) -> Self {
        Self {
            id,
            title: action.title(),
            status: StepStatus::Pending,
            action,
            timestamp: Utc::now(),
        }
    }

    pub fn kind(&self) -> StepKind {
        self.action.kind()
    }

    /// Move to `next` if the lifecycle allows it. Returns whether the status
    /// changed.
    pub fn transition_to(&mut self, next: StepStatus) -> bool {
        if self.status.can_transition_to(next) {
            self.status = next;
            true
        } else {
            false
        }
    }
}
