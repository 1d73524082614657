//! Typed error hierarchy for the scaffold pipeline.
//!
//! Four enums cover the fallible subsystems:
//! - `SandboxError` - operations against a sandbox runtime
//! - `SessionError` - session boot, mount and teardown
//! - `DevServerError` - dependency install and dev-server startup
//! - `ExportError` - zip export of the file tree
//!
//! Parsing and reduction never fail, and command execution reports failures
//! as step status rather than errors.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from a sandbox runtime.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("Sandbox environment unsupported: {0}")]
    Unsupported(String),

    #[error("Sandbox boot failed: {0}")]
    BootFailed(String),

    #[error("Failed to spawn '{command}': {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Sandbox I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Refusing unsafe path in mount tree: {0}")]
    UnsafePath(String),

    #[error("Process exited without reporting a status")]
    ProcessLost,
}

/// Errors from the session manager.
///
/// Cloneable because one in-flight boot result is handed to every waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Sandbox environment unsupported: {0}")]
    Unsupported(String),

    #[error("Sandbox boot failed: {0}")]
    BootFailed(String),

    #[error("Mount failed: {0}")]
    MountFailed(String),

    #[error("Teardown failed: {0}")]
    TeardownFailed(String),

    #[error("Sandbox boot was abandoned by a teardown")]
    Abandoned,
}

impl SessionError {
    /// Classify a runtime error raised while booting.
    pub fn from_boot(err: SandboxError) -> Self {
        match err {
            SandboxError::Unsupported(reason) => Self::Unsupported(reason),
            other => Self::BootFailed(other.to_string()),
        }
    }
}

/// Errors from dev-server startup.
///
/// A readiness timeout is not an error; `start_dev_server` returns `Ok(None)`.
#[derive(Debug, Error)]
pub enum DevServerError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Dev server failed to start (install failed: {install_failed}): {reason}")]
    StartFailed { install_failed: bool, reason: String },

    #[error(
        "Dev server exited with code {code} before becoming ready (install failed: {install_failed})"
    )]
    ExitedEarly { code: i32, install_failed: bool },

    #[error("Dev server start was interrupted by a stop")]
    Stopped,
}

/// Errors from exporting the file tree.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Failed to write archive: {0}")]
    Io(#[from] std::io::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}
