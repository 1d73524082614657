//! Sandbox session management.
//!
//! A [`SessionManager`] owns the one sandbox a process works against. The
//! first caller of [`SessionManager::get_session`] starts the boot; callers
//! arriving while it runs await the same boot. A failed boot leaves the
//! session in `failed` and the next call starts a fresh attempt.
//!
//! Boot state machine:
//!
//! ```text
//! unbooted -> booting -> ready
//!                    \-> failed -> booting (on the next request)
//! ```
//!
//! A teardown during `booting` drops the attempt. When that boot still
//! succeeds, its sandbox is torn down and its waiters get
//! [`SessionError::Abandoned`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde::Serialize;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, error, info, warn};

use super::dev_server::DevServer;
use super::mount::MountTree;
use super::runtime::{ProcessEvent, Sandbox, SandboxRuntime};
use crate::errors::{SandboxError, SessionError};
use crate::tree::FileTreeNode;

/// Commands and limits the session uses to bring up the project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Shell that runs commands as `<shell> -c <command>`.
    pub shell: String,
    /// Dependency install. Blank skips the install step.
    pub install_command: String,
    /// Long-running development server.
    pub dev_command: String,
    /// How long to wait for the dev server to announce readiness.
    pub ready_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            shell: "sh".to_string(),
            install_command: "npm install".to_string(),
            dev_command: "npm run dev".to_string(),
            ready_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BootState {
    Unbooted,
    Booting,
    Ready,
    Failed,
}

impl BootState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unbooted => "unbooted",
            Self::Booting => "booting",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for BootState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

type BootResult = Result<Arc<dyn Sandbox>, SessionError>;

enum Slot {
    Unbooted,
    Booting {
        attempt: u64,
        boot: Shared<BoxFuture<'static, BootResult>>,
    },
    Ready {
        attempt: u64,
        sandbox: Arc<dyn Sandbox>,
    },
    Failed {
        attempt: u64,
        error: SessionError,
    },
}

impl Slot {
    fn attempt(&self) -> Option<u64> {
        match self {
            Slot::Unbooted => None,
            Slot::Booting { attempt, .. }
            | Slot::Ready { attempt, .. }
            | Slot::Failed { attempt, .. } => Some(*attempt),
        }
    }
}

/// Owner of the sandbox lifecycle.
pub struct SessionManager {
    runtime: Arc<dyn SandboxRuntime>,
    pub(super) config: SessionConfig,
    slot: Mutex<Slot>,
    attempts: AtomicU64,
    mount_lock: Mutex<()>,
    pub(super) dev: DevServer,
    pub(super) dev_output: broadcast::Sender<String>,
}

impl SessionManager {
    pub fn new(runtime: Arc<dyn SandboxRuntime>, config: SessionConfig) -> Self {
        let (dev_output, _) = broadcast::channel(256);
        Self {
            runtime,
            config,
            slot: Mutex::new(Slot::Unbooted),
            attempts: AtomicU64::new(0),
            mount_lock: Mutex::new(()),
            dev: DevServer::default(),
            dev_output,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub async fn boot_state(&self) -> BootState {
        match &*self.slot.lock().await {
            Slot::Unbooted => BootState::Unbooted,
            Slot::Booting { .. } => BootState::Booting,
            Slot::Ready { .. } => BootState::Ready,
            Slot::Failed { .. } => BootState::Failed,
        }
    }

    /// The error of the last boot attempt, while the session is `failed`.
    pub async fn boot_error(&self) -> Option<SessionError> {
        match &*self.slot.lock().await {
            Slot::Failed { error, .. } => Some(error.clone()),
            _ => None,
        }
    }

    /// Number of boot attempts started so far.
    pub fn boot_attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Get the booted sandbox, booting it first if needed.
    pub async fn get_session(&self) -> Result<Arc<dyn Sandbox>, SessionError> {
        let (attempt, boot) = {
            let mut slot = self.slot.lock().await;
            if let Slot::Ready { sandbox, .. } = &*slot {
                return Ok(Arc::clone(sandbox));
            }
            if let Slot::Booting { attempt, boot } = &*slot {
                debug!(attempt, "joining in-flight sandbox boot");
                (*attempt, boot.clone())
            } else {
                let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
                info!(attempt, "booting sandbox");
                let runtime = Arc::clone(&self.runtime);
                let boot = async move { runtime.boot().await.map_err(SessionError::from_boot) }
                    .boxed()
                    .shared();
                *slot = Slot::Booting {
                    attempt,
                    boot: boot.clone(),
                };
                (attempt, boot)
            }
        };

        let result = boot.await;

        let mut slot = self.slot.lock().await;
        if slot.attempt() != Some(attempt) {
            // A teardown dropped this attempt while it was booting.
            drop(slot);
            return self.discard_abandoned(attempt, result).await;
        }
        if matches!(&*slot, Slot::Booting { .. }) {
            *slot = match &result {
                Ok(sandbox) => {
                    info!(attempt, "sandbox ready");
                    Slot::Ready {
                        attempt,
                        sandbox: Arc::clone(sandbox),
                    }
                }
                Err(err) => {
                    error!(attempt, error = %err, "sandbox boot failed");
                    Slot::Failed {
                        attempt,
                        error: err.clone(),
                    }
                }
            };
        }
        result
    }

    /// Tear down a sandbox whose boot finished after the session let go of
    /// it. Every waiter of that boot gets `Abandoned`.
    async fn discard_abandoned(&self, attempt: u64, result: BootResult) -> BootResult {
        match result {
            Ok(sandbox) => {
                warn!(attempt, "discarding a sandbox booted after teardown");
                if let Err(e) = sandbox.teardown().await {
                    warn!(attempt, error = %e, "failed to tear down abandoned sandbox");
                }
                Err(SessionError::Abandoned)
            }
            Err(err) => {
                debug!(attempt, error = %err, "abandoned boot failed");
                Err(err)
            }
        }
    }

    /// Replace the sandbox file system with `nodes`.
    ///
    /// Every call is a full resync. Concurrent mounts are applied one at a
    /// time in call order, so the last call wins.
    pub async fn mount(&self, nodes: &[FileTreeNode]) -> Result<(), SessionError> {
        let sandbox = self.get_session().await?;
        let tree = MountTree::from_nodes(nodes);

        let _guard = self.mount_lock.lock().await;
        sandbox
            .mount(&tree)
            .await
            .map_err(|e| SessionError::MountFailed(e.to_string()))?;
        info!(files = tree.file_count(), "file tree mounted");
        Ok(())
    }

    /// Stop the dev server, tear the sandbox down and return to `unbooted`.
    pub async fn teardown(&self) -> Result<(), SessionError> {
        self.stop_dev_server().await;

        let previous = std::mem::replace(&mut *self.slot.lock().await, Slot::Unbooted);
        match previous {
            Slot::Ready { sandbox, .. } => {
                sandbox
                    .teardown()
                    .await
                    .map_err(|e| SessionError::TeardownFailed(e.to_string()))?;
                info!("sandbox torn down");
            }
            Slot::Booting { attempt, .. } => {
                debug!(attempt, "teardown abandoned an in-flight boot");
            }
            Slot::Unbooted | Slot::Failed { .. } => {}
        }
        Ok(())
    }
}

/// Run `command` through the shell and wait for it, logging its output.
pub(super) async fn run_to_exit(
    sandbox: &dyn Sandbox,
    shell: &str,
    command: &str,
) -> Result<i32, SandboxError> {
    let mut process = sandbox
        .spawn(shell, &["-c".to_string(), command.to_string()])
        .await?;
    loop {
        match process.next_event().await {
            ProcessEvent::Line(line) => debug!(command, "{}", line),
            ProcessEvent::Exited(exit) => return exit,
        }
    }
}
