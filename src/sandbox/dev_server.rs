//! Dev-server lifecycle on top of a session.
//!
//! `not_started -> installing -> starting -> ready(url)` or `timed_out`.
//! An install failure does not stop the sequence: the server is still started
//! once in case dependencies are already present. Only a failed start is an
//! error. A readiness timeout resolves to `None`; calling again starts over
//! from the install. The state is observable at every step of a start, and a
//! stop interrupts whatever step is running.

use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex, broadcast, watch};
use tracing::{debug, error, info, warn};

use super::runtime::{Sandbox, SandboxProcess, ServerReady};
use super::session::{SessionManager, run_to_exit};
use crate::errors::{DevServerError, SandboxError};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DevServerState {
    #[default]
    NotStarted,
    Installing,
    Starting,
    Ready {
        url: String,
    },
    TimedOut,
    Failed {
        reason: String,
    },
}

impl DevServerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Installing => "installing",
            Self::Starting => "starting",
            Self::Ready { .. } => "ready",
            Self::TimedOut => "timed_out",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Ready { url } => Some(url),
            _ => None,
        }
    }
}

/// The single dev-server slot of a session.
///
/// `current` is only locked for reads and transitions, never across an
/// install or a readiness wait, so state queries and stops stay responsive
/// while a start is in flight. `start` serializes starts.
pub(super) struct DevServer {
    current: Mutex<Current>,
    start: Mutex<()>,
    stop: watch::Sender<u64>,
}

#[derive(Default)]
struct Current {
    state: DevServerState,
    process: Option<SandboxProcess>,
    /// Bumped by every stop. A start only commits transitions while the
    /// generation it began under is still current.
    generation: u64,
}

impl Default for DevServer {
    fn default() -> Self {
        Self {
            current: Mutex::new(Current::default()),
            start: Mutex::new(()),
            stop: watch::channel(0).0,
        }
    }
}

enum StartOutcome {
    Ready(ServerReady),
    Exited(Result<i32, SandboxError>),
}

impl SessionManager {
    /// Install dependencies, start the dev server and wait for its URL.
    ///
    /// Returns the cached URL when the server is already up. Concurrent
    /// callers are serialized. A stop while this runs interrupts it with
    /// [`DevServerError::Stopped`].
    pub async fn start_dev_server(&self) -> Result<Option<String>, DevServerError> {
        let _start = self.dev.start.lock().await;
        let (generation, mut stop) = {
            let mut current = self.dev.current.lock().await;
            if let Some(url) = current.state.url() {
                debug!(url, "dev server already running");
                return Ok(Some(url.to_string()));
            }
            if let Some(mut stale) = current.process.take() {
                stale.kill();
            }
            (current.generation, self.dev.stop.subscribe())
        };

        tokio::select! {
            biased;
            _ = stopped(&mut stop) => {
                info!("dev server start interrupted by a stop");
                Err(DevServerError::Stopped)
            }
            result = self.launch_dev_server(generation) => result,
        }
    }

    async fn launch_dev_server(&self, generation: u64) -> Result<Option<String>, DevServerError> {
        let sandbox = self.get_session().await?;

        self.transition(generation, DevServerState::Installing).await?;
        let install_failed = !self.install_dependencies(sandbox.as_ref()).await;

        self.transition(generation, DevServerState::Starting).await?;
        let mut ready = sandbox.server_ready();
        let args = ["-c".to_string(), self.config.dev_command.clone()];
        let mut process = match sandbox.spawn(&self.config.shell, &args).await {
            Ok(process) => process,
            Err(e) => {
                let reason = e.to_string();
                error!(install_failed, error = %reason, "dev server failed to start");
                let failed = DevServerState::Failed {
                    reason: reason.clone(),
                };
                self.transition(generation, failed).await?;
                return Err(DevServerError::StartFailed {
                    install_failed,
                    reason,
                });
            }
        };
        if let Some(output) = process.take_output() {
            self.forward_dev_output(output);
        }

        let waited = tokio::time::timeout(self.config.ready_timeout, async {
            tokio::select! {
                biased;
                server = next_ready(&mut ready) => StartOutcome::Ready(server),
                exit = process.wait() => StartOutcome::Exited(exit),
            }
        })
        .await;

        match waited {
            Ok(StartOutcome::Ready(server)) => {
                let mut current = self.dev.current.lock().await;
                if current.generation != generation {
                    return Err(DevServerError::Stopped);
                }
                info!(url = %server.url, port = server.port, "dev server ready");
                current.state = DevServerState::Ready {
                    url: server.url.clone(),
                };
                current.process = Some(process);
                Ok(Some(server.url))
            }
            Ok(StartOutcome::Exited(exit)) => {
                let code = exit.unwrap_or(-1);
                error!(code, install_failed, "dev server exited before becoming ready");
                let failed = DevServerState::Failed {
                    reason: format!("exited with code {}", code),
                };
                self.transition(generation, failed).await?;
                Err(DevServerError::ExitedEarly {
                    code,
                    install_failed,
                })
            }
            Err(_) => {
                warn!(
                    timeout_secs = self.config.ready_timeout.as_secs_f64(),
                    "dev server did not report readiness in time"
                );
                process.kill();
                self.transition(generation, DevServerState::TimedOut).await?;
                Ok(None)
            }
        }
    }

    /// Record `state` unless a stop has happened since `generation`.
    async fn transition(
        &self,
        generation: u64,
        state: DevServerState,
    ) -> Result<(), DevServerError> {
        let mut current = self.dev.current.lock().await;
        if current.generation != generation {
            return Err(DevServerError::Stopped);
        }
        debug!(state = state.as_str(), "dev server transition");
        current.state = state;
        Ok(())
    }

    /// Kill the dev server, if any, and forget its URL. Interrupts a start
    /// that is still installing or waiting for readiness.
    pub async fn stop_dev_server(&self) {
        let mut current = self.dev.current.lock().await;
        current.generation += 1;
        if let Some(mut process) = current.process.take() {
            process.kill();
            info!("dev server stopped");
        }
        current.state = DevServerState::NotStarted;
        self.dev.stop.send_replace(current.generation);
    }

    pub async fn dev_server_state(&self) -> DevServerState {
        self.dev.current.lock().await.state.clone()
    }

    pub async fn dev_server_url(&self) -> Option<String> {
        self.dev.current.lock().await.state.url().map(str::to_string)
    }

    /// Subscribe to dev-server output lines.
    pub fn subscribe_dev_output(&self) -> broadcast::Receiver<String> {
        self.dev_output.subscribe()
    }

    /// Returns whether the install succeeded.
    async fn install_dependencies(&self, sandbox: &dyn Sandbox) -> bool {
        let command = self.config.install_command.trim();
        if command.is_empty() {
            return true;
        }
        info!(command, "installing dependencies");
        match run_to_exit(sandbox, &self.config.shell, command).await {
            Ok(0) => {
                info!("dependencies installed");
                true
            }
            Ok(code) => {
                warn!(code, "dependency install failed, starting the dev server anyway");
                false
            }
            Err(e) => {
                warn!(error = %e, "dependency install could not run, starting the dev server anyway");
                false
            }
        }
    }

    fn forward_dev_output(&self, mut output: tokio::sync::mpsc::UnboundedReceiver<String>) {
        let sink = self.dev_output.clone();
        tokio::spawn(async move {
            while let Some(line) = output.recv().await {
                debug!(target: "scaffold::dev_server", "{}", line);
                let _ = sink.send(line);
            }
        });
    }
}

/// Resolves on the next stop. Never resolves once the sender is gone.
async fn stopped(stop: &mut watch::Receiver<u64>) {
    if stop.changed().await.is_err() {
        std::future::pending::<()>().await;
    }
}

async fn next_ready(ready: &mut broadcast::Receiver<ServerReady>) -> ServerReady {
    loop {
        match ready.recv().await {
            Ok(server) => return server,
            Err(RecvError::Lagged(skipped)) => {
                debug!(skipped, "missed readiness announcements");
            }
            Err(RecvError::Closed) => std::future::pending::<()>().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::errors::SessionError;
    use crate::sandbox::session::SessionConfig;
    use crate::sandbox::testing::{Script, ScriptedRuntime};

    fn config(timeout: Duration) -> SessionConfig {
        SessionConfig {
            ready_timeout: timeout,
            ..SessionConfig::default()
        }
    }

    fn setup(timeout: Duration) -> (Arc<ScriptedRuntime>, SessionManager) {
        let runtime = Arc::new(ScriptedRuntime::new());
        let manager = SessionManager::new(runtime.clone(), config(timeout));
        (runtime, manager)
    }

    #[tokio::test]
    async fn test_install_then_start_then_ready() {
        let (runtime, manager) = setup(Duration::from_secs(5));
        runtime
            .sandbox()
            .script("npm run dev", Script::default().ready(5173).hang());

        let url = manager.start_dev_server().await.unwrap();
        assert_eq!(url.as_deref(), Some("http://localhost:5173"));
        assert_eq!(runtime.sandbox().spawned(), vec!["npm install", "npm run dev"]);
        assert_eq!(
            manager.dev_server_state().await,
            DevServerState::Ready {
                url: "http://localhost:5173".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_ready_url_is_cached() {
        let (runtime, manager) = setup(Duration::from_secs(5));
        runtime
            .sandbox()
            .script("npm run dev", Script::default().ready(3000).hang());

        let first = manager.start_dev_server().await.unwrap();
        let second = manager.start_dev_server().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(runtime.sandbox().spawned().len(), 2);
        assert_eq!(manager.dev_server_url().await, first);
    }

    #[tokio::test]
    async fn test_install_failure_still_starts_server() {
        let (runtime, manager) = setup(Duration::from_secs(5));
        let sandbox = runtime.sandbox();
        sandbox.script("npm install", Script::default().exit(1));
        sandbox.script("npm run dev", Script::default().ready(8080).hang());

        let url = manager.start_dev_server().await.unwrap();
        assert_eq!(url.as_deref(), Some("http://localhost:8080"));
        assert_eq!(sandbox.spawned(), vec!["npm install", "npm run dev"]);
    }

    #[tokio::test]
    async fn test_install_and_start_failure_is_an_error() {
        let (runtime, manager) = setup(Duration::from_secs(5));
        let sandbox = runtime.sandbox();
        sandbox.script("npm install", Script::default().exit(1));
        sandbox.script("npm run dev", Script::default().spawn_error());

        let err = manager.start_dev_server().await.unwrap_err();
        assert!(matches!(
            err,
            DevServerError::StartFailed {
                install_failed: true,
                ..
            }
        ));
        assert!(matches!(
            manager.dev_server_state().await,
            DevServerState::Failed { .. }
        ));
    }

    #[tokio::test]
    async fn test_server_exiting_before_ready_is_an_error() {
        let (runtime, manager) = setup(Duration::from_secs(5));
        runtime
            .sandbox()
            .script("npm run dev", Script::default().line("boom").exit(2));

        let err = manager.start_dev_server().await.unwrap_err();
        assert!(matches!(
            err,
            DevServerError::ExitedEarly {
                code: 2,
                install_failed: false
            }
        ));
    }

    #[tokio::test]
    async fn test_timeout_resolves_to_none_and_retry_starts_over() {
        let (runtime, manager) = setup(Duration::from_millis(100));
        let sandbox = runtime.sandbox();
        sandbox.script("npm run dev", Script::default().hang());

        assert_eq!(manager.start_dev_server().await.unwrap(), None);
        assert_eq!(manager.dev_server_state().await, DevServerState::TimedOut);
        sandbox.wait_for_kills(1).await;

        sandbox.script("npm run dev", Script::default().ready(5173).hang());
        let url = manager.start_dev_server().await.unwrap();
        assert_eq!(url.as_deref(), Some("http://localhost:5173"));
        assert_eq!(
            sandbox.spawned(),
            vec!["npm install", "npm run dev", "npm install", "npm run dev"]
        );
    }

    #[tokio::test]
    async fn test_blank_install_command_is_skipped() {
        let runtime = Arc::new(ScriptedRuntime::new());
        let manager = SessionManager::new(
            runtime.clone(),
            SessionConfig {
                install_command: "  ".to_string(),
                ..config(Duration::from_secs(5))
            },
        );
        runtime
            .sandbox()
            .script("npm run dev", Script::default().ready(4000).hang());

        manager.start_dev_server().await.unwrap();
        assert_eq!(runtime.sandbox().spawned(), vec!["npm run dev"]);
    }

    #[tokio::test]
    async fn test_boot_failure_surfaces_as_session_error() {
        let runtime = Arc::new(ScriptedRuntime::new().with_failing_boots(1));
        let manager = SessionManager::new(runtime.clone(), config(Duration::from_secs(5)));

        let err = manager.start_dev_server().await.unwrap_err();
        assert!(matches!(
            err,
            DevServerError::Session(SessionError::BootFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_dev_output_is_forwarded() {
        let (runtime, manager) = setup(Duration::from_secs(5));
        runtime.sandbox().script(
            "npm run dev",
            Script::default().line("VITE ready").ready(5173).hang(),
        );
        let mut output = manager.subscribe_dev_output();

        manager.start_dev_server().await.unwrap();
        let line = tokio::time::timeout(Duration::from_secs(1), output.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(line, "VITE ready");
    }

    #[tokio::test]
    async fn test_state_is_readable_during_a_slow_install() {
        let (runtime, manager) = setup(Duration::from_secs(5));
        let sandbox = runtime.sandbox();
        sandbox.script("npm install", Script::default().delay(Duration::from_millis(500)));
        sandbox.script("npm run dev", Script::default().ready(5173).hang());
        let manager = Arc::new(manager);

        let background = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.start_dev_server().await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;

        let state = tokio::time::timeout(Duration::from_millis(200), manager.dev_server_state())
            .await
            .unwrap();
        assert_eq!(state, DevServerState::Installing);
        let url = tokio::time::timeout(Duration::from_millis(200), manager.dev_server_url())
            .await
            .unwrap();
        assert_eq!(url, None);

        let url = background.await.unwrap().unwrap();
        assert_eq!(url.as_deref(), Some("http://localhost:5173"));
    }

    #[tokio::test]
    async fn test_teardown_interrupts_a_hung_install() {
        let (runtime, manager) = setup(Duration::from_secs(5));
        let sandbox = runtime.sandbox();
        sandbox.script("npm install", Script::default().hang());
        let manager = Arc::new(manager);

        let background = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.start_dev_server().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(manager.dev_server_state().await, DevServerState::Installing);

        tokio::time::timeout(Duration::from_secs(1), manager.teardown())
            .await
            .unwrap()
            .unwrap();
        let err = background.await.unwrap().unwrap_err();
        assert!(matches!(err, DevServerError::Stopped));
        assert_eq!(manager.dev_server_state().await, DevServerState::NotStarted);
        sandbox.wait_for_kills(1).await;
        assert_eq!(sandbox.spawned(), vec!["npm install"]);
    }

    #[tokio::test]
    async fn test_teardown_clears_url_and_kills_server() {
        let (runtime, manager) = setup(Duration::from_secs(5));
        let sandbox = runtime.sandbox();
        sandbox.script("npm run dev", Script::default().ready(5173).hang());

        manager.start_dev_server().await.unwrap();
        manager.teardown().await.unwrap();

        assert_eq!(manager.dev_server_url().await, None);
        assert_eq!(manager.dev_server_state().await, DevServerState::NotStarted);
        sandbox.wait_for_kills(1).await;

        // After teardown the whole sequence runs again.
        manager.start_dev_server().await.unwrap();
        assert_eq!(sandbox.spawned().len(), 4);
        assert_eq!(runtime.boot_count(), 2);
    }
}
