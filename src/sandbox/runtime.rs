//! The contract between the session manager and a sandbox runtime.
//!
//! A runtime boots sandboxes. A sandbox accepts a full file-tree mount,
//! spawns processes, announces servers that start listening, and can be torn
//! down. Nothing else is assumed.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;

use super::mount::MountTree;
use crate::errors::SandboxError;

/// A server inside the sandbox started accepting connections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerReady {
    pub port: u16,
    pub url: String,
}

/// Boots sandbox instances.
#[async_trait]
pub trait SandboxRuntime: Send + Sync {
    async fn boot(&self) -> Result<Arc<dyn Sandbox>, SandboxError>;
}

/// A booted sandbox.
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Replace the visible file system with `tree`.
    async fn mount(&self, tree: &MountTree) -> Result<(), SandboxError>;

    /// Start `program` with `args` inside the sandbox.
    async fn spawn(&self, program: &str, args: &[String]) -> Result<SandboxProcess, SandboxError>;

    /// Subscribe to server readiness announcements. Only announcements made
    /// after subscribing are received.
    fn server_ready(&self) -> broadcast::Receiver<ServerReady>;

    /// Stop everything running in the sandbox.
    async fn teardown(&self) -> Result<(), SandboxError>;
}

/// How long output is still collected after the process exited. Children
/// left running in the background can hold the stream open indefinitely.
pub const OUTPUT_DRAIN_GRACE: Duration = Duration::from_millis(250);

/// Handle to a process running in a sandbox.
///
/// Output arrives line by line until the process closes its streams. Dropping
/// the handle kills the process.
pub struct SandboxProcess {
    output: Option<mpsc::UnboundedReceiver<String>>,
    exit: Option<oneshot::Receiver<i32>>,
    exit_code: Option<i32>,
    drain_deadline: Option<Instant>,
    kill: Option<oneshot::Sender<()>>,
}

/// What [`SandboxProcess::next_event`] observed.
#[derive(Debug)]
pub enum ProcessEvent {
    Line(String),
    Exited(Result<i32, SandboxError>),
}

enum Woke {
    Line(Option<String>),
    Exit(Result<i32, oneshot::error::RecvError>),
}

/// The runtime's side of a [`SandboxProcess`].
pub struct ProcessChannels {
    pub output: mpsc::UnboundedSender<String>,
    pub exit: oneshot::Sender<i32>,
    /// Resolves when the handle asks for a kill or is dropped.
    pub kill: oneshot::Receiver<()>,
}

/// Create a connected process handle and runtime channel set.
pub fn process_channels() -> (SandboxProcess, ProcessChannels) {
    let (output_tx, output_rx) = mpsc::unbounded_channel();
    let (exit_tx, exit_rx) = oneshot::channel();
    let (kill_tx, kill_rx) = oneshot::channel();
    (
        SandboxProcess {
            output: Some(output_rx),
            exit: Some(exit_rx),
            exit_code: None,
            drain_deadline: None,
            kill: Some(kill_tx),
        },
        ProcessChannels {
            output: output_tx,
            exit: exit_tx,
            kill: kill_rx,
        },
    )
}

impl SandboxProcess {
    /// Next output line, or `None` once the output stream has ended.
    pub async fn next_line(&mut self) -> Option<String> {
        match self.output.as_mut() {
            Some(output) => output.recv().await,
            None => None,
        }
    }

    /// Next output line or the exit, whichever the process gets to first.
    ///
    /// Unlike reading [`next_line`](Self::next_line) to the end, this does not
    /// depend on the output stream closing. Once the process has exited,
    /// buffered lines are still returned for up to [`OUTPUT_DRAIN_GRACE`]
    /// before `Exited` is reported.
    pub async fn next_event(&mut self) -> ProcessEvent {
        loop {
            if let Some(code) = self.exit_code {
                let Some(output) = self.output.as_mut() else {
                    return ProcessEvent::Exited(Ok(code));
                };
                let deadline = *self
                    .drain_deadline
                    .get_or_insert_with(|| Instant::now() + OUTPUT_DRAIN_GRACE);
                if let Ok(Some(line)) = tokio::time::timeout_at(deadline, output.recv()).await {
                    return ProcessEvent::Line(line);
                }
                self.output = None;
                return ProcessEvent::Exited(Ok(code));
            }

            let (Some(output), Some(exit)) = (self.output.as_mut(), self.exit.as_mut()) else {
                return ProcessEvent::Exited(self.wait().await);
            };
            let woke = tokio::select! {
                biased;
                line = output.recv() => Woke::Line(line),
                code = exit => Woke::Exit(code),
            };
            match woke {
                Woke::Line(Some(line)) => return ProcessEvent::Line(line),
                Woke::Line(None) => self.output = None,
                Woke::Exit(Ok(code)) => {
                    self.exit = None;
                    self.exit_code = Some(code);
                }
                Woke::Exit(Err(_)) => {
                    self.exit = None;
                    return ProcessEvent::Exited(Err(SandboxError::ProcessLost));
                }
            }
        }
    }

    /// Take the output stream to consume it elsewhere.
    pub fn take_output(&mut self) -> Option<mpsc::UnboundedReceiver<String>> {
        self.output.take()
    }

    /// Wait for the exit code. Safe to call again after it resolved, and safe
    /// to cancel.
    pub async fn wait(&mut self) -> Result<i32, SandboxError> {
        if let Some(code) = self.exit_code {
            return Ok(code);
        }
        let exit = self.exit.as_mut().ok_or(SandboxError::ProcessLost)?;
        let code = exit.await.map_err(|_| SandboxError::ProcessLost)?;
        self.exit = None;
        self.exit_code = Some(code);
        Ok(code)
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Ask the runtime to kill the process. Idempotent.
    pub fn kill(&mut self) {
        if let Some(kill) = self.kill.take() {
            let _ = kill.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_process_handle_streams_then_exits() {
        let (mut process, channels) = process_channels();
        channels.output.send("one".to_string()).unwrap();
        channels.output.send("two".to_string()).unwrap();
        drop(channels.output);
        channels.exit.send(3).unwrap();

        assert_eq!(process.next_line().await.as_deref(), Some("one"));
        assert_eq!(process.next_line().await.as_deref(), Some("two"));
        assert_eq!(process.next_line().await, None);
        assert_eq!(process.wait().await.unwrap(), 3);
        assert_eq!(process.wait().await.unwrap(), 3);
        assert_eq!(process.exit_code(), Some(3));
    }

    #[tokio::test]
    async fn test_lost_exit_is_an_error() {
        let (mut process, channels) = process_channels();
        drop(channels);
        assert!(matches!(process.wait().await, Err(SandboxError::ProcessLost)));
    }

    #[tokio::test]
    async fn test_kill_and_drop_signal_the_runtime() {
        let (mut process, channels) = process_channels();
        process.kill();
        process.kill();
        assert!(channels.kill.await.is_ok());

        let (process, channels) = process_channels();
        drop(process);
        assert!(channels.kill.await.is_err());
    }

    #[tokio::test]
    async fn test_next_event_does_not_wait_for_output_to_close() {
        let (mut process, channels) = process_channels();
        channels.output.send("started".to_string()).unwrap();
        channels.exit.send(0).unwrap();

        // The output sender stays alive, like a background child holding the pipe.
        let (first, second) = tokio::time::timeout(Duration::from_secs(2), async {
            (process.next_event().await, process.next_event().await)
        })
        .await
        .unwrap();
        assert!(matches!(first, ProcessEvent::Line(line) if line == "started"));
        assert!(matches!(second, ProcessEvent::Exited(Ok(0))));
        assert_eq!(process.wait().await.unwrap(), 0);
        drop(channels.output);
    }

    #[tokio::test]
    async fn test_next_event_streams_lines_before_exit() {
        let (mut process, channels) = process_channels();
        channels.output.send("a".to_string()).unwrap();
        channels.output.send("b".to_string()).unwrap();
        drop(channels.output);
        channels.exit.send(5).unwrap();

        for expected in ["a", "b"] {
            let event = process.next_event().await;
            assert!(matches!(event, ProcessEvent::Line(line) if line == expected));
        }
        assert!(matches!(process.next_event().await, ProcessEvent::Exited(Ok(5))));
        assert!(matches!(process.next_event().await, ProcessEvent::Exited(Ok(5))));
    }

    #[tokio::test]
    async fn test_next_event_reports_a_lost_process() {
        let (mut process, channels) = process_channels();
        drop(channels.exit);
        assert!(matches!(
            process.next_event().await,
            ProcessEvent::Exited(Err(SandboxError::ProcessLost))
        ));
        drop(channels.output);
    }

    #[tokio::test]
    async fn test_taken_output_leaves_no_lines() {
        let (mut process, channels) = process_channels();
        channels.output.send("x".to_string()).unwrap();
        let mut output = process.take_output().unwrap();
        assert_eq!(output.recv().await.as_deref(), Some("x"));
        assert_eq!(process.next_line().await, None);
    }
}
