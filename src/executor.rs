//! Command execution against the sandbox session.
//!
//! Queue entries run one at a time, in queue order, through the configured
//! shell. Each entry's step goes `pending -> in_progress -> completed|error`;
//! a failing command never stops the entries after it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

use crate::reducer::{CommandQueue, CommandQueueEntry};
use crate::sandbox::{ProcessEvent, SessionManager};
use crate::step::{StepId, StepStatus};

/// Events emitted while commands run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutorEvent {
    /// A command was dispatched to the sandbox.
    Started { step_id: StepId, command: String },
    /// One line of command output.
    Output { step_id: StepId, line: String },
    /// A command reached a terminal status.
    Finished {
        step_id: StepId,
        status: StepStatus,
        exit_code: Option<i32>,
        error: Option<String>,
    },
}

/// Tally of a queue drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionSummary {
    pub completed: usize,
    pub failed: usize,
}

impl ExecutionSummary {
    pub fn total(&self) -> usize {
        self.completed + self.failed
    }
}

pub struct CommandExecutor {
    session: Arc<SessionManager>,
    event_tx: Option<mpsc::Sender<ExecutorEvent>>,
    /// Held while a command runs: the sandbox has one shell context.
    turn: Mutex<()>,
}

impl CommandExecutor {
    pub fn new(session: Arc<SessionManager>) -> Self {
        Self {
            session,
            event_tx: None,
            turn: Mutex::new(()),
        }
    }

    /// Set the event channel for command progress.
    pub fn with_event_channel(mut self, tx: mpsc::Sender<ExecutorEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Run one entry to completion and return the step's terminal status.
    pub async fn execute(&self, entry: &CommandQueueEntry) -> StepStatus {
        let _turn = self.turn.lock().await;
        let step_id = entry.step_id;

        self.emit(ExecutorEvent::Started {
            step_id,
            command: entry.command.clone(),
        })
        .await;
        info!(step = step_id, command = %entry.command, "running command");

        let sandbox = match self.session.get_session().await {
            Ok(sandbox) => sandbox,
            Err(e) => return self.finish(step_id, None, Some(e.to_string())).await,
        };

        let shell = &self.session.config().shell;
        let args = ["-c".to_string(), entry.command.clone()];
        let mut process = match sandbox.spawn(shell, &args).await {
            Ok(process) => process,
            Err(e) => return self.finish(step_id, None, Some(e.to_string())).await,
        };

        // Background children may keep the output open past the exit.
        let exit = loop {
            match process.next_event().await {
                ProcessEvent::Line(line) => {
                    debug!(step = step_id, "{}", line);
                    self.emit(ExecutorEvent::Output { step_id, line }).await;
                }
                ProcessEvent::Exited(exit) => break exit,
            }
        };

        match exit {
            Ok(code) => self.finish(step_id, Some(code), None).await,
            Err(e) => self.finish(step_id, None, Some(e.to_string())).await,
        }
    }

    /// Run every queued entry in FIFO order, removing each once it finishes.
    ///
    /// `on_status` sees `in_progress` before an entry runs and its terminal
    /// status after.
    pub async fn drain<F>(&self, queue: &mut CommandQueue, mut on_status: F) -> ExecutionSummary
    where
        F: FnMut(StepId, StepStatus),
    {
        let mut summary = ExecutionSummary::default();
        while let Some(entry) = queue.front().cloned() {
            on_status(entry.step_id, StepStatus::InProgress);
            let status = self.execute(&entry).await;
            on_status(entry.step_id, status);
            queue.pop_front();

            match status {
                StepStatus::Completed => summary.completed += 1,
                _ => summary.failed += 1,
            }
        }
        summary
    }

    async fn finish(
        &self,
        step_id: StepId,
        exit_code: Option<i32>,
        error: Option<String>,
    ) -> StepStatus {
        let status = match (exit_code, &error) {
            (Some(0), None) => StepStatus::Completed,
            _ => StepStatus::Error,
        };
        match (&error, exit_code) {
            (Some(error), _) => warn!(step = step_id, error = %error, "command could not run"),
            (None, Some(code)) if code != 0 => warn!(step = step_id, code, "command failed"),
            _ => info!(step = step_id, "command completed"),
        }

        self.emit(ExecutorEvent::Finished {
            step_id,
            status,
            exit_code,
            error,
        })
        .await;
        status
    }

    async fn emit(&self, event: ExecutorEvent) {
        if let Some(ref tx) = self.event_tx {
            tx.send(event).await.ok();
        }
    }
}
