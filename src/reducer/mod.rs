//! Folding steps into the file tree and the command queue.
//!
//! [`Reducer::reduce`] takes the current tree and a batch of steps and
//! returns the next tree, the commands to enqueue and the status changes to
//! apply. It does not touch its inputs and uses no clock or randomness, so the
//! same inputs always give the same tree.

pub mod filter;

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::step::{Step, StepAction, StepId, StepStatus};
use crate::tree::{self, FileTreeNode};

pub use filter::{CommandFilter, DEFAULT_SKIP_PATTERNS};

/// A command waiting for the executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandQueueEntry {
    pub step_id: StepId,
    pub command: String,
}

/// FIFO of commands awaiting execution.
#[derive(Debug, Clone, Default)]
pub struct CommandQueue {
    entries: VecDeque<CommandQueueEntry>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: CommandQueueEntry) {
        self.entries.push_back(entry);
    }

    pub fn pop_front(&mut self) -> Option<CommandQueueEntry> {
        self.entries.pop_front()
    }

    pub fn front(&self) -> Option<&CommandQueueEntry> {
        self.entries.front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CommandQueueEntry> {
        self.entries.iter()
    }
}

impl Extend<CommandQueueEntry> for CommandQueue {
    fn extend<T: IntoIterator<Item = CommandQueueEntry>>(&mut self, iter: T) {
        self.entries.extend(iter);
    }
}

/// Result of one reducer pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReduceOutcome {
    pub tree: Vec<FileTreeNode>,
    pub new_queue_entries: Vec<CommandQueueEntry>,
    pub status_updates: BTreeMap<StepId, StepStatus>,
    /// Reason for every step marked `error`.
    pub failures: BTreeMap<StepId, String>,
    /// Command steps completed without running, with the pattern they matched.
    pub skipped: BTreeMap<StepId, String>,
}

/// Applies pending steps to a file tree.
#[derive(Debug, Clone, Default)]
pub struct Reducer {
    filter: CommandFilter,
}

impl Reducer {
    pub fn new(filter: CommandFilter) -> Self {
        Self { filter }
    }

    pub fn filter(&self) -> &CommandFilter {
        &self.filter
    }

    /// Reduce every `pending` step of `steps` in ascending id order.
    /// Steps in any other status are left alone.
    pub fn reduce(&self, current: &[FileTreeNode], steps: &[Step]) -> ReduceOutcome {
        let mut outcome = ReduceOutcome {
            tree: current.to_vec(),
            ..Default::default()
        };

        let mut pending: Vec<&Step> = steps
            .iter()
            .filter(|s| s.status == StepStatus::Pending)
            .collect();
        pending.sort_by_key(|s| s.id);

        for step in pending {
            self.apply(step, &mut outcome);
        }
        outcome
    }

    fn apply(&self, step: &Step, outcome: &mut ReduceOutcome) {
        let id = step.id;
        let result = match &step.action {
            StepAction::CreateFile { path, content } | StepAction::EditFile { path, content } => {
                tree::upsert_file(&mut outcome.tree, path, content).map(|_| ())
            }
            StepAction::CreateFolder { path } => {
                tree::ensure_folder(&mut outcome.tree, path).map(|_| ())
            }
            StepAction::RunCommand { command } | StepAction::ExecuteCommand { command } => {
                self.route_command(id, command, outcome);
                return;
            }
            StepAction::DeleteFile { .. }
            | StepAction::MoveFile { .. }
            | StepAction::InstallPackage { .. } => {
                debug!(step = id, kind = %step.kind(), "informational step, tree unchanged");
                Ok(())
            }
        };

        match result {
            Ok(()) => {
                outcome.status_updates.insert(id, StepStatus::Completed);
            }
            Err(e) => {
                warn!(step = id, error = %e, "step could not be applied to the file tree");
                outcome.status_updates.insert(id, StepStatus::Error);
                outcome.failures.insert(id, e.to_string());
            }
        }
    }

    fn route_command(&self, id: StepId, command: &str, outcome: &mut ReduceOutcome) {
        let command = command.trim();
        if command.is_empty() {
            outcome.status_updates.insert(id, StepStatus::Error);
            outcome.failures.insert(id, "empty command".to_string());
            return;
        }

        if let Some(pattern) = self.filter.matched(command) {
            debug!(step = id, command, pattern, "lifecycle command handled by the session, not queued");
            outcome.status_updates.insert(id, StepStatus::Completed);
            outcome.skipped.insert(id, pattern.to_string());
            return;
        }

        outcome.new_queue_entries.push(CommandQueueEntry {
            step_id: id,
            command: command.to_string(),
        });
    }
}

/// Reduce with the default lifecycle filter.
pub fn reduce(current: &[FileTreeNode], steps: &[Step]) -> ReduceOutcome {
    Reducer::default().reduce(current, steps)
}
