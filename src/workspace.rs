//! A project workspace: the step log, the file tree and the command queue.
//!
//! Responses are ingested one at a time. Each response is parsed, its step
//! ids are shifted past the ids already in the log, and only the new steps
//! are reduced into the existing tree. Nothing already in the log is
//! reprocessed, so earlier files and queued commands are never duplicated.

use std::collections::BTreeMap;

use tracing::info;

use crate::errors::SessionError;
use crate::executor::{CommandExecutor, ExecutionSummary};
use crate::reducer::{CommandQueue, CommandQueueEntry, Reducer};
use crate::sandbox::SessionManager;
use crate::step::{ArtifactInfo, Step, StepAction, StepId, StepStatus, parse_response};
use crate::tree::FileTreeNode;

/// What one ingested response contributed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub artifacts: Vec<ArtifactInfo>,
    pub step_ids: Vec<StepId>,
    pub queued: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Default)]
pub struct Workspace {
    steps: Vec<Step>,
    tree: Vec<FileTreeNode>,
    queue: CommandQueue,
    reducer: Reducer,
    failures: BTreeMap<StepId, String>,
    skipped: BTreeMap<StepId, String>,
}

impl Workspace {
    pub fn new(reducer: Reducer) -> Self {
        Self {
            reducer,
            ..Default::default()
        }
    }

    /// Parse a response and fold its steps into the workspace.
    pub fn ingest(&mut self, response: &str) -> IngestSummary {
        let parsed = parse_response(response);
        let offset = self.last_id();
        let batch: Vec<Step> = parsed
            .steps
            .into_iter()
            .map(|mut step| {
                step.id += offset;
                step
            })
            .collect();

        let outcome = self.reducer.reduce(&self.tree, &batch);
        let summary = IngestSummary {
            artifacts: parsed.artifacts,
            step_ids: batch.iter().map(|s| s.id).collect(),
            queued: outcome.new_queue_entries.len(),
            skipped: outcome.skipped.len(),
            failed: outcome.failures.len(),
        };

        self.steps.extend(batch);
        self.tree = outcome.tree;
        self.queue.extend(outcome.new_queue_entries);
        for (id, status) in outcome.status_updates {
            self.set_status(id, status);
        }
        self.failures.extend(outcome.failures);
        self.skipped.extend(outcome.skipped);

        info!(
            steps = summary.step_ids.len(),
            queued = summary.queued,
            skipped = summary.skipped,
            failed = summary.failed,
            "response ingested"
        );
        summary
    }

    /// Queue a command typed by the user. The lifecycle filter does not
    /// apply: the user asked for it explicitly.
    pub fn push_user_command(&mut self, command: &str) -> Option<StepId> {
        let command = command.trim();
        if command.is_empty() {
            return None;
        }
        let id = self.last_id() + 1;
        self.steps.push(Step::new(
            id,
            StepAction::RunCommand {
                command: command.to_string(),
            },
        ));
        self.queue.push(CommandQueueEntry {
            step_id: id,
            command: command.to_string(),
        });
        Some(id)
    }

    /// Mount the current tree into the session's sandbox.
    pub async fn mount(&self, session: &SessionManager) -> Result<(), SessionError> {
        session.mount(&self.tree).await
    }

    /// Run every queued command, updating step statuses as they go.
    pub async fn run_commands(&mut self, executor: &CommandExecutor) -> ExecutionSummary {
        let steps = &mut self.steps;
        executor
            .drain(&mut self.queue, |id, status| {
                if let Some(step) = steps.iter_mut().find(|s| s.id == id) {
                    step.transition_to(status);
                }
            })
            .await
    }

    /// Apply a status change if the step lifecycle allows it.
    pub fn set_status(&mut self, id: StepId, status: StepStatus) -> bool {
        self.steps
            .iter_mut()
            .find(|s| s.id == id)
            .is_some_and(|step| step.transition_to(status))
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn step(&self, id: StepId) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn tree(&self) -> &[FileTreeNode] {
        &self.tree
    }

    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Why a step ended in `error` while being reduced.
    pub fn failure(&self, id: StepId) -> Option<&str> {
        self.failures.get(&id).map(String::as_str)
    }

    /// The lifecycle pattern a command step matched, if it was skipped.
    pub fn skipped_pattern(&self, id: StepId) -> Option<&str> {
        self.skipped.get(&id).map(String::as_str)
    }

    fn last_id(&self) -> StepId {
        self.steps.iter().map(|s| s.id).max().unwrap_or(0)
    }
}
