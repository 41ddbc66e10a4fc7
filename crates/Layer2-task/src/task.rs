//! Task definition and types

use crate::agent::AgentKind;
use crate::state::TaskStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Progress step applied per streamed output fragment
const PROGRESS_STEP: u8 = 5;

/// Progress ceiling while still running; 100 is reserved for completion
const PROGRESS_RUNNING_CAP: u8 = 95;

/// Unique identifier for a task
///
/// Monotonically generated by the registry, unique for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub u64);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// One dispatch of a prompt to an agent, tracked through a lifecycle.
///
/// Owned exclusively by the registry; everything handed out is a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier
    pub id: TaskId,

    /// Which agent the prompt is dispatched to
    pub agent: AgentKind,

    /// Prompt text
    pub prompt: String,

    /// Current state
    pub status: TaskStatus,

    /// Progress percentage (0-100); only meaningful while running
    pub progress: u8,

    /// Accumulated output text (stdout and stderr in arrival order)
    pub output: String,

    /// Error text, set when the task fails
    pub error: Option<String>,

    /// When the task was created
    pub created_at: DateTime<Utc>,

    /// When the task reached a terminal state
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(id: TaskId, agent: AgentKind, prompt: impl Into<String>) -> Self {
        Self {
            id,
            agent,
            prompt: prompt.into(),
            status: TaskStatus::Pending,
            progress: 0,
            output: String::new(),
            error: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Mark task as running
    pub fn start(&mut self) {
        self.set_status(TaskStatus::Running);
    }

    /// Mark task as completed successfully
    pub fn complete(&mut self) {
        if self.set_status(TaskStatus::Completed) {
            self.progress = 100;
            self.completed_at = Some(Utc::now());
        }
    }

    /// Mark task as failed
    pub fn fail(&mut self, error: impl Into<String>) {
        if self.set_status(TaskStatus::Failed) {
            self.error = Some(error.into());
            self.completed_at = Some(Utc::now());
        }
    }

    /// Mark task as cancelled
    pub fn cancel(&mut self) {
        if self.set_status(TaskStatus::Cancelled) {
            self.completed_at = Some(Utc::now());
        }
    }

    /// Append a streamed fragment to the accumulated output
    pub fn append_output(&mut self, text: &str) {
        if !self.output.is_empty() {
            self.output.push('\n');
        }
        self.output.push_str(text);
    }

    /// Advance progress by the fixed step, capped below completion
    pub fn bump_progress(&mut self) {
        self.progress = (self.progress + PROGRESS_STEP).min(PROGRESS_RUNNING_CAP);
    }

    /// Check if task is still active (pending or running)
    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Apply a transition if the state machine allows it.
    ///
    /// Returns false (and leaves the task untouched) for illegal moves, so a
    /// task can never reach a second terminal state.
    fn set_status(&mut self, next: TaskStatus) -> bool {
        if self.status.can_transition(next) {
            self.status = next;
            true
        } else {
            warn!(
                task = %self.id,
                from = %self.status,
                to = %next,
                "ignoring illegal task transition"
            );
            false
        }
    }
}
