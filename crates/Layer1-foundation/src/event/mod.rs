//! Task event broadcast system
//!
//! Fan-out for the two notifications the task layer emits:
//! - "tasks changed" after any task mutation
//! - per-task progress fragments while an execution streams output
//!
//! Subscribers get a `broadcast::Receiver`; events are relayed, never stored.
//! The notifier guarantees that an event is sent only *after* the state
//! mutation it describes has been applied - callers emit post-mutation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

/// Broadcast channel capacity
const CHANNEL_CAPACITY: usize = 1024;

/// Kind of a progress fragment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressKind {
    /// Standard output chunk
    Output,
    /// Standard error chunk
    Error,
    /// Execution finished (carries an exit note, not payload)
    Complete,
}

impl ProgressKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressKind::Output => "output",
            ProgressKind::Error => "error",
            ProgressKind::Complete => "complete",
        }
    }
}

/// One streamed fragment of task output
///
/// Ephemeral: relayed to subscribers and appended to the owning task's
/// accumulated output, then dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressFragment {
    pub kind: ProgressKind,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl ProgressFragment {
    pub fn new(kind: ProgressKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn output(text: impl Into<String>) -> Self {
        Self::new(ProgressKind::Output, text)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(ProgressKind::Error, text)
    }

    pub fn complete(text: impl Into<String>) -> Self {
        Self::new(ProgressKind::Complete, text)
    }
}

/// Event emitted by the task registry
#[derive(Debug, Clone)]
pub enum TaskEvent {
    /// The task table changed (created / state transition / teardown)
    TasksChanged,
    /// A running task streamed a fragment
    Progress {
        task_id: u64,
        fragment: ProgressFragment,
    },
}

/// Broadcast notifier for task events
///
/// Cheap to clone; all clones share the same channel.
#[derive(Clone)]
pub struct TaskNotifier {
    sender: broadcast::Sender<TaskEvent>,
}

impl TaskNotifier {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Subscribe to all task events
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.sender.subscribe()
    }

    /// Notify that the task table changed
    pub fn tasks_changed(&self) {
        trace!("emitting tasks-changed");
        // No subscribers is fine - events are fire and forget
        let _ = self.sender.send(TaskEvent::TasksChanged);
    }

    /// Relay a progress fragment for a task
    pub fn progress(&self, task_id: u64, fragment: ProgressFragment) {
        trace!(task_id, kind = fragment.kind.as_str(), "emitting progress");
        let _ = self.sender.send(TaskEvent::Progress { task_id, fragment });
    }

    /// Current subscriber count
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for TaskNotifier {
    fn default() -> Self {
        Self::new()
    }
}
