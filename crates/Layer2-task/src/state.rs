//! Task state machine
//!
//! `Pending -> Running -> {Completed | Failed | Cancelled}`. Running is the
//! only non-terminal, non-initial state; terminal states never transition.

use serde::{Deserialize, Serialize};

/// Possible states of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Task is waiting to be executed
    Pending,

    /// Task is currently running
    Running,

    /// Task completed successfully
    Completed,

    /// Task failed with an error
    Failed,

    /// Task was cancelled
    Cancelled,
}

impl TaskStatus {
    /// Check if this is a terminal state (cannot transition further)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Check if task is currently running
    pub fn is_running(&self) -> bool {
        matches!(self, TaskStatus::Running)
    }

    /// Check if task is pending (not yet started)
    pub fn is_pending(&self) -> bool {
        matches!(self, TaskStatus::Pending)
    }

    /// Whether the state machine allows moving from `self` to `next`
    pub fn can_transition(&self, next: TaskStatus) -> bool {
        match self {
            TaskStatus::Pending => matches!(next, TaskStatus::Running),
            TaskStatus::Running => next.is_terminal(),
            _ => false,
        }
    }

    /// Get display name for the state
    pub fn display_name(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "Pending",
            TaskStatus::Running => "Running",
            TaskStatus::Completed => "Completed",
            TaskStatus::Failed => "Failed",
            TaskStatus::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_only_moves_to_running() {
        assert!(TaskStatus::Pending.can_transition(TaskStatus::Running));
        assert!(!TaskStatus::Pending.can_transition(TaskStatus::Completed));
        assert!(!TaskStatus::Pending.can_transition(TaskStatus::Failed));
        assert!(!TaskStatus::Pending.can_transition(TaskStatus::Cancelled));
        assert!(!TaskStatus::Pending.can_transition(TaskStatus::Pending));
    }

    #[test]
    fn test_running_moves_to_any_terminal() {
        assert!(TaskStatus::Running.can_transition(TaskStatus::Completed));
        assert!(TaskStatus::Running.can_transition(TaskStatus::Failed));
        assert!(TaskStatus::Running.can_transition(TaskStatus::Cancelled));
        assert!(!TaskStatus::Running.can_transition(TaskStatus::Pending));
        assert!(!TaskStatus::Running.can_transition(TaskStatus::Running));
    }

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [
            TaskStatus::Completed,
            TaskStatus::Failed,
            TaskStatus::Cancelled,
        ] {
            assert!(terminal.is_terminal());
            for next in [
                TaskStatus::Pending,
                TaskStatus::Running,
                TaskStatus::Completed,
                TaskStatus::Failed,
                TaskStatus::Cancelled,
            ] {
                assert!(!terminal.can_transition(next));
            }
        }
    }
}
