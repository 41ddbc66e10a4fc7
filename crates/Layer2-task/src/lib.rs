//! # relay-task
//!
//! Task orchestration for Relay:
//! - Agent: the supported external command-line AI tools
//! - Task: lifecycle-tracked prompt dispatch with progress
//! - Executor: one-shot process execution with output streaming
//! - Daemon: persistent multiplexer-backed agent sessions
//! - Registry: create, execute, observe and cancel tasks

pub mod agent;
pub mod daemon;
pub mod executor;
pub mod registry;
pub mod state;
pub mod task;

// ============================================================================
// Agent
// ============================================================================
pub use agent::{agent_settings, AgentKind};

// ============================================================================
// Task
// ============================================================================
pub use state::TaskStatus;
pub use task::{Task, TaskId};

// ============================================================================
// Executor
// ============================================================================
pub use executor::{ExecOptions, Executor, ProcessExecutor, ProgressSender};

// ============================================================================
// Daemon
// ============================================================================
pub use daemon::{
    build_daemons, Choice, ChoiceDetector, ChoiceResolver, InteractionMode, Multiplexer,
    PromptSession, SessionDaemon, Tmux,
};

// ============================================================================
// Registry
// ============================================================================
pub use registry::{ExecutorFactory, TaskRegistry};
