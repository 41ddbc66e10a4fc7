//! Task executors
//!
//! One-shot execution backends:
//! - `ProcessExecutor` - runs the external tool once, streams output,
//!   enforces timeout and cancellation
//!
//! The `Executor` trait is the seam the registry uses to pick a backend and
//! the seam tests use to substitute stubs.

pub mod process;

pub use process::ProcessExecutor;

use async_trait::async_trait;
use relay_foundation::{ProgressFragment, Result};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

/// Channel end an execution streams progress fragments into
pub type ProgressSender = mpsc::UnboundedSender<ProgressFragment>;

/// Per-invocation options
#[derive(Default)]
pub struct ExecOptions {
    /// Working directory for the spawned process
    pub working_dir: Option<PathBuf>,

    /// Environment overrides applied on top of the inherited environment
    pub env: Vec<(String, String)>,

    /// Hard timeout; the process is terminated when it elapses
    pub timeout: Option<Duration>,

    /// Where to stream progress fragments; dropped when the call returns so
    /// consumers can detect the end of the stream
    pub progress: Option<ProgressSender>,
}

/// Executor trait - implement to add new execution backends
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run once and return the accumulated output text
    async fn execute(&self, opts: ExecOptions) -> Result<String>;

    /// Terminate the in-flight invocation, if any. Idempotent.
    async fn cancel(&self);

    /// Get executor name
    fn name(&self) -> &'static str;
}
