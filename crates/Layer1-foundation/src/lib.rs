//! # relay-foundation
//!
//! Foundation layer for Relay:
//! - Error: central error taxonomy shared by every crate
//! - Event: task/progress broadcast notifier
//! - Config: per-agent dispatch settings (TOML)

pub mod config;
pub mod error;
pub mod event;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Event
// ============================================================================
pub use event::{ProgressFragment, ProgressKind, TaskEvent, TaskNotifier};

// ============================================================================
// Config
// ============================================================================
pub use config::{AgentSettings, Settings};
