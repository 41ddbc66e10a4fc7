//! Agent definitions
//!
//! The two supported external command-line AI tools and everything that is
//! fixed per agent kind: binary name, one-shot argument shape, session
//! naming, output file location and the persistent-session response timeout.

use relay_foundation::{AgentSettings, Error, Result, Settings};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// One of the supported external command-line AI agents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    /// The heavier agent: permission-style prompts, longer session timeout
    Claude,
    /// The lighter agent: shorter session timeout
    Gemini,
}

impl AgentKind {
    pub const ALL: [AgentKind; 2] = [AgentKind::Claude, AgentKind::Gemini];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Claude => "claude",
            AgentKind::Gemini => "gemini",
        }
    }

    /// Well-known binary name, used when no executable is configured
    pub fn binary_name(&self) -> &'static str {
        self.as_str()
    }

    /// Argument list for one-shot (non-interactive) invocation.
    ///
    /// The prompt placement differs between the two tools; Gemini runs with
    /// auto-approval so it never blocks on interactive input in this mode.
    pub fn one_shot_args(&self, prompt: &str) -> Vec<String> {
        match self {
            AgentKind::Claude => vec![
                prompt.to_string(),
                "-p".to_string(),
                "--output-format".to_string(),
                "text".to_string(),
            ],
            AgentKind::Gemini => vec![
                "-p".to_string(),
                prompt.to_string(),
                "--output-format".to_string(),
                "stream-json".to_string(),
                "--yolo".to_string(),
            ],
        }
    }

    /// Well-known multiplexer session name for the persistent daemon
    pub fn session_name(&self) -> String {
        format!("relay-{}", self.as_str())
    }

    /// Well-known file the persistent session's combined output is piped to
    pub fn output_path(&self) -> PathBuf {
        std::env::temp_dir().join(format!("relay-{}-output.log", self.as_str()))
    }

    /// Overall response timeout for the persistent-session completion loop
    pub fn daemon_timeout(&self) -> Duration {
        match self {
            AgentKind::Claude => Duration::from_secs(300),
            AgentKind::Gemini => Duration::from_secs(120),
        }
    }
}

/// Settings section for an agent kind
pub fn agent_settings(settings: &Settings, agent: AgentKind) -> &AgentSettings {
    match agent {
        AgentKind::Claude => &settings.claude,
        AgentKind::Gemini => &settings.gemini,
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AgentKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "claude" => Ok(AgentKind::Claude),
            "gemini" => Ok(AgentKind::Gemini),
            other => Err(Error::Config(format!("unknown agent: {other}"))),
        }
    }
}
