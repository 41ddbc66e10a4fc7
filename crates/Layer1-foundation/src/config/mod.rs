//! Config - agent dispatch settings
//!
//! The task layer treats configuration as an opaque key/value surface: which
//! executable to run per agent, whether to route through the persistent
//! session daemon, and the per-call timeout. Loaded from TOML; every field
//! has a sensible default so a missing file is not an error.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default one-shot timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Per-agent settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Executable to invoke; `None` means the agent's well-known binary name
    pub executable: Option<String>,

    /// Route prompts through the persistent session daemon instead of a
    /// fresh process per call
    pub use_daemon: bool,

    /// One-shot execution timeout in seconds
    pub timeout_secs: u64,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            executable: None,
            use_daemon: false,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl AgentSettings {
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }
}

/// Workspace settings: one block per supported agent
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub claude: AgentSettings,
    pub gemini: AgentSettings,
}

impl Settings {
    /// Load settings from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        toml::from_str(&content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load settings from a TOML file, falling back to defaults if the file
    /// does not exist
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert!(!settings.claude.use_daemon);
        assert!(settings.claude.executable.is_none());
        assert_eq!(settings.gemini.timeout_secs, DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn test_load_partial_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[claude]
use_daemon = true
executable = "/usr/local/bin/claude"
"#
        )
        .unwrap();

        let settings = Settings::load(file.path()).unwrap();
        assert!(settings.claude.use_daemon);
        assert_eq!(
            settings.claude.executable.as_deref(),
            Some("/usr/local/bin/claude")
        );
        // Untouched block keeps defaults
        assert!(!settings.gemini.use_daemon);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let settings = Settings::load_or_default("/nonexistent/relay.toml").unwrap();
        assert!(!settings.claude.use_daemon);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "claude = 42").unwrap();

        let err = Settings::load(file.path()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
