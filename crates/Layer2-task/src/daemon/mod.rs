//! Persistent agent sessions
//!
//! Makes a single long-lived external-tool session behave like a
//! request/response call, despite the session exposing only an append-only
//! text stream with no structured framing:
//! - prompts are delivered as keystrokes into a named multiplexer session
//! - the session's combined output is piped to a well-known file
//! - response completion is inferred by polling: the output must grow past
//!   the baseline and then stay byte-identical for several consecutive ticks
//! - interactive choices the tool blocks on are detected heuristically and
//!   resolved automatically or deferred to an operator-facing resolver

pub mod choice;
pub mod output;
pub mod tmux;

pub use choice::{Choice, ChoiceDetector, ChoiceMatcher};
pub use output::{clean_output, escape_prompt};
pub use tmux::{map_key, Multiplexer, Tmux};

use crate::agent::{agent_settings, AgentKind};
use async_trait::async_trait;
use relay_foundation::{Error, Result, Settings};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// How a detected choice is resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionMode {
    /// Resolve interactive choices without asking anyone
    Auto,
    /// Defer each choice to the registered resolver
    Interactive,
}

/// Operator-facing decision hook for `InteractionMode::Interactive`.
///
/// Returns the chosen option token, or `None` when no decision is
/// obtainable - the daemon then keeps polling with the choice unresolved.
#[async_trait]
pub trait ChoiceResolver: Send + Sync {
    async fn resolve(&self, agent: AgentKind, choice: &Choice) -> Option<String>;
}

/// Request/response surface of a persistent agent session.
///
/// The registry holds one implementation per agent kind; tests substitute
/// fakes.
#[async_trait]
pub trait PromptSession: Send + Sync {
    fn agent(&self) -> AgentKind;

    /// Ensure the session exists; true when running afterwards.
    /// Attaching to an already-existing session is not an error.
    async fn start(&self) -> Result<bool>;

    /// Destroy the session. Best-effort; failures are logged, not surfaced.
    async fn stop(&self);

    async fn set_mode(&self, mode: InteractionMode);

    /// Send a prompt and await the response text.
    ///
    /// Concurrent calls on the same session are not serialized here: two
    /// simultaneous prompts would corrupt each other's output window.
    /// Callers serialize prompts per agent kind.
    async fn send_prompt(&self, prompt: &str) -> Result<String>;

    /// Send a symbolic key into the session
    async fn send_key(&self, key: &str) -> Result<()>;
}

/// Session daemon tuning
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Well-known multiplexer session name
    pub session_name: String,

    /// Well-known file the session output is piped to
    pub output_path: PathBuf,

    /// Wait after creating a fresh session before it accepts keystrokes
    pub warmup: Duration,

    /// Completion-detection polling interval
    pub poll_interval: Duration,

    /// Overall bound for one response; on expiry the latest cleaned text is
    /// returned as a best-effort partial result
    pub timeout: Duration,

    /// Consecutive unchanged polls before a response counts as complete
    pub stable_ticks: u32,
}

impl DaemonConfig {
    pub fn for_agent(agent: AgentKind) -> Self {
        Self {
            session_name: agent.session_name(),
            output_path: agent.output_path(),
            warmup: Duration::from_secs(2),
            poll_interval: Duration::from_millis(500),
            timeout: agent.daemon_timeout(),
            stable_ticks: 4,
        }
    }
}

/// One persistent external-tool session per agent kind.
///
/// Cancellation of a task backed by this daemon is bookkeeping only: an
/// in-flight `send_prompt` keeps polling until its own completion or
/// timeout. The session itself is never torn down by task cancellation.
pub struct SessionDaemon {
    agent: AgentKind,
    program: String,
    config: DaemonConfig,
    mux: Arc<dyn Multiplexer>,
    detector: ChoiceDetector,
    resolver: Option<Arc<dyn ChoiceResolver>>,

    running: AtomicBool,
    /// Delimits one response window from the next within the same
    /// continuously-appended output stream
    baseline: AtomicU64,
    mode: RwLock<InteractionMode>,
}

impl SessionDaemon {
    pub fn new(agent: AgentKind, program: impl Into<String>) -> Self {
        Self::with_multiplexer(agent, program, Arc::new(Tmux::new()))
    }

    pub fn with_multiplexer(
        agent: AgentKind,
        program: impl Into<String>,
        mux: Arc<dyn Multiplexer>,
    ) -> Self {
        Self {
            agent,
            program: program.into(),
            config: DaemonConfig::for_agent(agent),
            mux,
            detector: ChoiceDetector::for_agent(agent),
            resolver: None,
            running: AtomicBool::new(false),
            baseline: AtomicU64::new(0),
            mode: RwLock::new(InteractionMode::Auto),
        }
    }

    pub fn with_config(mut self, config: DaemonConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn ChoiceResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub async fn mode(&self) -> InteractionMode {
        *self.mode.read().await
    }

    /// Read the output window past the baseline and clean it
    async fn read_window(&self, baseline: usize) -> (usize, String) {
        let raw = tokio::fs::read(&self.config.output_path)
            .await
            .unwrap_or_default();
        let window = if raw.len() > baseline {
            &raw[baseline..]
        } else {
            &[][..]
        };
        let clean = clean_output(&String::from_utf8_lossy(window));
        (raw.len(), clean)
    }

    /// Send one choice answer: a bare Enter for continue-prompts, otherwise
    /// the token's characters followed by Enter.
    async fn send_answer(&self, token: &str) -> Result<()> {
        let name = &self.config.session_name;
        if token != "enter" {
            self.mux.send_text(name, token).await?;
        }
        self.mux.send_key(name, "Enter").await
    }

    /// Fixed auto-response policy: affirmative if offered, bare confirmation
    /// for continue-prompts, else the first listed option.
    fn auto_answer(choice: &Choice) -> String {
        if choice.options.iter().any(|o| o == "y") {
            "y".to_string()
        } else if choice.options.iter().any(|o| o == "enter") {
            "enter".to_string()
        } else {
            choice.options.first().cloned().unwrap_or_default()
        }
    }

    /// Resolve a detected choice per the current interaction mode.
    /// Failures are logged, not surfaced: the polling loop carries on and
    /// its overall timeout bounds a permanently-blocked session.
    async fn resolve_choice(&self, choice: &Choice) {
        match *self.mode.read().await {
            InteractionMode::Auto => {
                let answer = Self::auto_answer(choice);
                info!(
                    agent = %self.agent,
                    answer,
                    asked = %choice.description,
                    "auto-resolving choice"
                );
                if let Err(e) = self.send_answer(&answer).await {
                    warn!(agent = %self.agent, error = %e, "failed to send auto answer");
                }
            }
            InteractionMode::Interactive => {
                let Some(resolver) = &self.resolver else {
                    debug!(agent = %self.agent, "no resolver registered, leaving choice unresolved");
                    return;
                };
                match resolver.resolve(self.agent, choice).await {
                    Some(answer) => {
                        info!(agent = %self.agent, answer, "operator resolved choice");
                        if let Err(e) = self.send_answer(&answer).await {
                            warn!(agent = %self.agent, error = %e, "failed to send operator answer");
                        }
                    }
                    None => {
                        debug!(agent = %self.agent, "no decision obtained, continuing to poll");
                    }
                }
            }
        }
    }

    /// Completion-detection loop.
    ///
    /// Each tick reads the output window, runs choice detection and
    /// otherwise compares size and cleaned text against the previous tick.
    /// The response counts as complete after `stable_ticks` consecutive
    /// unchanged polls with output past the baseline. When the overall
    /// timeout elapses first, the latest cleaned text is returned as a
    /// best-effort partial result.
    async fn await_response(&self) -> Result<String> {
        let baseline = self.baseline.load(Ordering::SeqCst) as usize;
        let deadline = Instant::now() + self.config.timeout;
        let mut stable = 0u32;
        let mut last_size = baseline;
        let mut last_clean = String::new();

        loop {
            tokio::time::sleep(self.config.poll_interval).await;

            let (size, clean) = self.read_window(baseline).await;

            if Instant::now() >= deadline {
                debug!(
                    agent = %self.agent,
                    bytes = clean.len(),
                    "response window timed out, returning partial output"
                );
                return Ok(clean);
            }

            if let Some(choice) = self.detector.detect(&clean) {
                self.resolve_choice(&choice).await;
                stable = 0;
                last_size = size;
                last_clean = clean;
                continue;
            }

            if size > baseline && size == last_size && clean == last_clean {
                stable += 1;
                if stable >= self.config.stable_ticks {
                    debug!(agent = %self.agent, bytes = clean.len(), "response stabilized");
                    return Ok(clean);
                }
            } else {
                stable = 0;
                last_size = size;
                last_clean = clean;
            }
        }
    }
}

#[async_trait]
impl PromptSession for SessionDaemon {
    fn agent(&self) -> AgentKind {
        self.agent
    }

    async fn start(&self) -> Result<bool> {
        let name = &self.config.session_name;

        if self.mux.session_exists(name).await {
            debug!(agent = %self.agent, session = %name, "attaching to existing session");
            self.running.store(true, Ordering::SeqCst);
            return Ok(true);
        }

        if !self.mux.is_available() {
            return Err(Error::Daemon(format!(
                "{} is not installed",
                self.mux.id()
            )));
        }

        if let Some(parent) = self.config.output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.config.output_path, b"").await?;

        self.mux.create_session(name, &self.program).await?;
        self.mux
            .pipe_output(name, &self.config.output_path)
            .await?;

        tokio::time::sleep(self.config.warmup).await;
        self.running.store(true, Ordering::SeqCst);
        info!(agent = %self.agent, session = %name, "session started");
        Ok(true)
    }

    async fn stop(&self) {
        let name = &self.config.session_name;
        if self.mux.session_exists(name).await {
            if let Err(e) = self.mux.kill_session(name).await {
                warn!(agent = %self.agent, error = %e, "failed to kill session");
            }
        }
        self.running.store(false, Ordering::SeqCst);
        info!(agent = %self.agent, session = %name, "session stopped");
    }

    async fn set_mode(&self, mode: InteractionMode) {
        *self.mode.write().await = mode;
    }

    async fn send_prompt(&self, prompt: &str) -> Result<String> {
        if !self.is_running() {
            self.start().await?;
        }

        // Clear the shared file so this response starts from a clean window
        tokio::fs::write(&self.config.output_path, b"").await?;
        let baseline = tokio::fs::metadata(&self.config.output_path)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        self.baseline.store(baseline, Ordering::SeqCst);

        let name = &self.config.session_name;
        let escaped = escape_prompt(prompt);
        self.mux.send_text(name, &escaped).await?;
        self.mux.send_key(name, "Enter").await?;

        self.await_response().await
    }

    async fn send_key(&self, key: &str) -> Result<()> {
        if !self.is_running() {
            return Err(Error::NotRunning(format!(
                "no active {} session",
                self.agent
            )));
        }
        let key = map_key(key)?;
        self.mux.send_key(&self.config.session_name, &key).await
    }
}

/// Build the per-agent daemon map the registry is constructed with
pub fn build_daemons(settings: &Settings) -> HashMap<AgentKind, Arc<dyn PromptSession>> {
    AgentKind::ALL
        .iter()
        .map(|&agent| {
            let program = agent_settings(settings, agent)
                .executable
                .clone()
                .unwrap_or_else(|| agent.binary_name().to_string());
            let daemon: Arc<dyn PromptSession> = Arc::new(SessionDaemon::new(agent, program));
            (agent, daemon)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_answer_prefers_affirmative() {
        let choice = Choice {
            options: vec!["y".to_string(), "n".to_string()],
            description: "Proceed? (y/n)".to_string(),
        };
        assert_eq!(SessionDaemon::auto_answer(&choice), "y");
    }

    #[test]
    fn test_auto_answer_continue_prompt() {
        let choice = Choice {
            options: vec!["enter".to_string()],
            description: "press enter to continue".to_string(),
        };
        assert_eq!(SessionDaemon::auto_answer(&choice), "enter");
    }

    #[test]
    fn test_auto_answer_numbered_list_takes_first() {
        let choice = Choice {
            options: vec!["1".to_string(), "2".to_string(), "3".to_string()],
            description: "select an option (1-3)".to_string(),
        };
        assert_eq!(SessionDaemon::auto_answer(&choice), "1");
    }

    #[test]
    fn test_build_daemons_covers_all_agents() {
        let daemons = build_daemons(&Settings::default());
        assert_eq!(daemons.len(), AgentKind::ALL.len());
        for agent in AgentKind::ALL {
            assert_eq!(daemons[&agent].agent(), agent);
        }
    }
}
