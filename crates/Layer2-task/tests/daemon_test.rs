//! Session daemon integration tests with a fake multiplexer
//!
//! The fake records every multiplexer call and never shells out; test
//! writers append to the output file the way a piped pane would.

use async_trait::async_trait;
use relay_foundation::{Error, Result};
use relay_task::daemon::{ChoiceResolver, DaemonConfig, SessionDaemon};
use relay_task::{AgentKind, Choice, InteractionMode, Multiplexer, PromptSession};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct FakeMux {
    exists: AtomicBool,
    available: bool,
    fail_kill: bool,
    calls: Mutex<Vec<String>>,
}

impl FakeMux {
    fn new() -> Self {
        Self {
            exists: AtomicBool::new(false),
            available: true,
            fail_kill: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn existing() -> Self {
        let mux = Self::new();
        mux.exists.store(true, Ordering::SeqCst);
        mux
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Multiplexer for FakeMux {
    fn id(&self) -> &'static str {
        "fake"
    }

    fn is_available(&self) -> bool {
        self.available
    }

    async fn session_exists(&self, _name: &str) -> bool {
        self.exists.load(Ordering::SeqCst)
    }

    async fn create_session(&self, name: &str, _command: &str) -> Result<()> {
        self.record(format!("create:{name}"));
        self.exists.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn pipe_output(&self, _name: &str, _path: &Path) -> Result<()> {
        self.record("pipe");
        Ok(())
    }

    async fn send_text(&self, _name: &str, text: &str) -> Result<()> {
        self.record(format!("text:{text}"));
        Ok(())
    }

    async fn send_key(&self, _name: &str, key: &str) -> Result<()> {
        self.record(format!("key:{key}"));
        Ok(())
    }

    async fn kill_session(&self, _name: &str) -> Result<()> {
        if self.fail_kill {
            return Err(Error::Daemon("kill refused".to_string()));
        }
        self.record("kill");
        self.exists.store(false, Ordering::SeqCst);
        Ok(())
    }
}

fn test_config(output_path: PathBuf, timeout: Duration) -> DaemonConfig {
    DaemonConfig {
        session_name: "relay-test".to_string(),
        output_path,
        warmup: Duration::from_millis(10),
        poll_interval: Duration::from_millis(25),
        timeout,
        stable_ticks: 3,
    }
}

fn daemon_with(
    mux: Arc<FakeMux>,
    output_path: PathBuf,
    timeout: Duration,
) -> SessionDaemon {
    SessionDaemon::with_multiplexer(AgentKind::Claude, "claude", mux)
        .with_config(test_config(output_path, timeout))
}

/// Append to the output file after a delay, like a piped pane would
fn write_after(path: PathBuf, delay: Duration, text: &'static str) {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .unwrap();
        file.write_all(text.as_bytes()).unwrap();
    });
}

#[tokio::test]
async fn test_response_returned_once_stable() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let path = file.path().to_path_buf();
    let mux = Arc::new(FakeMux::new());
    let daemon = daemon_with(Arc::clone(&mux), path.clone(), Duration::from_secs(5));

    write_after(path, Duration::from_millis(100), "answer text\n");

    let response = daemon.send_prompt("what is it").await.unwrap();
    assert_eq!(response.trim(), "answer text");

    // Session was created, prompt sent as text, then submitted with Enter
    let calls = mux.calls();
    assert!(calls.iter().any(|c| c == "create:relay-test"));
    assert!(calls.iter().any(|c| c == "text:what is it"));
    assert!(calls.iter().any(|c| c == "key:Enter"));
}

#[tokio::test]
async fn test_timeout_returns_partial_output() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let path = file.path().to_path_buf();
    let mux = Arc::new(FakeMux::new());
    let daemon = daemon_with(mux, path, Duration::from_millis(150));

    // Nothing ever written: the call still resolves, with what little there is
    let response = daemon.send_prompt("hello").await.unwrap();
    assert_eq!(response, "");
}

#[tokio::test]
async fn test_prompt_is_escaped_for_double_quotes() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let path = file.path().to_path_buf();
    let mux = Arc::new(FakeMux::new());
    let daemon = daemon_with(Arc::clone(&mux), path, Duration::from_millis(150));

    daemon.send_prompt(r#"say "hi" for $5"#).await.unwrap();

    let calls = mux.calls();
    assert!(calls.iter().any(|c| c == r#"text:say \"hi\" for \$5"#));
}

#[tokio::test]
async fn test_yes_no_prompt_auto_answered() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let path = file.path().to_path_buf();
    let mux = Arc::new(FakeMux::new());
    let daemon = daemon_with(Arc::clone(&mux), path.clone(), Duration::from_secs(5));

    write_after(path.clone(), Duration::from_millis(100), "Overwrite? (y/n)\n");
    write_after(
        path,
        Duration::from_millis(300),
        "writing file\nformatting\ndone\n",
    );

    let response = daemon.send_prompt("apply the patch").await.unwrap();
    assert!(response.contains("done"));

    // The affirmative answer went into the session, followed by Enter
    let calls = mux.calls();
    assert!(calls.iter().any(|c| c == "text:y"));
    assert!(calls.iter().filter(|c| *c == "key:Enter").count() >= 2);
}

#[tokio::test]
async fn test_interactive_mode_uses_resolver() {
    struct PickSecond;

    #[async_trait]
    impl ChoiceResolver for PickSecond {
        async fn resolve(&self, _agent: AgentKind, choice: &Choice) -> Option<String> {
            choice.options.get(1).cloned()
        }
    }

    let file = tempfile::NamedTempFile::new().unwrap();
    let path = file.path().to_path_buf();
    let mux = Arc::new(FakeMux::new());
    let daemon = daemon_with(Arc::clone(&mux), path.clone(), Duration::from_secs(5))
        .with_resolver(Arc::new(PickSecond));
    daemon.set_mode(InteractionMode::Interactive).await;

    write_after(path.clone(), Duration::from_millis(100), "1) red\n2) blue\n");
    write_after(
        path,
        Duration::from_millis(300),
        "selection accepted\nrendering\npalette loaded\nok\ndone\n",
    );

    let response = daemon.send_prompt("pick a color").await.unwrap();
    assert!(response.contains("done"));
    assert!(mux.calls().iter().any(|c| c == "text:2"));
}

#[tokio::test]
async fn test_start_attaches_to_existing_session() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let mux = Arc::new(FakeMux::existing());
    let daemon = daemon_with(
        Arc::clone(&mux),
        file.path().to_path_buf(),
        Duration::from_secs(1),
    );

    assert!(daemon.start().await.unwrap());
    assert!(daemon.is_running());
    // No new session, no pipe: the existing one is reused as is
    assert!(mux.calls().is_empty());
}

#[tokio::test]
async fn test_start_fails_when_multiplexer_missing() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let mut mux = FakeMux::new();
    mux.available = false;
    let daemon = daemon_with(
        Arc::new(mux),
        file.path().to_path_buf(),
        Duration::from_secs(1),
    );

    let err = daemon.start().await.unwrap_err();
    assert!(matches!(err, Error::Daemon(_)));
    assert!(!daemon.is_running());
}

#[tokio::test]
async fn test_send_key_requires_running_session() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let mux = Arc::new(FakeMux::new());
    let daemon = daemon_with(mux, file.path().to_path_buf(), Duration::from_secs(1));

    let err = daemon.send_key("enter").await.unwrap_err();
    assert!(matches!(err, Error::NotRunning(_)));
}

#[tokio::test]
async fn test_send_key_maps_symbolic_names() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let mux = Arc::new(FakeMux::existing());
    let daemon = daemon_with(
        Arc::clone(&mux),
        file.path().to_path_buf(),
        Duration::from_secs(1),
    );
    daemon.start().await.unwrap();

    daemon.send_key("enter").await.unwrap();
    daemon.send_key("ctrl+c").await.unwrap();
    assert!(daemon.send_key("no-such-key").await.is_err());

    let calls = mux.calls();
    assert!(calls.iter().any(|c| c == "key:Enter"));
    assert!(calls.iter().any(|c| c == "key:C-c"));
}

#[tokio::test]
async fn test_stop_survives_kill_failure() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let mut mux = FakeMux::existing();
    mux.fail_kill = true;
    let daemon = daemon_with(
        Arc::new(mux),
        file.path().to_path_buf(),
        Duration::from_secs(1),
    );

    daemon.start().await.unwrap();
    daemon.stop().await;
    assert!(!daemon.is_running());
}
