//! tmux multiplexer wrapper
//!
//! Drives tmux through its command-line interface. The `Multiplexer` trait
//! is the seam the session daemon talks through, so tests can substitute a
//! fake that never shells out.

use async_trait::async_trait;
use relay_foundation::{Error, Result};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Terminal multiplexer operations the session daemon needs
#[async_trait]
pub trait Multiplexer: Send + Sync {
    fn id(&self) -> &'static str;

    /// Whether the multiplexer binary is usable on this host
    fn is_available(&self) -> bool;

    /// Whether a session with this name currently exists
    async fn session_exists(&self, name: &str) -> bool;

    /// Create a detached session running `command`
    async fn create_session(&self, name: &str, command: &str) -> Result<()>;

    /// Pipe the session's combined pane output to a file
    async fn pipe_output(&self, name: &str, path: &Path) -> Result<()>;

    /// Send literal text (already escaped for double-quote rules) as
    /// keystrokes
    async fn send_text(&self, name: &str, text: &str) -> Result<()>;

    /// Send a single key by its multiplexer name (`Enter`, `C-c`, ...)
    async fn send_key(&self, name: &str, key: &str) -> Result<()>;

    /// Destroy the session
    async fn kill_session(&self, name: &str) -> Result<()>;
}

/// Map a symbolic key name to tmux `send-keys` syntax.
///
/// Accepts the small set of keys the choice-resolution step needs plus
/// literal single characters.
pub fn map_key(key: &str) -> Result<String> {
    let mapped = match key.to_ascii_lowercase().as_str() {
        "enter" | "return" => "Enter",
        "escape" | "esc" => "Escape",
        "tab" => "Tab",
        "up" => "Up",
        "down" => "Down",
        "ctrl+c" => "C-c",
        "ctrl+d" => "C-d",
        _ => {
            if key.chars().count() == 1 {
                return Ok(key.to_string());
            }
            return Err(Error::Daemon(format!("unknown key: {key}")));
        }
    };
    Ok(mapped.to_string())
}

/// tmux implementation
#[derive(Debug, Default)]
pub struct Tmux;

impl Tmux {
    pub fn new() -> Self {
        Self
    }

    /// Run a tmux command and return its stdout
    async fn run(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("tmux")
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::Daemon("tmux is not installed".to_string())
                } else {
                    Error::Io(e)
                }
            })?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(Error::Daemon(format!(
                "tmux {} failed: {}",
                args.join(" "),
                stderr.trim()
            )))
        }
    }
}

#[async_trait]
impl Multiplexer for Tmux {
    fn id(&self) -> &'static str {
        "tmux"
    }

    fn is_available(&self) -> bool {
        std::process::Command::new("tmux")
            .arg("-V")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    async fn session_exists(&self, name: &str) -> bool {
        self.run(&["has-session", "-t", name]).await.is_ok()
    }

    async fn create_session(&self, name: &str, command: &str) -> Result<()> {
        self.run(&["new-session", "-d", "-s", name, command]).await?;
        Ok(())
    }

    async fn pipe_output(&self, name: &str, path: &Path) -> Result<()> {
        let sink = format!("cat >> {}", path.display());
        self.run(&["pipe-pane", "-t", name, "-o", &sink]).await?;
        Ok(())
    }

    async fn send_text(&self, name: &str, text: &str) -> Result<()> {
        // Through a shell so the double-quote escaping the caller applied
        // is what tmux actually sees
        let command = format!("tmux send-keys -t {name} \"{text}\"");
        let output = Command::new("sh")
            .args(["-c", &command])
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(Error::Io)?;
        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(Error::Daemon(format!("send-keys failed: {}", stderr.trim())))
        }
    }

    async fn send_key(&self, name: &str, key: &str) -> Result<()> {
        self.run(&["send-keys", "-t", name, key]).await?;
        Ok(())
    }

    async fn kill_session(&self, name: &str) -> Result<()> {
        self.run(&["kill-session", "-t", name]).await?;
        Ok(())
    }
}
