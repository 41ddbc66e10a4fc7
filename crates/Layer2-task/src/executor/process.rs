//! Process executor - one-shot external tool invocation with output streaming
//!
//! Features:
//! - Real-time stdout/stderr streaming as progress fragments
//! - Both streams accumulated into one buffer in arrival order
//! - Hard timeout with process termination
//! - Cancellation (process-tree kill on Windows, SIGTERM elsewhere)

use crate::executor::{ExecOptions, Executor};
use async_trait::async_trait;
use relay_foundation::{Error, ProgressFragment, Result};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// How often the wait loop checks for exit, timeout and cancellation
const CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// One-shot executor for an external command fixed at construction.
///
/// At most one invocation may be in flight per instance; a second `execute`
/// on a still-running instance fails with `InvalidState`.
pub struct ProcessExecutor {
    program: String,
    args: Vec<String>,

    /// Guards against re-entrant execute calls
    running: AtomicBool,

    /// In-flight child, shared with `cancel`
    child: Mutex<Option<Child>>,
}

impl ProcessExecutor {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            running: AtomicBool::new(false),
            child: Mutex::new(None),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Terminate a child: process-tree kill on Windows, SIGTERM then kill
    /// elsewhere. The final `kill` guarantees the process is gone.
    async fn terminate(child: &mut Child) {
        #[cfg(windows)]
        if let Some(pid) = child.id() {
            let _ = Command::new("taskkill")
                .args(["/PID", &pid.to_string(), "/T", "/F"])
                .output()
                .await;
        }

        #[cfg(unix)]
        if let Some(pid) = child.id() {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;
            let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
        }

        let _ = child.kill().await;
    }

    async fn run(&self, opts: ExecOptions) -> Result<String> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            // The external tool must never block on interactive input here
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &opts.working_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &opts.env {
            cmd.env(key, value);
        }

        debug!(program = %self.program, "spawning one-shot process");

        let mut child = cmd.spawn().map_err(Error::Spawn)?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // Shared buffer: stdout and stderr interleave in arrival order
        let buffer = Arc::new(Mutex::new(String::new()));
        let mut readers = Vec::new();

        if let Some(stdout) = stdout {
            let buffer = Arc::clone(&buffer);
            let progress = opts.progress.clone();
            readers.push(tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    {
                        let mut buf = buffer.lock().await;
                        buf.push_str(&line);
                        buf.push('\n');
                    }
                    if let Some(tx) = &progress {
                        let _ = tx.send(ProgressFragment::output(line));
                    }
                }
            }));
        }

        if let Some(stderr) = stderr {
            let buffer = Arc::clone(&buffer);
            let progress = opts.progress.clone();
            readers.push(tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    {
                        let mut buf = buffer.lock().await;
                        buf.push_str(&line);
                        buf.push('\n');
                    }
                    if let Some(tx) = &progress {
                        let _ = tx.send(ProgressFragment::error(line));
                    }
                }
            }));
        }

        *self.child.lock().await = Some(child);

        // Wait loop: exit, timeout and external cancellation all surface here
        let started = Instant::now();
        let mut timed_out = false;
        let status = loop {
            tokio::time::sleep(CHECK_INTERVAL).await;

            let mut guard = self.child.lock().await;
            let Some(child) = guard.as_mut() else {
                // cancel() reaped the child already
                break None;
            };

            match child.try_wait() {
                Ok(Some(status)) => {
                    guard.take();
                    break Some(status);
                }
                Ok(None) => {}
                Err(e) => {
                    guard.take();
                    return Err(Error::Io(e));
                }
            }

            if let Some(timeout) = opts.timeout {
                if !timed_out && started.elapsed() >= timeout {
                    warn!(program = %self.program, ?timeout, "one-shot timeout, terminating");
                    timed_out = true;
                    Self::terminate(child).await;
                }
            }
        };

        for handle in readers {
            let _ = handle.await;
        }

        let output = buffer.lock().await.clone();

        if timed_out {
            let timeout = opts.timeout.unwrap_or_default();
            return Err(Error::Timeout {
                elapsed_ms: timeout.as_millis() as u64,
            });
        }

        let code = status.and_then(|s| s.code()).unwrap_or(-1);
        if code == 0 {
            if let Some(tx) = &opts.progress {
                let _ = tx.send(ProgressFragment::complete(format!(
                    "process exited with code {code}"
                )));
            }
            Ok(output)
        } else {
            Err(Error::NonZeroExit { code, output })
        }
    }
}

#[async_trait]
impl Executor for ProcessExecutor {
    async fn execute(&self, opts: ExecOptions) -> Result<String> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(Error::InvalidState(format!(
                "executor for {} already has an invocation in flight",
                self.program
            )));
        }

        let result = self.run(opts).await;

        self.child.lock().await.take();
        self.running.store(false, Ordering::SeqCst);

        result
    }

    async fn cancel(&self) {
        if !self.running.load(Ordering::SeqCst) {
            return;
        }
        let mut guard = self.child.lock().await;
        if let Some(child) = guard.as_mut() {
            debug!(program = %self.program, "cancelling one-shot process");
            Self::terminate(child).await;
        }
        // The wait loop observes the exit status and unwinds normally
    }

    fn name(&self) -> &'static str {
        "process"
    }
}
