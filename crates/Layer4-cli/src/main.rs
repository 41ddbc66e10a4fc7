//! Relay CLI - Main entry point

use clap::{Parser, Subcommand};
use relay_foundation::{ProgressKind, Settings, TaskEvent};
use relay_task::{agent_settings, build_daemons, AgentKind, TaskRegistry, TaskStatus};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Relay - dispatch prompts to command-line AI agents
#[derive(Parser, Debug)]
#[command(name = "relay")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Settings file (TOML); missing file means defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Dispatch a prompt to an agent and print the response
    Run {
        /// Agent to dispatch to (claude, gemini)
        agent: AgentKind,

        /// Prompt text
        prompt: String,

        /// Route through the agent's persistent session instead of a
        /// one-shot process
        #[arg(long)]
        daemon: bool,

        /// One-shot timeout in seconds (overrides settings)
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Suppress live output streaming to stderr
        #[arg(short, long)]
        quiet: bool,
    },
    /// Tear down an agent's persistent session
    StopSession {
        /// Agent whose session to stop (claude, gemini)
        agent: AgentKind,
    },
}

fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".relay")
        .join("relay.toml")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();

    let config_path = args.config.unwrap_or_else(default_config_path);
    let mut settings = Settings::load_or_default(&config_path)?;

    match args.command {
        Command::Run {
            agent,
            prompt,
            daemon,
            timeout,
            quiet,
        } => {
            apply_overrides(&mut settings, agent, daemon, timeout);
            run(settings, agent, prompt, quiet).await
        }
        Command::StopSession { agent } => {
            let daemons = build_daemons(&settings);
            if let Some(session) = daemons.get(&agent) {
                session.stop().await;
            }
            Ok(())
        }
    }
}

/// Fold command-line overrides into the loaded settings
fn apply_overrides(settings: &mut Settings, agent: AgentKind, daemon: bool, timeout: Option<u64>) {
    let block = match agent {
        AgentKind::Claude => &mut settings.claude,
        AgentKind::Gemini => &mut settings.gemini,
    };
    if daemon {
        block.use_daemon = true;
    }
    if let Some(secs) = timeout {
        block.timeout_secs = secs;
    }
}

async fn run(settings: Settings, agent: AgentKind, prompt: String, quiet: bool) -> anyhow::Result<()> {
    let use_daemon = agent_settings(&settings, agent).use_daemon;
    let daemons = build_daemons(&settings);
    let registry = TaskRegistry::new(settings, daemons);

    // Stream live progress to stderr so stdout stays clean for the response
    let mut events = registry.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if quiet {
                continue;
            }
            if let TaskEvent::Progress { fragment, .. } = event {
                match fragment.kind {
                    ProgressKind::Output => eprintln!("{}", fragment.text),
                    ProgressKind::Error => eprintln!("! {}", fragment.text),
                    ProgressKind::Complete => {}
                }
            }
        }
    });

    let task = registry.create_task(agent, prompt).await;
    if use_daemon {
        eprintln!("dispatching {} via persistent session...", task.id);
    }

    // Ctrl-C cancels the in-flight task instead of orphaning the process
    let result = tokio::select! {
        result = registry.execute_task(task.id) => result,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("interrupted, cancelling {}", task.id);
            registry.cancel_task(task.id).await;
            registry.shutdown().await;
            printer.abort();
            anyhow::bail!("cancelled");
        }
    };

    printer.abort();

    match result {
        Ok(done) => {
            println!("{}", done.output);
            Ok(())
        }
        Err(e) => {
            // Partial output recorded on the task is still worth showing
            if let Some(snapshot) = registry.get_task(task.id).await {
                if !snapshot.output.is_empty() {
                    eprintln!("{}", snapshot.output);
                }
            }
            anyhow::bail!("{} {}: {e}", task.id, TaskStatus::Failed)
        }
    }
}
