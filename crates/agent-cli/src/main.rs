//! agent-cli
//!
//! Interactive command-line agent. Reads lines from stdin, runs prompts
//! against the active session, and keeps every conversation on disk so it
//! can be listed, reopened or resumed later.

mod commands;
mod tools;

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use agent_core::tool::{CurrentTimeTool, ToolRegistry};
use agent_core::FileSessionStore;
use agent_runtime::{
    build_provider, AgentRuntime, ConfirmationGate, ModelSpec, OutputSink, PromptOutcome,
    RuntimeConfig, StdoutSink,
};

use crate::commands::{Command, CommandHandler, Flow};
use crate::tools::{DangerousOperationTool, WeatherTool};

/// Interactive agent with persistent sessions
#[derive(Parser, Debug)]
#[command(name = "agent-cli", version, about)]
struct Cli {
    /// Directory holding session files
    #[arg(long, env = "SESSION_DIR", default_value = ".sessions")]
    session_dir: PathBuf,

    /// Directory of skill files to load into the system prompt
    #[arg(long, env = "SKILLS_DIR")]
    skills_dir: Option<PathBuf>,

    /// Working directory that scopes session listing (defaults to the current one)
    #[arg(long)]
    cwd: Option<PathBuf>,

    /// Resume the most recent session instead of starting a new one
    #[arg(long = "continue")]
    resume: bool,

    /// Delay before streamed text is flushed, in milliseconds
    #[arg(long, env = "BATCH_INTERVAL_MS", default_value_t = 32)]
    batch_interval_ms: u64,

    /// Start without the example tools
    #[arg(long)]
    no_tools: bool,

    /// Start without the read/write/edit/bash tools
    #[arg(long, env = "NO_CODING_TOOLS")]
    no_coding_tools: bool,
}

const PROMPT: &str = "You: ";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment first so RUST_LOG from .env applies
    dotenvy::dotenv().ok();

    // Logs go to stderr; stdout belongs to the conversation
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let spec = ModelSpec::from_env().context("Model configuration")?;
    let provider = build_provider(&spec).context("Model provider")?;
    match provider.health_check().await {
        Ok(true) => tracing::info!(model = %spec, "✓ Provider reachable"),
        Ok(false) | Err(_) => {
            tracing::warn!("⚠ {} not available - prompts will fail", spec.provider);
            tracing::warn!("  Make sure Ollama is running: ollama serve");
        }
    }

    let sink: Arc<dyn OutputSink> = Arc::new(StdoutSink);
    let gate = ConfirmationGate::new();
    let (decisions, decision_rx) = mpsc::unbounded_channel();
    gate.attach(decision_rx);

    let mut tools = ToolRegistry::new();
    if !cli.no_tools {
        tools.register(WeatherTool);
        tools.register(CurrentTimeTool);
        tools.register(DangerousOperationTool::new(gate.clone(), Arc::clone(&sink)));
    }
    tracing::info!(tools = ?tools.names(), "Registered example tools");

    let cwd = match cli.cwd {
        Some(cwd) => cwd,
        None => std::env::current_dir().context("Reading current directory")?,
    };
    let mut config = RuntimeConfig::new(cwd, &cli.session_dir, spec);
    config.skills_dir = cli.skills_dir;
    config.batch_interval = Duration::from_millis(cli.batch_interval_ms);
    config.coding_tools = !cli.no_coding_tools;

    let runtime = AgentRuntime::new(
        &config,
        provider,
        tools,
        Arc::new(FileSessionStore::new(&cli.session_dir)),
        Arc::clone(&sink),
        gate,
    )?;
    if cli.resume {
        runtime.continue_recent_session()?;
    }

    sink.line("🚀 Full CLI Agent ready. Type /help for commands.\n");
    run_repl(&runtime, &decisions).await;

    runtime.shutdown();
    Ok(())
}

/// Read stdin on a dedicated thread; the channel closes at end of input
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read stdin");
                    break;
                }
            }
        }
    });
    rx
}

/// Resolves when the running turn finishes; pending while there is none
async fn join_turn(turn: &mut Option<JoinHandle<PromptOutcome>>) -> PromptOutcome {
    let Some(handle) = turn.as_mut() else {
        return std::future::pending().await;
    };
    let outcome = handle
        .await
        .unwrap_or_else(|e| PromptOutcome::Failed(e.to_string()));
    *turn = None;
    outcome
}

async fn run_repl(runtime: &AgentRuntime, decisions: &mpsc::UnboundedSender<String>) {
    let sink = runtime.sink();
    let mut lines = spawn_stdin_reader();
    let mut commands = CommandHandler::new();
    let mut turn: Option<JoinHandle<PromptOutcome>> = None;

    sink.write(PROMPT);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                if !commands::interrupt(runtime) {
                    tracing::debug!("Ctrl-C with no turn running");
                }
            }
            outcome = join_turn(&mut turn) => {
                tracing::debug!(?outcome, "Turn finished");
                sink.write(PROMPT);
            }
            line = lines.recv() => {
                let Some(line) = line else { break };

                // A pending confirmation takes the next line as its answer
                if runtime.gate().is_pending() {
                    if decisions.send(line).is_err() {
                        runtime.gate().cancel();
                    }
                    continue;
                }

                let input = line.trim();
                if let Some(command) = Command::parse(input) {
                    if commands.handle(command, runtime) == Flow::Quit {
                        break;
                    }
                } else if turn.is_some() {
                    sink.line("⏳ Still answering. Use /abort or Ctrl+C to stop it.");
                    continue;
                } else if !input.is_empty() {
                    let running = runtime.clone();
                    let text = input.to_string();
                    turn = Some(tokio::spawn(async move { running.prompt(&text).await }));
                    continue;
                }

                if turn.is_none() {
                    sink.write(PROMPT);
                }
            }
        }
    }

    // Let a cancelled turn finish writing before teardown completes
    runtime.abort();
    runtime.gate().cancel();
    if let Some(handle) = turn {
        let _ = handle.await;
    }
}
