//! Slash Commands
//!
//! Lines starting with `/` are commands; everything else is a prompt.

use agent_core::SessionInfo;
use agent_runtime::{AgentRuntime, OutputSink, RuntimeError};
use chrono::Local;

const HELP: &str = "
Commands:
  /sessions   List all saved sessions
  /new        Start a new session
  /open <n>   Open session N from list
  /continue   Resume most recent session
  /abort      Abort current streaming
  /help       Show this help
  /quit       Exit
";

/// A parsed slash command
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Help,
    Sessions,
    New,
    /// 1-based position in the last `/sessions` listing
    Open(Option<usize>),
    Continue,
    Abort,
    Quit,
    Unknown(String),
}

impl Command {
    /// Parse `input` as a command. `None` when it is not one.
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if !input.starts_with('/') {
            return None;
        }

        let mut words = input.split_whitespace();
        let name = words.next().unwrap_or(input);
        Some(match name {
            "/help" => Self::Help,
            "/sessions" => Self::Sessions,
            "/new" => Self::New,
            "/open" => Self::Open(words.next().and_then(|n| n.parse().ok())),
            "/continue" => Self::Continue,
            "/abort" => Self::Abort,
            "/quit" => Self::Quit,
            other => Self::Unknown(other.to_string()),
        })
    }
}

/// What the read loop should do after a command
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// One listing line: `  N. [<count> msgs, <date>] <label>`
pub fn format_session_line(position: usize, info: &SessionInfo) -> String {
    let date = info.modified.with_timezone(&Local).format("%Y-%m-%d");
    format!(
        "  {position}. [{} msgs, {date}] {}",
        info.message_count,
        info.label()
    )
}

/// Ctrl-C: cancel the running turn and say so. Silent when nothing was
/// running.
pub fn interrupt(runtime: &AgentRuntime) -> bool {
    let cancelled = runtime.abort();
    if cancelled {
        runtime.sink().line("\n🛑 Aborted.");
    }
    cancelled
}

/// Runs commands against a runtime, remembering the last listing for `/open`
#[derive(Default)]
pub struct CommandHandler {
    cached_sessions: Vec<SessionInfo>,
}

impl CommandHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&mut self, command: Command, runtime: &AgentRuntime) -> Flow {
        let sink = runtime.sink();
        let result = match command {
            Command::Help => {
                sink.line(HELP);
                Ok(())
            }
            Command::Sessions => self.list(runtime, sink.as_ref()),
            Command::New => runtime.new_session(),
            Command::Open(position) => {
                let picked = position
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|i| self.cached_sessions.get(i));
                match picked {
                    Some(info) => runtime.open_session(&info.id),
                    None => {
                        sink.line("Invalid session number. Run /sessions first.\n");
                        Ok(())
                    }
                }
            }
            Command::Continue => runtime.continue_recent_session().map(|_| ()),
            Command::Abort => {
                runtime.abort();
                sink.line("🛑 Aborted.\n");
                Ok(())
            }
            Command::Quit => return Flow::Quit,
            Command::Unknown(name) => {
                sink.line(&format!(
                    "Unknown command: {name}. Type /help for available commands.\n"
                ));
                Ok(())
            }
        };

        if let Err(e) = result {
            tracing::warn!(error = %e, "Command failed");
            sink.line(&format!("Error: {}\n", e.user_message()));
        }
        Flow::Continue
    }

    fn list(&mut self, runtime: &AgentRuntime, sink: &dyn OutputSink) -> Result<(), RuntimeError> {
        self.cached_sessions = runtime.list_sessions()?;
        if self.cached_sessions.is_empty() {
            sink.line("  No saved sessions.\n");
            return Ok(());
        }
        for (i, info) in self.cached_sessions.iter().enumerate() {
            sink.line(&format_session_line(i + 1, info));
        }
        sink.line("");
        Ok(())
    }
}
