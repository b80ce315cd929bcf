//! Coding Tools
//!
//! `read`, `write`, `edit` and `bash`, working relative to the runtime's
//! working directory. Everything that changes the machine (`write`, `edit`,
//! `bash`) describes itself on the sink and waits on the
//! [`ConfirmationGate`] first; a declined request is reported to the model
//! as an ordinary result.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use agent_core::tool::{ParameterSchema, Tool, ToolCall, ToolRegistry, ToolResult, ToolSchema};
use agent_core::{AgentError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::confirmation::ConfirmationGate;
use crate::output::OutputSink;

/// Longest tool output handed back to the model, in characters
const MAX_OUTPUT_CHARS: usize = 30_000;

const DEFAULT_BASH_TIMEOUT_MS: u64 = 120_000;
const MAX_BASH_TIMEOUT_MS: u64 = 600_000;

/// State shared by the coding tools
#[derive(Clone)]
pub struct Workspace {
    root: PathBuf,
    gate: ConfirmationGate,
    sink: Arc<dyn OutputSink>,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>, gate: ConfirmationGate, sink: Arc<dyn OutputSink>) -> Self {
        Self {
            root: root.into(),
            gate,
            sink,
        }
    }

    /// Relative paths resolve against the workspace root
    pub fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// Show `title` and `details`, then wait for the user's decision.
    /// `Err` carries the message for a failed tool result.
    async fn approve(&self, title: &str, details: &[(&str, &str)]) -> std::result::Result<bool, String> {
        self.sink.line(&format!("\n⚠️  {title}"));
        for (label, value) in details {
            self.sink.line(&format!("   {label}: {value}"));
        }
        self.sink.line("   Confirm? [y/N]");

        match self.gate.wait_for_confirmation().await {
            Ok(decision) if decision.confirmed => Ok(true),
            Ok(_) => {
                self.sink.line("   ❌ Cancelled by user\n");
                Ok(false)
            }
            Err(e) => Err(e.to_string()),
        }
    }

    /// Register `read`, `write`, `edit` and `bash`
    pub fn register_tools(&self, registry: &mut ToolRegistry) {
        registry.register(ReadTool(self.clone()));
        registry.register(WriteTool(self.clone()));
        registry.register(EditTool(self.clone()));
        registry.register(BashTool(self.clone()));
    }
}

fn parse_input<T: DeserializeOwned>(call: &ToolCall) -> Result<T> {
    serde_json::from_value(call.arguments_json())
        .map_err(|e| AgentError::ToolValidation(format!("{}: {e}", call.name)))
}

fn truncate(mut output: String) -> String {
    let total = output.chars().count();
    if total > MAX_OUTPUT_CHARS {
        let cut = output
            .char_indices()
            .nth(MAX_OUTPUT_CHARS)
            .map_or(output.len(), |(i, _)| i);
        output.truncate(cut);
        output.push_str(&format!("...\n\n(output truncated, {total} total characters)"));
    }
    output
}

/// Reads a file, optionally a window of its lines
pub struct ReadTool(Workspace);

#[derive(Debug, Deserialize)]
struct ReadInput {
    path: String,
    /// 1-based first line
    #[serde(default)]
    offset: Option<usize>,
    #[serde(default)]
    limit: Option<usize>,
}

#[async_trait]
impl Tool for ReadTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "read".into(),
            label: "Read File".into(),
            description: "Read a file's contents with line numbers. Use offset and limit for large files."
                .into(),
            parameters: vec![
                ParameterSchema::string("path", "File to read, relative to the working directory"),
                ParameterSchema::integer("offset", "First line to show (1-based)").optional(),
                ParameterSchema::integer("limit", "Number of lines to show").optional(),
            ],
            requires_confirmation: false,
        }
    }

    async fn execute(&self, call: &ToolCall) -> Result<ToolResult> {
        let input: ReadInput = parse_input(call)?;
        let path = self.0.resolve(&input.path);

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) => {
                return Ok(ToolResult::failure(
                    "read",
                    format!("Cannot read '{}': {e}", path.display()),
                ));
            }
        };

        let total = content.lines().count();
        let skip = input.offset.unwrap_or(1).saturating_sub(1);
        let take = input.limit.unwrap_or(total);
        let numbered: Vec<String> = content
            .lines()
            .enumerate()
            .skip(skip)
            .take(take)
            .map(|(i, line)| format!("{:>6}\t{line}", i + 1))
            .collect();

        let output = if numbered.is_empty() {
            "(empty file)".to_string()
        } else if input.offset.is_some() || input.limit.is_some() {
            format!(
                "Showing lines {}-{} of {total}\n{}",
                skip + 1,
                skip + numbered.len(),
                numbered.join("\n")
            )
        } else {
            numbered.join("\n")
        };
        Ok(ToolResult::success("read", truncate(output)))
    }
}

/// Creates or overwrites a file
pub struct WriteTool(Workspace);

#[derive(Debug, Deserialize)]
struct WriteInput {
    path: String,
    content: String,
}

#[async_trait]
impl Tool for WriteTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "write".into(),
            label: "Write File".into(),
            description: "Write content to a file, creating it (and missing parent directories) \
                          or replacing it. Requires user confirmation."
                .into(),
            parameters: vec![
                ParameterSchema::string("path", "File to write, relative to the working directory"),
                ParameterSchema::string("content", "Full new contents of the file"),
            ],
            requires_confirmation: true,
        }
    }

    async fn execute(&self, call: &ToolCall) -> Result<ToolResult> {
        let input: WriteInput = parse_input(call)?;
        let path = self.0.resolve(&input.path);
        let shown = path.display().to_string();
        let size = format!("{} bytes", input.content.len());

        match self.0.approve("Write requested:", &[("File", shown.as_str()), ("Size", size.as_str())]).await {
            Ok(true) => {}
            Ok(false) => return Ok(ToolResult::success("write", "User declined the write.")),
            Err(e) => return Ok(ToolResult::failure("write", e)),
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &input.content).await?;
        Ok(ToolResult::success(
            "write",
            format!(
                "Wrote {} lines ({size}) to '{shown}'",
                input.content.lines().count()
            ),
        ))
    }
}

/// Replaces an exact string inside a file
pub struct EditTool(Workspace);

#[derive(Debug, Deserialize)]
struct EditInput {
    path: String,
    old_string: String,
    new_string: String,
    #[serde(default)]
    replace_all: bool,
}

#[async_trait]
impl Tool for EditTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "edit".into(),
            label: "Edit File".into(),
            description: "Replace old_string with new_string in a file. old_string must match \
                          exactly once unless replace_all is true. Requires user confirmation."
                .into(),
            parameters: vec![
                ParameterSchema::string("path", "File to edit, relative to the working directory"),
                ParameterSchema::string("old_string", "Exact text to replace"),
                ParameterSchema::string("new_string", "Replacement text"),
                ParameterSchema::boolean("replace_all", "Replace every occurrence").optional(),
            ],
            requires_confirmation: true,
        }
    }

    async fn execute(&self, call: &ToolCall) -> Result<ToolResult> {
        let input: EditInput = parse_input(call)?;
        let path = self.0.resolve(&input.path);
        let shown = path.display().to_string();

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) => return Ok(ToolResult::failure("edit", format!("Cannot read '{shown}': {e}"))),
        };

        let count = content.matches(&input.old_string).count();
        if input.old_string.is_empty() || count == 0 {
            return Ok(ToolResult::failure(
                "edit",
                format!("Text to replace not found in '{shown}'"),
            ));
        }
        if count > 1 && !input.replace_all {
            return Ok(ToolResult::failure(
                "edit",
                format!(
                    "Found {count} matches in '{shown}'. Give more context or set replace_all."
                ),
            ));
        }

        let replaced = if input.replace_all { count } else { 1 };
        let summary = format!("{replaced} replacement(s)");
        match self.0.approve("Edit requested:", &[("File", shown.as_str()), ("Change", summary.as_str())]).await {
            Ok(true) => {}
            Ok(false) => return Ok(ToolResult::success("edit", "User declined the edit.")),
            Err(e) => return Ok(ToolResult::failure("edit", e)),
        }

        let updated = if input.replace_all {
            content.replace(&input.old_string, &input.new_string)
        } else {
            content.replacen(&input.old_string, &input.new_string, 1)
        };
        tokio::fs::write(&path, updated).await?;
        Ok(ToolResult::success(
            "edit",
            format!("Made {summary} in '{shown}'"),
        ))
    }
}

/// Runs a shell command in the working directory
pub struct BashTool(Workspace);

#[derive(Debug, Deserialize)]
struct BashInput {
    command: String,
    #[serde(default)]
    timeout_ms: Option<u64>,
}

#[async_trait]
impl Tool for BashTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "bash".into(),
            label: "Run Command".into(),
            description: "Run a shell command in the working directory and return its stdout, \
                          stderr and exit code. Requires user confirmation."
                .into(),
            parameters: vec![
                ParameterSchema::string("command", "Shell command to run"),
                ParameterSchema::integer("timeout_ms", "Timeout in milliseconds (default 120000)")
                    .optional(),
            ],
            requires_confirmation: true,
        }
    }

    async fn execute(&self, call: &ToolCall) -> Result<ToolResult> {
        let input: BashInput = parse_input(call)?;

        match self.0.approve("Command requested:", &[("Command", input.command.as_str())]).await {
            Ok(true) => {}
            Ok(false) => return Ok(ToolResult::success("bash", "User declined the command.")),
            Err(e) => return Ok(ToolResult::failure("bash", e)),
        }

        let timeout = Duration::from_millis(
            input
                .timeout_ms
                .unwrap_or(DEFAULT_BASH_TIMEOUT_MS)
                .min(MAX_BASH_TIMEOUT_MS),
        );
        let child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&input.command)
            .current_dir(&self.0.root)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(timeout, child).await {
            Ok(output) => output?,
            Err(_) => {
                return Ok(ToolResult::failure(
                    "bash",
                    format!("Command timed out after {} ms", timeout.as_millis()),
                ));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let mut text = stdout.into_owned();
        if !stderr.is_empty() {
            if !text.is_empty() {
                text.push_str("\n\n--- stderr ---\n");
            }
            text.push_str(&stderr);
        }
        if text.is_empty() {
            text.push_str("(no output)");
        }
        let code = output
            .status
            .code()
            .map_or_else(|| "killed by signal".to_string(), |c| c.to_string());
        let text = format!("{}\n\nExit code: {code}", truncate(text));

        Ok(if output.status.success() {
            ToolResult::success("bash", text)
        } else {
            ToolResult::failure("bash", text)
        })
    }
}
