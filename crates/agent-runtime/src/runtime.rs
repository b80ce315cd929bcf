//! Agent Runtime
//!
//! Composes the batcher, the confirmation gate, the session controller and
//! the prompt driver into one handle the CLI drives. A runtime is an owned
//! value: several can coexist in one process.
//!
//! ```text
//!  input ──► PromptDriver ──► AgentSession ──events──► Relay ─┬─► DeltaBatcher ─► sink
//!                 ▲                  ▲                        └─► tool lines ───► sink
//!                 │                  │
//!          SessionController ────────┘ (owns, swaps, disposes)
//!
//!  decisions ──► ConfirmationGate ◄── gated tools
//! ```

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use agent_core::{
    AgentBuilder, AgentSession, LlmProvider, SessionId, SessionInfo, SessionScope, SessionStore,
    ToolRegistry,
};

use crate::batcher::{DeltaBatcher, DEFAULT_BATCH_INTERVAL};
use crate::coding::Workspace;
use crate::confirmation::ConfirmationGate;
use crate::controller::{SessionController, SessionOrigin};
use crate::driver::{PromptDriver, PromptOutcome};
use crate::error::Result;
use crate::model::ModelSpec;
use crate::output::OutputSink;
use crate::relay::Relay;
use crate::skills::{load_skills_from_dir, SystemPrompt};

/// Base system prompt of the interactive agent
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a versatile CLI assistant.\n\
You have access to tools for weather, time, file operations, and shell commands.\n\
Be concise but thorough. Use tools when appropriate rather than guessing.";

/// Settings for one runtime instance
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    /// Working directory that scopes session listing
    pub cwd: PathBuf,
    pub session_dir: PathBuf,
    pub skills_dir: Option<PathBuf>,
    pub system_prompt: String,
    pub batch_interval: Duration,
    pub model: ModelSpec,
    /// Register `read`, `write`, `edit` and `bash` rooted at `cwd`
    pub coding_tools: bool,
}

impl RuntimeConfig {
    pub fn new(cwd: impl Into<PathBuf>, session_dir: impl Into<PathBuf>, model: ModelSpec) -> Self {
        Self {
            cwd: cwd.into(),
            session_dir: session_dir.into(),
            skills_dir: None,
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            batch_interval: DEFAULT_BATCH_INTERVAL,
            model,
            coding_tools: true,
        }
    }
}

/// Interactive agent runtime
#[derive(Clone)]
pub struct AgentRuntime {
    controller: Arc<Mutex<SessionController>>,
    driver: PromptDriver,
    batcher: DeltaBatcher,
    gate: ConfirmationGate,
    sink: Arc<dyn OutputSink>,
}

impl AgentRuntime {
    /// Build a runtime with a fresh, empty session installed
    pub fn new(
        config: &RuntimeConfig,
        provider: Arc<dyn LlmProvider>,
        mut tools: ToolRegistry,
        store: Arc<dyn SessionStore>,
        sink: Arc<dyn OutputSink>,
        gate: ConfirmationGate,
    ) -> Result<Self> {
        let mut system_prompt = config.system_prompt.clone();
        if let Some(dir) = &config.skills_dir {
            let loaded = load_skills_from_dir(dir);
            if !loaded.skills.is_empty() {
                system_prompt = SystemPrompt::compose(&system_prompt, &loaded.skills);
                sink.line(&format!("📚 Loaded {} skill(s)", loaded.skills.len()));
            }
        }

        if config.coding_tools {
            Workspace::new(config.cwd.clone(), gate.clone(), Arc::clone(&sink)).register_tools(&mut tools);
        }
        tracing::debug!(tools = ?tools.names(), "Tools registered");

        let agent = AgentBuilder::new()
            .provider(provider)
            .tools(Arc::new(tools))
            .system_prompt(system_prompt)
            .generation(config.model.generation_options())
            .context_window(config.model.context_window)
            .build()?;

        let batcher = DeltaBatcher::new(Arc::clone(&sink), config.batch_interval);
        let relay = Arc::new(Relay::new(batcher.clone(), Arc::clone(&sink)));
        let mut controller = SessionController::new(
            store,
            Arc::new(agent),
            SessionScope::new(&config.cwd),
            relay,
        );
        controller.new_session()?;

        let controller = Arc::new(Mutex::new(controller));
        let driver = PromptDriver::new(Arc::clone(&controller), batcher.clone(), Arc::clone(&sink));
        controller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .set_release_hook(driver.release_hook());
        tracing::info!(model = %config.model, "Runtime ready");

        Ok(Self {
            controller,
            driver,
            batcher,
            gate,
            sink,
        })
    }

    fn controller(&self) -> MutexGuard<'_, SessionController> {
        self.controller.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run one turn against the active session
    pub async fn prompt(&self, text: &str) -> PromptOutcome {
        self.driver.prompt(text).await
    }

    /// Cancel the running turn, if any
    pub fn abort(&self) -> bool {
        self.driver.abort()
    }

    pub fn is_prompting(&self) -> bool {
        self.driver.is_in_flight()
    }

    /// Replace the active session with a fresh one
    pub fn new_session(&self) -> Result<()> {
        self.controller().new_session()?;
        self.sink.line("📝 New session created\n");
        Ok(())
    }

    /// Replace the active session with a stored one
    pub fn open_session(&self, id: &SessionId) -> Result<()> {
        self.controller().open(id)?;
        self.sink.line("📂 Session opened\n");
        Ok(())
    }

    /// Resume the most recent session in scope, creating one if there is none
    pub fn continue_recent_session(&self) -> Result<SessionOrigin> {
        let origin = self.controller().resume_most_recent()?;
        match origin {
            SessionOrigin::Resumed => self.sink.line("📂 Resumed most recent session\n"),
            SessionOrigin::Created => {
                self.sink.line("📝 No previous session found. Created new session.\n");
            }
        }
        Ok(origin)
    }

    /// Snapshot of stored sessions in scope, most recent first
    pub fn list_sessions(&self) -> Result<Vec<SessionInfo>> {
        self.controller().list_sessions()
    }

    pub fn active_session(&self) -> Option<Arc<AgentSession>> {
        self.controller().active()
    }

    pub const fn gate(&self) -> &ConfirmationGate {
        &self.gate
    }

    pub fn sink(&self) -> Arc<dyn OutputSink> {
        Arc::clone(&self.sink)
    }

    /// Dispose the active session, release the decision channel and flush
    /// pending output
    pub fn shutdown(&self) {
        self.controller().dispose();
        self.gate.cleanup();
        self.batcher.flush();
        tracing::debug!("Runtime shut down");
    }
}
