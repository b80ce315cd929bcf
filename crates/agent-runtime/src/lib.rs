//! # agent-runtime
//!
//! The interactive runtime around an [`agent_core::AgentSession`]:
//!
//! - [`DeltaBatcher`]: coalesces streamed text into fewer writes
//! - [`ConfirmationGate`]: suspends a tool until a yes/no decision arrives
//! - [`SessionController`]: owns and swaps the single active session
//! - [`PromptDriver`]: runs one turn at a time and relays its events
//! - [`AgentRuntime`]: all of the above behind one handle
//! - [`coding`]: `read`, `write`, `edit` and `bash` tools, gated on the
//!   confirmation gate where they change anything
//!
//! ## Providers
//!
//! - **Ollama** (default feature): local inference via Ollama
//!
//! ## Usage
//!
//! ```rust,ignore
//! let spec = ModelSpec::from_env()?;
//! let runtime = AgentRuntime::new(
//!     &RuntimeConfig::new(cwd, ".sessions", spec.clone()),
//!     build_provider(&spec)?,
//!     tools,
//!     Arc::new(FileSessionStore::new(".sessions")),
//!     Arc::new(StdoutSink),
//!     ConfirmationGate::new(),
//! )?;
//! runtime.prompt("What's the weather in Tokyo?").await;
//! ```

pub mod batcher;
pub mod coding;
pub mod confirmation;
pub mod controller;
pub mod driver;
pub mod error;
pub mod model;
pub mod output;
pub mod relay;
pub mod runtime;
pub mod skills;

#[cfg(feature = "ollama")]
pub mod ollama;

#[cfg(feature = "ollama")]
pub use ollama::OllamaProvider;

pub use batcher::DeltaBatcher;
pub use coding::Workspace;
pub use confirmation::{Confirmation, ConfirmationGate};
pub use controller::{SessionController, SessionOrigin};
pub use driver::{PromptDriver, PromptOutcome};
pub use error::{Result, RuntimeError};
pub use model::{build_provider, ModelSpec};
pub use output::{MemorySink, OutputSink, StdoutSink};
pub use runtime::{AgentRuntime, RuntimeConfig};
pub use skills::{load_skills_from_dir, Skill, SystemPrompt};
