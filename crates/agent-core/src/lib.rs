//! # agent-core
//!
//! Sessions, events, tools and the provider contract behind the interactive
//! agent.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       AgentSession                            │
//! │  ┌─────────────┐  ┌─────────────┐  ┌──────────────────────┐  │
//! │  │  Reasoning  │  │    Tools    │  │   LlmProvider        │  │
//! │  │    Loop     │──│   Registry  │──│   (Strategy)         │  │
//! │  └──────┬──────┘  └─────────────┘  └──────────────────────┘  │
//! │         │ AgentEvent                 SessionStore             │
//! │         ▼                            (memory / jsonl files)   │
//! │     EventBus ──► subscribers                                  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `LlmProvider` trait enables swapping between Ollama, OpenAI, Anthropic,
//! or any other provider without changing session logic.

pub mod agent_session;
pub mod error;
pub mod event;
pub mod message;
pub mod mock;
pub mod provider;
pub mod reasoning;
pub mod session;
pub mod store;
pub mod tool;

pub use agent_session::AgentSession;
pub use error::{AgentError, Result};
pub use event::{AgentEvent, EventBus, EventListener, Subscription};
pub use message::{Conversation, Message, Role};
pub use provider::{GenerationOptions, LlmProvider};
pub use reasoning::{Agent, AgentBuilder, AgentConfig};
pub use session::{Session, SessionId, SessionInfo, SessionScope};
pub use store::{FileSessionStore, MemorySessionStore, SessionStore};
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult, ToolSchema};
