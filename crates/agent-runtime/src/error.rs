//! Runtime Error Types

use std::path::PathBuf;

use agent_core::AgentError;
use thiserror::Error;

/// Result type alias for runtime operations
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Runtime error types
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// A second confirmation was requested while one is outstanding
    #[error("A confirmation is already pending")]
    ConfirmationPending,

    /// The gate was torn down before the waiter got a decision
    #[error("Confirmation channel closed")]
    ConfirmationDropped,

    /// No session has been installed yet
    #[error("No active session")]
    NoActiveSession,

    /// A skill file could not be loaded
    #[error("Skill {0}: {1}")]
    Skill(PathBuf, String),

    /// Error from the session layer
    #[error(transparent)]
    Agent(#[from] AgentError),
}

impl RuntimeError {
    /// Whether this is a misuse of the confirmation protocol
    pub const fn is_protocol_misuse(&self) -> bool {
        matches!(self, Self::ConfirmationPending)
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::Agent(e) => e.user_message(),
            other => other.to_string(),
        }
    }
}
