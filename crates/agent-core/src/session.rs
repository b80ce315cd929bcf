//! Session Records
//!
//! A session is one persisted conversation thread. Stores hand these out;
//! the live, promptable form is [`crate::agent_session::AgentSession`].

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::{Conversation, Message};

/// Unique session identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, for log lines and fallback titles
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Working-directory scope a session belongs to
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionScope {
    pub cwd: String,
}

impl SessionScope {
    pub fn new(cwd: impl AsRef<Path>) -> Self {
        Self {
            cwd: cwd.as_ref().to_string_lossy().into_owned(),
        }
    }
}

/// Session metadata
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SessionMetadata {
    /// Explicit session name, if one was set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Working directory the session was created in
    pub cwd: String,
}

/// A complete conversation thread
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier
    pub id: SessionId,

    /// Conversation history
    pub conversation: Conversation,

    /// Session metadata
    pub metadata: SessionMetadata,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last activity timestamp
    pub updated_at: DateTime<Utc>,

    /// Storage location, for file-backed sessions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl Session {
    /// Create a new, empty session in `scope`
    pub fn new(scope: &SessionScope) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            conversation: Conversation::new(),
            metadata: SessionMetadata {
                title: None,
                cwd: scope.cwd.clone(),
            },
            created_at: now,
            updated_at: now,
            path: None,
        }
    }

    /// Append a message and bump the activity timestamp
    pub fn push(&mut self, message: Message) {
        self.updated_at = self.updated_at.max(message.timestamp);
        self.conversation.push(message);
    }

    /// Whether the session belongs to `scope`
    pub fn in_scope(&self, scope: &SessionScope) -> bool {
        self.metadata.cwd == scope.cwd
    }

    /// Message count
    pub fn message_count(&self) -> usize {
        self.conversation.len()
    }

    /// Point-in-time summary for listings
    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id.clone(),
            path: self.path.clone(),
            name: self.metadata.title.clone(),
            first_message: self
                .conversation
                .first_user_message()
                .map(|m| m.content.clone())
                .unwrap_or_default(),
            message_count: self.message_count(),
            modified: self.updated_at,
        }
    }
}

/// Summary metadata for one stored session
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: SessionId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Explicit name, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Text of the first user message, empty for a fresh session
    pub first_message: String,

    pub message_count: usize,

    pub modified: DateTime<Utc>,
}

impl SessionInfo {
    /// Display label: explicit name, else the first 50 characters of the
    /// first message, else `(empty)`.
    pub fn label(&self) -> String {
        if let Some(name) = self.name.as_deref().filter(|n| !n.is_empty()) {
            return name.to_string();
        }
        let preview: String = self.first_message.chars().take(50).collect();
        if preview.is_empty() {
            "(empty)".into()
        } else {
            preview
        }
    }
}

/// Orders listings most recently modified first; ties fall back to id so the
/// order is stable.
pub fn sort_most_recent_first(infos: &mut [SessionInfo]) {
    infos.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| a.id.cmp(&b.id)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_creation() {
        let session = Session::new(&SessionScope::new("/work"));
        assert_eq!(session.message_count(), 0);
        assert_eq!(session.metadata.cwd, "/work");
        assert!(session.in_scope(&SessionScope::new("/work")));
        assert!(!session.in_scope(&SessionScope::new("/elsewhere")));
    }

    #[test]
    fn test_info_label_prefers_name_then_preview() {
        let mut session = Session::new(&SessionScope::new("/work"));
        assert_eq!(session.info().label(), "(empty)");

        session.push(Message::user("a".repeat(80)));
        assert_eq!(session.info().label().chars().count(), 50);
        assert_eq!(session.info().message_count, 1);

        session.metadata.title = Some("groceries".into());
        assert_eq!(session.info().label(), "groceries");
    }

    #[test]
    fn test_sort_most_recent_first() {
        let scope = SessionScope::new("/work");
        let older = Session::new(&scope).info();
        let mut newer = Session::new(&scope).info();
        newer.modified = older.modified + chrono::Duration::seconds(5);

        let mut infos = vec![older.clone(), newer.clone()];
        sort_most_recent_first(&mut infos);
        assert_eq!(infos[0].id, newer.id);
        assert_eq!(infos[1].id, older.id);
    }
}
