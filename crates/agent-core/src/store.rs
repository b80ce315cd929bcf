//! Session Storage
//!
//! Create/open/list/resume operations over persisted sessions, keyed by a
//! working-directory scope. Two backends:
//!
//! - [`MemorySessionStore`]: process-local, for tests and throwaway runs
//! - [`FileSessionStore`]: one append-only JSON-lines file per session
//!
//! Both write lazily: a session becomes visible to `list`/`open` once its
//! first message has been appended.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};
use crate::message::Message;
use crate::session::{sort_most_recent_first, Session, SessionId, SessionInfo, SessionScope, SessionMetadata};

/// Session store trait for persistence
pub trait SessionStore: Send + Sync {
    /// Allocate a fresh, empty session in `scope`
    fn create(&self, scope: &SessionScope) -> Result<Session>;

    /// Load a session by id. Fails with [`AgentError::SessionNotFound`] when
    /// the id does not resolve.
    fn open(&self, id: &SessionId) -> Result<Session>;

    /// Persist `message`, which the caller has already pushed onto `session`
    fn append(&self, session: &Session, message: &Message) -> Result<()>;

    /// Snapshot of sessions in `scope`, most recently modified first
    fn list(&self, scope: &SessionScope) -> Result<Vec<SessionInfo>>;

    /// The most recently modified session in `scope`, if any
    fn most_recent(&self, scope: &SessionScope) -> Result<Option<Session>> {
        match self.list(scope)?.into_iter().next() {
            Some(info) => self.open(&info.id).map(Some),
            None => Ok(None),
        }
    }
}

/// In-memory session store (for development/testing)
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<SessionId, Session>>,
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn create(&self, scope: &SessionScope) -> Result<Session> {
        Ok(Session::new(scope))
    }

    fn open(&self, id: &SessionId) -> Result<Session> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        sessions
            .get(id)
            .cloned()
            .ok_or_else(|| AgentError::SessionNotFound(id.to_string()))
    }

    fn append(&self, session: &Session, _message: &Message) -> Result<()> {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    fn list(&self, scope: &SessionScope) -> Result<Vec<SessionInfo>> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        let mut result: Vec<_> = sessions
            .values()
            .filter(|s| s.in_scope(scope))
            .map(Session::info)
            .collect();
        sort_most_recent_first(&mut result);
        Ok(result)
    }
}

/// One line of a session file
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Entry {
    Session {
        id: SessionId,
        cwd: String,
        timestamp: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
    Message {
        message: Message,
    },
}

/// File-backed store: `<dir>/<id>.jsonl`, a header line followed by one line
/// per message.
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &SessionId) -> PathBuf {
        self.dir.join(format!("{}.jsonl", id.as_str()))
    }

    /// Resolve an id to a file. A bare path to an existing session file is
    /// accepted too.
    fn resolve(&self, id: &SessionId) -> Option<PathBuf> {
        let direct = self.path_for(id);
        if direct.is_file() {
            return Some(direct);
        }
        let as_path = PathBuf::from(id.as_str());
        (as_path.extension().is_some_and(|ext| ext == "jsonl") && as_path.is_file()).then_some(as_path)
    }

    fn read_session(path: &Path) -> Result<Session> {
        let reader = BufReader::new(File::open(path)?);
        let mut session: Option<Session> = None;

        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry = match serde_json::from_str::<Entry>(&line) {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(path = %path.display(), line = lineno + 1, error = %e, "Skipping malformed session line");
                    continue;
                }
            };
            match (entry, session.as_mut()) {
                (Entry::Session { id, cwd, timestamp, title }, None) => {
                    session = Some(Session {
                        id,
                        conversation: crate::message::Conversation::new(),
                        metadata: SessionMetadata { title, cwd },
                        created_at: timestamp,
                        updated_at: timestamp,
                        path: Some(path.to_path_buf()),
                    });
                }
                (Entry::Message { message }, Some(current)) => current.push(message),
                (Entry::Session { .. }, Some(_)) => {
                    tracing::warn!(path = %path.display(), line = lineno + 1, "Ignoring duplicate session header");
                }
                (Entry::Message { .. }, None) => {
                    return Err(AgentError::Session(format!(
                        "{} has a message before its header",
                        path.display()
                    )));
                }
            }
        }

        session.ok_or_else(|| AgentError::Session(format!("{} has no session header", path.display())))
    }

    fn write_line(file: &mut File, entry: &Entry) -> Result<()> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        file.write_all(line.as_bytes())?;
        Ok(())
    }
}

impl SessionStore for FileSessionStore {
    fn create(&self, scope: &SessionScope) -> Result<Session> {
        let mut session = Session::new(scope);
        session.path = Some(self.path_for(&session.id));
        Ok(session)
    }

    fn open(&self, id: &SessionId) -> Result<Session> {
        let path = self
            .resolve(id)
            .ok_or_else(|| AgentError::SessionNotFound(id.to_string()))?;
        Self::read_session(&path)
    }

    fn append(&self, session: &Session, message: &Message) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = session.path.clone().unwrap_or_else(|| self.path_for(&session.id));
        let fresh = !path.exists();

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        if fresh {
            Self::write_line(
                &mut file,
                &Entry::Session {
                    id: session.id.clone(),
                    cwd: session.metadata.cwd.clone(),
                    timestamp: session.created_at,
                    title: session.metadata.title.clone(),
                },
            )?;
            tracing::debug!(session = %session.id.short(), path = %path.display(), "Session file created");
        }
        Self::write_line(&mut file, &Entry::Message { message: message.clone() })
    }

    fn list(&self, scope: &SessionScope) -> Result<Vec<SessionInfo>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut result = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_none_or(|ext| ext != "jsonl") {
                continue;
            }
            match Self::read_session(&path) {
                Ok(session) if session.in_scope(scope) => result.push(session.info()),
                Ok(_) => {}
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable session file"),
            }
        }

        sort_most_recent_first(&mut result);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn append_user(store: &dyn SessionStore, session: &mut Session, text: &str) {
        let message = Message::user(text);
        session.push(message.clone());
        store.append(session, &message).unwrap();
    }

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemorySessionStore::new();
        let scope = SessionScope::new("/work");
        let mut session = store.create(&scope).unwrap();
        append_user(&store, &mut session, "hello");

        let loaded = store.open(&session.id).unwrap();
        assert_eq!(loaded.id, session.id);
        assert_eq!(loaded.message_count(), 1);
    }

    #[test]
    fn test_memory_store_missing_id() {
        let store = MemorySessionStore::new();
        let err = store.open(&SessionId::from_string("nope")).unwrap_err();
        assert!(matches!(err, AgentError::SessionNotFound(id) if id == "nope"));
    }

    #[test]
    fn test_fresh_session_is_not_listed_until_written() {
        let store = MemorySessionStore::new();
        let scope = SessionScope::new("/work");
        let _session = store.create(&scope).unwrap();
        assert!(store.list(&scope).unwrap().is_empty());
        assert!(store.most_recent(&scope).unwrap().is_none());
    }

    #[test]
    fn test_file_store_persists_lines() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        let scope = SessionScope::new("/work");

        let mut session = store.create(&scope).unwrap();
        append_user(&store, &mut session, "first question");
        let reply = Message::assistant("an answer");
        session.push(reply.clone());
        store.append(&session, &reply).unwrap();

        let raw = fs::read_to_string(dir.path().join(format!("{}.jsonl", session.id))).unwrap();
        assert_eq!(raw.lines().count(), 3);
        assert!(raw.lines().next().unwrap().contains(r#""type":"session""#));

        let loaded = store.open(&session.id).unwrap();
        assert_eq!(loaded.message_count(), 2);
        assert_eq!(loaded.conversation.messages()[1].content, "an answer");
    }

    #[test]
    fn test_file_store_lists_two_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        let scope = SessionScope::new("/work");

        let mut a = store.create(&scope).unwrap();
        append_user(&store, &mut a, "alpha");
        let mut b = store.create(&scope).unwrap();
        append_user(&store, &mut b, "beta");
        append_user(&store, &mut b, "beta again");

        let infos = store.list(&scope).unwrap();
        assert_eq!(infos.len(), 2);
        assert!(infos.iter().all(|i| i.message_count >= 1));
        assert_eq!(infos[0].id, b.id);
        assert_eq!(infos[0].first_message, "beta");
    }

    #[test]
    fn test_file_store_filters_by_scope() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());

        let mut here = store.create(&SessionScope::new("/here")).unwrap();
        append_user(&store, &mut here, "mine");
        let mut there = store.create(&SessionScope::new("/there")).unwrap();
        append_user(&store, &mut there, "theirs");

        let infos = store.list(&SessionScope::new("/here")).unwrap();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].id, here.id);
    }

    #[test]
    fn test_file_store_missing_dir_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("absent"));
        let scope = SessionScope::new("/work");
        assert!(store.list(&scope).unwrap().is_empty());
        assert!(store.most_recent(&scope).unwrap().is_none());
    }

    #[test]
    fn test_file_store_skips_malformed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        let scope = SessionScope::new("/work");
        let mut session = store.create(&scope).unwrap();
        append_user(&store, &mut session, "ok");

        let path = dir.path().join(format!("{}.jsonl", session.id));
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{{not json").unwrap();

        let loaded = store.open(&session.id).unwrap();
        assert_eq!(loaded.message_count(), 1);
    }

    #[test]
    fn test_file_store_opens_by_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        let scope = SessionScope::new("/work");
        let mut session = store.create(&scope).unwrap();
        append_user(&store, &mut session, "by path");

        let path = dir.path().join(format!("{}.jsonl", session.id));
        let id = SessionId::from_string(path.to_string_lossy());
        assert_eq!(store.open(&id).unwrap().id, session.id);
    }
}
