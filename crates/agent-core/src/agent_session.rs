//! Live Sessions
//!
//! [`AgentSession`] binds a stored [`Session`] to an [`Agent`]: it runs one
//! turn at a time, persists every message through the store as it is
//! produced, and publishes [`AgentEvent`]s to its subscribers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;

use crate::error::{AgentError, Result};
use crate::event::{AgentEvent, EventBus, EventListener, Subscription};
use crate::message::{Conversation, Message};
use crate::reasoning::{Agent, Transcript, TurnContext};
use crate::session::{Session, SessionId, SessionInfo};
use crate::store::SessionStore;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A promptable conversation
pub struct AgentSession {
    agent: Arc<Agent>,
    store: Arc<dyn SessionStore>,
    record: Mutex<Session>,
    events: EventBus,
    turn: Mutex<Option<CancellationToken>>,
    disposed: AtomicBool,
}

/// Clears the running-turn slot however the turn ends
struct TurnGuard<'a>(&'a Mutex<Option<CancellationToken>>);

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        *lock(self.0) = None;
    }
}

impl AgentSession {
    pub fn new(agent: Arc<Agent>, store: Arc<dyn SessionStore>, mut session: Session) -> Self {
        session.conversation.set_max_context(agent.config().context_window);
        Self {
            agent,
            store,
            record: Mutex::new(session),
            events: EventBus::new(),
            turn: Mutex::new(None),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> SessionId {
        lock(&self.record).id.clone()
    }

    pub fn info(&self) -> SessionInfo {
        lock(&self.record).info()
    }

    /// Copy of the underlying record
    pub fn session_record(&self) -> Session {
        lock(&self.record).clone()
    }

    pub const fn events(&self) -> &EventBus {
        &self.events
    }

    /// Attach a listener to this session's events
    pub fn subscribe(&self, listener: Arc<dyn EventListener>) -> Subscription {
        self.events.subscribe(listener)
    }

    /// Whether a turn is running
    pub fn is_streaming(&self) -> bool {
        lock(&self.turn).is_some()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Run one turn. Emits `TurnStart` first and `TurnEnd` last; resolves to
    /// [`AgentError::Aborted`] when cancelled through [`Self::abort`] or
    /// [`Self::dispose`].
    pub async fn prompt(&self, text: &str) -> Result<String> {
        if self.is_disposed() {
            return Err(AgentError::Session("session has been disposed".into()));
        }

        let cancel = {
            let mut turn = lock(&self.turn);
            if turn.is_some() {
                return Err(AgentError::Session("a prompt is already running".into()));
            }
            let token = CancellationToken::new();
            *turn = Some(token.clone());
            token
        };
        let _guard = TurnGuard(&self.turn);

        self.events.emit(&AgentEvent::TurnStart);
        let ctx = TurnContext {
            events: &self.events,
            cancel: &cancel,
        };
        let result = self.agent.run_turn(text, self, &ctx).await;
        self.events.emit(&AgentEvent::TurnEnd);

        if let Err(e) = &result {
            tracing::debug!(session = %self.id().short(), error = %e, "Turn ended early");
        }
        result
    }

    /// Request cancellation of the running turn. Returns whether a turn was
    /// running.
    pub fn abort(&self) -> bool {
        lock(&self.turn).as_ref().is_some_and(|token| {
            token.cancel();
            true
        })
    }

    /// Cancel any running turn and detach every subscriber. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.abort();
        self.events.close();
        tracing::debug!(session = %self.id().short(), "Session disposed");
    }
}

impl Transcript for AgentSession {
    fn snapshot(&self) -> Conversation {
        lock(&self.record).conversation.clone()
    }

    fn record(&self, message: Message) -> Result<()> {
        let mut session = lock(&self.record);
        session.push(message.clone());
        self.store.append(&session, &message)
    }
}
