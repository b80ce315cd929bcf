//! Session Lifecycle Controller
//!
//! Owns the single active [`AgentSession`]. Every transition (new, open,
//! resume) resolves the replacement first, then tears down the old session's
//! subscription, the session itself and whatever output it still has
//! buffered, then installs and subscribes the new one. Nothing from the old
//! session reaches the relay after a swap.
//!
//! ```text
//! Uninitialized ──new/open/resume──► Active(s1)
//! Active(s1) ──new/open/resume──► [unsubscribe s1, dispose s1, release hook] ──► Active(s2)
//! ```

use std::sync::Arc;

use agent_core::{
    Agent, AgentSession, EventListener, Session, SessionId, SessionInfo, SessionScope,
    SessionStore, Subscription,
};

use crate::error::{Result, RuntimeError};

/// How [`SessionController::resume_most_recent`] ended up with a session
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionOrigin {
    /// An existing session was reopened
    Resumed,
    /// Nothing to resume; a fresh session was created
    Created,
}

struct ActiveSession {
    session: Arc<AgentSession>,
    subscription: Subscription,
}

type ReleaseHook = Box<dyn Fn() + Send + Sync>;

/// Owner of the active session
pub struct SessionController {
    store: Arc<dyn SessionStore>,
    agent: Arc<Agent>,
    scope: SessionScope,
    relay: Arc<dyn EventListener>,
    active: Option<ActiveSession>,
    on_release: Option<ReleaseHook>,
}

impl SessionController {
    pub fn new(
        store: Arc<dyn SessionStore>,
        agent: Arc<Agent>,
        scope: SessionScope,
        relay: Arc<dyn EventListener>,
    ) -> Self {
        Self {
            store,
            agent,
            scope,
            relay,
            active: None,
            on_release: None,
        }
    }

    /// Run `hook` every time an active session is torn down, after its
    /// relay is detached and before any replacement is installed
    pub fn set_release_hook(&mut self, hook: impl Fn() + Send + Sync + 'static) {
        self.on_release = Some(Box::new(hook));
    }

    pub const fn scope(&self) -> &SessionScope {
        &self.scope
    }

    /// Create an empty session and make it active
    pub fn new_session(&mut self) -> Result<Arc<AgentSession>> {
        let record = self.store.create(&self.scope)?;
        Ok(self.install(record))
    }

    /// Load a stored session and make it active. On failure the current
    /// session stays active.
    pub fn open(&mut self, id: &SessionId) -> Result<Arc<AgentSession>> {
        let record = self.store.open(id)?;
        Ok(self.install(record))
    }

    /// Reopen the most recently modified session in scope, or create one
    /// when there is none. Store failures fall back to creating.
    pub fn resume_most_recent(&mut self) -> Result<SessionOrigin> {
        match self.store.most_recent(&self.scope) {
            Ok(Some(record)) => {
                self.install(record);
                return Ok(SessionOrigin::Resumed);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "Could not resume a session, starting fresh"),
        }
        self.new_session()?;
        Ok(SessionOrigin::Created)
    }

    /// Point-in-time listing of sessions in scope, most recent first
    pub fn list_sessions(&self) -> Result<Vec<SessionInfo>> {
        Ok(self.store.list(&self.scope)?)
    }

    /// The active session, if one is installed
    pub fn active(&self) -> Option<Arc<AgentSession>> {
        self.active.as_ref().map(|a| Arc::clone(&a.session))
    }

    pub fn require_active(&self) -> Result<Arc<AgentSession>> {
        self.active().ok_or(RuntimeError::NoActiveSession)
    }

    /// Unsubscribe the relay from the active session, dispose it and run
    /// the release hook
    pub fn dispose(&mut self) {
        if let Some(ActiveSession {
            session,
            subscription,
        }) = self.active.take()
        {
            subscription.unsubscribe();
            session.dispose();
            if let Some(hook) = &self.on_release {
                hook();
            }
            tracing::debug!(session = %session.id().short(), "Released active session");
        }
    }

    fn install(&mut self, record: Session) -> Arc<AgentSession> {
        self.dispose();

        let session = Arc::new(AgentSession::new(
            Arc::clone(&self.agent),
            Arc::clone(&self.store),
            record,
        ));
        let subscription = session.subscribe(Arc::clone(&self.relay));
        tracing::info!(
            session = %session.id().short(),
            messages = session.info().message_count,
            "Session active"
        );
        self.active = Some(ActiveSession {
            session: Arc::clone(&session),
            subscription,
        });
        session
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::mock::ScriptedProvider;
    use agent_core::{AgentBuilder, AgentEvent, MemorySessionStore, Message};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingRelay(AtomicUsize);

    impl EventListener for CountingRelay {
        fn on_event(&self, _event: &AgentEvent) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn controller() -> (SessionController, Arc<MemorySessionStore>, Arc<CountingRelay>) {
        let agent = Arc::new(
            AgentBuilder::new()
                .provider(Arc::new(ScriptedProvider::default()))
                .build()
                .unwrap(),
        );
        let store = Arc::new(MemorySessionStore::new());
        let relay = Arc::new(CountingRelay::default());
        let controller =
            SessionController::new(store.clone(), agent, SessionScope::new("/work"), relay.clone());
        (controller, store, relay)
    }

    fn stored_session(store: &MemorySessionStore, text: &str) -> SessionId {
        let mut session = store.create(&SessionScope::new("/work")).unwrap();
        let message = Message::user(text);
        session.push(message.clone());
        store.append(&session, &message).unwrap();
        session.id
    }

    #[test]
    fn test_old_session_events_never_reach_relay() {
        let (mut controller, _store, relay) = controller();
        let old = controller.new_session().unwrap();
        old.events().emit(&AgentEvent::TurnStart);
        assert_eq!(relay.0.load(Ordering::SeqCst), 1);

        let new = controller.new_session().unwrap();
        old.events().emit(&AgentEvent::TurnStart);
        assert_eq!(relay.0.load(Ordering::SeqCst), 1);
        assert!(old.is_disposed());
        assert_eq!(old.events().listener_count(), 0);

        new.events().emit(&AgentEvent::TurnEnd);
        assert_eq!(relay.0.load(Ordering::SeqCst), 2);
        assert_eq!(new.events().listener_count(), 1);
    }

    #[test]
    fn test_open_swaps_and_unknown_id_keeps_current() {
        let (mut controller, store, _relay) = controller();
        let id = stored_session(&store, "earlier chat");
        let current = controller.new_session().unwrap();

        let Err(err) = controller.open(&SessionId::from_string("nope")) else {
            panic!("unknown id should not open");
        };
        assert!(matches!(
            err,
            RuntimeError::Agent(agent_core::AgentError::SessionNotFound(_))
        ));
        assert!(!current.is_disposed());
        assert_eq!(controller.active().unwrap().id(), current.id());

        let opened = controller.open(&id).unwrap();
        assert_eq!(opened.info().message_count, 1);
        assert!(current.is_disposed());
    }

    #[test]
    fn test_resume_on_empty_scope_creates() {
        let (mut controller, _store, _relay) = controller();
        assert_eq!(controller.resume_most_recent().unwrap(), SessionOrigin::Created);
        let active = controller.active().unwrap();
        assert_eq!(active.info().message_count, 0);
    }

    #[test]
    fn test_resume_picks_most_recent() {
        let (mut controller, store, _relay) = controller();
        stored_session(&store, "older");
        std::thread::sleep(std::time::Duration::from_millis(5));
        let newest = stored_session(&store, "newer");

        assert_eq!(controller.resume_most_recent().unwrap(), SessionOrigin::Resumed);
        assert_eq!(controller.active().unwrap().id(), newest);
    }

    #[test]
    fn test_list_sessions_returns_snapshot() {
        let (controller, store, _relay) = controller();
        stored_session(&store, "one");
        stored_session(&store, "two");

        let sessions = controller.list_sessions().unwrap();
        assert_eq!(sessions.len(), 2);
        assert!(sessions.iter().all(|s| s.message_count == 1));
    }

    #[test]
    fn test_release_hook_runs_once_per_teardown() {
        let (mut controller, _store, _relay) = controller();
        let released = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&released);
        controller.set_release_hook(move || {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        controller.new_session().unwrap();
        assert_eq!(released.load(Ordering::SeqCst), 0);
        controller.new_session().unwrap();
        assert_eq!(released.load(Ordering::SeqCst), 1);
        controller.dispose();
        controller.dispose();
        assert_eq!(released.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_dispose_releases_active() {
        let (mut controller, _store, _relay) = controller();
        let session = controller.new_session().unwrap();
        controller.dispose();
        controller.dispose();

        assert!(session.is_disposed());
        assert!(matches!(
            controller.require_active(),
            Err(RuntimeError::NoActiveSession)
        ));
    }
}
