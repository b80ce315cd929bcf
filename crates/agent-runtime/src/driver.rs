//! Prompt Driver
//!
//! Submits one user turn at a time to whichever session is active when the
//! turn starts. Empty input and input that arrives while a turn is running
//! are skipped without output. Failures are reported and swallowed; the
//! driver is usable again as soon as the turn resolves.
//!
//! A turn whose session is swapped out from under it is closed by the swap
//! (see [`PromptDriver::release_hook`]), so its trailer lands before the
//! next session is announced and nothing follows it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use agent_core::AgentSession;

use crate::batcher::DeltaBatcher;
use crate::controller::SessionController;
use crate::error::Result;
use crate::output::OutputSink;

/// How a call to [`PromptDriver::prompt`] ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PromptOutcome {
    /// Empty input, or a turn was already in flight
    Skipped,
    /// The turn finished with this reply
    Completed(String),
    /// The turn was cancelled
    Aborted,
    /// The turn failed; the message was shown to the user
    Failed(String),
}

#[derive(Default)]
struct TurnFlags {
    in_flight: AtomicBool,
    abort_requested: AtomicBool,
    /// Set by whoever writes the running turn's trailer first
    closed: AtomicBool,
}

impl TurnFlags {
    /// Claim the right to write the trailer of the running turn
    fn close(&self) -> bool {
        !self.closed.swap(true, Ordering::SeqCst)
    }
}

/// Clears the in-flight flag however the turn ends
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Serializes prompts against the active session
#[derive(Clone)]
pub struct PromptDriver {
    controller: Arc<Mutex<SessionController>>,
    batcher: DeltaBatcher,
    sink: Arc<dyn OutputSink>,
    flags: Arc<TurnFlags>,
}

impl PromptDriver {
    pub fn new(
        controller: Arc<Mutex<SessionController>>,
        batcher: DeltaBatcher,
        sink: Arc<dyn OutputSink>,
    ) -> Self {
        Self {
            controller,
            batcher,
            sink,
            flags: Arc::new(TurnFlags::default()),
        }
    }

    /// Teardown step for the session controller: flush pending text and, if
    /// a turn is running, close it as aborted. Captures no controller handle.
    pub fn release_hook(&self) -> impl Fn() + Send + Sync + 'static {
        let batcher = self.batcher.clone();
        let sink = Arc::clone(&self.sink);
        let flags = Arc::clone(&self.flags);
        move || {
            batcher.flush();
            if flags.in_flight.load(Ordering::SeqCst) && flags.close() {
                flags.abort_requested.store(true, Ordering::SeqCst);
                sink.write("\n\n");
            }
        }
    }

    fn controller(&self) -> MutexGuard<'_, SessionController> {
        self.controller.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn active_session(&self) -> Result<Arc<AgentSession>> {
        self.controller().require_active()
    }

    /// Whether a turn is running
    pub fn is_in_flight(&self) -> bool {
        self.flags.in_flight.load(Ordering::SeqCst)
    }

    /// Run one turn for `text`
    pub async fn prompt(&self, text: &str) -> PromptOutcome {
        if text.trim().is_empty() {
            return PromptOutcome::Skipped;
        }
        if self
            .flags
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("Prompt skipped, a turn is in flight");
            return PromptOutcome::Skipped;
        }
        let _in_flight = InFlight(&self.flags.in_flight);
        self.flags.abort_requested.store(false, Ordering::SeqCst);
        self.flags.closed.store(false, Ordering::SeqCst);

        self.sink.write("\nAgent: ");
        let outcome = match self.active_session() {
            Ok(session) => match session.prompt(text).await {
                Ok(reply) => PromptOutcome::Completed(reply),
                Err(e) if e.is_abort() || self.flags.abort_requested.load(Ordering::SeqCst) => {
                    PromptOutcome::Aborted
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Turn failed");
                    PromptOutcome::Failed(e.user_message())
                }
            },
            Err(e) => PromptOutcome::Failed(e.user_message()),
        };

        if !self.flags.close() {
            tracing::debug!("Turn already closed by a session swap");
            return PromptOutcome::Aborted;
        }
        self.batcher.flush();
        if let PromptOutcome::Failed(message) = &outcome {
            self.sink.write(&format!("\nError: {message}"));
        }
        self.sink.write("\n\n");
        outcome
    }

    /// Cancel the running turn, if any, and flush pending output. Does not
    /// wait for the turn to resolve.
    pub fn abort(&self) -> bool {
        if !self.is_in_flight() {
            return false;
        }
        self.flags.abort_requested.store(true, Ordering::SeqCst);
        if let Some(session) = self.controller().active() {
            session.abort();
        }
        self.batcher.flush();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::MemorySink;
    use crate::relay::Relay;
    use agent_core::mock::{ScriptedProvider, ScriptedReply};
    use agent_core::{AgentBuilder, MemorySessionStore, SessionScope};

    fn driver(replies: Vec<ScriptedReply>) -> (PromptDriver, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let batcher = DeltaBatcher::with_default_interval(sink.clone());
        let agent = Arc::new(
            AgentBuilder::new()
                .provider(Arc::new(ScriptedProvider::new(replies)))
                .build()
                .unwrap(),
        );
        let relay = Arc::new(Relay::new(batcher.clone(), sink.clone()));
        let mut controller = SessionController::new(
            Arc::new(MemorySessionStore::new()),
            agent,
            SessionScope::new("/work"),
            relay,
        );
        controller.new_session().unwrap();
        let driver = PromptDriver::new(Arc::new(Mutex::new(controller)), batcher, sink.clone());
        (driver, sink)
    }

    async fn wait_in_flight(driver: &PromptDriver) {
        while !driver.is_in_flight() {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_prompt_completes_and_frames_output() {
        let (driver, sink) = driver(vec![ScriptedReply::text(["He", "llo"])]);
        let outcome = driver.prompt("hi").await;

        assert_eq!(outcome, PromptOutcome::Completed("Hello".into()));
        assert_eq!(sink.contents(), "\nAgent: Hello\n\n");
        assert!(!driver.is_in_flight());
    }

    #[tokio::test]
    async fn test_empty_prompt_is_skipped_silently() {
        let (driver, sink) = driver(vec![]);
        assert_eq!(driver.prompt("").await, PromptOutcome::Skipped);
        assert_eq!(driver.prompt("   ").await, PromptOutcome::Skipped);
        assert!(sink.writes().is_empty());
    }

    #[tokio::test]
    async fn test_prompt_while_in_flight_is_skipped() {
        let (driver, sink) = driver(vec![ScriptedReply::text(["..."]).then_hang()]);
        let running = driver.clone();
        let turn = tokio::spawn(async move { running.prompt("first").await });
        wait_in_flight(&driver).await;

        let before = sink.writes().len();
        assert_eq!(driver.prompt("second").await, PromptOutcome::Skipped);
        assert_eq!(sink.writes().len(), before);
        assert!(driver.is_in_flight());

        assert!(driver.abort());
        assert_eq!(turn.await.unwrap(), PromptOutcome::Aborted);
    }

    #[tokio::test]
    async fn test_abort_flushes_and_resolves_aborted() {
        let (driver, sink) = driver(vec![ScriptedReply::text(["partial "]).then_hang()]);
        let running = driver.clone();
        let turn = tokio::spawn(async move { running.prompt("go").await });
        wait_in_flight(&driver).await;
        while !sink.contents().contains("Agent: ") {
            tokio::task::yield_now().await;
        }

        assert!(driver.abort());
        assert_eq!(turn.await.unwrap(), PromptOutcome::Aborted);
        assert!(sink.contents().ends_with("\n\n"));
        assert!(!sink.contents().contains("Error"));
        assert!(!driver.abort());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_reported_and_driver_recovers() {
        let (driver, sink) = driver(vec![
            ScriptedReply::text(["Hal"]).then_fail("connection reset"),
            ScriptedReply::text(["ok"]),
        ]);

        let outcome = driver.prompt("first").await;
        assert!(matches!(outcome, PromptOutcome::Failed(ref m) if m.contains("connection reset")));
        let shown = sink.contents();
        assert!(shown.contains("Hal"));
        assert!(shown.contains("\nError: "));

        sink.clear();
        assert_eq!(driver.prompt("again").await, PromptOutcome::Completed("ok".into()));
        assert_eq!(sink.contents(), "\nAgent: ok\n\n");
    }
}
