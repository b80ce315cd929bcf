//! Confirmation Gate
//!
//! A single-slot rendezvous between a tool that needs a human decision and
//! whatever supplies that decision: a line channel fed by the terminal, a
//! test, or a programmatic [`ConfirmationGate::confirm`] /
//! [`ConfirmationGate::cancel`].
//!
//! Only one wait may be outstanding. A second
//! [`ConfirmationGate::wait_for_confirmation`] while the first is pending is
//! rejected with [`RuntimeError::ConfirmationPending`]; the first waiter is
//! left untouched. A slot whose waiter has gone away counts as free.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{Result, RuntimeError};

/// Outcome of a confirmation request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Confirmation {
    pub confirmed: bool,
}

/// Interpret a typed answer: `y` or `yes` in any case confirms, anything
/// else declines.
pub fn parse_decision(input: &str) -> bool {
    matches!(input.trim().to_lowercase().as_str(), "y" | "yes")
}

#[derive(Default)]
struct GateState {
    slot: Option<oneshot::Sender<bool>>,
    listener: Option<JoinHandle<()>>,
}

impl GateState {
    fn has_waiter(&self) -> bool {
        self.slot.as_ref().is_some_and(|tx| !tx.is_closed())
    }
}

/// Human-confirmation rendezvous
#[derive(Clone, Default)]
pub struct ConfirmationGate {
    state: Arc<Mutex<GateState>>,
}

impl ConfirmationGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Suspend until a decision arrives
    pub async fn wait_for_confirmation(&self) -> Result<Confirmation> {
        let rx = {
            let mut state = self.state();
            if state.has_waiter() {
                tracing::warn!("Rejected a second confirmation request");
                return Err(RuntimeError::ConfirmationPending);
            }
            let (tx, rx) = oneshot::channel();
            state.slot = Some(tx);
            rx
        };

        tracing::debug!("Waiting for confirmation");
        rx.await
            .map(|confirmed| Confirmation { confirmed })
            .map_err(|_| RuntimeError::ConfirmationDropped)
    }

    /// Whether a waiter is suspended on the gate
    pub fn is_pending(&self) -> bool {
        self.state().has_waiter()
    }

    /// Resolve the pending wait with `confirmed`. Returns whether a waiter
    /// received it.
    pub fn resolve(&self, confirmed: bool) -> bool {
        let Some(tx) = self.state().slot.take() else {
            return false;
        };
        let delivered = tx.send(confirmed).is_ok();
        if delivered {
            tracing::debug!(confirmed, "Confirmation resolved");
        }
        delivered
    }

    /// Resolve the pending wait from a typed answer
    pub fn answer(&self, input: &str) -> bool {
        self.resolve(parse_decision(input))
    }

    /// Force-resolve as confirmed. No-op when nothing is pending.
    pub fn confirm(&self) -> bool {
        self.resolve(true)
    }

    /// Force-resolve as declined. No-op when nothing is pending.
    pub fn cancel(&self) -> bool {
        self.resolve(false)
    }

    /// Feed decisions from a line channel. Each received line answers the
    /// pending wait, if any. Replaces a previously attached channel.
    pub fn attach(&self, mut lines: mpsc::UnboundedReceiver<String>) {
        let gate = self.clone();
        let listener = tokio::spawn(async move {
            while let Some(line) = lines.recv().await {
                if !gate.answer(&line) {
                    tracing::debug!("Decision arrived with nothing pending");
                }
            }
        });

        if let Some(previous) = self.state().listener.replace(listener) {
            previous.abort();
        }
    }

    /// Detach the decision channel and decline any pending wait
    pub fn cleanup(&self) {
        let listener = self.state().listener.take();
        if let Some(listener) = listener {
            listener.abort();
        }
        self.cancel();
    }
}
