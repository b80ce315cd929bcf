//! Session Events
//!
//! [`AgentEvent`] is the closed set of events a session emits during a turn.
//! Listeners attach to an [`EventBus`] and get a [`Subscription`] back;
//! dropping the subscription detaches the listener.
//!
//! ```text
//! TurnStart ─┬─ TextDelta* ─┬─ ToolStart ── ToolEnd ─┬─ ... ── TurnEnd
//!            └──────────────┴────────────────────────┘
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::{Deserialize, Serialize};

use crate::tool::ToolResult;

/// Events emitted by a session while a turn runs
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// A turn has begun
    TurnStart,

    /// Incremental assistant text
    TextDelta { delta: String },

    /// A tool is about to run
    ToolStart {
        name: String,
        args: serde_json::Value,
    },

    /// A tool finished
    ToolEnd { result: ToolResult },

    /// The turn is over, successfully or not
    TurnEnd,
}

/// Receives events from a bus
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &AgentEvent);
}

impl<F> EventListener for F
where
    F: Fn(&AgentEvent) + Send + Sync,
{
    fn on_event(&self, event: &AgentEvent) {
        self(event);
    }
}

/// One attached listener. Delivery holds `attached` for the duration of the
/// call, so detaching waits for a delivery already in progress.
struct Slot {
    listener: Arc<dyn EventListener>,
    attached: Mutex<bool>,
}

impl Slot {
    fn deliver(&self, event: &AgentEvent) {
        let attached = self.attached.lock().unwrap_or_else(PoisonError::into_inner);
        if *attached {
            self.listener.on_event(event);
        }
    }

    fn detach(&self) {
        *self.attached.lock().unwrap_or_else(PoisonError::into_inner) = false;
    }
}

#[derive(Default)]
struct BusState {
    next_id: u64,
    listeners: Vec<(u64, Arc<Slot>)>,
    closed: bool,
}

/// Fan-out of events to the current listeners
#[derive(Clone, Default)]
pub struct EventBus {
    state: Arc<Mutex<BusState>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach a listener. On a closed bus the returned subscription is inert.
    pub fn subscribe(&self, listener: Arc<dyn EventListener>) -> Subscription {
        let mut state = self.state();
        if state.closed {
            return Subscription {
                id: 0,
                bus: Weak::new(),
                slot: None,
            };
        }
        state.next_id += 1;
        let id = state.next_id;
        let slot = Arc::new(Slot {
            listener,
            attached: Mutex::new(true),
        });
        state.listeners.push((id, Arc::clone(&slot)));
        Subscription {
            id,
            bus: Arc::downgrade(&self.state),
            slot: Some(slot),
        }
    }

    /// Deliver `event` to every listener attached at the time of the call
    /// that is still attached when its turn comes. Listeners run outside the
    /// bus lock and may subscribe others, but must not detach themselves from
    /// inside `on_event`.
    pub fn emit(&self, event: &AgentEvent) {
        let slots: Vec<_> = self
            .state()
            .listeners
            .iter()
            .map(|(_, slot)| Arc::clone(slot))
            .collect();
        for slot in slots {
            slot.deliver(event);
        }
    }

    /// Detach every listener and refuse new ones. Returns once no listener
    /// of this bus is running.
    pub fn close(&self) {
        let slots = {
            let mut state = self.state();
            state.closed = true;
            std::mem::take(&mut state.listeners)
        };
        for (_, slot) in slots {
            slot.detach();
        }
    }

    pub fn listener_count(&self) -> usize {
        self.state().listeners.len()
    }
}

/// Handle for one attached listener
#[must_use = "dropping a subscription detaches its listener"]
pub struct Subscription {
    id: u64,
    bus: Weak<Mutex<BusState>>,
    slot: Option<Arc<Slot>>,
}

impl Subscription {
    /// Detach the listener now. Waits for a delivery to it that is already
    /// running on another thread.
    pub fn unsubscribe(self) {
        drop(self);
    }

    /// Whether the listener is still attached
    pub fn is_active(&self) -> bool {
        self.bus.upgrade().is_some_and(|state| {
            state
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .listeners
                .iter()
                .any(|(id, _)| *id == self.id)
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(state) = self.bus.upgrade() {
            state
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .listeners
                .retain(|(id, _)| *id != self.id);
        }
        if let Some(slot) = &self.slot {
            slot.detach();
        }
    }
}
