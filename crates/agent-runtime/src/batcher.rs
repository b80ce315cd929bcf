//! Delta Batcher
//!
//! Coalesces the token-sized text deltas of a streaming reply into fewer,
//! larger writes. The first [`DeltaBatcher::push`] after a flush schedules a
//! flush `interval` later; everything pushed before then goes out in one
//! write. [`DeltaBatcher::flush`] cancels the scheduled flush and writes
//! whatever is pending right away.
//!
//! ```text
//! push("He") ──┐
//! push("llo") ─┼── 32ms ──► sink.write("Hello")
//!              │
//! flush() ─────┴──────────► sink.write(pending), timer cancelled
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::output::OutputSink;

/// Default delay between the first pending delta and its flush
pub const DEFAULT_BATCH_INTERVAL: Duration = Duration::from_millis(32);

#[derive(Default)]
struct BatchState {
    pending: String,
    timer: Option<JoinHandle<()>>,
    /// Bumped on every schedule and flush; a timer only fires for its own
    /// generation
    generation: u64,
}

struct Inner {
    sink: Arc<dyn OutputSink>,
    interval: Duration,
    state: Mutex<BatchState>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, BatchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write out pending text. The sink is called under the lock so writes
    /// never reorder.
    fn drain(&self, state: &mut BatchState) {
        if !state.pending.is_empty() {
            let text = std::mem::take(&mut state.pending);
            self.sink.write(&text);
        }
    }
}

/// Time-windowed text coalescer
#[derive(Clone)]
pub struct DeltaBatcher {
    inner: Arc<Inner>,
}

impl DeltaBatcher {
    pub fn new(sink: Arc<dyn OutputSink>, interval: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                sink,
                interval,
                state: Mutex::new(BatchState::default()),
            }),
        }
    }

    pub fn with_default_interval(sink: Arc<dyn OutputSink>) -> Self {
        Self::new(sink, DEFAULT_BATCH_INTERVAL)
    }

    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    /// Queue `delta`, scheduling a flush if none is scheduled
    pub fn push(&self, delta: &str) {
        if delta.is_empty() {
            return;
        }

        let mut state = self.inner.state();
        state.pending.push_str(delta);
        if state.timer.is_some() {
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            // Outside a runtime there is no timer to wait on
            self.inner.drain(&mut state);
            return;
        };

        state.generation += 1;
        let generation = state.generation;
        let inner = Arc::clone(&self.inner);
        state.timer = Some(handle.spawn(async move {
            tokio::time::sleep(inner.interval).await;
            let mut state = inner.state();
            if state.generation == generation {
                state.timer = None;
                inner.drain(&mut state);
            }
        }));
    }

    /// Cancel the scheduled flush and write pending text now. No write
    /// happens when nothing is pending.
    pub fn flush(&self) {
        let mut state = self.inner.state();
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.generation += 1;
        self.inner.drain(&mut state);
    }

    /// Text waiting for the next flush
    pub fn pending_len(&self) -> usize {
        self.inner.state().pending.len()
    }

    /// Whether a timed flush is scheduled
    pub fn is_scheduled(&self) -> bool {
        self.inner.state().timer.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::MemorySink;

    fn batcher() -> (DeltaBatcher, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        (DeltaBatcher::with_default_interval(sink.clone()), sink)
    }

    #[tokio::test(start_paused = true)]
    async fn test_deltas_within_interval_coalesce() {
        let (batcher, sink) = batcher();
        batcher.push("He");
        batcher.push("llo");
        assert!(sink.writes().is_empty());
        assert!(batcher.is_scheduled());

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(sink.writes(), vec!["Hello".to_string()]);
        assert!(!batcher.is_scheduled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_writes_now_and_cancels_timer() {
        let (batcher, sink) = batcher();
        batcher.push("abc");
        batcher.flush();
        assert_eq!(sink.writes(), vec!["abc".to_string()]);
        assert!(!batcher.is_scheduled());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(sink.writes().len(), 1);
    }

    #[tokio::test]
    async fn test_flush_on_empty_buffer_writes_nothing() {
        let (batcher, sink) = batcher();
        batcher.flush();
        batcher.flush();
        assert!(sink.writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_text_lost_or_duplicated() {
        let (batcher, sink) = batcher();
        let deltas = ["The ", "quick ", "brown ", "fox ", "jumps"];

        for (i, delta) in deltas.iter().enumerate() {
            batcher.push(delta);
            if i % 2 == 0 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            if i == 3 {
                batcher.flush();
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        batcher.flush();

        assert_eq!(sink.contents(), deltas.concat());
        assert!(sink.writes().len() > 1);
        assert_eq!(batcher.pending_len(), 0);
    }

    #[test]
    fn test_push_without_runtime_writes_immediately() {
        let (batcher, sink) = batcher();
        batcher.push("x");
        assert_eq!(sink.contents(), "x");
    }
}
