//! Output Sinks
//!
//! Everything the runtime shows the user goes through an [`OutputSink`], so
//! the same runtime can drive a terminal or a test buffer.

use std::io::Write;
use std::sync::{Mutex, PoisonError};

/// Destination for user-visible text
pub trait OutputSink: Send + Sync {
    /// Write `text` as-is
    fn write(&self, text: &str);

    /// Write `text` followed by a newline
    fn line(&self, text: &str) {
        self.write(&format!("{text}\n"));
    }
}

/// Writes to stdout and flushes after every write
#[derive(Clone, Copy, Debug, Default)]
pub struct StdoutSink;

impl OutputSink for StdoutSink {
    fn write(&self, text: &str) {
        let mut out = std::io::stdout().lock();
        if let Err(e) = out.write_all(text.as_bytes()).and_then(|()| out.flush()) {
            tracing::warn!(error = %e, "Failed to write to stdout");
        }
    }
}

/// Records every write separately
#[derive(Debug, Default)]
pub struct MemorySink {
    writes: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Each write, in order
    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Everything written, concatenated
    pub fn contents(&self) -> String {
        self.writes().concat()
    }

    pub fn clear(&self) {
        self.writes.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

impl OutputSink for MemorySink {
    fn write(&self, text: &str) {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(text.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_keeps_writes_apart() {
        let sink = MemorySink::new();
        sink.write("a");
        sink.line("b");
        assert_eq!(sink.writes(), vec!["a".to_string(), "b\n".to_string()]);
        assert_eq!(sink.contents(), "ab\n");

        sink.clear();
        assert!(sink.writes().is_empty());
    }
}
