//! Event Relay
//!
//! The listener the runtime subscribes to the active session. Text deltas go
//! through the [`DeltaBatcher`]; tool notifications flush it first so they
//! never land in the middle of a sentence.

use std::sync::Arc;

use agent_core::{AgentEvent, EventListener};

use crate::batcher::DeltaBatcher;
use crate::output::OutputSink;

/// Forwards session events to the terminal
pub struct Relay {
    batcher: DeltaBatcher,
    sink: Arc<dyn OutputSink>,
}

impl Relay {
    pub fn new(batcher: DeltaBatcher, sink: Arc<dyn OutputSink>) -> Self {
        Self { batcher, sink }
    }
}

impl EventListener for Relay {
    fn on_event(&self, event: &AgentEvent) {
        match event {
            AgentEvent::TextDelta { delta } => self.batcher.push(delta),
            AgentEvent::ToolStart { name, args } => {
                self.batcher.flush();
                self.sink.line(&format!("\n🔧 {name}({args})"));
            }
            AgentEvent::ToolEnd { result } => {
                if result.success {
                    self.sink.line("✅ Done\n");
                } else {
                    self.sink.line(&format!("❌ {}\n", result.output));
                }
            }
            AgentEvent::TurnStart => tracing::debug!("Turn started"),
            AgentEvent::TurnEnd => tracing::debug!("Turn ended"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::MemorySink;
    use agent_core::ToolResult;

    fn relay() -> (Relay, DeltaBatcher, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let batcher = DeltaBatcher::with_default_interval(sink.clone());
        (Relay::new(batcher.clone(), sink.clone()), batcher, sink)
    }

    #[tokio::test(start_paused = true)]
    async fn test_tool_start_flushes_pending_text_first() {
        let (relay, batcher, sink) = relay();
        relay.on_event(&AgentEvent::TextDelta { delta: "abc".into() });
        assert_eq!(batcher.pending_len(), 3);

        relay.on_event(&AgentEvent::ToolStart {
            name: "get_weather".into(),
            args: serde_json::json!({"city": "Tokyo"}),
        });

        assert_eq!(
            sink.writes(),
            vec![
                "abc".to_string(),
                "\n🔧 get_weather({\"city\":\"Tokyo\"})\n".to_string(),
            ]
        );
        assert!(!batcher.is_scheduled());
    }

    #[tokio::test]
    async fn test_tool_end_reports_outcome() {
        let (relay, _batcher, sink) = relay();
        relay.on_event(&AgentEvent::ToolEnd {
            result: ToolResult::success("t", "ok"),
        });
        relay.on_event(&AgentEvent::ToolEnd {
            result: ToolResult::failure("t", "Error: boom"),
        });
        assert_eq!(sink.contents(), "✅ Done\n\n❌ Error: boom\n\n");
    }

    #[tokio::test]
    async fn test_turn_markers_write_nothing() {
        let (relay, _batcher, sink) = relay();
        relay.on_event(&AgentEvent::TurnStart);
        relay.on_event(&AgentEvent::TurnEnd);
        assert!(sink.writes().is_empty());
    }
}
