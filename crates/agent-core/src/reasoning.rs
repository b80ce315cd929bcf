//! Reasoning Loop
//!
//! Implements the ReAct (Reason + Act) pattern for one turn: stream a
//! completion, run the tool it asks for, feed the result back, repeat until
//! the model answers without a tool call.

use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::error::{AgentError, Result};
use crate::event::{AgentEvent, EventBus};
use crate::message::{Conversation, Message};
use crate::provider::{GenerationOptions, LlmProvider};
use crate::tool::{ToolCall, ToolRegistry, ToolResult};

/// Agent configuration
#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// System prompt template
    pub system_prompt: String,

    /// Maximum reasoning iterations before giving up
    pub max_iterations: usize,

    /// Generation options
    pub generation: GenerationOptions,

    /// Context budget for requests, in estimated tokens
    pub context_window: u32,

    /// Whether to append tool descriptions to system prompt
    pub inject_tool_descriptions: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            max_iterations: 10,
            generation: GenerationOptions::default(),
            context_window: 128_000,
            inject_tool_descriptions: true,
        }
    }
}

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant. Be concise.";

/// Where a turn reads history from and writes new messages to
pub trait Transcript: Send + Sync {
    /// Conversation so far
    fn snapshot(&self) -> Conversation;

    /// Append and persist one message
    fn record(&self, message: Message) -> Result<()>;
}

/// Per-turn plumbing
pub struct TurnContext<'a> {
    pub events: &'a EventBus,
    pub cancel: &'a CancellationToken,
}

/// Stateless turn engine: provider, tools and configuration
pub struct Agent {
    provider: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    config: AgentConfig,
}

impl Agent {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        tools: Arc<ToolRegistry>,
        config: AgentConfig,
    ) -> Self {
        Self {
            provider,
            tools,
            config,
        }
    }

    /// Build the full system prompt including tool descriptions
    pub fn system_prompt(&self) -> String {
        let mut prompt = self.config.system_prompt.clone();

        if self.config.inject_tool_descriptions && !self.tools.is_empty() {
            prompt.push_str("\n\n");
            prompt.push_str(&self.tools.generate_prompt_section());
        }

        prompt
    }

    /// Run one turn for `input`. Emits text deltas and tool events on
    /// `ctx.events`; resolves to [`AgentError::Aborted`] once `ctx.cancel`
    /// fires.
    pub async fn run_turn(
        &self,
        input: &str,
        transcript: &dyn Transcript,
        ctx: &TurnContext<'_>,
    ) -> Result<String> {
        transcript.record(Message::user(input))?;
        let system_prompt = self.system_prompt();

        for iteration in 1..=self.config.max_iterations {
            let mut history = transcript.snapshot();
            history.set_max_context(self.config.context_window);
            let request = history.request_window(&system_prompt);

            let content = self.stream_completion(&request, ctx).await?;
            transcript.record(Message::assistant(&content))?;

            let Some(tool_call) = parse_tool_call(&content) else {
                return Ok(content);
            };

            tracing::debug!(tool = %tool_call.name, iteration, "Executing tool");
            ctx.events.emit(&AgentEvent::ToolStart {
                name: tool_call.name.clone(),
                args: tool_call.arguments_json(),
            });

            let result = tokio::select! {
                biased;
                () = ctx.cancel.cancelled() => return Err(AgentError::Aborted),
                result = self.execute_tool(&tool_call) => result,
            };

            ctx.events.emit(&AgentEvent::ToolEnd {
                result: result.clone(),
            });
            transcript.record(Message::tool(format_tool_result(&result), tool_call.id.clone()))?;
        }

        Err(AgentError::MaxIterations(self.config.max_iterations))
    }

    async fn stream_completion(&self, request: &[Message], ctx: &TurnContext<'_>) -> Result<String> {
        let mut stream = tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => return Err(AgentError::Aborted),
            stream = self.provider.complete_stream(request, &self.config.generation) => stream?,
        };

        let mut content = String::new();
        loop {
            let next = tokio::select! {
                biased;
                () = ctx.cancel.cancelled() => return Err(AgentError::Aborted),
                next = stream.next() => next,
            };
            match next {
                None => break,
                Some(Err(e)) => return Err(e),
                Some(Ok(chunk)) => {
                    if !chunk.delta.is_empty() {
                        content.push_str(&chunk.delta);
                        ctx.events.emit(&AgentEvent::TextDelta { delta: chunk.delta });
                    }
                    if chunk.done {
                        break;
                    }
                }
            }
        }

        Ok(content)
    }

    /// Execute a tool call; failures become failed results for the model
    async fn execute_tool(&self, call: &ToolCall) -> ToolResult {
        match self.tools.execute(call).await {
            Ok(mut result) => {
                result.id.clone_from(&call.id);
                result
            }
            Err(e) => ToolResult {
                name: call.name.clone(),
                id: call.id.clone(),
                success: false,
                output: format!("Error: {e}"),
                data: None,
            },
        }
    }

    /// Get the tool registry
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Get configuration
    pub const fn config(&self) -> &AgentConfig {
        &self.config
    }
}

/// Parse a tool call from an assistant reply: a fenced ```` ```tool ````
/// block, else an inline JSON object with a `"tool"` key.
pub fn parse_tool_call(content: &str) -> Option<ToolCall> {
    const TOOL_START: &str = "```tool";
    const TOOL_END: &str = "```";

    if let Some(start_idx) = content.find(TOOL_START) {
        let after_marker = &content[start_idx + TOOL_START.len()..];
        if let Some(end_idx) = after_marker.find(TOOL_END) {
            let json_str = after_marker[..end_idx].trim();
            if let Ok(call) = serde_json::from_str::<ToolCall>(json_str) {
                return Some(with_call_id(call));
            }
        }
    }

    parse_inline_tool_call(content).map(with_call_id)
}

fn parse_inline_tool_call(content: &str) -> Option<ToolCall> {
    if !content.contains(r#""tool""#) {
        return None;
    }

    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if end <= start {
        return None;
    }

    serde_json::from_str::<ToolCall>(&content[start..=end]).ok()
}

fn with_call_id(mut call: ToolCall) -> ToolCall {
    if call.id.is_none() {
        call.id = Some(uuid::Uuid::new_v4().to_string());
    }
    call
}

/// Format tool result for conversation
fn format_tool_result(result: &ToolResult) -> String {
    if result.success {
        format!("[Tool '{}' returned]\n{}", result.name, result.output)
    } else {
        format!("[Tool '{}' failed]\n{}", result.name, result.output)
    }
}

/// Builder for Agent configuration
pub struct AgentBuilder {
    provider: Option<Arc<dyn LlmProvider>>,
    tools: Arc<ToolRegistry>,
    config: AgentConfig,
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            tools: Arc::new(ToolRegistry::new()),
            config: AgentConfig::default(),
        }
    }

    #[must_use]
    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    #[must_use]
    pub fn tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = tools;
        self
    }

    #[must_use]
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = prompt.into();
        self
    }

    #[must_use]
    pub fn generation(mut self, generation: GenerationOptions) -> Self {
        self.config.generation = generation;
        self
    }

    #[must_use]
    pub const fn context_window(mut self, tokens: u32) -> Self {
        self.config.context_window = tokens;
        self
    }

    #[must_use]
    pub const fn max_iterations(mut self, max: usize) -> Self {
        self.config.max_iterations = max;
        self
    }

    pub fn build(self) -> Result<Agent> {
        let provider = self
            .provider
            .ok_or_else(|| AgentError::Config("Provider is required".into()))?;

        Ok(Agent::new(provider, self.tools, self.config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{ScriptedProvider, ScriptedReply};
    use crate::tool::CurrentTimeTool;
    use std::sync::{Mutex, PoisonError};

    #[derive(Default)]
    struct MemoryTranscript(Mutex<Conversation>);

    impl Transcript for MemoryTranscript {
        fn snapshot(&self) -> Conversation {
            self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
        }

        fn record(&self, message: Message) -> Result<()> {
            self.0.lock().unwrap_or_else(PoisonError::into_inner).push(message);
            Ok(())
        }
    }

    fn collect(bus: &EventBus) -> (Arc<Mutex<Vec<AgentEvent>>>, crate::event::Subscription) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sub = bus.subscribe(Arc::new(move |e: &AgentEvent| {
            sink.lock().unwrap().push(e.clone());
        }));
        (seen, sub)
    }

    #[test]
    fn test_parse_tool_call_fenced() {
        let content = r#"Let me check that for you.
```tool
{"tool": "get_weather", "arguments": {"city": "Tokyo"}}
```"#;
        let call = parse_tool_call(content).unwrap();
        assert_eq!(call.name, "get_weather");
        assert_eq!(call.str_arg("city"), Some("Tokyo"));
        assert!(call.id.is_some());
    }

    #[test]
    fn test_parse_tool_call_inline_and_none() {
        let call = parse_tool_call(r#"{"tool": "get_current_time", "arguments": {}}"#).unwrap();
        assert_eq!(call.name, "get_current_time");
        assert!(parse_tool_call("Just a plain answer.").is_none());
    }

    #[tokio::test]
    async fn test_turn_streams_deltas_and_runs_tools() {
        let provider = Arc::new(ScriptedProvider::new([
            ScriptedReply::tool_call("get_current_time", &serde_json::json!({})),
            ScriptedReply::text(["It is ", "now."]),
        ]));
        let mut tools = ToolRegistry::new();
        tools.register(CurrentTimeTool);
        let agent = AgentBuilder::new()
            .provider(provider.clone())
            .tools(Arc::new(tools))
            .build()
            .unwrap();

        let bus = EventBus::new();
        let (seen, _sub) = collect(&bus);
        let cancel = CancellationToken::new();
        let transcript = MemoryTranscript::default();

        let answer = agent
            .run_turn("what time is it?", &transcript, &TurnContext { events: &bus, cancel: &cancel })
            .await
            .unwrap();
        assert_eq!(answer, "It is now.");

        let events = seen.lock().unwrap().clone();
        let tool_start = events.iter().position(|e| matches!(e, AgentEvent::ToolStart { name, .. } if name == "get_current_time"));
        let tool_end = events.iter().position(|e| matches!(e, AgentEvent::ToolEnd { result } if result.success));
        assert!(tool_start.unwrap() < tool_end.unwrap());
        assert_eq!(events.last(), Some(&AgentEvent::TextDelta { delta: "now.".into() }));

        // user, assistant(tool call), tool result, assistant answer
        assert_eq!(transcript.snapshot().len(), 4);
        // the second request carries the tool result, after the system prompt
        let second = &provider.requests()[1];
        assert_eq!(second[0].role, crate::message::Role::System);
        assert!(second.last().unwrap().content.contains("get_current_time"));
    }

    #[tokio::test]
    async fn test_cancelled_turn_reports_abort() {
        let provider = Arc::new(ScriptedProvider::new([ScriptedReply::text(["thinking"]).then_hang()]));
        let agent = AgentBuilder::new().provider(provider).build().unwrap();
        let bus = EventBus::new();
        let cancel = CancellationToken::new();
        let transcript = MemoryTranscript::default();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            trigger.cancel();
        });

        let err = agent
            .run_turn("hi", &transcript, &TurnContext { events: &bus, cancel: &cancel })
            .await
            .unwrap_err();
        assert!(err.is_abort());
    }

    #[tokio::test]
    async fn test_iteration_limit() {
        let call = ScriptedReply::tool_call("missing_tool", &serde_json::json!({}));
        let provider = Arc::new(ScriptedProvider::new([call.clone(), call]));
        let agent = AgentBuilder::new().provider(provider).max_iterations(2).build().unwrap();
        let bus = EventBus::new();
        let cancel = CancellationToken::new();

        let err = agent
            .run_turn("loop", &MemoryTranscript::default(), &TurnContext { events: &bus, cancel: &cancel })
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::MaxIterations(2)));
    }

    #[test]
    fn test_builder_requires_provider() {
        assert!(matches!(AgentBuilder::new().build(), Err(AgentError::Config(_))));
    }
}
