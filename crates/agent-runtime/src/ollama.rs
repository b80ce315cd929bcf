//! Ollama Backend
//!
//! Local inference through an Ollama server. Tool results are sent back as
//! user-role context since the chat API has no tool role here.

use agent_core::{
    error::{AgentError, Result},
    message::{Message, Role},
    provider::{CompletionStream, GenerationOptions, LlmProvider, StreamChunk, TokenUsage},
};
use async_trait::async_trait;
use futures::StreamExt;
use ollama_rs::{
    generation::chat::{ChatMessage, MessageRole, request::ChatMessageRequest},
    models::ModelOptions,
    Ollama,
};

/// Where the Ollama server listens
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OllamaConfig {
    /// Scheme and host, e.g. `http://localhost`
    pub host: String,
    pub port: u16,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost".into(),
            port: 11434,
        }
    }
}

impl OllamaConfig {
    /// Read `OLLAMA_HOST` and `OLLAMA_PORT`, falling back to localhost
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            host: lookup("OLLAMA_HOST").unwrap_or(defaults.host),
            port: lookup("OLLAMA_PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
        }
    }
}

/// [`LlmProvider`] backed by Ollama's chat endpoint
pub struct OllamaProvider {
    client: Ollama,
    config: OllamaConfig,
}

impl OllamaProvider {
    pub fn from_config(config: OllamaConfig) -> Self {
        Self {
            client: Ollama::new(&config.host, config.port),
            config,
        }
    }

    /// Connect using `OLLAMA_HOST` / `OLLAMA_PORT`
    pub fn from_env() -> Self {
        Self::from_config(OllamaConfig::from_env())
    }

    pub const fn config(&self) -> &OllamaConfig {
        &self.config
    }

    fn convert_messages(messages: &[Message]) -> Vec<ChatMessage> {
        messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    Role::System => MessageRole::System,
                    Role::User | Role::Tool => MessageRole::User,
                    Role::Assistant => MessageRole::Assistant,
                };
                ChatMessage::new(role, m.content.clone())
            })
            .collect()
    }

    fn usage(prompt: impl TryInto<u32>, completion: impl TryInto<u32>) -> TokenUsage {
        let prompt_tokens = prompt.try_into().unwrap_or(u32::MAX);
        let completion_tokens = completion.try_into().unwrap_or(u32::MAX);
        TokenUsage {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }

    fn request(messages: &[Message], opts: &GenerationOptions) -> ChatMessageRequest {
        let options = ModelOptions::default()
            .temperature(opts.temperature)
            .top_p(opts.top_p)
            .num_predict(i32::try_from(opts.max_tokens).unwrap_or(i32::MAX));

        ChatMessageRequest::new(opts.model.clone(), Self::convert_messages(messages))
            .options(options)
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    async fn health_check(&self) -> Result<bool> {
        match self.client.list_local_models().await {
            Ok(_) => Ok(true),
            Err(e) => {
                tracing::warn!(host = %self.config.host, port = self.config.port, error = %e, "Ollama unreachable");
                Ok(false)
            }
        }
    }

    async fn complete_stream(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<CompletionStream> {
        let stream = self
            .client
            .send_chat_messages_stream(Self::request(messages, options))
            .await
            .map_err(|e| AgentError::ProviderUnavailable(e.to_string()))?;

        let mapped = stream.map(|result| {
            result
                .map(|chunk| StreamChunk {
                    delta: chunk.message.content,
                    done: chunk.done,
                    usage: chunk
                        .final_data
                        .as_ref()
                        .map(|d| Self::usage(d.prompt_eval_count, d.eval_count)),
                })
                .map_err(|_| AgentError::Provider("Ollama stream failed".into()))
        });

        Ok(Box::pin(mapped))
    }
}
