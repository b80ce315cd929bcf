//! Model Providers
//!
//! [`LlmProvider`] is the only thing a session knows about the model behind
//! it. Backends (Ollama, a scripted test double, hosted APIs) implement it;
//! sessions never branch on which one they got.
//!
//! ```rust,ignore
//! let mut stream = provider.complete_stream(&request, &options).await?;
//! while let Some(chunk) = stream.next().await {
//!     print!("{}", chunk?.delta);
//! }
//! ```

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::message::Message;

/// Sampling settings sent with every request
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Model id as the backend knows it
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Cap on generated tokens per reply
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_top_p")]
    pub top_p: f32,
}

const fn default_temperature() -> f32 {
    0.7
}

const fn default_max_tokens() -> u32 {
    8192
}

const fn default_top_p() -> f32 {
    0.9
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            model: "llama3.2".into(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            top_p: default_top_p(),
        }
    }
}

/// Token accounting reported by the backend
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// One piece of a streamed reply
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Text added by this chunk, possibly empty
    pub delta: String,

    /// Set on the last chunk
    pub done: bool,

    /// Usually only present on the last chunk
    pub usage: Option<TokenUsage>,
}

impl StreamChunk {
    /// A non-final chunk carrying `delta`
    pub fn text(delta: impl Into<String>) -> Self {
        Self {
            delta: delta.into(),
            done: false,
            usage: None,
        }
    }
}

/// Streamed reply; ends after the `done` chunk or an error
pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>;

/// Model backend
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Whether the backend answers at all. Connection failures are `Ok(false)`.
    async fn health_check(&self) -> Result<bool>;

    /// Generate a reply to `messages` chunk by chunk
    async fn complete_stream(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<CompletionStream>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_options_defaults() {
        let opts = GenerationOptions::default();
        assert!((opts.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(opts.max_tokens, 8192);
        assert_eq!(opts.model, "llama3.2");
    }

    #[test]
    fn test_options_fill_missing_fields() {
        let opts: GenerationOptions = serde_json::from_str(r#"{"model": "qwen2.5"}"#).unwrap();
        assert_eq!(opts.model, "qwen2.5");
        assert_eq!(opts.max_tokens, 8192);
    }

    #[test]
    fn test_stream_chunk_text() {
        let chunk = StreamChunk::text("He");
        assert_eq!(chunk.delta, "He");
        assert!(!chunk.done);
    }
}
