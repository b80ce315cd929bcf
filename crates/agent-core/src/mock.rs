//! Scripted Provider
//!
//! Deterministic [`LlmProvider`] for tests and offline demos. Each request
//! consumes the next queued [`ScriptedReply`].

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use crate::error::{AgentError, Result};
use crate::message::Message;
use crate::provider::{CompletionStream, GenerationOptions, LlmProvider, StreamChunk};

/// How a scripted reply ends after its chunks
#[derive(Clone, Debug)]
pub enum ReplyEnd {
    /// Stream finishes normally
    Done,
    /// Stream yields a provider error
    Fail(String),
    /// Stream never finishes; only cancellation ends the turn
    Hang,
}

/// One queued reply
#[derive(Clone, Debug)]
pub struct ScriptedReply {
    pub chunks: Vec<String>,
    pub end: ReplyEnd,
}

impl ScriptedReply {
    pub fn text<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            chunks: chunks.into_iter().map(Into::into).collect(),
            end: ReplyEnd::Done,
        }
    }

    /// A reply whose text is a single tool-call block
    pub fn tool_call(name: &str, arguments: &serde_json::Value) -> Self {
        let call = serde_json::json!({ "tool": name, "arguments": arguments });
        Self::text([format!("```tool\n{call}\n```")])
    }

    #[must_use]
    pub fn then_fail(mut self, message: impl Into<String>) -> Self {
        self.end = ReplyEnd::Fail(message.into());
        self
    }

    #[must_use]
    pub fn then_hang(mut self) -> Self {
        self.end = ReplyEnd::Hang;
        self
    }
}

/// Provider that replays queued replies
#[derive(Default)]
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<ScriptedReply>>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedProvider {
    pub fn new(replies: impl IntoIterator<Item = ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue another reply
    pub fn push(&self, reply: ScriptedReply) {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(reply);
    }

    /// Every request received so far, in order
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn next_reply(&self, messages: &[Message]) -> Result<ScriptedReply> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(messages.to_vec());
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .ok_or_else(|| AgentError::Provider("no scripted reply left".into()))
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    async fn complete_stream(
        &self,
        messages: &[Message],
        _options: &GenerationOptions,
    ) -> Result<CompletionStream> {
        let reply = self.next_reply(messages)?;
        let head = stream::iter(reply.chunks.into_iter().map(|c| Ok(StreamChunk::text(c))));

        let stream: CompletionStream = match reply.end {
            ReplyEnd::Done => Box::pin(head.chain(stream::once(async {
                Ok(StreamChunk {
                    delta: String::new(),
                    done: true,
                    usage: None,
                })
            }))),
            ReplyEnd::Fail(message) => {
                Box::pin(head.chain(stream::once(async move { Err(AgentError::Provider(message)) })))
            }
            ReplyEnd::Hang => Box::pin(head.chain(stream::pending())),
        };
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replies_are_consumed_in_order() {
        let provider = ScriptedProvider::new([
            ScriptedReply::text(["He", "llo"]),
            ScriptedReply::text(["again"]),
        ]);
        let options = GenerationOptions::default();

        let first: Vec<_> = provider
            .complete_stream(&[Message::user("hi")], &options)
            .await
            .unwrap()
            .map(|chunk| chunk.unwrap().delta)
            .collect()
            .await;
        assert_eq!(first.concat(), "Hello");

        let mut stream = provider.complete_stream(&[], &options).await.unwrap();
        let chunk = stream.next().await.unwrap().unwrap();
        assert_eq!(chunk.delta, "again");
        assert!(stream.next().await.unwrap().unwrap().done);
        assert!(stream.next().await.is_none());

        assert_eq!(provider.requests().len(), 2);
        assert!(provider.complete_stream(&[], &options).await.is_err());
    }

    #[test]
    fn test_hang_replaces_earlier_failure() {
        let reply = ScriptedReply::text(["x"]).then_fail("boom").then_hang();
        assert!(matches!(reply.end, ReplyEnd::Hang));
    }

    #[tokio::test]
    async fn test_failing_reply_streams_error_last() {
        let provider = ScriptedProvider::new([ScriptedReply::text(["partial"]).then_fail("boom")]);
        let mut stream = provider
            .complete_stream(&[], &GenerationOptions::default())
            .await
            .unwrap();

        assert!(stream.next().await.unwrap().is_ok());
        let err = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(err, AgentError::Provider(msg) if msg == "boom"));
    }
}
