//! Mock LLM Client
//!
//! Scripted client for tests and for running without an API key. Each call
//! pops the next scripted step; once the script is empty the default reply is
//! returned. Every request is recorded for inspection.

use crate::agent::model::{
    ChatMessage, LlmClient, LlmError, LlmResponse, LlmToolCall, ProviderKind,
};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

/// One scripted reaction of the mock.
#[derive(Debug, Clone)]
pub enum MockStep {
    Text(String),
    ToolCalls {
        content: String,
        calls: Vec<LlmToolCall>,
    },
    Fail(String),
}

/// What the mock was asked.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<Value>,
}

#[derive(Debug, Clone)]
pub struct MockLlmClient {
    script: Arc<Mutex<VecDeque<MockStep>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    default_reply: String,
    model_name: String,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
            default_reply: "This is a mock response from the test provider.".to_string(),
            model_name: "mock-model".to_string(),
        }
    }

    /// Mock that answers every request with `reply`.
    pub fn with_reply(reply: impl Into<String>) -> Self {
        let mut mock = Self::new();
        mock.default_reply = reply.into();
        mock
    }

    pub fn with_model_name(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = model_name.into();
        self
    }

    pub fn push_step(&self, step: MockStep) -> &Self {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(step);
        self
    }

    pub fn push_text(&self, content: impl Into<String>) -> &Self {
        self.push_step(MockStep::Text(content.into()))
    }

    /// Script a tool-calling turn. Call ids are generated in order.
    pub fn push_tool_calls(&self, content: impl Into<String>, calls: Vec<(&str, Value)>) -> &Self {
        let calls = calls
            .into_iter()
            .enumerate()
            .map(|(i, (name, arguments))| LlmToolCall {
                id: format!("call_{}", i + 1),
                name: name.to_string(),
                arguments,
            })
            .collect();
        self.push_step(MockStep::ToolCalls {
            content: content.into(),
            calls,
        })
    }

    pub fn push_failure(&self, message: impl Into<String>) -> &Self {
        self.push_step(MockStep::Fail(message.into()))
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn record(&self, messages: &[ChatMessage], tools: &[Value]) {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedRequest {
                messages: messages.to_vec(),
                tools: tools.to_vec(),
            });
    }

    fn next_step(&self) -> MockStep {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| MockStep::Text(self.default_reply.clone()))
    }
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String> {
        let response = self.generate_with_tools(messages, &[]).await?;
        if response.content.is_empty() {
            return Err(LlmError::EmptyResponse.into());
        }
        Ok(response.content)
    }

    async fn generate_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: &[Value],
    ) -> Result<LlmResponse> {
        if messages.is_empty() {
            return Err(LlmError::MissingMessages.into());
        }
        self.record(messages, tools);

        match self.next_step() {
            MockStep::Text(content) => Ok(LlmResponse::text(content)),
            MockStep::ToolCalls { content, calls } => Ok(LlmResponse {
                content,
                tool_calls: calls,
            }),
            MockStep::Fail(message) => Err(LlmError::RequestFailed(message).into()),
        }
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Mock
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_script_then_default() {
        let mock = MockLlmClient::with_reply("fallback");
        mock.push_text("first");
        let messages = [ChatMessage::user("hi")];

        assert_eq!(mock.generate(&messages).await.unwrap(), "first");
        assert_eq!(mock.generate(&messages).await.unwrap(), "fallback");
        assert_eq!(mock.request_count(), 2);
    }

    #[tokio::test]
    async fn test_tool_calls_get_sequential_ids() {
        let mock = MockLlmClient::new();
        mock.push_tool_calls(
            "",
            vec![
                ("get_user_goals", json!({})),
                ("get_available_goals", json!({})),
            ],
        );
        let response = mock
            .generate_with_tools(&[ChatMessage::user("goals?")], &[json!({"type": "function"})])
            .await
            .unwrap();
        let ids: Vec<&str> = response.tool_calls.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["call_1", "call_2"]);
        assert_eq!(mock.requests()[0].tools.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_messages_rejected() {
        let mock = MockLlmClient::new();
        let err = mock.generate(&[]).await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<LlmError>(),
            Some(&LlmError::MissingMessages)
        );
        assert_eq!(mock.request_count(), 0);
    }

    #[tokio::test]
    async fn test_scripted_failure() {
        let mock = MockLlmClient::new();
        mock.push_failure("rate limited");
        let err = mock
            .generate_with_tools(&[ChatMessage::user("hi")], &[])
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "model request failed: rate limited");
    }

    #[tokio::test]
    async fn test_empty_text_is_an_error_for_generate() {
        let mock = MockLlmClient::new();
        mock.push_text("");
        let err = mock.generate(&[ChatMessage::user("hi")]).await.unwrap_err();
        assert_eq!(err.downcast_ref::<LlmError>(), Some(&LlmError::EmptyResponse));
    }
}
