//! LLM client abstraction.
//!
//! The orchestrator talks to models only through [`LlmClient`], so tests can
//! swap in the scripted mock and production can use the OpenAI-compatible client.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::types::MessageRole;

/// One entry of the context sent to a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }
}

/// Tool call requested by a model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmToolCall {
    pub id: String,
    pub name: String,
    /// Parsed arguments; `{}` when the model sent something unparseable.
    pub arguments: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: String,
    #[serde(default)]
    pub tool_calls: Vec<LlmToolCall>,
}

impl LlmResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LlmError {
    #[error("no messages to send to the model")]
    MissingMessages,
    #[error("model returned an empty response")]
    EmptyResponse,
    #[error("model request failed: {0}")]
    RequestFailed(String),
}

/// Types of LLM providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Mock,
    #[cfg(feature = "openai")]
    OpenAI,
}

impl ProviderKind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "mock" => Some(ProviderKind::Mock),
            #[cfg(feature = "openai")]
            "openai" => Some(ProviderKind::OpenAI),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Mock => "mock",
            #[cfg(feature = "openai")]
            ProviderKind::OpenAI => "openai",
        }
    }
}

/// Core trait that all LLM clients implement
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Plain completion without tools.
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String>;

    /// Completion that may request tool calls. `tools` are chat-completions
    /// function schemas; an empty slice disables tool calling.
    async fn generate_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: &[Value],
    ) -> Result<LlmResponse>;

    fn model_name(&self) -> &str;

    fn kind(&self) -> ProviderKind;
}
