//! OpenAI Model Client
//!
//! Chat-completions client built on the async-openai crate. Works against any
//! OpenAI-compatible endpoint through `with_base_url`.

use crate::agent::function_calling::{parse_tool_arguments, schema_to_openai_tool};
use crate::agent::model::{
    ChatMessage, LlmClient, LlmError, LlmResponse, LlmToolCall, ProviderKind,
};
use crate::types::MessageRole;
use anyhow::{anyhow, Result};
use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        ChatCompletionToolChoiceOption, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: Option<f32>,
}

impl OpenAiClient {
    /// Client using the OPENAI_API_KEY environment variable.
    pub fn new() -> Self {
        Self::with_config(OpenAIConfig::new())
    }

    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self::with_config(OpenAIConfig::new().with_api_key(api_key))
    }

    pub fn with_config(config: OpenAIConfig) -> Self {
        Self {
            client: Client::with_config(config),
            model: DEFAULT_MODEL.to_string(),
            temperature: None,
        }
    }

    /// Same key, different endpoint.
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self::with_config(
            OpenAIConfig::new()
                .with_api_key(api_key)
                .with_api_base(base_url),
        )
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    fn build_messages(&self, messages: &[ChatMessage]) -> Result<Vec<ChatCompletionRequestMessage>> {
        messages
            .iter()
            .map(|message| {
                let content = message.content.clone();
                let built = match message.role {
                    MessageRole::System => ChatCompletionRequestSystemMessageArgs::default()
                        .content(content)
                        .build()
                        .map(ChatCompletionRequestMessage::System),
                    MessageRole::User => ChatCompletionRequestUserMessageArgs::default()
                        .content(content)
                        .build()
                        .map(ChatCompletionRequestMessage::User),
                    MessageRole::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                        .content(content)
                        .build()
                        .map(ChatCompletionRequestMessage::Assistant),
                };
                built.map_err(|e| anyhow!("Failed to build {} message: {}", message.role, e))
            })
            .collect()
    }
}

impl Default for OpenAiClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
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

        let mut request_builder = CreateChatCompletionRequestArgs::default();
        request_builder
            .model(&self.model)
            .messages(self.build_messages(messages)?);

        if let Some(temp) = self.temperature {
            request_builder.temperature(temp);
        }

        let openai_tools: Vec<_> = tools.iter().filter_map(schema_to_openai_tool).collect();
        if !openai_tools.is_empty() {
            request_builder
                .tools(openai_tools)
                .tool_choice(ChatCompletionToolChoiceOption::Auto);
        }

        let request = request_builder
            .build()
            .map_err(|e| anyhow!("Failed to build request: {}", e))?;

        debug!(model = %self.model, messages = messages.len(), tools = tools.len(), "Sending chat completion request");

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| LlmError::RequestFailed(format!("OpenAI API error: {}", e)))?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or(LlmError::EmptyResponse)?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| LlmToolCall {
                id: call.id,
                arguments: parse_tool_arguments(&call.function.arguments),
                name: call.function.name,
            })
            .collect();

        Ok(LlmResponse {
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAI
    }
}
