//! Two-phase tool-calling conversation turn.
//!
//! The first model call sees every registered tool. When it asks for tools,
//! the calls run in order, the exchange is recorded as one assistant message,
//! and a second call without tools writes the reply.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::agent::model::{ChatMessage, LlmClient, LlmToolCall};
use crate::agent::system_prompt::SystemPromptBuilder;
use crate::persistence::Persistence;
use crate::tools::registry::{FunctionCall, FunctionCallOutcome, ToolRegistry};

pub const APOLOGY_MESSAGE: &str =
    "I encountered an error while processing your request. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeneratedKind {
    /// JSON record of the tool calls and their results.
    ToolExchange,
    Reply,
}

/// One assistant message produced by a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedMessage {
    pub kind: GeneratedKind,
    pub content: String,
}

impl GeneratedMessage {
    pub fn reply(content: impl Into<String>) -> Self {
        Self {
            kind: GeneratedKind::Reply,
            content: content.into(),
        }
    }

    pub fn tool_exchange(content: impl Into<String>) -> Self {
        Self {
            kind: GeneratedKind::ToolExchange,
            content: content.into(),
        }
    }
}

/// Result of the first model call after its tool calls have run.
struct FirstPass {
    content: String,
    tool_calls: Vec<LlmToolCall>,
    tool_results: Vec<FunctionCallOutcome>,
}

pub struct ConversationOrchestrator {
    client: Arc<dyn LlmClient>,
    registry: ToolRegistry,
    persistence: Persistence,
    user_id: Uuid,
}

impl ConversationOrchestrator {
    /// Orchestrator with the full tool set bound to `user_id` and `chat_id`.
    pub fn new(
        client: Arc<dyn LlmClient>,
        persistence: Persistence,
        user_id: Uuid,
        chat_id: Uuid,
    ) -> Self {
        let registry = ToolRegistry::for_user(persistence.clone(), user_id, chat_id);
        Self::with_registry(client, registry, persistence, user_id)
    }

    pub fn with_registry(
        client: Arc<dyn LlmClient>,
        registry: ToolRegistry,
        persistence: Persistence,
        user_id: Uuid,
    ) -> Self {
        Self {
            client,
            registry,
            persistence,
            user_id,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Run one turn. `history` already ends with the new user message.
    ///
    /// Never fails: any error becomes a single apology reply.
    pub async fn generate_response(&self, history: &[ChatMessage]) -> Vec<GeneratedMessage> {
        info!(
            user_id = %self.user_id,
            history = history.len(),
            "Starting conversation turn"
        );
        match self.run_turn(history).await {
            Ok(messages) => {
                debug!(count = messages.len(), "Conversation turn produced messages");
                messages
            }
            Err(err) => {
                error!(user_id = %self.user_id, error = %format!("{:#}", err), "Conversation turn failed");
                vec![GeneratedMessage::reply(APOLOGY_MESSAGE)]
            }
        }
    }

    async fn run_turn(&self, history: &[ChatMessage]) -> Result<Vec<GeneratedMessage>> {
        let context = self.build_context(history).await;
        let first = self.first_pass(&context).await?;

        if first.tool_calls.is_empty() || first.tool_results.is_empty() {
            return Ok(vec![GeneratedMessage::reply(first.content)]);
        }

        let exchange = serde_json::to_string_pretty(&json!({
            "tool_calls": first.tool_calls,
            "tool_results": first.tool_results,
        }))
        .context("serializing tool exchange")?;

        let mut second_context = context;
        second_context.push(ChatMessage::assistant(exchange.clone()));
        let second = self
            .client
            .generate_with_tools(&second_context, &[])
            .await
            .context("second model call")?;

        // The tool summary stands in when the model has nothing to add.
        let reply = if second.content.trim().is_empty() {
            first.content
        } else {
            second.content
        };

        Ok(vec![
            GeneratedMessage::tool_exchange(exchange),
            GeneratedMessage::reply(reply),
        ])
    }

    async fn build_context(&self, history: &[ChatMessage]) -> Vec<ChatMessage> {
        let system_prompt = SystemPromptBuilder::new(&self.persistence, &self.registry, self.user_id)
            .build()
            .await;
        let mut context = Vec::with_capacity(history.len() + 1);
        context.push(ChatMessage::system(system_prompt));
        context.extend_from_slice(history);
        context
    }

    async fn first_pass(&self, context: &[ChatMessage]) -> Result<FirstPass> {
        let schemas = self.registry.get_tool_schemas();
        debug!(
            messages = context.len(),
            tools = ?self.registry.get_function_names(),
            "Sending first model call"
        );
        let response = self
            .client
            .generate_with_tools(context, &schemas)
            .await
            .context("first model call")?;

        let mut pass = FirstPass {
            content: response.content,
            tool_calls: response.tool_calls,
            tool_results: Vec::new(),
        };
        if pass.tool_calls.is_empty() {
            return Ok(pass);
        }

        info!(
            calls = ?pass.tool_calls.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            "Model requested tools"
        );
        let calls: Vec<FunctionCall> = pass
            .tool_calls
            .iter()
            .map(|call| FunctionCall::new(call.name.clone(), call.arguments.clone()))
            .collect();
        pass.tool_results = self.registry.process_function_calls(&calls).await;

        let summary = tool_feedback(&pass.tool_results);
        if !summary.is_empty() {
            pass.content = summary.join("\n");
        }
        Ok(pass)
    }
}

/// User-facing lines from tool results: each `success_message`, or
/// `Error: <error>` for failed calls.
pub fn tool_feedback(results: &[FunctionCallOutcome]) -> Vec<String> {
    results
        .iter()
        .filter_map(|outcome| outcome.result.as_ref().and_then(Value::as_object))
        .filter_map(|result| {
            let non_empty = |key: &str| {
                result
                    .get(key)
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
            };
            non_empty("success_message").or_else(|| non_empty("error").map(|e| format!("Error: {}", e)))
        })
        .collect()
}
