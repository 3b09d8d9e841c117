use anyhow::Result;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::events::EventTools;
use super::goals::GoalTools;
use super::guidance::GuidanceTools;
use super::mental_states::MentalStateTools;
use super::notifications::NotificationTools;
use super::ToolContext;
use crate::persistence::Persistence;

/// Boxed async handler stored per tool name.
pub type ToolHandler = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// One entry of the registry: the schema shown to the model and its handler.
#[derive(Clone)]
pub struct RegisteredTool {
    pub name: String,
    pub description: String,
    pub parameters: Value,
    handler: ToolHandler,
}

impl RegisteredTool {
    /// Chat-completions function schema.
    pub fn schema(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// A call requested by the model. `arguments` is either a JSON object or the
/// raw JSON string the model produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl FunctionCall {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallOutcome {
    pub function: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Explicit name to handler map, kept in registration order.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the full assistant tool set bound to one user and chat.
    pub fn for_user(persistence: Persistence, user_id: Uuid, chat_id: Uuid) -> Self {
        let ctx = ToolContext::new(persistence, user_id, chat_id);
        let mut registry = Self::new();

        super::goals::register(&mut registry, Arc::new(GoalTools::new(ctx.clone())));
        super::events::register(&mut registry, Arc::new(EventTools::new(ctx.clone())));
        super::notifications::register(
            &mut registry,
            Arc::new(NotificationTools::new(ctx.clone())),
        );
        super::mental_states::register(
            &mut registry,
            Arc::new(MentalStateTools::new(ctx.clone())),
        );
        super::guidance::register(&mut registry, Arc::new(GuidanceTools::new(ctx)));

        debug!(
            "ToolRegistry created with {} tools for user {}",
            registry.len(),
            user_id
        );
        registry
    }

    /// Register a raw handler. A later registration under the same name replaces the earlier one.
    pub fn register<F, Fut>(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        handler: F,
    ) where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let name = name.into();
        let tool = RegisteredTool {
            name: name.clone(),
            description: description.into(),
            parameters,
            handler: Arc::new(move |args| handler(args).boxed()),
        };
        debug!("Registered tool: {}", name);
        match self.index.get(&name) {
            Some(&slot) => self.tools[slot] = tool,
            None => {
                self.index.insert(name, self.tools.len());
                self.tools.push(tool);
            }
        }
    }

    /// Register a handler whose arguments are deserialized into `A` first.
    /// Arguments that do not fit `A` fail the call.
    pub fn register_typed<A, F, Fut>(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        handler: F,
    ) where
        A: DeserializeOwned + Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Value> + Send + 'static,
    {
        let handler = Arc::new(handler);
        self.register(name, description, parameters, move |args: Value| {
            let handler = Arc::clone(&handler);
            async move {
                let args = if args.is_null() { json!({}) } else { args };
                let parsed: A = serde_json::from_value(args)?;
                Ok(handler(parsed).await)
            }
        });
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.index.get(name).map(|&slot| &self.tools[slot])
    }

    pub fn has(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Registered tools in registration order.
    pub fn tools(&self) -> &[RegisteredTool] {
        &self.tools
    }

    pub fn get_tool_schemas(&self) -> Vec<Value> {
        self.tools.iter().map(RegisteredTool::schema).collect()
    }

    pub fn get_function_names(&self) -> Vec<String> {
        self.tools.iter().map(|tool| tool.name.clone()).collect()
    }

    /// Invoke one tool. Never fails: unknown names, handler errors and
    /// panics are all reported as `{"error": ...}`.
    pub async fn call_function(&self, name: &str, arguments: Value) -> Value {
        info!("Calling function: {} with args: {}", name, arguments);

        let Some(tool) = self.get(name) else {
            error!("Unknown function: {}", name);
            return json!({ "error": format!("Unknown function: {}", name) });
        };

        let call = (tool.handler)(arguments);
        match AssertUnwindSafe(call).catch_unwind().await {
            Ok(Ok(result)) => {
                debug!("Successfully called {}", name);
                result
            }
            Ok(Err(err)) => {
                let message = format!("Error calling {}: {:#}", name, err);
                error!("{}", message);
                json!({ "error": message })
            }
            Err(panic) => {
                let cause = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "handler panicked".to_string());
                let message = format!("Error calling {}: {}", name, cause);
                error!("{}", message);
                json!({ "error": message })
            }
        }
    }

    /// Run calls one after another in the given order. Each call stands alone;
    /// one failing does not stop the rest.
    pub async fn process_function_calls(&self, calls: &[FunctionCall]) -> Vec<FunctionCallOutcome> {
        let mut outcomes = Vec::with_capacity(calls.len());
        for call in calls {
            let arguments = match &call.arguments {
                Value::String(raw) => match serde_json::from_str::<Value>(raw) {
                    Ok(parsed) => parsed,
                    Err(_) => {
                        outcomes.push(FunctionCallOutcome {
                            function: call.name.clone(),
                            result: None,
                            error: Some("Invalid JSON arguments".to_string()),
                        });
                        continue;
                    }
                },
                other => other.clone(),
            };

            let result = self.call_function(&call.name, arguments).await;
            outcomes.push(FunctionCallOutcome {
                function: call.name.clone(),
                result: Some(result),
                error: None,
            });
        }
        outcomes
    }
}

/// Wrap a tool-set method as a registry handler. The tool set is shared
/// behind an `Arc` so each call owns its future.
macro_rules! bind {
    ($tools:expr, $method:ident) => {{
        let tools = ::std::sync::Arc::clone(&$tools);
        move |args| {
            let tools = ::std::sync::Arc::clone(&tools);
            async move { tools.$method(args).await }
        }
    }};
}
pub(crate) use bind;
