//! OpenAI Function Calling Integration
//!
//! Converts registry schemas into the SDK's `ChatCompletionTool` format and
//! normalizes the argument strings models send back.

use async_openai::types::{ChatCompletionTool, ChatCompletionToolType, FunctionObject};
use serde_json::{json, Value};

/// Converts parameters to OpenAI function schema format
fn parameters_to_openai_schema(params: &Value) -> Value {
    let properties = params
        .get("properties")
        .and_then(|p| p.as_object())
        .cloned()
        .unwrap_or_default();

    let required: Vec<String> = params
        .get("required")
        .and_then(|r| r.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default();

    json!({
        "type": "object",
        "properties": properties,
        "required": required
    })
}

/// Converts a tool definition into OpenAI ChatCompletionTool format
pub fn tool_to_openai_function(
    name: &str,
    description: &str,
    parameters: &Value,
) -> ChatCompletionTool {
    let schema = parameters_to_openai_schema(parameters);

    ChatCompletionTool {
        r#type: ChatCompletionToolType::Function,
        function: FunctionObject {
            name: name.to_string(),
            description: Some(description.to_string()),
            parameters: Some(schema),
            strict: Some(false),
        },
    }
}

/// Converts a `{"type": "function", "function": {...}}` schema. Returns `None`
/// when the schema has no function name.
pub fn schema_to_openai_tool(schema: &Value) -> Option<ChatCompletionTool> {
    let function = schema.get("function")?;
    let name = function.get("name")?.as_str()?;
    let description = function
        .get("description")
        .and_then(|d| d.as_str())
        .unwrap_or_default();
    let parameters = function
        .get("parameters")
        .cloned()
        .unwrap_or_else(|| json!({}));
    Some(tool_to_openai_function(name, description, &parameters))
}

/// Parse a model-produced argument string. Anything that is not a JSON
/// object becomes `{}`.
pub fn parse_tool_arguments(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ Value::Object(_)) => value,
        _ => json!({}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_to_openai_function() {
        let params = json!({
            "type": "object",
            "properties": {
                "title": {
                    "type": "string",
                    "description": "Goal title"
                }
            },
            "required": ["title"]
        });

        let tool = tool_to_openai_function("create_goal", "Create a goal", &params);

        assert_eq!(tool.function.name, "create_goal");
        assert_eq!(tool.function.description, Some("Create a goal".to_string()));
        let parameters = tool.function.parameters.unwrap();
        assert_eq!(parameters["required"], json!(["title"]));
    }

    #[test]
    fn test_schema_envelope_conversion() {
        let schema = json!({
            "type": "function",
            "function": {
                "name": "get_available_goals",
                "description": "List goals",
                "parameters": {"type": "object", "properties": {}}
            }
        });
        let tool = schema_to_openai_tool(&schema).unwrap();
        assert_eq!(tool.function.name, "get_available_goals");
        assert!(schema_to_openai_tool(&json!({"type": "function"})).is_none());
    }

    #[test]
    fn test_parse_tool_arguments() {
        assert_eq!(parse_tool_arguments(r#"{"goal_id": "x"}"#)["goal_id"], "x");
        assert_eq!(parse_tool_arguments("invalid json"), json!({}));
        assert_eq!(parse_tool_arguments("[1, 2]"), json!({}));
    }
}
