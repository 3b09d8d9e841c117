/// API request and response models
use serde::{Deserialize, Serialize};

use crate::types::{Goal, GoalDependency, MentalState, Message};

/// Body of `POST /chats/:chat_id/messages` and of a WebSocket text frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
    /// Client-generated UUID used to drop retried sends
    #[serde(default)]
    pub client_msg_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageResponse {
    /// The user message followed by the assistant messages
    pub messages: Vec<Message>,
}

/// Body of `POST /chats/:chat_id/assistant`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantMessageRequest {
    pub content: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaginationQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GoalListQuery {
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalListResponse {
    pub goals: Vec<Goal>,
    pub total: usize,
}

/// A goal with the edges on both sides of it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalDetailResponse {
    #[serde(flatten)]
    pub goal: Goal,
    pub dependencies: Vec<GoalDependency>,
    pub dependents: Vec<GoalDependency>,
}

/// Page of `GET /goals/mental-states`, newest first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MentalStateListResponse {
    pub mental_states: Vec<MentalState>,
    /// All of the user's polls, not just this page
    pub total: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteChatResponse {
    pub deleted: bool,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
    /// Error code
    pub code: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    /// Chats with a live WebSocket
    pub active_connections: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_message_request_without_client_id() {
        let request: SendMessageRequest =
            serde_json::from_str(r#"{"content": "hello"}"#).unwrap();
        assert_eq!(request.content, "hello");
        assert!(request.client_msg_id.is_none());
    }

    #[test]
    fn test_error_response_shape() {
        let err = ErrorResponse::new("chat_not_found", "Chat not found or not owned by user");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "chat_not_found");
        assert_eq!(json["error"], "Chat not found or not owned by user");
    }
}
