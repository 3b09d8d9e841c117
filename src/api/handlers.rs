/// API request handlers
use crate::api::models::*;
use crate::config::AppConfig;
use crate::persistence::{GoalRepository, MentalStateRepository, Persistence};
use crate::services::{ChatError, ChatService, ConnectionRegistry};
use crate::types::{GoalFilter, GoalStatus};
use axum::{
    extract::{Json, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use std::time::Instant;
use tracing::error;
use uuid::Uuid;

/// Header carrying the caller's user id
pub const USER_ID_HEADER: &str = "x-user-id";

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_MENTAL_STATE_PAGE: i64 = 100;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub persistence: Persistence,
    pub chat_service: Arc<ChatService>,
    pub config: AppConfig,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(persistence: Persistence, chat_service: Arc<ChatService>, config: AppConfig) -> Self {
        Self {
            persistence,
            chat_service,
            config,
            start_time: Instant::now(),
        }
    }

    pub fn connections(&self) -> &Arc<dyn ConnectionRegistry> {
        self.chat_service.connections()
    }
}

fn error_response(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    (status, Json(ErrorResponse::new(code, message))).into_response()
}

pub fn chat_error_response(err: ChatError) -> Response {
    match err {
        ChatError::ChatNotFound => {
            error_response(StatusCode::NOT_FOUND, "chat_not_found", err.to_string())
        }
        ChatError::MissingUser => {
            error_response(StatusCode::BAD_REQUEST, "missing_user", err.to_string())
        }
        ChatError::Internal(inner) => {
            error!("Request failed: {:#}", inner);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Internal server error",
            )
        }
    }
}

fn internal_error(err: impl std::fmt::Display) -> Response {
    error!("Request failed: {:#}", err);
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal_error",
        "Internal server error",
    )
}

/// Read the caller's identity from the `x-user-id` header.
pub fn user_id_from_headers(headers: &HeaderMap) -> Result<Uuid, Response> {
    let value = headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            error_response(
                StatusCode::BAD_REQUEST,
                "missing_user_id",
                format!("Missing {} header", USER_ID_HEADER),
            )
        })?;
    Uuid::parse_str(value.trim()).map_err(|_| {
        error_response(
            StatusCode::BAD_REQUEST,
            "invalid_user_id",
            format!("Invalid {} header", USER_ID_HEADER),
        )
    })
}

/// Parse an optional client message id. Non-UUID values are rejected.
pub fn parse_client_msg_id(raw: Option<&str>) -> Result<Option<Uuid>, String> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => Uuid::parse_str(s)
            .map(Some)
            .map_err(|_| format!("Invalid client_msg_id: {}", s)),
    }
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let response = HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        active_connections: state.connections().connection_count(),
    };

    Json(response)
}

/// Save a user message and run one assistant turn
pub async fn send_message(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    headers: HeaderMap,
    Json(request): Json<SendMessageRequest>,
) -> Response {
    let user_id = match user_id_from_headers(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let client_msg_id = match parse_client_msg_id(request.client_msg_id.as_deref()) {
        Ok(id) => id,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, "invalid_request", msg),
    };
    if request.content.trim().is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            "content must not be empty",
        );
    }

    match state
        .chat_service
        .send_message(chat_id, user_id, &request.content, client_msg_id)
        .await
    {
        Ok(messages) => (StatusCode::OK, Json(SendMessageResponse { messages })).into_response(),
        Err(err) => chat_error_response(err),
    }
}

/// Paginated history, newest page first, messages in chronological order
pub async fn list_messages(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    headers: HeaderMap,
    Query(query): Query<PaginationQuery>,
) -> Response {
    let user_id = match user_id_from_headers(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE);
    let offset = query.offset.unwrap_or(0);

    match state
        .chat_service
        .get_chat_messages(chat_id, user_id, limit, offset)
        .await
    {
        Ok(page) => Json(page).into_response(),
        Err(err) => chat_error_response(err),
    }
}

/// Post an assistant message without a model turn
pub async fn send_assistant_message(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    headers: HeaderMap,
    Json(request): Json<AssistantMessageRequest>,
) -> Response {
    let user_id = match user_id_from_headers(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match state
        .chat_service
        .send_assistant_message(chat_id, Some(user_id), &request.content)
        .await
    {
        Ok(delivery) => Json(delivery).into_response(),
        Err(err) => chat_error_response(err),
    }
}

pub async fn delete_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    headers: HeaderMap,
) -> Response {
    let user_id = match user_id_from_headers(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match state.chat_service.delete_chat(chat_id, user_id).await {
        Ok(true) => Json(DeleteChatResponse { deleted: true }).into_response(),
        Ok(false) => chat_error_response(ChatError::ChatNotFound),
        Err(err) => chat_error_response(err),
    }
}

pub async fn list_goals(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<GoalListQuery>,
) -> Response {
    let user_id = match user_id_from_headers(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let status = match query.status.as_deref().map(str::parse::<GoalStatus>) {
        None => None,
        Some(Ok(status)) => Some(status),
        Some(Err(err)) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "invalid_status",
                format!(
                    "Invalid status '{}'. Must be one of: {}",
                    err.value,
                    err.expected_list()
                ),
            )
        }
    };

    let persistence = state.persistence.clone();
    let result = tokio::task::spawn_blocking(move || {
        let conn = persistence.conn();
        let filter = GoalFilter {
            status,
            ..Default::default()
        };
        GoalRepository::new(&conn).get_user_goals(user_id, &filter)
    })
    .await;

    match result {
        Ok(Ok(goals)) => Json(GoalListResponse {
            total: goals.len(),
            goals,
        })
        .into_response(),
        Ok(Err(err)) => internal_error(err),
        Err(err) => internal_error(err),
    }
}

pub async fn goal_stats(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let user_id = match user_id_from_headers(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let persistence = state.persistence.clone();
    let result = tokio::task::spawn_blocking(move || {
        let conn = persistence.conn();
        GoalRepository::new(&conn).get_goal_stats(user_id)
    })
    .await;

    match result {
        Ok(Ok(stats)) => Json(stats).into_response(),
        Ok(Err(err)) => internal_error(err),
        Err(err) => internal_error(err),
    }
}

pub async fn get_goal(
    State(state): State<AppState>,
    Path(goal_id): Path<Uuid>,
    headers: HeaderMap,
) -> Response {
    let user_id = match user_id_from_headers(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let persistence = state.persistence.clone();
    let result = tokio::task::spawn_blocking(move || -> anyhow::Result<Option<GoalDetailResponse>> {
        let conn = persistence.conn();
        let repo = GoalRepository::new(&conn);
        let Some(goal) = repo.get_user_goal(user_id, goal_id)? else {
            return Ok(None);
        };
        Ok(Some(GoalDetailResponse {
            dependencies: repo.get_goal_dependencies(goal_id)?,
            dependents: repo.get_goal_dependents(goal_id)?,
            goal,
        }))
    })
    .await;

    match result {
        Ok(Ok(Some(detail))) => Json(detail).into_response(),
        Ok(Ok(None)) => error_response(
            StatusCode::NOT_FOUND,
            "goal_not_found",
            "Goal not found or access denied",
        ),
        Ok(Err(err)) => internal_error(err),
        Err(err) => internal_error(err),
    }
}

/// Mental state history, newest first. `limit` is clamped to 1..=100.
pub async fn list_mental_states(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PaginationQuery>,
) -> Response {
    let user_id = match user_id_from_headers(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let limit = query
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_MENTAL_STATE_PAGE);
    let offset = query.offset.unwrap_or(0).max(0);

    let persistence = state.persistence.clone();
    let result = tokio::task::spawn_blocking(move || -> anyhow::Result<MentalStateListResponse> {
        let conn = persistence.conn();
        let repo = MentalStateRepository::new(&conn);
        Ok(MentalStateListResponse {
            total: repo.count_user_mental_states(user_id)?,
            mental_states: repo.list_user_mental_states_page(user_id, limit, offset)?,
        })
    })
    .await;

    match result {
        Ok(Ok(page)) => Json(page).into_response(),
        Ok(Err(err)) => internal_error(err),
        Err(err) => internal_error(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_user_id_header_parsing() {
        let mut headers = HeaderMap::new();
        assert!(user_id_from_headers(&headers).is_err());

        headers.insert(USER_ID_HEADER, HeaderValue::from_static("not-a-uuid"));
        let resp = user_id_from_headers(&headers).unwrap_err();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let id = Uuid::new_v4();
        headers.insert(
            USER_ID_HEADER,
            HeaderValue::from_str(&id.to_string()).unwrap(),
        );
        assert_eq!(user_id_from_headers(&headers).unwrap(), id);
    }

    #[test]
    fn test_client_msg_id_parsing() {
        assert_eq!(parse_client_msg_id(None).unwrap(), None);
        assert_eq!(parse_client_msg_id(Some("  ")).unwrap(), None);
        assert!(parse_client_msg_id(Some("abc")).is_err());
        let id = Uuid::new_v4();
        assert_eq!(
            parse_client_msg_id(Some(&id.to_string())).unwrap(),
            Some(id)
        );
    }

    #[test]
    fn test_chat_not_found_maps_to_404() {
        let resp = chat_error_response(ChatError::ChatNotFound);
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let resp = chat_error_response(ChatError::Internal(anyhow::anyhow!("boom")));
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
