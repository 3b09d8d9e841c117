#![cfg(feature = "api")]

use aimi::agent::MockLlmClient;
use aimi::api::{ApiConfig, ApiServer};
use aimi::config::{AppConfig, ChatConfig};
use aimi::persistence::{GoalRepository, MentalStateRepository, Persistence};
use aimi::services::{ChatService, ConnectionManager};
use aimi::types::NewGoal;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

fn app() -> (Router, Persistence) {
    let db = Persistence::in_memory().unwrap();
    let service = Arc::new(ChatService::new(
        db.clone(),
        Arc::new(MockLlmClient::with_reply("Happy to help.")),
        Arc::new(ConnectionManager::new()),
        &ChatConfig::default(),
    ));
    let server = ApiServer::new(ApiConfig::default(), db.clone(), service, AppConfig::default());
    (server.build_router(), db)
}

fn request(method: &str, uri: &str, user: Option<Uuid>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header("x-user-id", user.to_string());
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn health_reports_status() {
    let (app, _) = app();
    let (status, body) = send(&app, request("GET", "/health", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["active_connections"], 0);
}

#[tokio::test]
async fn send_then_list_messages() {
    let (app, _) = app();
    let (chat, user) = (Uuid::new_v4(), Uuid::new_v4());

    let (status, body) = send(
        &app,
        request(
            "POST",
            &format!("/chats/{chat}/messages"),
            Some(user),
            Some(json!({ "content": "Plan my week" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["role"], "user");
    assert_eq!(messages[1]["content"], "Happy to help.");

    let (status, page) = send(
        &app,
        request(
            "GET",
            &format!("/chats/{chat}/messages?limit=1"),
            Some(user),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 2);
    assert_eq!(page["has_more"], true);
    assert_eq!(page["messages"][0]["seq"], 2);
}

#[tokio::test]
async fn missing_or_bad_user_header_is_400() {
    let (app, _) = app();
    let chat = Uuid::new_v4();

    let (status, body) = send(
        &app,
        request("GET", &format!("/chats/{chat}/messages"), None, None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "missing_user_id");

    let req = Request::builder()
        .uri(format!("/chats/{chat}/messages"))
        .header("x-user-id", "nobody")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_user_id");
}

#[tokio::test]
async fn foreign_chat_is_404() {
    let (app, _) = app();
    let chat = Uuid::new_v4();
    send(
        &app,
        request(
            "POST",
            &format!("/chats/{chat}/messages"),
            Some(Uuid::new_v4()),
            Some(json!({ "content": "mine" })),
        ),
    )
    .await;

    let (status, body) = send(
        &app,
        request(
            "GET",
            &format!("/chats/{chat}/messages"),
            Some(Uuid::new_v4()),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Chat not found or not owned by user");
}

#[tokio::test]
async fn assistant_message_without_socket_is_pushed() {
    let (app, _) = app();
    let (chat, user) = (Uuid::new_v4(), Uuid::new_v4());
    let (status, body) = send(
        &app,
        request(
            "POST",
            &format!("/chats/{chat}/assistant"),
            Some(user),
            Some(json!({ "content": "Drink some water" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "push_sent");
    assert_eq!(body["message"]["role"], "assistant");
}

#[tokio::test]
async fn delete_chat_then_404() {
    let (app, _) = app();
    let (chat, user) = (Uuid::new_v4(), Uuid::new_v4());
    send(
        &app,
        request(
            "POST",
            &format!("/chats/{chat}/messages"),
            Some(user),
            Some(json!({ "content": "hello" })),
        ),
    )
    .await;

    let (status, body) = send(
        &app,
        request("DELETE", &format!("/chats/{chat}"), Some(user), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], true);

    let (status, _) = send(
        &app,
        request("DELETE", &format!("/chats/{chat}"), Some(user), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn goal_endpoints() {
    let (app, db) = app();
    let user = Uuid::new_v4();
    let goal_id = {
        let conn = db.conn();
        let repo = GoalRepository::new(&conn);
        let goal = repo.create_goal(NewGoal::new(user, "Learn Rust")).unwrap();
        repo.create_goal(NewGoal::new(Uuid::new_v4(), "Someone else's"))
            .unwrap();
        goal.id
    };

    let (status, body) = send(&app, request("GET", "/goals", Some(user), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["goals"][0]["title"], "Learn Rust");

    let (status, body) = send(&app, request("GET", "/goals?status=done", Some(user), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 0);

    let (status, body) =
        send(&app, request("GET", "/goals?status=paused", Some(user), None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_status");

    let (status, body) = send(&app, request("GET", "/goals/stats", Some(user), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["by_status"]["todo"], 1);

    let (status, body) = send(
        &app,
        request("GET", &format!("/goals/{goal_id}"), Some(user), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Learn Rust");
    assert_eq!(body["dependencies"], json!([]));

    let (status, _) = send(
        &app,
        request("GET", &format!("/goals/{goal_id}"), Some(Uuid::new_v4()), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn socket_for_foreign_chat_is_refused_before_upgrade() {
    let (app, _) = app();
    let (chat, owner) = (Uuid::new_v4(), Uuid::new_v4());
    send(
        &app,
        request(
            "POST",
            &format!("/chats/{chat}/messages"),
            Some(owner),
            Some(json!({ "content": "private" })),
        ),
    )
    .await;

    let intruder = Uuid::new_v4();
    let (status, body) = send(
        &app,
        request(
            "GET",
            &format!("/ws/chat/{chat}?user_id={intruder}"),
            None,
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "chat_not_found");

    // The owner passes the ownership check; a plain GET then fails the upgrade.
    let response = app
        .clone()
        .oneshot(request("GET", &format!("/ws/chat/{chat}"), Some(owner), None))
        .await
        .unwrap();
    assert_ne!(response.status(), StatusCode::NOT_FOUND);
    assert!(response.status().is_client_error());

    let (_, health) = send(&app, request("GET", "/health", None, None)).await;
    assert_eq!(health["active_connections"], 0);
}

#[tokio::test]
async fn mental_state_history_is_paged_newest_first() {
    let (app, db) = app();
    let user = Uuid::new_v4();
    let today = Utc::now().date_naive();
    {
        let conn = db.conn();
        let repo = MentalStateRepository::new(&conn);
        for days_ago in [2, 1, 0] {
            repo.create_mental_state(user, today - Duration::days(days_ago))
                .unwrap();
        }
        repo.create_mental_state(Uuid::new_v4(), today).unwrap();
    }

    let (status, body) = send(
        &app,
        request("GET", "/goals/mental-states?limit=2", Some(user), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 3);
    let page = body["mental_states"].as_array().unwrap();
    assert_eq!(page.len(), 2);
    assert_eq!(page[0]["date"], today.to_string());

    let (_, body) = send(
        &app,
        request("GET", "/goals/mental-states?limit=0&offset=2", Some(user), None),
    )
    .await;
    let page = body["mental_states"].as_array().unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0]["date"], (today - Duration::days(2)).to_string());

    let (_, body) = send(
        &app,
        request("GET", "/goals/mental-states?limit=1000", Some(user), None),
    )
    .await;
    assert_eq!(body["mental_states"].as_array().unwrap().len(), 3);
}
