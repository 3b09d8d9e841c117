/// WebSocket endpoint for live chats
///
/// A connection registers its chat as live for the duration of the socket.
/// Each text frame `{content, client_msg_id?}` is answered with a
/// `user_message` ack followed by one `assistant_message` frame per generated
/// message. A chat owned by another user is refused before the upgrade.
use crate::api::handlers::{chat_error_response, parse_client_msg_id, user_id_from_headers, AppState};
use crate::api::models::SendMessageRequest;
use crate::services::{ChatFrame, FrameSender};
use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Browsers cannot set headers on a WebSocket handshake, so the user id may
/// also come as `?user_id=`.
#[derive(Debug, Default, Deserialize)]
pub struct WsQuery {
    pub user_id: Option<Uuid>,
}

pub async fn chat_socket(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let user_id = match query.user_id {
        Some(id) => id,
        None => match user_id_from_headers(&headers) {
            Ok(id) => id,
            Err(resp) => return resp,
        },
    };

    if let Err(err) = state.chat_service.authorize_chat(chat_id, user_id).await {
        return chat_error_response(err);
    }

    match ws {
        Ok(ws) => ws.on_upgrade(move |socket| handle_socket(socket, state, chat_id, user_id)),
        Err(rejection) => rejection.into_response(),
    }
}

async fn handle_socket(socket: WebSocket, state: AppState, chat_id: Uuid, user_id: Uuid) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    state.connections().register(chat_id, tx.clone());

    let send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sender.send(Message::Text(frame)).await.is_err() {
                debug!("Socket for chat {} closed while sending", chat_id);
                break;
            }
        }
    });

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => handle_frame(&state, &tx, chat_id, user_id, &text).await,
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                warn!("WebSocket error on chat {}: {}", chat_id, err);
                break;
            }
        }
    }

    state.connections().unregister(chat_id);
    drop(tx);
    send_task.abort();
    info!("WebSocket for chat {} closed", chat_id);
}

fn send_frame(tx: &FrameSender, frame: ChatFrame) {
    // The receiver only goes away once the socket is closing.
    let _ = tx.send(frame.to_json());
}

fn error_frame(tx: &FrameSender, error: impl Into<String>) {
    send_frame(
        tx,
        ChatFrame::Error {
            error: error.into(),
        },
    );
}

async fn handle_frame(state: &AppState, tx: &FrameSender, chat_id: Uuid, user_id: Uuid, text: &str) {
    let request: SendMessageRequest = match serde_json::from_str(text) {
        Ok(request) => request,
        Err(err) => {
            warn!("Malformed frame on chat {}: {}", chat_id, err);
            error_frame(tx, format!("Invalid message format: {}", err));
            return;
        }
    };
    if request.content.trim().is_empty() {
        error_frame(tx, "content must not be empty");
        return;
    }
    let client_msg_id = match parse_client_msg_id(request.client_msg_id.as_deref()) {
        Ok(id) => id,
        Err(msg) => {
            error_frame(tx, msg);
            return;
        }
    };

    let service = &state.chat_service;
    let user_message = match service
        .save_user_message(chat_id, user_id, &request.content, client_msg_id)
        .await
    {
        Ok(message) => message,
        Err(err) => {
            error!("Failed to save message on chat {}: {}", chat_id, err);
            error_frame(tx, err.to_string());
            return;
        }
    };
    send_frame(
        tx,
        ChatFrame::UserMessage {
            message: user_message,
        },
    );

    match service.generate_assistant_response(chat_id, user_id).await {
        Ok(messages) => {
            for message in messages {
                send_frame(tx, ChatFrame::AssistantMessage { message });
            }
        }
        Err(err) => {
            error!("Failed to generate response on chat {}: {}", chat_id, err);
            error_frame(tx, err.to_string());
        }
    }
}
