//! Delivery for users who are not connected.
//!
//! Live chats get their messages over the socket; for everyone else a push is
//! recorded in the log. Vendor push delivery is not wired up.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use super::connections::ConnectionRegistry;
use crate::agent::system_prompt::preview;
use crate::persistence::{now_utc, ChatRepository, NotificationRepository, Persistence};
use crate::types::NotificationStatus;

const PREVIEW_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PushOutcome {
    DeliveredViaWebsocket,
    PushSent {
        chat_id: Uuid,
        user_id: Uuid,
        preview: String,
        sent_at: DateTime<Utc>,
    },
    Sent {
        notification_id: Uuid,
        user_id: Uuid,
        sent_at: DateTime<Utc>,
    },
    Failed {
        error: String,
    },
}

impl PushOutcome {
    fn failed(error: impl Into<String>) -> Self {
        PushOutcome::Failed {
            error: error.into(),
        }
    }
}

#[derive(Clone)]
pub struct PushNotifier {
    persistence: Persistence,
    connections: Arc<dyn ConnectionRegistry>,
}

impl PushNotifier {
    pub fn new(persistence: Persistence, connections: Arc<dyn ConnectionRegistry>) -> Self {
        Self {
            persistence,
            connections,
        }
    }

    pub async fn send_push_notification(&self, chat_id: Uuid, content: &str) -> PushOutcome {
        let persistence = self.persistence.clone();
        let chat = tokio::task::spawn_blocking(move || {
            let conn = persistence.conn();
            ChatRepository::new(&conn).get_by_id(chat_id)
        })
        .await;

        let chat = match chat {
            Ok(Ok(Some(chat))) => chat,
            Ok(Ok(None)) => {
                error!("Chat {} not found for push notification", chat_id);
                return PushOutcome::failed("Chat not found");
            }
            Ok(Err(err)) => {
                error!("Failed to send push notification for chat {}: {:#}", chat_id, err);
                return PushOutcome::failed(format!("Failed to send push notification: {:#}", err));
            }
            Err(err) => {
                error!("Failed to send push notification for chat {}: {}", chat_id, err);
                return PushOutcome::failed(format!("Failed to send push notification: {}", err));
            }
        };

        if self.connections.is_active(chat_id) {
            info!("Chat {} is active, no push notification needed", chat_id);
            return PushOutcome::DeliveredViaWebsocket;
        }

        let preview = preview(content, PREVIEW_CHARS);
        info!(
            "PUSH NOTIFICATION: Chat '{}' - {} (user_id: {})",
            chat.title.as_deref().unwrap_or("Untitled"),
            preview,
            chat.user_id
        );

        PushOutcome::PushSent {
            chat_id,
            user_id: chat.user_id,
            preview,
            sent_at: now_utc(),
        }
    }

    /// Deliver a scheduled notification and mark it sent.
    pub async fn send_scheduled_notification(&self, notification_id: Uuid) -> PushOutcome {
        match self.mark_sent(notification_id).await {
            Ok(Some(outcome)) => outcome,
            Ok(None) => {
                error!("Notification {} not found", notification_id);
                PushOutcome::failed("Notification not found")
            }
            Err(err) => {
                error!(
                    "Failed to send scheduled notification {}: {:#}",
                    notification_id, err
                );
                PushOutcome::failed(format!("Failed to send scheduled notification: {:#}", err))
            }
        }
    }

    async fn mark_sent(&self, notification_id: Uuid) -> Result<Option<PushOutcome>> {
        let persistence = self.persistence.clone();
        tokio::task::spawn_blocking(move || {
            persistence.transaction(|conn| -> Result<Option<PushOutcome>> {
                let repo = NotificationRepository::new(conn);
                let Some(notification) = repo.get_by_id(notification_id)? else {
                    return Ok(None);
                };

                info!(
                    "SCHEDULED NOTIFICATION: {} - {} (user_id: {})",
                    notification.notification_type, notification.message, notification.user_id
                );

                let sent_at = now_utc();
                repo.update_notification_status(
                    notification_id,
                    NotificationStatus::Sent,
                    Some(sent_at),
                )?;
                Ok(Some(PushOutcome::Sent {
                    notification_id,
                    user_id: notification.user_id,
                    sent_at,
                }))
            })
        })
        .await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::connections::ConnectionManager;
    use tokio::sync::mpsc;

    fn notifier() -> (PushNotifier, Persistence, Arc<ConnectionManager>) {
        let db = Persistence::in_memory().unwrap();
        let connections = Arc::new(ConnectionManager::new());
        (
            PushNotifier::new(db.clone(), connections.clone()),
            db,
            connections,
        )
    }

    fn create_chat(db: &Persistence) -> Uuid {
        let conn = db.conn();
        ChatRepository::new(&conn)
            .create_chat(Uuid::new_v4(), Uuid::new_v4(), None, "mock-model")
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn missing_chat_fails() {
        let (notifier, _db, _) = notifier();
        let outcome = notifier.send_push_notification(Uuid::new_v4(), "hi").await;
        assert_eq!(outcome, PushOutcome::failed("Chat not found"));
    }

    #[tokio::test]
    async fn inactive_chat_gets_push_with_preview() {
        let (notifier, db, _) = notifier();
        let chat_id = create_chat(&db);
        let outcome = notifier
            .send_push_notification(chat_id, &"a".repeat(150))
            .await;
        match outcome {
            PushOutcome::PushSent { preview, .. } => {
                assert_eq!(preview, format!("{}...", "a".repeat(100)));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn live_chat_is_delivered_over_socket() {
        let (notifier, db, connections) = notifier();
        let chat_id = create_chat(&db);
        let (tx, _rx) = mpsc::unbounded_channel();
        connections.register(chat_id, tx);
        assert_eq!(
            notifier.send_push_notification(chat_id, "hello").await,
            PushOutcome::DeliveredViaWebsocket
        );
    }

    #[tokio::test]
    async fn unknown_scheduled_notification_fails() {
        let (notifier, _db, _) = notifier();
        assert_eq!(
            notifier.send_scheduled_notification(Uuid::new_v4()).await,
            PushOutcome::failed("Notification not found")
        );
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let json = serde_json::to_value(PushOutcome::DeliveredViaWebsocket).unwrap();
        assert_eq!(json["status"], "delivered_via_websocket");
    }
}
