//! Chat message persistence and assistant turns.
//!
//! Each write (user message, generated messages) is one transaction. History
//! for the model comes from the in-memory cache when it covers the context
//! window or the whole chat; otherwise it is reloaded from the database and
//! the cache is seeded with it.

use anyhow::Context;
use duckdb::Connection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::cache::MessageCache;
use super::connections::ConnectionRegistry;
use super::push::PushNotifier;
use crate::agent::model::{ChatMessage, LlmClient};
use crate::agent::orchestrator::{ConversationOrchestrator, APOLOGY_MESSAGE};
use crate::config::ChatConfig;
use crate::persistence::{ChatRepository, Persistence};
use crate::types::{Chat, Message, MessageRole};

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Chat not found or not owned by user")]
    ChatNotFound,
    #[error("user_id required to create new chat")]
    MissingUser,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<duckdb::Error> for ChatError {
    fn from(err: duckdb::Error) -> Self {
        ChatError::Internal(err.into())
    }
}

pub type ChatResult<T> = Result<T, ChatError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagePage {
    /// Oldest first.
    pub messages: Vec<Message>,
    pub total: i64,
    pub has_more: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Delivered,
    PushSent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantDelivery {
    pub message: Message,
    pub status: DeliveryStatus,
}

/// Frames written to a chat's WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatFrame {
    UserMessage { message: Message },
    AssistantMessage { message: Message },
    Error { error: String },
}

impl ChatFrame {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|err| {
            format!(r#"{{"type":"error","error":"serialization failed: {}"}}"#, err)
        })
    }
}

pub struct ChatService {
    persistence: Persistence,
    client: Arc<dyn LlmClient>,
    connections: Arc<dyn ConnectionRegistry>,
    notifier: PushNotifier,
    cache: MessageCache,
    context_message_limit: usize,
}

impl ChatService {
    pub fn new(
        persistence: Persistence,
        client: Arc<dyn LlmClient>,
        connections: Arc<dyn ConnectionRegistry>,
        config: &ChatConfig,
    ) -> Self {
        let notifier = PushNotifier::new(persistence.clone(), connections.clone());
        Self {
            persistence,
            client,
            connections,
            notifier,
            cache: MessageCache::new(config.cache_size),
            context_message_limit: config.context_message_limit,
        }
    }

    pub fn connections(&self) -> &Arc<dyn ConnectionRegistry> {
        &self.connections
    }

    pub fn notifier(&self) -> &PushNotifier {
        &self.notifier
    }

    pub fn cache(&self) -> &MessageCache {
        &self.cache
    }

    /// Persist a user message, creating the chat on first use. A repeated
    /// `client_msg_id` returns the message saved the first time.
    pub async fn save_user_message(
        &self,
        chat_id: Uuid,
        user_id: Uuid,
        content: &str,
        client_msg_id: Option<Uuid>,
    ) -> ChatResult<Message> {
        info!("Saving user message for chat {}", chat_id);
        let model = self.client.model_name().to_string();
        let content = content.to_string();

        let message = self
            .transaction(move |conn| {
                ensure_chat(conn, chat_id, Some(user_id), &model)?;
                let repo = ChatRepository::new(conn);
                if let Some(request_id) = client_msg_id {
                    if let Some(existing) = repo.get_by_request_id(chat_id, request_id)? {
                        debug!("Duplicate client_msg_id {} for chat {}", request_id, chat_id);
                        return Ok(existing);
                    }
                }
                Ok(repo.append_message(chat_id, MessageRole::User, &content, client_msg_id)?)
            })
            .await?;

        self.cache.push(message.clone());
        info!(
            "Saved user message {} with seq {} in chat {}",
            message.id, message.seq, chat_id
        );
        Ok(message)
    }

    /// Run one assistant turn over the chat's recent history and save what it
    /// produced. Failures save and return the apology message instead.
    pub async fn generate_assistant_response(
        &self,
        chat_id: Uuid,
        user_id: Uuid,
    ) -> ChatResult<Vec<Message>> {
        info!("Generating assistant response for chat {}", chat_id);
        match self.try_generate(chat_id, user_id).await {
            Ok(saved) => Ok(saved),
            Err(err) => {
                error!(
                    "Error generating response for chat {}: {:#}",
                    chat_id, err
                );
                let apology = self
                    .save_assistant(chat_id, vec![APOLOGY_MESSAGE.to_string()])
                    .await?;
                Ok(apology)
            }
        }
    }

    async fn try_generate(&self, chat_id: Uuid, user_id: Uuid) -> anyhow::Result<Vec<Message>> {
        let history = self.conversation_history(chat_id).await?;
        debug!("Loaded {} history messages for chat {}", history.len(), chat_id);

        let orchestrator = ConversationOrchestrator::new(
            self.client.clone(),
            self.persistence.clone(),
            user_id,
            chat_id,
        );
        let generated = orchestrator.generate_response(&history).await;
        let contents = generated.into_iter().map(|m| m.content).collect();
        let saved = self.save_assistant(chat_id, contents).await?;

        if let Some(last) = saved.last() {
            if !self.connections.is_active(chat_id) {
                self.notifier
                    .send_push_notification(chat_id, &last.content)
                    .await;
            }
        }
        info!("Generated {} assistant messages for chat {}", saved.len(), chat_id);
        Ok(saved)
    }

    /// The user message followed by every generated assistant message.
    pub async fn send_message(
        &self,
        chat_id: Uuid,
        user_id: Uuid,
        content: &str,
        client_msg_id: Option<Uuid>,
    ) -> ChatResult<Vec<Message>> {
        let user_message = self
            .save_user_message(chat_id, user_id, content, client_msg_id)
            .await?;
        let mut messages = vec![user_message];
        messages.extend(self.generate_assistant_response(chat_id, user_id).await?);
        Ok(messages)
    }

    /// Post an assistant message without running the model, e.g. a reminder.
    /// Live chats get the message over their socket; others get a push.
    pub async fn send_assistant_message(
        &self,
        chat_id: Uuid,
        user_id: Option<Uuid>,
        content: &str,
    ) -> ChatResult<AssistantDelivery> {
        let model = self.client.model_name().to_string();
        let content_owned = content.to_string();
        let message = self
            .transaction(move |conn| {
                ensure_chat(conn, chat_id, user_id, &model)?;
                Ok(ChatRepository::new(conn).append_message(
                    chat_id,
                    MessageRole::Assistant,
                    &content_owned,
                    None,
                )?)
            })
            .await?;
        self.cache.push(message.clone());

        let frame = ChatFrame::AssistantMessage {
            message: message.clone(),
        };
        let status = if self.connections.send_to_chat(chat_id, frame.to_json()) {
            DeliveryStatus::Delivered
        } else {
            self.notifier.send_push_notification(chat_id, content).await;
            DeliveryStatus::PushSent
        };

        Ok(AssistantDelivery { message, status })
    }

    /// Fails with `ChatNotFound` when the chat exists and belongs to someone
    /// else. A chat that does not exist yet is created on first message.
    pub async fn authorize_chat(&self, chat_id: Uuid, user_id: Uuid) -> ChatResult<()> {
        self.transaction(move |conn| match ChatRepository::new(conn).get_by_id(chat_id)? {
            Some(chat) if chat.user_id != user_id => {
                warn!("User {} denied access to chat {}", user_id, chat_id);
                Err(ChatError::ChatNotFound)
            }
            _ => Ok(()),
        })
        .await
    }

    /// A page of the chat's messages counted back from the newest.
    pub async fn get_chat_messages(
        &self,
        chat_id: Uuid,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> ChatResult<MessagePage> {
        let (limit, offset) = (limit.max(0), offset.max(0));
        self.transaction(move |conn| {
            let repo = ChatRepository::new(conn);
            if repo.get_user_chat(chat_id, user_id)?.is_none() {
                return Err(ChatError::ChatNotFound);
            }
            let total = repo.count_messages(chat_id)?;
            let messages = repo.list_messages(chat_id, limit, offset)?;
            Ok(MessagePage {
                messages,
                total,
                has_more: offset + limit < total,
            })
        })
        .await
    }

    /// Remove the chat and its messages. Returns false when the chat does not
    /// exist or belongs to someone else.
    pub async fn delete_chat(&self, chat_id: Uuid, user_id: Uuid) -> ChatResult<bool> {
        let deleted = self
            .transaction(move |conn| {
                let repo = ChatRepository::new(conn);
                if repo.get_user_chat(chat_id, user_id)?.is_none() {
                    return Ok(false);
                }
                Ok(repo.delete_chat(chat_id)?)
            })
            .await?;

        if deleted {
            self.cache.clear(chat_id);
            self.connections.unregister(chat_id);
            info!("Deleted chat {} for user {}", chat_id, user_id);
        }
        Ok(deleted)
    }

    pub async fn get_user_chats(&self, user_id: Uuid) -> ChatResult<Vec<Chat>> {
        self.transaction(move |conn| Ok(ChatRepository::new(conn).get_user_chats(user_id)?))
            .await
    }

    async fn conversation_history(&self, chat_id: Uuid) -> anyhow::Result<Vec<ChatMessage>> {
        let limit = self.context_message_limit;
        let mut messages = self.cache.recent(chat_id, limit);
        if messages.len() < limit {
            let cached = messages.len();
            let loaded = self
                .transaction(move |conn| {
                    let repo = ChatRepository::new(conn);
                    if repo.count_messages(chat_id)? as usize <= cached {
                        return Ok(None);
                    }
                    Ok(Some(repo.list_messages(chat_id, limit as i64, 0)?))
                })
                .await
                .context("loading conversation history")?;
            if let Some(loaded) = loaded {
                debug!(
                    "History cache held {} of {} messages for chat {}, loaded from database",
                    cached,
                    loaded.len(),
                    chat_id
                );
                for message in &loaded {
                    self.cache.push(message.clone());
                }
                messages = loaded;
            }
        }
        Ok(messages
            .into_iter()
            .map(|m| ChatMessage::new(m.role, m.content))
            .collect())
    }

    async fn save_assistant(&self, chat_id: Uuid, contents: Vec<String>) -> ChatResult<Vec<Message>> {
        let saved = self
            .transaction(move |conn| {
                let repo = ChatRepository::new(conn);
                let mut saved = Vec::with_capacity(contents.len());
                for content in &contents {
                    saved.push(repo.append_message(chat_id, MessageRole::Assistant, content, None)?);
                }
                Ok(saved)
            })
            .await?;
        for message in &saved {
            self.cache.push(message.clone());
        }
        Ok(saved)
    }

    /// Run `f` on the blocking pool inside one transaction.
    async fn transaction<T, F>(&self, f: F) -> ChatResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> ChatResult<T> + Send + 'static,
    {
        let persistence = self.persistence.clone();
        tokio::task::spawn_blocking(move || persistence.transaction(f))
            .await
            .context("task join error")?
    }
}

/// Create the chat when it does not exist yet. An existing chat must belong
/// to `user_id` when one is given.
fn ensure_chat(
    conn: &Connection,
    chat_id: Uuid,
    user_id: Option<Uuid>,
    model: &str,
) -> ChatResult<Chat> {
    let repo = ChatRepository::new(conn);
    match (repo.get_by_id(chat_id)?, user_id) {
        (Some(chat), Some(user_id)) if chat.user_id != user_id => {
            warn!("User {} tried to write to chat {} of another user", user_id, chat_id);
            Err(ChatError::ChatNotFound)
        }
        (Some(chat), _) => Ok(chat),
        (None, None) => Err(ChatError::MissingUser),
        (None, Some(user_id)) => {
            let chat = repo.create_chat(chat_id, user_id, None, model)?;
            info!("Auto-created chat {} for user {}", chat_id, user_id);
            Ok(chat)
        }
    }
}
