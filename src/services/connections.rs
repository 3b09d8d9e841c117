//! Live WebSocket connections per chat.
//!
//! The chat service only needs to know whether a chat has a live socket and
//! to push text frames to it, so it sees the [`ConnectionRegistry`] trait. The
//! in-process [`ConnectionManager`] keeps one outbound channel per chat.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};
use uuid::Uuid;

/// Outbound half of a socket: text frames queued for the writer task.
pub type FrameSender = UnboundedSender<String>;

pub trait ConnectionRegistry: Send + Sync {
    fn is_active(&self, chat_id: Uuid) -> bool;

    /// Register the live socket for a chat, replacing any previous one.
    fn register(&self, chat_id: Uuid, sender: FrameSender);

    fn unregister(&self, chat_id: Uuid);

    /// Queue a frame for the chat's socket. Returns false when the chat has no
    /// live socket or the socket has gone away; a dead socket is unregistered.
    fn send_to_chat(&self, chat_id: Uuid, payload: String) -> bool;

    fn active_chats(&self) -> Vec<Uuid>;

    fn connection_count(&self) -> usize;
}

#[derive(Default)]
pub struct ConnectionManager {
    connections: RwLock<HashMap<Uuid, FrameSender>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConnectionRegistry for ConnectionManager {
    fn is_active(&self, chat_id: Uuid) -> bool {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&chat_id)
    }

    fn register(&self, chat_id: Uuid, sender: FrameSender) {
        let mut connections = self
            .connections
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        connections.insert(chat_id, sender);
        info!(
            "Chat {} connected. Active chats: {}",
            chat_id,
            connections.len()
        );
    }

    fn unregister(&self, chat_id: Uuid) {
        let mut connections = self
            .connections
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if connections.remove(&chat_id).is_some() {
            info!(
                "Chat {} disconnected. Active chats: {}",
                chat_id,
                connections.len()
            );
        }
    }

    fn send_to_chat(&self, chat_id: Uuid, payload: String) -> bool {
        let sent = {
            let connections = self
                .connections
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            match connections.get(&chat_id) {
                Some(sender) => sender.send(payload).is_ok(),
                None => return false,
            }
        };

        if !sent {
            warn!("Failed to send message to chat {}", chat_id);
            self.unregister(chat_id);
        }
        sent
    }

    fn active_chats(&self) -> Vec<Uuid> {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }

    fn connection_count(&self) -> usize {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
