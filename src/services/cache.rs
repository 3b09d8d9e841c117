//! Recent messages per chat, kept in memory so building model context does
//! not hit the database on every turn.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use uuid::Uuid;

use crate::types::Message;

pub const DEFAULT_CACHE_SIZE: usize = 100;

pub struct MessageCache {
    capacity: usize,
    chats: RwLock<HashMap<Uuid, Vec<Message>>>,
}

impl MessageCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            chats: RwLock::new(HashMap::new()),
        }
    }

    /// Insert in seq order, replacing a cached message with the same seq, and
    /// drop the oldest entries past capacity.
    pub fn push(&self, message: Message) {
        let mut chats = self.chats.write().unwrap_or_else(PoisonError::into_inner);
        let entries = chats.entry(message.chat_id).or_default();
        match entries.binary_search_by_key(&message.seq, |m| m.seq) {
            Ok(pos) => entries[pos] = message,
            Err(pos) => entries.insert(pos, message),
        }
        if entries.len() > self.capacity {
            let excess = entries.len() - self.capacity;
            entries.drain(..excess);
        }
    }

    /// Up to `limit` newest messages, oldest first.
    pub fn recent(&self, chat_id: Uuid, limit: usize) -> Vec<Message> {
        let chats = self.chats.read().unwrap_or_else(PoisonError::into_inner);
        chats
            .get(&chat_id)
            .map(|entries| {
                let start = entries.len().saturating_sub(limit);
                entries[start..].to_vec()
            })
            .unwrap_or_default()
    }

    pub fn len(&self, chat_id: Uuid) -> usize {
        self.chats
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&chat_id)
            .map_or(0, Vec::len)
    }

    pub fn clear(&self, chat_id: Uuid) {
        self.chats
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&chat_id);
    }
}

impl Default for MessageCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_SIZE)
    }
}
