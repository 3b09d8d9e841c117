use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use duckdb::{params, Connection, Row};
use uuid::Uuid;

use super::{
    enum_from_sql, now_utc, opt_ts_from_sql, opt_uuid_from_sql, ts_from_sql, ts_to_sql,
    uuid_from_sql,
};
use crate::types::{Chat, Message, MessageRole};

const CHAT_COLUMNS: &str =
    "id, user_id, title, model, last_seq, CAST(last_active_at AS TEXT), CAST(created_at AS TEXT)";

const MESSAGE_COLUMNS: &str =
    "id, chat_id, seq, role, content, request_id, CAST(created_at AS TEXT)";

fn chat_from_row(row: &Row) -> duckdb::Result<Chat> {
    let id: String = row.get(0)?;
    let user_id: String = row.get(1)?;
    let created_at: String = row.get(6)?;
    Ok(Chat {
        id: uuid_from_sql(0, &id)?,
        user_id: uuid_from_sql(1, &user_id)?,
        title: row.get(2)?,
        model: row.get(3)?,
        last_seq: row.get(4)?,
        last_active_at: opt_ts_from_sql(5, row.get(5)?)?,
        created_at: ts_from_sql(6, &created_at)?,
    })
}

fn message_from_row(row: &Row) -> duckdb::Result<Message> {
    let id: String = row.get(0)?;
    let chat_id: String = row.get(1)?;
    let role: String = row.get(3)?;
    let created_at: String = row.get(6)?;
    Ok(Message {
        id: uuid_from_sql(0, &id)?,
        chat_id: uuid_from_sql(1, &chat_id)?,
        seq: row.get(2)?,
        role: enum_from_sql(3, &role)?,
        content: row.get(4)?,
        request_id: opt_uuid_from_sql(5, row.get(5)?)?,
        created_at: ts_from_sql(6, &created_at)?,
    })
}

/// Chats and their ordered message log.
pub struct ChatRepository<'a> {
    conn: &'a Connection,
}

impl<'a> ChatRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    // ---------- Chats ----------

    pub fn get_by_id(&self, chat_id: Uuid) -> Result<Option<Chat>> {
        let sql = format!("SELECT {} FROM chats WHERE id = ?", CHAT_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params![chat_id.to_string()])?;
        if let Some(row) = rows.next()? {
            Ok(Some(chat_from_row(row)?))
        } else {
            Ok(None)
        }
    }

    /// Chat by id, only when it belongs to `user_id`.
    pub fn get_user_chat(&self, chat_id: Uuid, user_id: Uuid) -> Result<Option<Chat>> {
        Ok(self
            .get_by_id(chat_id)?
            .filter(|chat| chat.user_id == user_id))
    }

    pub fn create_chat(
        &self,
        chat_id: Uuid,
        user_id: Uuid,
        title: Option<String>,
        model: &str,
    ) -> Result<Chat> {
        let chat = Chat {
            id: chat_id,
            user_id,
            title,
            model: model.to_string(),
            last_seq: 0,
            last_active_at: None,
            created_at: now_utc(),
        };
        self.conn
            .execute(
                "INSERT INTO chats (id, user_id, title, model, last_seq, created_at) \
                 VALUES (?, ?, ?, ?, 0, CAST(? AS TIMESTAMP))",
                params![
                    chat.id.to_string(),
                    chat.user_id.to_string(),
                    chat.title,
                    chat.model,
                    ts_to_sql(&chat.created_at),
                ],
            )
            .context("inserting chat")?;
        Ok(chat)
    }

    /// Most recently active first; never-active chats last.
    pub fn get_user_chats(&self, user_id: Uuid) -> Result<Vec<Chat>> {
        let sql = format!(
            "SELECT {} FROM chats WHERE user_id = ? ORDER BY last_active_at DESC NULLS LAST",
            CHAT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params![user_id.to_string()])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(chat_from_row(row)?);
        }
        Ok(out)
    }

    /// Delete a chat and its messages. Returns false when the chat did not exist.
    pub fn delete_chat(&self, chat_id: Uuid) -> Result<bool> {
        self.conn
            .execute(
                "DELETE FROM messages WHERE chat_id = ?",
                params![chat_id.to_string()],
            )
            .context("deleting chat messages")?;
        let removed = self
            .conn
            .execute("DELETE FROM chats WHERE id = ?", params![chat_id.to_string()])
            .context("deleting chat")?;
        Ok(removed > 0)
    }

    // ---------- Messages ----------

    /// Append a message with the next sequence number and bump the chat's activity.
    pub fn append_message(
        &self,
        chat_id: Uuid,
        role: MessageRole,
        content: &str,
        request_id: Option<Uuid>,
    ) -> Result<Message> {
        let seq = self.next_sequence(chat_id)?;
        let message = Message {
            id: Uuid::new_v4(),
            chat_id,
            seq,
            role,
            content: content.to_string(),
            request_id,
            created_at: now_utc(),
        };

        self.conn
            .execute(
                "INSERT INTO messages (id, chat_id, seq, role, content, request_id, created_at) \
                 VALUES (?, ?, ?, ?, ?, ?, CAST(? AS TIMESTAMP))",
                params![
                    message.id.to_string(),
                    chat_id.to_string(),
                    seq,
                    role.as_str(),
                    message.content,
                    request_id.map(|r| r.to_string()),
                    ts_to_sql(&message.created_at),
                ],
            )
            .context("inserting message")?;

        self.update_last_activity(chat_id, seq, message.created_at)?;
        Ok(message)
    }

    pub fn get_by_request_id(&self, chat_id: Uuid, request_id: Uuid) -> Result<Option<Message>> {
        let sql = format!(
            "SELECT {} FROM messages WHERE chat_id = ? AND request_id = ? ORDER BY seq LIMIT 1",
            MESSAGE_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params![chat_id.to_string(), request_id.to_string()])?;
        if let Some(row) = rows.next()? {
            Ok(Some(message_from_row(row)?))
        } else {
            Ok(None)
        }
    }

    pub fn next_sequence(&self, chat_id: Uuid) -> Result<i64> {
        let max: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(seq), 0) FROM messages WHERE chat_id = ?",
            params![chat_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(max + 1)
    }

    pub fn count_messages(&self, chat_id: Uuid) -> Result<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE chat_id = ?",
            params![chat_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// A page counted back from the newest message, returned oldest first.
    pub fn list_messages(&self, chat_id: Uuid, limit: i64, offset: i64) -> Result<Vec<Message>> {
        let sql = format!(
            "SELECT {} FROM messages WHERE chat_id = ? ORDER BY seq DESC LIMIT ? OFFSET ?",
            MESSAGE_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params![chat_id.to_string(), limit.max(0), offset.max(0)])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(message_from_row(row)?);
        }
        out.reverse();
        Ok(out)
    }

    fn update_last_activity(&self, chat_id: Uuid, last_seq: i64, at: DateTime<Utc>) -> Result<()> {
        self.conn
            .execute(
                "UPDATE chats SET last_seq = ?, last_active_at = CAST(? AS TIMESTAMP) WHERE id = ?",
                params![last_seq, ts_to_sql(&at), chat_id.to_string()],
            )
            .context("updating chat activity")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::Persistence;

    #[test]
    fn messages_get_consecutive_sequence_numbers() {
        let db = Persistence::in_memory().unwrap();
        let conn = db.conn();
        let repo = ChatRepository::new(&conn);
        let chat = repo
            .create_chat(Uuid::new_v4(), Uuid::new_v4(), None, "gpt-4o-mini")
            .unwrap();

        for text in ["one", "two", "three"] {
            repo.append_message(chat.id, MessageRole::User, text, None)
                .unwrap();
        }
        let seqs: Vec<i64> = repo
            .list_messages(chat.id, 10, 0)
            .unwrap()
            .iter()
            .map(|m| m.seq)
            .collect();
        assert_eq!(seqs, vec![1, 2, 3]);

        let reloaded = repo.get_by_id(chat.id).unwrap().unwrap();
        assert_eq!(reloaded.last_seq, 3);
        assert!(reloaded.last_active_at.is_some());
    }

    #[test]
    fn pages_count_back_from_newest() {
        let db = Persistence::in_memory().unwrap();
        let conn = db.conn();
        let repo = ChatRepository::new(&conn);
        let chat = repo
            .create_chat(Uuid::new_v4(), Uuid::new_v4(), None, "m")
            .unwrap();
        for i in 1..=5 {
            repo.append_message(chat.id, MessageRole::User, &format!("m{}", i), None)
                .unwrap();
        }
        let page: Vec<String> = repo
            .list_messages(chat.id, 2, 1)
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(page, vec!["m3", "m4"]);
        assert_eq!(repo.count_messages(chat.id).unwrap(), 5);
    }

    #[test]
    fn delete_removes_messages_too() {
        let db = Persistence::in_memory().unwrap();
        let conn = db.conn();
        let repo = ChatRepository::new(&conn);
        let chat = repo
            .create_chat(Uuid::new_v4(), Uuid::new_v4(), None, "m")
            .unwrap();
        repo.append_message(chat.id, MessageRole::User, "bye", None)
            .unwrap();
        assert!(repo.delete_chat(chat.id).unwrap());
        assert_eq!(repo.count_messages(chat.id).unwrap(), 0);
        assert!(!repo.delete_chat(chat.id).unwrap());
    }

    #[test]
    fn request_id_lookup() {
        let db = Persistence::in_memory().unwrap();
        let conn = db.conn();
        let repo = ChatRepository::new(&conn);
        let chat = repo
            .create_chat(Uuid::new_v4(), Uuid::new_v4(), None, "m")
            .unwrap();
        let request = Uuid::new_v4();
        let saved = repo
            .append_message(chat.id, MessageRole::User, "hello", Some(request))
            .unwrap();
        assert_eq!(repo.get_by_request_id(chat.id, request).unwrap(), Some(saved));
        assert!(repo
            .get_by_request_id(chat.id, Uuid::new_v4())
            .unwrap()
            .is_none());
    }
}
