use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use duckdb::{params, Connection, Row};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use super::{
    enum_from_sql, now_utc, opt_ts_from_sql, opt_uuid_from_sql, ts_from_sql, ts_to_sql,
    uuid_from_sql,
};
use crate::types::{Notification, NotificationStatus, NotificationType};

const NOTIFICATION_COLUMNS: &str = "id, user_id, chat_id, goal_id, message, notification_type, \
     CAST(scheduled_for AS TEXT), status, CAST(sent_at AS TEXT), context, CAST(created_at AS TEXT)";

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub chat_id: Uuid,
    pub goal_id: Option<Uuid>,
    pub message: String,
    pub notification_type: NotificationType,
    pub scheduled_for: DateTime<Utc>,
    pub context: Option<JsonValue>,
}

fn notification_from_row(row: &Row) -> duckdb::Result<Notification> {
    let id: String = row.get(0)?;
    let user_id: String = row.get(1)?;
    let chat_id: String = row.get(2)?;
    let notification_type: String = row.get(5)?;
    let scheduled_for: String = row.get(6)?;
    let status: String = row.get(7)?;
    let context: Option<String> = row.get(9)?;
    let created_at: String = row.get(10)?;
    let context = context
        .map(|raw| serde_json::from_str(&raw))
        .transpose()
        .map_err(|e| {
            duckdb::Error::FromSqlConversionFailure(9, duckdb::types::Type::Text, Box::new(e))
        })?;
    Ok(Notification {
        id: uuid_from_sql(0, &id)?,
        user_id: uuid_from_sql(1, &user_id)?,
        chat_id: uuid_from_sql(2, &chat_id)?,
        goal_id: opt_uuid_from_sql(3, row.get(3)?)?,
        message: row.get(4)?,
        notification_type: enum_from_sql(5, &notification_type)?,
        scheduled_for: ts_from_sql(6, &scheduled_for)?,
        status: enum_from_sql(7, &status)?,
        sent_at: opt_ts_from_sql(8, row.get(8)?)?,
        context,
        created_at: ts_from_sql(10, &created_at)?,
    })
}

pub struct NotificationRepository<'a> {
    conn: &'a Connection,
}

impl<'a> NotificationRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn create_notification(&self, new: NewNotification) -> Result<Notification> {
        let notification = Notification {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            chat_id: new.chat_id,
            goal_id: new.goal_id,
            message: new.message,
            notification_type: new.notification_type,
            scheduled_for: new.scheduled_for,
            status: NotificationStatus::Pending,
            sent_at: None,
            context: new.context,
            created_at: now_utc(),
        };
        let context = notification
            .context
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .context("serializing notification context")?;

        self.conn
            .execute(
                "INSERT INTO notifications (id, user_id, chat_id, goal_id, message, notification_type, \
                 scheduled_for, status, context, created_at) VALUES (?, ?, ?, ?, ?, ?, \
                 CAST(? AS TIMESTAMP), ?, ?, CAST(? AS TIMESTAMP))",
                params![
                    notification.id.to_string(),
                    notification.user_id.to_string(),
                    notification.chat_id.to_string(),
                    notification.goal_id.map(|g| g.to_string()),
                    notification.message,
                    notification.notification_type.as_str(),
                    ts_to_sql(&notification.scheduled_for),
                    notification.status.as_str(),
                    context,
                    ts_to_sql(&notification.created_at),
                ],
            )
            .context("inserting notification")?;

        Ok(notification)
    }

    pub fn get_by_id(&self, notification_id: Uuid) -> Result<Option<Notification>> {
        let sql = format!(
            "SELECT {} FROM notifications WHERE id = ?",
            NOTIFICATION_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params![notification_id.to_string()])?;
        if let Some(row) = rows.next()? {
            Ok(Some(notification_from_row(row)?))
        } else {
            Ok(None)
        }
    }

    /// Most recently scheduled first.
    pub fn get_user_notifications(
        &self,
        user_id: Uuid,
        status: Option<NotificationStatus>,
        limit: Option<i64>,
    ) -> Result<Vec<Notification>> {
        let mut sql = format!(
            "SELECT {} FROM notifications WHERE user_id = ?",
            NOTIFICATION_COLUMNS
        );
        let mut args = vec![user_id.to_string()];
        if let Some(status) = status {
            sql.push_str(" AND status = ?");
            args.push(status.as_str().to_string());
        }
        sql.push_str(" ORDER BY scheduled_for DESC");
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {}", limit.max(0)));
        }
        self.collect(&sql, args)
    }

    /// Pending notifications already due at `now`, oldest first.
    pub fn get_pending_notifications(
        &self,
        user_id: Option<Uuid>,
        now: DateTime<Utc>,
        limit: Option<i64>,
    ) -> Result<Vec<Notification>> {
        let mut sql = format!(
            "SELECT {} FROM notifications WHERE status = ? AND scheduled_for <= CAST(? AS TIMESTAMP)",
            NOTIFICATION_COLUMNS
        );
        let mut args = vec![
            NotificationStatus::Pending.as_str().to_string(),
            ts_to_sql(&now),
        ];
        if let Some(user_id) = user_id {
            sql.push_str(" AND user_id = ?");
            args.push(user_id.to_string());
        }
        sql.push_str(" ORDER BY scheduled_for ASC");
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {}", limit.max(0)));
        }
        self.collect(&sql, args)
    }

    /// Set the status; `sent_at` is stamped when given.
    pub fn update_notification_status(
        &self,
        notification_id: Uuid,
        status: NotificationStatus,
        sent_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Notification>> {
        self.conn
            .execute(
                "UPDATE notifications SET status = ?, \
                 sent_at = COALESCE(CAST(? AS TIMESTAMP), sent_at) WHERE id = ?",
                params![
                    status.as_str(),
                    sent_at.as_ref().map(ts_to_sql),
                    notification_id.to_string(),
                ],
            )
            .context("updating notification status")?;
        self.get_by_id(notification_id)
    }

    fn collect(&self, sql: &str, args: Vec<String>) -> Result<Vec<Notification>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(duckdb::params_from_iter(args.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(notification_from_row(row)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::Persistence;
    use chrono::Duration;
    use serde_json::json;

    fn pending(user_id: Uuid, message: &str, at: DateTime<Utc>) -> NewNotification {
        NewNotification {
            user_id,
            chat_id: Uuid::new_v4(),
            goal_id: None,
            message: message.to_string(),
            notification_type: NotificationType::GoalReminder,
            scheduled_for: at,
            context: Some(json!({"source": "test"})),
        }
    }

    #[test]
    fn context_is_stored_as_json() {
        let db = Persistence::in_memory().unwrap();
        let conn = db.conn();
        let repo = NotificationRepository::new(&conn);
        let created = repo
            .create_notification(pending(Uuid::new_v4(), "stretch", now_utc()))
            .unwrap();
        let loaded = repo.get_by_id(created.id).unwrap().unwrap();
        assert_eq!(loaded.context, Some(json!({"source": "test"})));
        assert_eq!(loaded, created);
    }

    #[test]
    fn pending_only_returns_due_items_oldest_first() {
        let db = Persistence::in_memory().unwrap();
        let conn = db.conn();
        let repo = NotificationRepository::new(&conn);
        let user = Uuid::new_v4();
        let now = now_utc();
        repo.create_notification(pending(user, "future", now + Duration::hours(1)))
            .unwrap();
        repo.create_notification(pending(user, "recent", now - Duration::minutes(5)))
            .unwrap();
        repo.create_notification(pending(user, "old", now - Duration::hours(2)))
            .unwrap();

        let due: Vec<String> = repo
            .get_pending_notifications(Some(user), now, None)
            .unwrap()
            .into_iter()
            .map(|n| n.message)
            .collect();
        assert_eq!(due, vec!["old", "recent"]);
    }

    #[test]
    fn marking_sent_stamps_sent_at() {
        let db = Persistence::in_memory().unwrap();
        let conn = db.conn();
        let repo = NotificationRepository::new(&conn);
        let created = repo
            .create_notification(pending(Uuid::new_v4(), "hi", now_utc()))
            .unwrap();
        let sent_at = now_utc();
        let updated = repo
            .update_notification_status(created.id, NotificationStatus::Sent, Some(sent_at))
            .unwrap()
            .unwrap();
        assert_eq!(updated.status, NotificationStatus::Sent);
        assert_eq!(updated.sent_at, Some(sent_at));

        let dismissed = repo
            .update_notification_status(created.id, NotificationStatus::Dismissed, None)
            .unwrap()
            .unwrap();
        assert_eq!(dismissed.sent_at, Some(sent_at));
    }
}
