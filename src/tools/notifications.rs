use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::registry::{bind, ToolRegistry};
use super::{
    not_owned, parse_choice, parse_id, parse_iso_datetime, parse_optional_choice, respond,
    ToolContext, ToolOutcome,
};
use crate::persistence::notifications::NewNotification;
use crate::persistence::{now_utc, GoalRepository, NotificationRepository};
use crate::types::{Notification, NotificationStatus, NotificationType};

fn default_notification_type() -> String {
    NotificationType::GoalReminder.as_str().to_string()
}

fn default_list_limit() -> i64 {
    50
}

fn default_pending_limit() -> i64 {
    10
}

#[derive(Debug, Deserialize)]
pub struct CreateNotificationArgs {
    pub message: String,
    pub scheduled_for: String,
    #[serde(default = "default_notification_type")]
    pub notification_type: String,
    #[serde(default)]
    pub goal_id: Option<String>,
    #[serde(default)]
    pub context: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateNotificationStatusArgs {
    pub notification_id: String,
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct UserNotificationsArgs {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default = "default_list_limit")]
    pub limit: i64,
}

#[derive(Debug, Deserialize)]
pub struct PendingNotificationsArgs {
    #[serde(default = "default_pending_limit")]
    pub limit: i64,
}

fn notification_json(notification: &Notification) -> Value {
    json!({
        "notification_id": notification.id,
        "message": notification.message,
        "notification_type": notification.notification_type,
        "scheduled_for": notification.scheduled_for,
        "status": notification.status,
        "sent_at": notification.sent_at,
        "goal_id": notification.goal_id,
        "context": notification.context,
    })
}

pub struct NotificationTools {
    ctx: ToolContext,
}

impl NotificationTools {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }

    pub async fn create_notification(&self, args: CreateNotificationArgs) -> Value {
        respond("create notification", self.try_create_notification(args).await)
    }

    async fn try_create_notification(&self, args: CreateNotificationArgs) -> ToolOutcome {
        let notification_type = parse_choice::<NotificationType>(&args.notification_type)?;
        let scheduled_for = parse_iso_datetime("scheduled_for", &args.scheduled_for)?;
        let goal_id = match args.goal_id.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(raw) => Some(parse_id("goal_id", raw)?),
            None => None,
        };
        let user_id = self.ctx.user_id;
        let chat_id = self.ctx.chat_id;
        let message = args.message;
        let context = args.context.filter(|c| !c.is_null());

        let notification = self
            .ctx
            .transaction(move |conn| {
                if let Some(goal_id) = goal_id {
                    if GoalRepository::new(conn)
                        .get_user_goal(user_id, goal_id)?
                        .is_none()
                    {
                        return Err(not_owned("Goal", &goal_id.to_string()));
                    }
                }
                Ok(NotificationRepository::new(conn).create_notification(NewNotification {
                    user_id,
                    chat_id,
                    goal_id,
                    message,
                    notification_type,
                    scheduled_for,
                    context,
                })?)
            })
            .await?;

        let mut value = notification_json(&notification);
        value["created_at"] = json!(notification.created_at);
        value["success_message"] = Value::String(format!(
            "Scheduled {} notification for {}",
            notification.notification_type.as_str().replace('_', " "),
            notification.scheduled_for.format("%B %d, %Y at %I:%M %p UTC")
        ));
        Ok(value)
    }

    pub async fn update_notification_status(&self, args: UpdateNotificationStatusArgs) -> Value {
        respond(
            "update notification status",
            self.try_update_notification_status(args).await,
        )
    }

    async fn try_update_notification_status(
        &self,
        args: UpdateNotificationStatusArgs,
    ) -> ToolOutcome {
        let notification_id = parse_id("notification_id", &args.notification_id)?;
        let status = parse_choice::<NotificationStatus>(&args.status)?;
        let user_id = self.ctx.user_id;

        self.ctx
            .transaction(move |conn| {
                let repo = NotificationRepository::new(conn);
                let missing = || not_owned("Notification", &notification_id.to_string());
                repo.get_by_id(notification_id)?
                    .filter(|n| n.user_id == user_id)
                    .ok_or_else(missing)?;

                let sent_at = (status == NotificationStatus::Sent).then(now_utc);
                let notification = repo
                    .update_notification_status(notification_id, status, sent_at)?
                    .ok_or_else(missing)?;
                Ok(json!({
                    "notification_id": notification.id,
                    "message": notification.message,
                    "status": notification.status,
                    "sent_at": notification.sent_at,
                    "success_message": format!("Notification marked as {}", notification.status),
                }))
            })
            .await
    }

    pub async fn get_user_notifications(&self, args: UserNotificationsArgs) -> Value {
        respond(
            "get notifications",
            self.try_get_user_notifications(args).await,
        )
    }

    async fn try_get_user_notifications(&self, args: UserNotificationsArgs) -> ToolOutcome {
        let status = parse_optional_choice::<NotificationStatus>(args.status.as_deref())?;
        let limit = args.limit;
        let user_id = self.ctx.user_id;

        self.ctx
            .transaction(move |conn| {
                let notifications = NotificationRepository::new(conn).get_user_notifications(
                    user_id,
                    status,
                    Some(limit),
                )?;
                let goals = GoalRepository::new(conn);

                let mut listed = Vec::with_capacity(notifications.len());
                for notification in &notifications {
                    let goal_title = match notification.goal_id {
                        Some(goal_id) => goals.get_by_id(goal_id)?.map(|goal| goal.title),
                        None => None,
                    };
                    let mut value = notification_json(notification);
                    value["goal_title"] = json!(goal_title);
                    listed.push(value);
                }

                Ok(json!({
                    "notifications": listed,
                    "total": notifications.len(),
                    "filter_status": status,
                }))
            })
            .await
    }

    pub async fn get_pending_notifications(&self, args: PendingNotificationsArgs) -> Value {
        respond(
            "get pending notifications",
            self.try_get_pending_notifications(args).await,
        )
    }

    async fn try_get_pending_notifications(&self, args: PendingNotificationsArgs) -> ToolOutcome {
        let limit = args.limit;
        let user_id = self.ctx.user_id;
        let pending = self
            .ctx
            .transaction(move |conn| {
                Ok(NotificationRepository::new(conn).get_pending_notifications(
                    Some(user_id),
                    now_utc(),
                    Some(limit),
                )?)
            })
            .await?;

        Ok(json!({
            "pending_notifications": pending.iter().map(notification_json).collect::<Vec<_>>(),
            "total": pending.len(),
        }))
    }
}

pub fn register(registry: &mut ToolRegistry, tools: Arc<NotificationTools>) {
    registry.register_typed(
        "create_notification",
        "Schedule a notification for the user",
        json!({
            "type": "object",
            "properties": {
                "message": {"type": "string", "description": "Text shown to the user"},
                "scheduled_for": {"type": "string", "description": "When to deliver, ISO format"},
                "notification_type": {"type": "string", "enum": NotificationType::VALUES, "default": "goal_reminder"},
                "goal_id": {"type": "string", "description": "UUID of a related goal"},
                "context": {"type": "object", "description": "Extra data stored with the notification"}
            },
            "required": ["message", "scheduled_for"]
        }),
        bind!(tools, create_notification),
    );

    registry.register_typed(
        "update_notification_status",
        "Update the status of a notification",
        json!({
            "type": "object",
            "properties": {
                "notification_id": {"type": "string", "description": "UUID of the notification"},
                "status": {"type": "string", "enum": NotificationStatus::VALUES}
            },
            "required": ["notification_id", "status"]
        }),
        bind!(tools, update_notification_status),
    );

    registry.register_typed(
        "get_user_notifications",
        "Get the user's notifications, newest first",
        json!({
            "type": "object",
            "properties": {
                "status": {"type": "string", "enum": NotificationStatus::VALUES},
                "limit": {"type": "integer", "minimum": 1, "default": 50}
            }
        }),
        bind!(tools, get_user_notifications),
    );

    registry.register_typed(
        "get_pending_notifications",
        "Get pending notifications that are due now",
        json!({
            "type": "object",
            "properties": {
                "limit": {"type": "integer", "minimum": 1, "default": 10}
            }
        }),
        bind!(tools, get_pending_notifications),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::Persistence;
    use uuid::Uuid;

    fn tools() -> NotificationTools {
        let db = Persistence::in_memory().unwrap();
        NotificationTools::new(ToolContext::new(db, Uuid::new_v4(), Uuid::new_v4()))
    }

    fn args(message: &str, at: &str) -> CreateNotificationArgs {
        CreateNotificationArgs {
            message: message.to_string(),
            scheduled_for: at.to_string(),
            notification_type: default_notification_type(),
            goal_id: None,
            context: None,
        }
    }

    #[tokio::test]
    async fn marking_sent_sets_sent_at() {
        let tools = tools();
        let created = tools
            .create_notification(args("Drink water", "2020-01-01T10:00:00Z"))
            .await;
        assert_eq!(created["status"], "pending");
        assert!(created["sent_at"].is_null());

        let updated = tools
            .update_notification_status(UpdateNotificationStatusArgs {
                notification_id: created["notification_id"].as_str().unwrap().to_string(),
                status: "sent".into(),
            })
            .await;
        assert_eq!(updated["status"], "sent");
        assert!(updated["sent_at"].is_string());
    }

    #[tokio::test]
    async fn unknown_goal_is_rejected() {
        let tools = tools();
        let mut request = args("Go", "2030-01-01T10:00:00Z");
        let goal_id = Uuid::new_v4().to_string();
        request.goal_id = Some(goal_id.clone());
        let value = tools.create_notification(request).await;
        assert_eq!(
            value["error"],
            format!("Goal {} not found or not owned by user", goal_id)
        );
    }

    #[tokio::test]
    async fn pending_lists_only_due() {
        let tools = tools();
        tools
            .create_notification(args("due", "2020-01-01T10:00:00Z"))
            .await;
        tools
            .create_notification(args("later", "2099-01-01T10:00:00Z"))
            .await;
        let value = tools
            .get_pending_notifications(PendingNotificationsArgs { limit: 10 })
            .await;
        assert_eq!(value["total"], 1);
        assert_eq!(value["pending_notifications"][0]["message"], "due");

        let all = tools
            .get_user_notifications(UserNotificationsArgs {
                status: None,
                limit: 50,
            })
            .await;
        assert_eq!(all["total"], 2);
        assert_eq!(all["notifications"][0]["message"], "later");
    }
}
