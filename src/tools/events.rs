use chrono::Duration;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::registry::{bind, ToolRegistry};
use super::{
    not_owned, parse_choice, parse_id, parse_iso_datetime, parse_optional_choice, reject,
    respond, ToolContext, ToolOutcome,
};
use crate::persistence::events::NewEvent;
use crate::persistence::{now_utc, EventRepository, GoalRepository};
use crate::types::{Event, EventStatus, EventType};

fn default_event_type() -> String {
    EventType::Personal.as_str().to_string()
}

fn default_upcoming_limit() -> i64 {
    10
}

#[derive(Debug, Deserialize)]
pub struct CreateEventArgs {
    pub title: String,
    pub start_time: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default = "default_event_type")]
    pub event_type: String,
}

#[derive(Debug, Deserialize)]
pub struct LinkEventArgs {
    pub event_id: String,
    pub goal_id: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateEventStatusArgs {
    pub event_id: String,
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct UpcomingEventsArgs {
    #[serde(default = "default_upcoming_limit")]
    pub limit: i64,
}

#[derive(Debug, Deserialize)]
pub struct UserEventsArgs {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
}

fn event_json(event: &Event) -> Value {
    json!({
        "event_id": event.id,
        "title": event.title,
        "description": event.description,
        "location": event.location,
        "event_type": event.event_type,
        "status": event.status,
        "start_time": event.start_time,
        "end_time": event.end_time,
        "goal_id": event.goal_id,
    })
}

pub struct EventTools {
    ctx: ToolContext,
}

impl EventTools {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }

    pub async fn create_event(&self, args: CreateEventArgs) -> Value {
        respond("create event", self.try_create_event(args).await)
    }

    async fn try_create_event(&self, args: CreateEventArgs) -> ToolOutcome {
        let event_type = parse_choice::<EventType>(&args.event_type)?;
        let start_time = parse_iso_datetime("start_time", &args.start_time)?;
        let end_time = match args.end_time.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(raw) => parse_iso_datetime("end_time", raw)?,
            None => start_time + Duration::hours(1),
        };
        if end_time <= start_time {
            return reject("End time must be after start time");
        }

        let new = NewEvent {
            user_id: self.ctx.user_id,
            goal_id: None,
            title: args.title,
            description: args.description,
            location: args.location,
            event_type,
            start_time,
            end_time,
        };
        let event = self
            .ctx
            .transaction(move |conn| Ok(EventRepository::new(conn).create_event(new)?))
            .await?;

        let mut value = event_json(&event);
        value["created_at"] = json!(event.created_at);
        value["success_message"] = Value::String(format!(
            "Scheduled '{}' for {}",
            event.title,
            event.start_time.format("%B %d, %Y at %I:%M %p UTC")
        ));
        Ok(value)
    }

    pub async fn link_event_to_goal(&self, args: LinkEventArgs) -> Value {
        respond("link event to goal", self.try_link_event_to_goal(args).await)
    }

    async fn try_link_event_to_goal(&self, args: LinkEventArgs) -> ToolOutcome {
        let event_id = parse_id("event_id", &args.event_id)?;
        let goal_id = parse_id("goal_id", &args.goal_id)?;
        let user_id = self.ctx.user_id;

        self.ctx
            .transaction(move |conn| {
                let events = EventRepository::new(conn);
                let goals = GoalRepository::new(conn);
                let event = events
                    .get_by_id(event_id)?
                    .filter(|event| event.user_id == user_id)
                    .ok_or_else(|| not_owned("Event", &event_id.to_string()))?;
                let goal = goals
                    .get_user_goal(user_id, goal_id)?
                    .ok_or_else(|| not_owned("Goal", &goal_id.to_string()))?;

                events.link_event_to_goal(event.id, goal.id)?;
                Ok(json!({
                    "event_id": event.id,
                    "goal_id": goal.id,
                    "event_title": event.title,
                    "goal_title": goal.title,
                    "success_message": format!(
                        "Linked event '{}' to goal '{}'",
                        event.title, goal.title
                    ),
                }))
            })
            .await
    }

    pub async fn update_event_status(&self, args: UpdateEventStatusArgs) -> Value {
        respond("update event status", self.try_update_event_status(args).await)
    }

    async fn try_update_event_status(&self, args: UpdateEventStatusArgs) -> ToolOutcome {
        let event_id = parse_id("event_id", &args.event_id)?;
        let status = parse_choice::<EventStatus>(&args.status)?;
        let user_id = self.ctx.user_id;

        self.ctx
            .transaction(move |conn| {
                let repo = EventRepository::new(conn);
                if repo
                    .get_by_id(event_id)?
                    .filter(|event| event.user_id == user_id)
                    .is_none()
                {
                    return Err(not_owned("Event", &event_id.to_string()));
                }
                let event = repo
                    .update_event_status(event_id, status)?
                    .ok_or_else(|| not_owned("Event", &event_id.to_string()))?;
                Ok(json!({
                    "event_id": event.id,
                    "title": event.title,
                    "status": event.status,
                    "success_message": format!(
                        "Updated event '{}' status to {}",
                        event.title, event.status
                    ),
                }))
            })
            .await
    }

    pub async fn get_upcoming_events(&self, args: UpcomingEventsArgs) -> Value {
        respond("get upcoming events", self.try_get_upcoming_events(args).await)
    }

    async fn try_get_upcoming_events(&self, args: UpcomingEventsArgs) -> ToolOutcome {
        let user_id = self.ctx.user_id;
        let limit = args.limit;
        let events = self
            .ctx
            .transaction(move |conn| {
                Ok(EventRepository::new(conn).get_upcoming_events(user_id, now_utc(), limit)?)
            })
            .await?;

        Ok(json!({
            "events": events.iter().map(event_json).collect::<Vec<_>>(),
            "total": events.len(),
        }))
    }

    pub async fn get_user_events(&self, args: UserEventsArgs) -> Value {
        respond("get events", self.try_get_user_events(args).await)
    }

    async fn try_get_user_events(&self, args: UserEventsArgs) -> ToolOutcome {
        let status = parse_optional_choice::<EventStatus>(args.status.as_deref())?;
        let limit = args.limit;
        let user_id = self.ctx.user_id;

        self.ctx
            .transaction(move |conn| {
                let events = EventRepository::new(conn).get_user_events(user_id, status, limit)?;
                let goals = GoalRepository::new(conn);

                let mut titles: HashMap<Uuid, String> = HashMap::new();
                let mut listed = Vec::with_capacity(events.len());
                for event in &events {
                    let goal_title = match event.goal_id {
                        Some(goal_id) => {
                            if !titles.contains_key(&goal_id) {
                                if let Some(goal) = goals.get_by_id(goal_id)? {
                                    titles.insert(goal_id, goal.title);
                                }
                            }
                            titles.get(&goal_id).cloned()
                        }
                        None => None,
                    };
                    let mut value = event_json(event);
                    value["goal_title"] = json!(goal_title);
                    value["created_at"] = json!(event.created_at);
                    listed.push(value);
                }

                Ok(json!({
                    "events": listed,
                    "total": events.len(),
                    "filter_status": status,
                }))
            })
            .await
    }
}

pub fn register(registry: &mut ToolRegistry, tools: Arc<EventTools>) {
    registry.register_typed(
        "create_event",
        "Create a calendar event for the user",
        json!({
            "type": "object",
            "properties": {
                "title": {"type": "string"},
                "start_time": {"type": "string", "description": "Start time in ISO format"},
                "end_time": {"type": "string", "description": "End time in ISO format, defaults to one hour after start"},
                "description": {"type": "string"},
                "location": {"type": "string"},
                "event_type": {"type": "string", "enum": EventType::VALUES, "default": "personal"}
            },
            "required": ["title", "start_time"]
        }),
        bind!(tools, create_event),
    );

    registry.register_typed(
        "link_event_to_goal",
        "Link an event to one of the user's goals",
        json!({
            "type": "object",
            "properties": {
                "event_id": {"type": "string", "description": "UUID of the event"},
                "goal_id": {"type": "string", "description": "UUID of the goal"}
            },
            "required": ["event_id", "goal_id"]
        }),
        bind!(tools, link_event_to_goal),
    );

    registry.register_typed(
        "update_event_status",
        "Update the status of an event",
        json!({
            "type": "object",
            "properties": {
                "event_id": {"type": "string", "description": "UUID of the event"},
                "status": {"type": "string", "enum": EventStatus::VALUES}
            },
            "required": ["event_id", "status"]
        }),
        bind!(tools, update_event_status),
    );

    registry.register_typed(
        "get_upcoming_events",
        "Get the user's upcoming scheduled events",
        json!({
            "type": "object",
            "properties": {
                "limit": {"type": "integer", "minimum": 1, "default": 10}
            }
        }),
        bind!(tools, get_upcoming_events),
    );

    registry.register_typed(
        "get_user_events",
        "Get the user's events, optionally filtered by status",
        json!({
            "type": "object",
            "properties": {
                "status": {"type": "string", "enum": EventStatus::VALUES},
                "limit": {"type": "integer", "minimum": 1}
            }
        }),
        bind!(tools, get_user_events),
    );
}
