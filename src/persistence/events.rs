use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use duckdb::{params, Connection, Row};
use uuid::Uuid;

use super::{enum_from_sql, now_utc, opt_uuid_from_sql, ts_from_sql, ts_to_sql, uuid_from_sql};
use crate::types::{Event, EventStatus, EventType};

const EVENT_COLUMNS: &str = "id, user_id, goal_id, title, description, location, event_type, status, \
     CAST(start_time AS TEXT), CAST(end_time AS TEXT), CAST(created_at AS TEXT)";

/// Fields accepted when scheduling an event.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub user_id: Uuid,
    pub goal_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub event_type: EventType,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

fn event_from_row(row: &Row) -> duckdb::Result<Event> {
    let id: String = row.get(0)?;
    let user_id: String = row.get(1)?;
    let event_type: String = row.get(6)?;
    let status: String = row.get(7)?;
    let start_time: String = row.get(8)?;
    let end_time: String = row.get(9)?;
    let created_at: String = row.get(10)?;
    Ok(Event {
        id: uuid_from_sql(0, &id)?,
        user_id: uuid_from_sql(1, &user_id)?,
        goal_id: opt_uuid_from_sql(2, row.get(2)?)?,
        title: row.get(3)?,
        description: row.get(4)?,
        location: row.get(5)?,
        event_type: enum_from_sql(6, &event_type)?,
        status: enum_from_sql(7, &status)?,
        start_time: ts_from_sql(8, &start_time)?,
        end_time: ts_from_sql(9, &end_time)?,
        created_at: ts_from_sql(10, &created_at)?,
    })
}

pub struct EventRepository<'a> {
    conn: &'a Connection,
}

impl<'a> EventRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn create_event(&self, new: NewEvent) -> Result<Event> {
        let event = Event {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            goal_id: new.goal_id,
            title: new.title,
            description: new.description,
            location: new.location,
            event_type: new.event_type,
            status: EventStatus::Scheduled,
            start_time: new.start_time,
            end_time: new.end_time,
            created_at: now_utc(),
        };

        self.conn
            .execute(
                "INSERT INTO events (id, user_id, goal_id, title, description, location, event_type, status, \
                 start_time, end_time, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, \
                 CAST(? AS TIMESTAMP), CAST(? AS TIMESTAMP), CAST(? AS TIMESTAMP))",
                params![
                    event.id.to_string(),
                    event.user_id.to_string(),
                    event.goal_id.map(|g| g.to_string()),
                    event.title,
                    event.description,
                    event.location,
                    event.event_type.as_str(),
                    event.status.as_str(),
                    ts_to_sql(&event.start_time),
                    ts_to_sql(&event.end_time),
                    ts_to_sql(&event.created_at),
                ],
            )
            .context("inserting event")?;

        Ok(event)
    }

    pub fn get_by_id(&self, event_id: Uuid) -> Result<Option<Event>> {
        let sql = format!("SELECT {} FROM events WHERE id = ?", EVENT_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params![event_id.to_string()])?;
        if let Some(row) = rows.next()? {
            Ok(Some(event_from_row(row)?))
        } else {
            Ok(None)
        }
    }

    /// Events in start order, optionally narrowed to one status.
    pub fn get_user_events(
        &self,
        user_id: Uuid,
        status: Option<EventStatus>,
        limit: Option<i64>,
    ) -> Result<Vec<Event>> {
        let mut sql = format!("SELECT {} FROM events WHERE user_id = ?", EVENT_COLUMNS);
        let mut args = vec![user_id.to_string()];
        if let Some(status) = status {
            sql.push_str(" AND status = ?");
            args.push(status.as_str().to_string());
        }
        sql.push_str(" ORDER BY start_time ASC");
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {}", limit.max(0)));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(duckdb::params_from_iter(args.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(event_from_row(row)?);
        }
        Ok(out)
    }

    /// Scheduled events starting at or after `now`, soonest first.
    pub fn get_upcoming_events(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Event>> {
        let sql = format!(
            "SELECT {} FROM events WHERE user_id = ? AND start_time >= CAST(? AS TIMESTAMP) \
             AND status = ? ORDER BY start_time ASC LIMIT ?",
            EVENT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params![
            user_id.to_string(),
            ts_to_sql(&now),
            EventStatus::Scheduled.as_str(),
            limit.max(0),
        ])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(event_from_row(row)?);
        }
        Ok(out)
    }

    pub fn update_event_status(&self, event_id: Uuid, status: EventStatus) -> Result<Option<Event>> {
        self.conn
            .execute(
                "UPDATE events SET status = ? WHERE id = ?",
                params![status.as_str(), event_id.to_string()],
            )
            .context("updating event status")?;
        self.get_by_id(event_id)
    }

    pub fn link_event_to_goal(&self, event_id: Uuid, goal_id: Uuid) -> Result<Option<Event>> {
        self.conn
            .execute(
                "UPDATE events SET goal_id = ? WHERE id = ?",
                params![goal_id.to_string(), event_id.to_string()],
            )
            .context("linking event to goal")?;
        self.get_by_id(event_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::Persistence;
    use chrono::Duration;

    fn new_event(user_id: Uuid, title: &str, start: DateTime<Utc>) -> NewEvent {
        NewEvent {
            user_id,
            goal_id: None,
            title: title.to_string(),
            description: None,
            location: None,
            event_type: EventType::FocusTime,
            start_time: start,
            end_time: start + Duration::hours(1),
        }
    }

    #[test]
    fn upcoming_skips_past_and_non_scheduled() {
        let db = Persistence::in_memory().unwrap();
        let conn = db.conn();
        let repo = EventRepository::new(&conn);
        let user = Uuid::new_v4();
        let now = now_utc();

        repo.create_event(new_event(user, "past", now - Duration::hours(3)))
            .unwrap();
        let later = repo
            .create_event(new_event(user, "later", now + Duration::days(2)))
            .unwrap();
        repo.create_event(new_event(user, "soon", now + Duration::hours(2)))
            .unwrap();
        let cancelled = repo
            .create_event(new_event(user, "cancelled", now + Duration::hours(1)))
            .unwrap();
        repo.update_event_status(cancelled.id, EventStatus::Cancelled)
            .unwrap();

        let titles: Vec<String> = repo
            .get_upcoming_events(user, now, 10)
            .unwrap()
            .into_iter()
            .map(|e| e.title)
            .collect();
        assert_eq!(titles, vec!["soon".to_string(), later.title]);
    }

    #[test]
    fn linking_sets_goal() {
        let db = Persistence::in_memory().unwrap();
        let conn = db.conn();
        let repo = EventRepository::new(&conn);
        let user = Uuid::new_v4();
        let event = repo
            .create_event(new_event(user, "study", now_utc()))
            .unwrap();
        let goal_id = Uuid::new_v4();
        let linked = repo.link_event_to_goal(event.id, goal_id).unwrap().unwrap();
        assert_eq!(linked.goal_id, Some(goal_id));
    }
}
