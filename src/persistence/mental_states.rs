use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use duckdb::{params, Connection, Row};
use uuid::Uuid;

use super::{
    date_from_sql, date_to_sql, now_utc, opt_enum_from_sql, opt_ts_from_sql, ts_from_sql,
    ts_to_sql, uuid_from_sql,
};
use crate::types::{MentalState, Mood};

const MENTAL_STATE_COLUMNS: &str = "id, user_id, CAST(poll_date AS TEXT), mood, readiness_level, notes, \
     CAST(question_asked_at AS TEXT), CAST(responded_at AS TEXT)";

/// Answer to a poll. Absent fields keep their stored value.
#[derive(Debug, Clone, Default)]
pub struct MentalStateResponse {
    pub mood: Option<Mood>,
    pub readiness_level: Option<i32>,
    pub notes: Option<String>,
    pub responded_at: Option<DateTime<Utc>>,
}

fn mental_state_from_row(row: &Row) -> duckdb::Result<MentalState> {
    let id: String = row.get(0)?;
    let user_id: String = row.get(1)?;
    let date: String = row.get(2)?;
    let asked: String = row.get(6)?;
    Ok(MentalState {
        id: uuid_from_sql(0, &id)?,
        user_id: uuid_from_sql(1, &user_id)?,
        date: date_from_sql(2, &date)?,
        mood: opt_enum_from_sql(3, row.get(3)?)?,
        readiness_level: row.get(4)?,
        notes: row.get(5)?,
        question_asked_at: ts_from_sql(6, &asked)?,
        responded_at: opt_ts_from_sql(7, row.get(7)?)?,
    })
}

pub struct MentalStateRepository<'a> {
    conn: &'a Connection,
}

impl<'a> MentalStateRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Open a poll for `date`. The table allows one poll per user per day.
    pub fn create_mental_state(&self, user_id: Uuid, date: NaiveDate) -> Result<MentalState> {
        let state = MentalState {
            id: Uuid::new_v4(),
            user_id,
            date,
            mood: None,
            readiness_level: None,
            notes: None,
            question_asked_at: now_utc(),
            responded_at: None,
        };

        self.conn
            .execute(
                "INSERT INTO mental_states (id, user_id, poll_date, question_asked_at) \
                 VALUES (?, ?, CAST(? AS DATE), CAST(? AS TIMESTAMP))",
                params![
                    state.id.to_string(),
                    user_id.to_string(),
                    date_to_sql(&date),
                    ts_to_sql(&state.question_asked_at),
                ],
            )
            .context("inserting mental state poll")?;

        Ok(state)
    }

    pub fn get_by_id(&self, mental_state_id: Uuid) -> Result<Option<MentalState>> {
        let sql = format!(
            "SELECT {} FROM mental_states WHERE id = ?",
            MENTAL_STATE_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params![mental_state_id.to_string()])?;
        if let Some(row) = rows.next()? {
            Ok(Some(mental_state_from_row(row)?))
        } else {
            Ok(None)
        }
    }

    pub fn get_by_user_and_date(&self, user_id: Uuid, date: NaiveDate) -> Result<Option<MentalState>> {
        let sql = format!(
            "SELECT {} FROM mental_states WHERE user_id = ? AND poll_date = CAST(? AS DATE)",
            MENTAL_STATE_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params![user_id.to_string(), date_to_sql(&date)])?;
        if let Some(row) = rows.next()? {
            Ok(Some(mental_state_from_row(row)?))
        } else {
            Ok(None)
        }
    }

    /// Newest day first, optionally bounded by an inclusive date range.
    pub fn get_user_mental_states(
        &self,
        user_id: Uuid,
        limit: Option<i64>,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<MentalState>> {
        let mut sql = format!(
            "SELECT {} FROM mental_states WHERE user_id = ?",
            MENTAL_STATE_COLUMNS
        );
        let mut args = vec![user_id.to_string()];
        if let Some(start) = start_date {
            sql.push_str(" AND poll_date >= CAST(? AS DATE)");
            args.push(date_to_sql(&start));
        }
        if let Some(end) = end_date {
            sql.push_str(" AND poll_date <= CAST(? AS DATE)");
            args.push(date_to_sql(&end));
        }
        sql.push_str(" ORDER BY poll_date DESC");
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {}", limit.max(0)));
        }
        self.collect(&sql, args)
    }

    /// One page of the user's polls, newest day first.
    pub fn list_user_mental_states_page(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<MentalState>> {
        let sql = format!(
            "SELECT {} FROM mental_states WHERE user_id = ? \
             ORDER BY poll_date DESC, question_asked_at DESC LIMIT {} OFFSET {}",
            MENTAL_STATE_COLUMNS,
            limit.max(0),
            offset.max(0)
        );
        self.collect(&sql, vec![user_id.to_string()])
    }

    pub fn count_user_mental_states(&self, user_id: Uuid) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM mental_states WHERE user_id = ?",
                params![user_id.to_string()],
                |row| row.get(0),
            )
            .context("counting mental states")?;
        Ok(count)
    }

    /// Polls never answered, longest waiting first.
    pub fn get_unanswered_polls(&self, user_id: Uuid, limit: Option<i64>) -> Result<Vec<MentalState>> {
        let mut sql = format!(
            "SELECT {} FROM mental_states WHERE user_id = ? AND responded_at IS NULL \
             ORDER BY question_asked_at ASC",
            MENTAL_STATE_COLUMNS
        );
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {}", limit.max(0)));
        }
        self.collect(&sql, vec![user_id.to_string()])
    }

    /// Latest answered poll at or after `since`.
    pub fn get_latest_response(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Option<MentalState>> {
        let sql = format!(
            "SELECT {} FROM mental_states WHERE user_id = ? AND responded_at IS NOT NULL \
             AND responded_at >= CAST(? AS TIMESTAMP) ORDER BY responded_at DESC LIMIT 1",
            MENTAL_STATE_COLUMNS
        );
        Ok(self
            .collect(&sql, vec![user_id.to_string(), ts_to_sql(&since)])?
            .into_iter()
            .next())
    }

    pub fn respond(
        &self,
        mental_state_id: Uuid,
        response: MentalStateResponse,
    ) -> Result<Option<MentalState>> {
        self.conn
            .execute(
                "UPDATE mental_states SET mood = COALESCE(CAST(? AS TEXT), mood), \
                 readiness_level = COALESCE(CAST(? AS INTEGER), readiness_level), \
                 notes = COALESCE(CAST(? AS TEXT), notes), \
                 responded_at = COALESCE(CAST(? AS TIMESTAMP), responded_at) WHERE id = ?",
                params![
                    response.mood.map(|m| m.as_str()),
                    response.readiness_level,
                    response.notes,
                    response.responded_at.as_ref().map(ts_to_sql),
                    mental_state_id.to_string(),
                ],
            )
            .context("recording mental state response")?;
        self.get_by_id(mental_state_id)
    }

    fn collect(&self, sql: &str, args: Vec<String>) -> Result<Vec<MentalState>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(duckdb::params_from_iter(args.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(mental_state_from_row(row)?);
        }
        Ok(out)
    }
}
