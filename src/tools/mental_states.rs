use chrono::{Days, NaiveDate};
use duckdb::Connection;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use super::registry::{bind, ToolRegistry};
use super::{
    long_date, parse_choice, parse_iso_day, reject, respond, ToolContext, ToolError, ToolOutcome,
};
use crate::persistence::mental_states::MentalStateResponse;
use crate::persistence::{now_utc, MentalStateRepository};
use crate::types::{MentalState, Mood};

fn default_history_limit() -> i64 {
    30
}

fn default_unanswered_limit() -> i64 {
    10
}

fn default_trend_days() -> i64 {
    30
}

/// How many answered moods `get_mood_trends` echoes back, newest first.
const RECENT_MOODS: usize = 7;

#[derive(Debug, Deserialize, Default)]
pub struct CreatePollArgs {
    #[serde(default)]
    pub date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RespondToPollArgs {
    pub mental_state_id: String,
    #[serde(default)]
    pub mood: Option<String>,
    #[serde(default)]
    pub readiness_level: Option<i32>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RecordMoodArgs {
    pub mood: String,
    #[serde(default)]
    pub readiness_level: Option<i32>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MentalStateHistoryArgs {
    #[serde(default = "default_history_limit")]
    pub limit: i64,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UnansweredPollsArgs {
    #[serde(default = "default_unanswered_limit")]
    pub limit: i64,
}

#[derive(Debug, Deserialize)]
pub struct MoodTrendsArgs {
    #[serde(default = "default_trend_days")]
    pub days: i64,
}

/// Validated answer to a poll.
struct PollAnswer {
    mood: Option<Mood>,
    readiness_level: Option<i32>,
    notes: Option<String>,
}

impl PollAnswer {
    fn parse(
        mood: Option<&str>,
        readiness_level: Option<i32>,
        notes: Option<String>,
    ) -> ToolOutcome<Self> {
        let mood = match mood.filter(|m| !m.is_empty()) {
            Some(raw) => Some(parse_choice::<Mood>(raw)?),
            None => None,
        };
        if let Some(level) = readiness_level {
            if !(1..=10).contains(&level) {
                return reject("Readiness level must be between 1 and 10");
            }
        }
        Ok(Self {
            mood,
            readiness_level,
            notes,
        })
    }

    fn message(&self) -> String {
        let mood_text = match self.mood {
            Some(mood) => format!("feeling {}", mood.as_str().replace('_', " ")),
            None => "mood recorded".to_string(),
        };
        let readiness_text = self
            .readiness_level
            .map(|level| format!(" with readiness level {}/10", level))
            .unwrap_or_default();
        format!("Recorded your mental state: {}{}", mood_text, readiness_text)
    }
}

fn poll_not_owned(raw_id: &str) -> ToolError {
    ToolError::Rejected(format!(
        "Mental state poll {} not found or not owned by user",
        raw_id
    ))
}

fn state_json(state: &MentalState) -> Value {
    json!({
        "mental_state_id": state.id,
        "date": state.date,
        "mood": state.mood,
        "readiness_level": state.readiness_level,
        "notes": state.notes,
        "question_asked_at": state.question_asked_at,
        "responded_at": state.responded_at,
        "status": if state.responded_at.is_some() { "completed" } else { "pending" },
    })
}

/// Write the answer. Answering again overwrites the previous answer.
fn answer_poll(conn: &Connection, poll: &MentalState, answer: &PollAnswer) -> ToolOutcome {
    let repo = MentalStateRepository::new(conn);
    let updated = repo
        .respond(
            poll.id,
            MentalStateResponse {
                mood: answer.mood,
                readiness_level: answer.readiness_level,
                notes: answer.notes.clone(),
                responded_at: Some(now_utc()),
            },
        )?
        .ok_or_else(|| poll_not_owned(&poll.id.to_string()))?;

    Ok(json!({
        "mental_state_id": updated.id,
        "date": updated.date,
        "mood": answer.mood,
        "readiness_level": answer.readiness_level,
        "notes": answer.notes,
        "responded_at": updated.responded_at,
        "success_message": answer.message(),
    }))
}

pub struct MentalStateTools {
    ctx: ToolContext,
}

impl MentalStateTools {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }

    fn poll_date(raw: Option<&str>) -> ToolOutcome<NaiveDate> {
        match raw.filter(|s| !s.trim().is_empty()) {
            Some(raw) => parse_iso_day("date", raw),
            None => Ok(now_utc().date_naive()),
        }
    }

    pub async fn create_daily_poll(&self, args: CreatePollArgs) -> Value {
        respond("create daily poll", self.try_create_daily_poll(args).await)
    }

    async fn try_create_daily_poll(&self, args: CreatePollArgs) -> ToolOutcome {
        let date = Self::poll_date(args.date.as_deref())?;
        let user_id = self.ctx.user_id;

        let poll = self
            .ctx
            .transaction(move |conn| {
                let repo = MentalStateRepository::new(conn);
                if repo.get_by_user_and_date(user_id, date)?.is_some() {
                    return reject(format!("Mental state poll already exists for {}", date));
                }
                Ok(repo.create_mental_state(user_id, date)?)
            })
            .await?;

        Ok(json!({
            "mental_state_id": poll.id,
            "user_id": poll.user_id,
            "date": poll.date,
            "question_asked_at": poll.question_asked_at,
            "status": "pending",
            "success_message": format!("Created daily mood check for {}", long_date(&poll.date)),
        }))
    }

    pub async fn respond_to_poll(&self, args: RespondToPollArgs) -> Value {
        respond("respond to poll", self.try_respond_to_poll(args).await)
    }

    async fn try_respond_to_poll(&self, args: RespondToPollArgs) -> ToolOutcome {
        let raw_id = args.mental_state_id;
        let Ok(poll_id) = Uuid::parse_str(raw_id.trim()) else {
            return reject(format!("Invalid mental_state_id format: {}", raw_id));
        };
        let answer = PollAnswer::parse(args.mood.as_deref(), args.readiness_level, args.notes)?;
        let user_id = self.ctx.user_id;

        self.ctx
            .transaction(move |conn| {
                let poll = MentalStateRepository::new(conn)
                    .get_by_id(poll_id)?
                    .filter(|poll| poll.user_id == user_id)
                    .ok_or_else(|| poll_not_owned(&raw_id))?;
                answer_poll(conn, &poll, &answer)
            })
            .await
    }

    /// Answer the poll for a day in one step, opening it first when needed.
    pub async fn record_mood(&self, args: RecordMoodArgs) -> Value {
        respond("record mood", self.try_record_mood(args).await)
    }

    async fn try_record_mood(&self, args: RecordMoodArgs) -> ToolOutcome {
        let date = Self::poll_date(args.date.as_deref())?;
        let answer = PollAnswer::parse(Some(&args.mood), args.readiness_level, args.notes)?;
        let user_id = self.ctx.user_id;

        self.ctx
            .transaction(move |conn| {
                let repo = MentalStateRepository::new(conn);
                let poll = match repo.get_by_user_and_date(user_id, date)? {
                    Some(poll) => poll,
                    None => repo.create_mental_state(user_id, date)?,
                };
                answer_poll(conn, &poll, &answer)
            })
            .await
    }

    pub async fn get_user_mental_states(&self, args: MentalStateHistoryArgs) -> Value {
        respond(
            "get user mental states",
            self.try_get_user_mental_states(args).await,
        )
    }

    async fn try_get_user_mental_states(&self, args: MentalStateHistoryArgs) -> ToolOutcome {
        let start = match args.start_date.as_deref() {
            Some(raw) => Some(parse_iso_day("start_date", raw)?),
            None => None,
        };
        let end = match args.end_date.as_deref() {
            Some(raw) => Some(parse_iso_day("end_date", raw)?),
            None => None,
        };
        let limit = args.limit;
        let user_id = self.ctx.user_id;

        let states = self
            .ctx
            .transaction(move |conn| {
                Ok(MentalStateRepository::new(conn).get_user_mental_states(
                    user_id,
                    Some(limit),
                    start,
                    end,
                )?)
            })
            .await?;

        Ok(json!({
            "mental_states": states.iter().map(state_json).collect::<Vec<_>>(),
            "total": states.len(),
        }))
    }

    pub async fn get_unanswered_polls(&self, args: UnansweredPollsArgs) -> Value {
        respond(
            "get unanswered polls",
            self.try_get_unanswered_polls(args).await,
        )
    }

    async fn try_get_unanswered_polls(&self, args: UnansweredPollsArgs) -> ToolOutcome {
        let limit = args.limit;
        let user_id = self.ctx.user_id;
        let polls = self
            .ctx
            .transaction(move |conn| {
                Ok(MentalStateRepository::new(conn).get_unanswered_polls(user_id, Some(limit))?)
            })
            .await?;

        let now = now_utc();
        let listed: Vec<Value> = polls
            .iter()
            .map(|poll| {
                json!({
                    "mental_state_id": poll.id,
                    "date": poll.date,
                    "question_asked_at": poll.question_asked_at,
                    "days_pending": (now - poll.question_asked_at).num_days(),
                })
            })
            .collect();

        Ok(json!({
            "unanswered_polls": listed,
            "total": polls.len(),
        }))
    }

    pub async fn get_mood_trends(&self, args: MoodTrendsArgs) -> Value {
        respond("get mood trends", self.try_get_mood_trends(args).await)
    }

    async fn try_get_mood_trends(&self, args: MoodTrendsArgs) -> ToolOutcome {
        let days = args.days.max(0);
        let today = now_utc().date_naive();
        let start = u64::try_from(days)
            .ok()
            .and_then(|d| today.checked_sub_days(Days::new(d)))
            .ok_or_else(|| ToolError::Rejected(format!("Invalid days: {}. Period is too long", days)))?;
        let user_id = self.ctx.user_id;

        let states = self
            .ctx
            .transaction(move |conn| {
                Ok(MentalStateRepository::new(conn).get_user_mental_states(
                    user_id,
                    None,
                    Some(start),
                    Some(today),
                )?)
            })
            .await?;

        Ok(mood_trends(days, &states))
    }
}

/// Summarize polls listed newest first.
fn mood_trends(days: i64, states: &[MentalState]) -> Value {
    let answered: Vec<&MentalState> = states
        .iter()
        .filter(|state| state.responded_at.is_some())
        .collect();
    let moods: Vec<Mood> = answered.iter().filter_map(|state| state.mood).collect();
    let readiness: Vec<i32> = answered
        .iter()
        .filter_map(|state| state.readiness_level)
        .collect();

    let mut distribution: BTreeMap<&'static str, i64> = BTreeMap::new();
    for mood in &moods {
        *distribution.entry(mood.as_str()).or_insert(0) += 1;
    }
    let distribution: Map<String, Value> = distribution
        .into_iter()
        .map(|(mood, count)| (mood.to_string(), json!(count)))
        .collect();

    let average_readiness = if readiness.is_empty() {
        None
    } else {
        let mean = readiness.iter().map(|&r| f64::from(r)).sum::<f64>() / readiness.len() as f64;
        Some((mean * 10.0).round() / 10.0)
    };
    let response_rate = if states.is_empty() {
        0.0
    } else {
        answered.len() as f64 / states.len() as f64
    };

    json!({
        "period_days": days,
        "total_responses": answered.len(),
        "total_polls": states.len(),
        "response_rate": response_rate,
        "mood_distribution": distribution,
        "average_readiness_level": average_readiness,
        "recent_moods": moods.iter().take(RECENT_MOODS).collect::<Vec<_>>(),
    })
}

pub fn register(registry: &mut ToolRegistry, tools: Arc<MentalStateTools>) {
    registry.register_typed(
        "create_daily_poll",
        "Create a daily mental state poll asking how the user feels",
        json!({
            "type": "object",
            "properties": {
                "date": {"type": "string", "description": "Poll date in ISO format, defaults to today"}
            }
        }),
        bind!(tools, create_daily_poll),
    );

    registry.register_typed(
        "respond_to_poll",
        "Record the user's answer to a mental state poll",
        json!({
            "type": "object",
            "properties": {
                "mental_state_id": {"type": "string", "description": "UUID of the poll"},
                "mood": {"type": "string", "enum": Mood::VALUES},
                "readiness_level": {"type": "integer", "minimum": 1, "maximum": 10},
                "notes": {"type": "string"}
            },
            "required": ["mental_state_id"]
        }),
        bind!(tools, respond_to_poll),
    );

    registry.register_typed(
        "record_mood",
        "Record how the user feels today in one step",
        json!({
            "type": "object",
            "properties": {
                "mood": {"type": "string", "enum": Mood::VALUES},
                "readiness_level": {"type": "integer", "minimum": 1, "maximum": 10},
                "notes": {"type": "string"},
                "date": {"type": "string", "description": "Date in ISO format, defaults to today"}
            },
            "required": ["mood"]
        }),
        bind!(tools, record_mood),
    );

    registry.register_typed(
        "get_user_mental_states",
        "Get the user's mental state history, newest first",
        json!({
            "type": "object",
            "properties": {
                "limit": {"type": "integer", "minimum": 1, "default": 30},
                "start_date": {"type": "string", "description": "ISO date"},
                "end_date": {"type": "string", "description": "ISO date"}
            }
        }),
        bind!(tools, get_user_mental_states),
    );

    registry.register_typed(
        "get_unanswered_polls",
        "Get mental state polls the user has not answered yet",
        json!({
            "type": "object",
            "properties": {
                "limit": {"type": "integer", "minimum": 1, "default": 10}
            }
        }),
        bind!(tools, get_unanswered_polls),
    );

    registry.register_typed(
        "get_mood_trends",
        "Summarize the user's moods and readiness over recent days",
        json!({
            "type": "object",
            "properties": {
                "days": {"type": "integer", "minimum": 1, "default": 30}
            }
        }),
        bind!(tools, get_mood_trends),
    );
}
