//! Functions the assistant model may call.
//!
//! Every tool answers with a JSON object: domain fields plus an optional
//! `success_message`, or a single `error` string. Nothing here returns a Rust
//! error to the caller; failures become data at this boundary.

pub mod events;
pub mod goals;
pub mod guidance;
pub mod mental_states;
pub mod notifications;
pub mod registry;

pub use registry::{FunctionCall, FunctionCallOutcome, ToolRegistry};

use anyhow::Context;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use duckdb::Connection;
use serde_json::{json, Value};
use std::str::FromStr;
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

use crate::persistence::Persistence;
use crate::types::InvalidEnumValue;

/// Why a tool call did not produce a result.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Input or ownership problem; the message goes back to the model verbatim.
    #[error("{0}")]
    Rejected(String),
    /// Anything unexpected, reported as `Failed to <action>: <cause>`.
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

impl From<duckdb::Error> for ToolError {
    fn from(err: duckdb::Error) -> Self {
        ToolError::Failed(err.into())
    }
}

pub type ToolOutcome<T = Value> = Result<T, ToolError>;

pub fn reject<T>(message: impl Into<String>) -> ToolOutcome<T> {
    Err(ToolError::Rejected(message.into()))
}

/// Identity and storage a tool set is bound to.
#[derive(Clone)]
pub struct ToolContext {
    pub persistence: Persistence,
    pub user_id: Uuid,
    pub chat_id: Uuid,
}

impl ToolContext {
    pub fn new(persistence: Persistence, user_id: Uuid, chat_id: Uuid) -> Self {
        Self {
            persistence,
            user_id,
            chat_id,
        }
    }

    /// Run `f` on the blocking pool inside one database transaction.
    ///
    /// Any error, rejection included, rolls the transaction back.
    pub async fn transaction<T, F>(&self, f: F) -> ToolOutcome<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> ToolOutcome<T> + Send + 'static,
    {
        let persistence = self.persistence.clone();
        tokio::task::spawn_blocking(move || persistence.transaction(f))
            .await
            .context("task join error")?
    }
}

/// Fold an outcome into the uniform tool response.
pub fn respond(action: &str, outcome: ToolOutcome) -> Value {
    match outcome {
        Ok(value) => value,
        Err(ToolError::Rejected(message)) => json!({ "error": message }),
        Err(ToolError::Failed(err)) => {
            error!(action, error = %format!("{:#}", err), "tool call failed");
            json!({ "error": format!("Failed to {}: {:#}", action, err) })
        }
    }
}

// ---------- Argument parsing ----------

pub fn parse_id(field: &str, raw: &str) -> ToolOutcome<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|_| {
        ToolError::Rejected(format!(
            "Invalid {} format: {}. Must be a valid UUID",
            field, raw
        ))
    })
}

/// Parse a closed-set string, e.g. a status or category.
pub fn parse_choice<T>(raw: &str) -> ToolOutcome<T>
where
    T: FromStr<Err = InvalidEnumValue>,
{
    raw.parse::<T>().map_err(|err| {
        ToolError::Rejected(format!(
            "Invalid {}: {}. Must be one of {}",
            err.kind,
            err.value,
            err.expected_list()
        ))
    })
}

pub fn parse_optional_choice<T>(raw: Option<&str>) -> ToolOutcome<Option<T>>
where
    T: FromStr<Err = InvalidEnumValue>,
{
    match raw.filter(|s| !s.is_empty()) {
        Some(raw) => parse_choice(raw).map(Some),
        None => Ok(None),
    }
}

/// Accepts RFC 3339 and the naive ISO forms; naive values are taken as UTC.
pub fn parse_iso_datetime(field: &str, raw: &str) -> ToolOutcome<DateTime<Utc>> {
    let trimmed = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.with_timezone(&Utc));
    }
    const NAIVE_FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ];
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(naive.and_utc());
        }
    }
    if let Some(midnight) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
    {
        return Ok(midnight.and_utc());
    }
    reject(format!("Invalid {} format: {}. Use ISO format", field, raw))
}

/// Calendar day from an ISO date or datetime.
pub fn parse_iso_day(field: &str, raw: &str) -> ToolOutcome<NaiveDate> {
    parse_iso_datetime(field, raw).map(|dt| dt.date_naive())
}

pub fn parse_deadline(raw: &str) -> ToolOutcome<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
        ToolError::Rejected(format!(
            "Invalid deadline format: {}. Use YYYY-MM-DD",
            raw
        ))
    })
}

/// `March 05, 2025`
pub fn long_date(date: &NaiveDate) -> String {
    date.format("%B %d, %Y").to_string()
}

pub fn not_owned(kind: &str, id: &str) -> ToolError {
    ToolError::Rejected(format!("{} {} not found or not owned by user", kind, id))
}
