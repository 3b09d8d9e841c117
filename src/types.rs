use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Raised when a stored or user-supplied string does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind}: {value}")]
pub struct InvalidEnumValue {
    pub kind: &'static str,
    pub value: String,
    pub expected: &'static [&'static str],
}

impl InvalidEnumValue {
    /// Accepted values rendered as `['a', 'b']`, the shape tool error messages use.
    pub fn expected_list(&self) -> String {
        let quoted: Vec<String> = self.expected.iter().map(|v| format!("'{}'", v)).collect();
        format!("[{}]", quoted.join(", "))
    }
}

macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        $name:ident ($kind:literal) {
            $($variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const VALUES: &'static [&'static str] = &[$($text),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = InvalidEnumValue;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(InvalidEnumValue {
                        kind: $kind,
                        value: other.to_string(),
                        expected: Self::VALUES,
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_enum! {
    /// Lifecycle of a goal. `blocked` is only ever set by the dependency engine.
    GoalStatus ("status") {
        Todo => "todo",
        Blocked => "blocked",
        Done => "done",
        Canceled => "canceled",
    }
}

impl GoalStatus {
    /// Finished goals no longer hold back the goals that require them.
    pub fn is_finished(&self) -> bool {
        matches!(self, GoalStatus::Done | GoalStatus::Canceled)
    }
}

string_enum! {
    GoalCategory ("category") {
        Career => "career",
        Health => "health",
        Learning => "learning",
        Finance => "finance",
        Personal => "personal",
        Social => "social",
        Creative => "creative",
    }
}

string_enum! {
    /// Kind of edge between two goals. Only `requires` gates status.
    DependencyType ("dependency_type") {
        Requires => "requires",
        Enables => "enables",
        Blocks => "blocks",
        Related => "related",
        Parallel => "parallel",
    }
}

string_enum! {
    EventType ("event_type") {
        Work => "work",
        Meeting => "meeting",
        Break => "break",
        FocusTime => "focus_time",
        Deadline => "deadline",
        Personal => "personal",
    }
}

string_enum! {
    EventStatus ("status") {
        Scheduled => "scheduled",
        Completed => "completed",
        Cancelled => "cancelled",
        InProgress => "in_progress",
    }
}

string_enum! {
    NotificationType ("notification_type") {
        Motivation => "motivation",
        RestSuggestion => "rest_suggestion",
        ProgressCheck => "progress_check",
        GoalReminder => "goal_reminder",
        Celebration => "celebration",
        Planning => "planning",
    }
}

string_enum! {
    NotificationStatus ("status") {
        Pending => "pending",
        Sent => "sent",
        Dismissed => "dismissed",
    }
}

string_enum! {
    Mood ("mood") {
        Great => "great",
        Good => "good",
        Neutral => "neutral",
        Tired => "tired",
        Stressed => "stressed",
    }
}

string_enum! {
    MessageRole ("role") {
        User => "user",
        Assistant => "assistant",
        System => "system",
    }
}

// ========== Goal graph ==========

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub id: Uuid,
    pub user_id: Uuid,
    pub chat_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<GoalCategory>,
    pub status: GoalStatus,
    pub priority: i32,
    pub estimated_duration_days: Option<i32>,
    pub difficulty_level: i32,
    pub deadline: Option<NaiveDate>,
    pub motivation: Option<String>,
    pub success_criteria: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields accepted when creating a goal.
#[derive(Debug, Clone)]
pub struct NewGoal {
    pub user_id: Uuid,
    pub chat_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<GoalCategory>,
    pub priority: i32,
    pub estimated_duration_days: Option<i32>,
    pub difficulty_level: i32,
    pub deadline: Option<NaiveDate>,
    pub motivation: Option<String>,
    pub success_criteria: Option<String>,
}

impl NewGoal {
    pub fn new(user_id: Uuid, title: impl Into<String>) -> Self {
        Self {
            user_id,
            chat_id: None,
            title: title.into(),
            description: None,
            category: None,
            priority: 3,
            estimated_duration_days: None,
            difficulty_level: 0,
            deadline: None,
            motivation: None,
            success_criteria: None,
        }
    }

    pub fn with_chat(mut self, chat_id: Uuid) -> Self {
        self.chat_id = Some(chat_id);
        self
    }

    pub fn with_category(mut self, category: GoalCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_deadline(mut self, deadline: NaiveDate) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Partial update of a goal. `Some(None)` clears a nullable column.
#[derive(Debug, Clone, Default)]
pub struct GoalUpdate {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub category: Option<Option<GoalCategory>>,
    pub status: Option<GoalStatus>,
    pub priority: Option<i32>,
    pub estimated_duration_days: Option<Option<i32>>,
    pub difficulty_level: Option<i32>,
    pub deadline: Option<Option<NaiveDate>>,
    pub motivation: Option<Option<String>>,
    pub success_criteria: Option<Option<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalDependency {
    pub id: Uuid,
    pub parent_goal_id: Uuid,
    pub dependent_goal_id: Uuid,
    pub dependency_type: DependencyType,
    pub strength: i32,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Filter for listing a user's goals. `status` wins over `statuses`.
#[derive(Debug, Clone, Default)]
pub struct GoalFilter {
    pub status: Option<GoalStatus>,
    pub statuses: Option<Vec<GoalStatus>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GoalStats {
    pub total: i64,
    pub by_status: std::collections::BTreeMap<String, i64>,
    pub by_category: std::collections::BTreeMap<String, i64>,
}

// ========== Planning records ==========

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub user_id: Uuid,
    pub goal_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub event_type: EventType,
    pub status: EventStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub chat_id: Uuid,
    pub goal_id: Option<Uuid>,
    pub message: String,
    pub notification_type: NotificationType,
    pub scheduled_for: DateTime<Utc>,
    pub status: NotificationStatus,
    pub sent_at: Option<DateTime<Utc>>,
    pub context: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// One daily mood poll; unanswered until `responded_at` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MentalState {
    pub id: Uuid,
    pub user_id: Uuid,
    pub date: NaiveDate,
    pub mood: Option<Mood>,
    pub readiness_level: Option<i32>,
    pub notes: Option<String>,
    pub question_asked_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

// ========== Conversations ==========

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: Option<String>,
    pub model: String,
    pub last_seq: i64,
    pub last_active_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub seq: i64,
    pub role: MessageRole,
    pub content: String,
    pub request_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}
