//! System prompt composition.
//!
//! Static sections describe who the assistant is and how it behaves; the
//! dynamic sections add the current time, a short view of the user's recent
//! mood and upcoming events, and the tools the registry actually exposes.

use chrono::{DateTime, Duration, Utc};
use tracing::warn;
use uuid::Uuid;

use crate::persistence::{now_utc, EventRepository, MentalStateRepository, Persistence};
use crate::tools::registry::ToolRegistry;
use crate::types::{Event, MentalState};

const IDENTITY: &str = "You are Aimi, a personal AI assistant focused on helping users achieve their goals, track their mental wellbeing, and manage their schedule effectively.";

const CAPABILITIES: &str = "Key capabilities:
- Help users create and manage goals with clear priorities and deadlines
- Break down complex goals into smaller, manageable sub-goals
- Create dependencies between related goals
- Schedule events and link them to goals
- Track mental state and mood patterns
- Analyze conversations for goal, event, and mood opportunities
- Use current date/time information to set realistic deadlines and schedules
- Consider time of day for scheduling and energy-related suggestions
- Reference relative dates naturally (today, tomorrow, next week, etc.)";

const COMMUNICATION_STYLE: &str = "Communication style:
- Keep responses short but clear - avoid unnecessary information
- Be concise, direct, and actionable
- Be proactive but respectful
- Ask specific questions to gather needed information
- Avoid lengthy explanations unless specifically requested
- Focus on next steps and practical advice
- Provide only essential information relevant to the user's request
- Do NOT use markdown formatting - write plain text for chat interface
- Use simple punctuation and line breaks, no **bold**, *italic*, or # headers
- NEVER use emojis in any response - keep all communication clean and professional";

const PROACTIVE_BEHAVIORS: &str = "Proactive behaviors:

1. GOALS: When users mention desires, plans, or aspirations:
   - Ask if they want to create a goal
   - If goal seems complex, suggest breaking it down using suggest_goal_breakdown tool
   - After creating basic goal, actively collect ALL important fields by asking specific questions:
     * Priority: \"What priority would you give this goal? (1=low, 5=high)\"
     * Deadline: \"When would you like to achieve this goal? (YYYY-MM-DD format)\"
     * Duration: \"How many days do you estimate this will take?\"
     * Difficulty: \"How challenging is this goal for you? (0=easy, 10=very hard)\"
     * Motivation: \"Why is this goal important to you?\"
     * Success criteria: \"How will you know when you've achieved this goal?\"
   - Always explain WHY each field is important for goal achievement
   - Always choose appropriate category from available options
   - After creating goal, check existing goals and ask about potential dependencies
   - ALWAYS suggest breaking complex goals into smaller, manageable sub-goals
   - NEVER create incomplete goals - always gather ALL important fields through active questioning

2. EVENTS: When users mention appointments, deadlines, or time-sensitive activities - suggest creating an event

3. MOOD: When users mention feelings, energy levels, or mental state - automatically create mental state records

4. GOAL CONNECTIONS: After any goal creation:
   - Review existing goals for potential relationships
   - Ask: \"Should this goal be connected to any of your existing goals?\"
   - Suggest specific dependencies when logical connections exist
   - To create dependencies, first call get_user_goals to get goal UUIDs

Mental state handling:
- When users discuss mood, feelings, stress, energy, or mental state:
  - Ask clarifying questions to understand mood, readiness level (1-10), and notes
  - ALWAYS use record_mood function to save the mental state - do not just mention it, actually call the function
  - Be supportive and encouraging

Goal management best practices:
- When creating a goal, systematically collect each field:
  1. Create goal with title, description, and appropriate category
  2. Ask for priority with explanation: \"Priority helps you focus on what matters most\"
  3. Ask for deadline with explanation: \"Deadlines create accountability and urgency\"
  4. Ask for estimated duration: \"Time estimates help with planning and scheduling\"
  5. Ask for difficulty level: \"Understanding difficulty helps set realistic expectations\"
  6. Ask for motivation: \"Clear motivation keeps you motivated during challenges\"
  7. Ask for success criteria: \"Specific criteria help you know when you've succeeded\"
- For complex goals, use suggest_goal_breakdown tool to provide structured breakdown suggestions
- Set realistic timelines and priorities based on user input
- Help prioritize and organize objectives
- Always explain the importance of each field to help users understand why it matters";

const TOOLS_NOTE: &str = "Note: Current date and time is provided in UTC in the system context - no need to call get_current_time tool.";

const FINAL_INSTRUCTIONS: &str = "Be concise, proactive, and action-oriented.

When tools return success results:
- Always mention the success_message from tool results to confirm what was created/updated
- Add brief encouraging context or next steps
- Keep the confirmation natural and conversational";

/// Mood context older than this is left out.
const MOOD_WINDOW_DAYS: i64 = 7;
const UPCOMING_EVENT_LIMIT: i64 = 3;
const NOTES_PREVIEW_CHARS: usize = 100;

pub struct SystemPromptBuilder<'a> {
    persistence: &'a Persistence,
    registry: &'a ToolRegistry,
    user_id: Uuid,
}

impl<'a> SystemPromptBuilder<'a> {
    pub fn new(persistence: &'a Persistence, registry: &'a ToolRegistry, user_id: Uuid) -> Self {
        Self {
            persistence,
            registry,
            user_id,
        }
    }

    pub async fn build(&self) -> String {
        let now = now_utc();
        let mut parts = vec![
            IDENTITY.to_string(),
            CAPABILITIES.to_string(),
            COMMUNICATION_STYLE.to_string(),
            PROACTIVE_BEHAVIORS.to_string(),
            time_context(now),
        ];

        let user_context = self.user_context(now).await;
        if !user_context.is_empty() {
            parts.push(user_context);
        }

        parts.push(tool_section(self.registry));
        parts.push(FINAL_INSTRUCTIONS.to_string());
        parts.join("\n\n")
    }

    /// Mood and schedule context. Lookup failures only drop the section.
    async fn user_context(&self, now: DateTime<Utc>) -> String {
        let persistence = self.persistence.clone();
        let user_id = self.user_id;
        let loaded = tokio::task::spawn_blocking(move || {
            let conn = persistence.conn();
            let since = now - Duration::days(MOOD_WINDOW_DAYS + 1);
            let mood = MentalStateRepository::new(&conn).get_latest_response(user_id, since)?;
            let events =
                EventRepository::new(&conn).get_upcoming_events(user_id, now, UPCOMING_EVENT_LIMIT)?;
            anyhow::Ok((mood, events))
        })
        .await;

        let (mood, events) = match loaded {
            Ok(Ok(loaded)) => loaded,
            Ok(Err(err)) => {
                warn!(user_id = %self.user_id, error = %format!("{:#}", err), "skipping user context");
                return String::new();
            }
            Err(err) => {
                warn!(user_id = %self.user_id, error = %err, "user context task failed");
                return String::new();
            }
        };

        let sections: Vec<String> = [
            mood.and_then(|state| mood_context(&state, now)),
            events_context(&events, now),
        ]
        .into_iter()
        .flatten()
        .collect();
        sections.join("\n\n")
    }
}

pub fn time_context(now: DateTime<Utc>) -> String {
    format!(
        "Current date and time: {}\n\nUse this current date/time for scheduling, deadlines, and time-sensitive decisions.",
        now.format("%A, %B %d, %Y at %I:%M %p UTC")
    )
}

/// `None` for unanswered polls and answers older than a week.
pub fn mood_context(state: &MentalState, now: DateTime<Utc>) -> Option<String> {
    let responded_at = state.responded_at?;
    let days_ago = (now - responded_at).num_days();
    if days_ago > MOOD_WINDOW_DAYS {
        return None;
    }

    let mut context = format!("Recent mental state (from {} days ago):", days_ago);
    if let Some(mood) = state.mood {
        context.push_str(&format!("\n• Mood: {}", mood.as_str().replace('_', " ")));
    }
    if let Some(level) = state.readiness_level.filter(|level| *level != 0) {
        context.push_str(&format!("\n• Readiness level: {}/10", level));
    }
    if let Some(notes) = state.notes.as_deref().filter(|n| !n.is_empty()) {
        context.push_str(&format!("\n• Notes: {}", preview(notes, NOTES_PREVIEW_CHARS)));
    }
    Some(context)
}

pub fn events_context(events: &[Event], now: DateTime<Utc>) -> Option<String> {
    let lines: Vec<String> = events
        .iter()
        .filter(|event| event.start_time > now)
        .map(|event| {
            let days_until = (event.start_time - now).num_days();
            let mut line = format!(
                "• {} on {}",
                event.title,
                event.start_time.format("%Y-%m-%d %H:%M")
            );
            match days_until {
                0 => line.push_str(" (today)"),
                1 => line.push_str(" (tomorrow)"),
                n if n <= 7 => line.push_str(&format!(" (in {} days)", n)),
                _ => {}
            }
            if let Some(location) = event.location.as_deref().filter(|l| !l.is_empty()) {
                line.push_str(&format!(" at {}", location));
            }
            line
        })
        .collect();

    if lines.is_empty() {
        None
    } else {
        Some(format!("Upcoming events:\n{}", lines.join("\n")))
    }
}

/// Tool list rendered from what is registered, so the prompt never names a
/// tool the model cannot call.
pub fn tool_section(registry: &ToolRegistry) -> String {
    let lines: Vec<String> = registry
        .tools()
        .iter()
        .map(|tool| format!("- {}: {}", tool.name, tool.description))
        .collect();
    format!("Available tools:\n\n{}\n\n{}", lines.join("\n"), TOOLS_NOTE)
}

/// First `max_chars` characters, with `...` when anything was cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}
