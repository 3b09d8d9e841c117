//! Planning guidance for the model. These tools return fixed frameworks; the
//! model does the actual reasoning.

use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::registry::{bind, ToolRegistry};
use super::{respond, ToolContext, ToolOutcome};
use crate::persistence::GoalRepository;
use crate::types::GoalFilter;

const BREAKDOWN_APPROACH: [&str; 5] = [
    "Identify the main phases or stages of this goal",
    "Break each phase into specific, actionable tasks",
    "Consider prerequisites and dependencies between tasks",
    "Estimate time needed for each task",
    "Identify potential obstacles or challenges",
];

const TASK_EXAMPLES: [&str; 5] = [
    "Research and gather information",
    "Plan and prepare resources",
    "Execute core activities",
    "Review and iterate",
    "Complete and evaluate",
];

const QUESTIONS_TO_ASK: [&str; 5] = [
    "What specific skills or knowledge are needed?",
    "What resources or tools are required?",
    "Are there any dependencies on other goals?",
    "What would be a realistic timeline?",
    "How will progress be measured?",
];

const FACTORS_TO_CONSIDER: [&str; 5] = [
    "Skills overlap between goals",
    "Time and resource requirements",
    "Knowledge or experience gained from one goal helping another",
    "Physical or logistical dependencies",
    "Motivation and energy synergies",
];

#[derive(Debug, Deserialize)]
pub struct GoalBreakdownArgs {
    pub goal_title: String,
    #[serde(default)]
    pub goal_description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GoalConnectionsArgs {
    pub new_goal_title: String,
}

pub fn goal_breakdown(goal_title: &str, goal_description: Option<&str>) -> Value {
    json!({
        "goal_title": goal_title,
        "goal_description": goal_description,
        "suggestions": {
            "breakdown_approach": BREAKDOWN_APPROACH,
            "task_examples": TASK_EXAMPLES,
            "questions_to_ask": QUESTIONS_TO_ASK,
        },
        "note": "These are general guidelines. The specific tasks should be customized based on the goal's nature and user's situation.",
    })
}

/// `existing` holds `(title, description)` pairs.
pub fn connection_framework(new_goal_title: &str, existing: &[(String, Option<String>)]) -> Value {
    if existing.is_empty() {
        return json!({
            "connections": [],
            "note": "No existing goals to connect with",
        });
    }

    let existing_goals: Vec<Value> = existing
        .iter()
        .map(|(title, description)| {
            json!({
                "title": title,
                "description": description.as_deref().unwrap_or(""),
            })
        })
        .collect();

    json!({
        "new_goal": new_goal_title,
        "analysis_framework": {
            "connection_types": {
                "prerequisite": "One goal must be completed before the other can start",
                "supportive": "Goals that help each other when worked on together",
                "competitive": "Goals that compete for the same time/resources",
                "sequential": "Goals that naturally follow one after another",
                "parallel": "Goals that can be worked on simultaneously",
            },
            "factors_to_consider": FACTORS_TO_CONSIDER,
            "existing_goals": existing_goals,
        },
        "instruction": "Use this framework to identify potential connections and suggest appropriate dependency relationships",
    })
}

pub struct GuidanceTools {
    ctx: ToolContext,
}

impl GuidanceTools {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }

    pub async fn suggest_goal_breakdown(&self, args: GoalBreakdownArgs) -> Value {
        goal_breakdown(&args.goal_title, args.goal_description.as_deref())
    }

    pub async fn find_potential_goal_connections(&self, args: GoalConnectionsArgs) -> Value {
        respond(
            "analyze goal connections",
            self.try_find_potential_goal_connections(args).await,
        )
    }

    async fn try_find_potential_goal_connections(&self, args: GoalConnectionsArgs) -> ToolOutcome {
        let user_id = self.ctx.user_id;
        let existing = self
            .ctx
            .transaction(move |conn| {
                Ok(GoalRepository::new(conn).get_user_goals(user_id, &GoalFilter::default())?)
            })
            .await?;
        let pairs: Vec<(String, Option<String>)> = existing
            .into_iter()
            .map(|goal| (goal.title, goal.description))
            .collect();
        Ok(connection_framework(&args.new_goal_title, &pairs))
    }
}

pub fn register(registry: &mut ToolRegistry, tools: Arc<GuidanceTools>) {
    registry.register_typed(
        "suggest_goal_breakdown",
        "Get a structured approach for breaking a goal into actionable tasks",
        json!({
            "type": "object",
            "properties": {
                "goal_title": {"type": "string"},
                "goal_description": {"type": "string"}
            },
            "required": ["goal_title"]
        }),
        bind!(tools, suggest_goal_breakdown),
    );

    registry.register_typed(
        "find_potential_goal_connections",
        "Get a framework for relating a new goal to the user's existing goals",
        json!({
            "type": "object",
            "properties": {
                "new_goal_title": {"type": "string"}
            },
            "required": ["new_goal_title"]
        }),
        bind!(tools, find_potential_goal_connections),
    );
}
