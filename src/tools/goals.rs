//! Goal tools: creation, status changes, dependency edges and field updates.
//!
//! Every mutation checks that the goal belongs to the bound user before
//! touching it, and runs in a single transaction.

use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::cmp::Ordering;
use std::sync::Arc;
use uuid::Uuid;

use super::registry::{bind, ToolRegistry};
use super::{
    long_date, not_owned, parse_choice, parse_deadline, parse_id, parse_optional_choice, respond,
    ToolContext, ToolError, ToolOutcome,
};
use crate::persistence::{DependencyError, GoalRepository};
use crate::types::{
    DependencyType, Goal, GoalCategory, GoalDependency, GoalFilter, GoalStatus, NewGoal,
};

fn default_priority() -> i32 {
    3
}

fn default_dependency_type() -> String {
    DependencyType::Requires.as_str().to_string()
}

fn default_strength() -> i32 {
    1
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct CreateGoalArgs {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub deadline: Option<String>,
    #[serde(default)]
    pub estimated_duration_days: Option<i32>,
    #[serde(default)]
    pub difficulty_level: i32,
    #[serde(default)]
    pub motivation: Option<String>,
    #[serde(default)]
    pub success_criteria: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateGoalStatusArgs {
    pub goal_id: String,
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateDependencyArgs {
    pub parent_goal_id: String,
    pub dependent_goal_id: String,
    #[serde(default = "default_dependency_type")]
    pub dependency_type: String,
    #[serde(default = "default_strength")]
    pub strength: i32,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteDependencyArgs {
    pub dependency_id: String,
}

#[derive(Debug, Deserialize)]
pub struct GetUserGoalsArgs {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default = "default_true")]
    pub include_dependencies: bool,
}

#[derive(Debug, Deserialize)]
pub struct GoalIdArgs {
    pub goal_id: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct NoArgs {}

#[derive(Debug, Deserialize)]
pub struct UpdateTitleArgs {
    pub goal_id: String,
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDescriptionArgs {
    pub goal_id: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePriorityArgs {
    pub goal_id: String,
    pub priority: i32,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDeadlineArgs {
    pub goal_id: String,
    #[serde(default)]
    pub deadline: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCategoryArgs {
    pub goal_id: String,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMotivationArgs {
    pub goal_id: String,
    #[serde(default)]
    pub motivation: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSuccessCriteriaArgs {
    pub goal_id: String,
    #[serde(default)]
    pub success_criteria: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDifficultyArgs {
    pub goal_id: String,
    pub difficulty_level: i32,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDurationArgs {
    pub goal_id: String,
    #[serde(default)]
    pub estimated_duration_days: Option<i32>,
}

fn goal_json(goal: &Goal) -> Value {
    json!({
        "goal_id": goal.id,
        "title": goal.title,
        "description": goal.description,
        "priority": goal.priority,
        "category": goal.category,
        "deadline": goal.deadline,
        "estimated_duration_days": goal.estimated_duration_days,
        "difficulty_level": goal.difficulty_level,
        "motivation": goal.motivation,
        "success_criteria": goal.success_criteria,
        "status": goal.status,
        "created_at": goal.created_at,
        "updated_at": goal.updated_at,
    })
}

fn dependency_json(dependency: &GoalDependency) -> Value {
    json!({
        "dependency_id": dependency.id,
        "parent_goal_id": dependency.parent_goal_id,
        "dependency_type": dependency.dependency_type,
        "strength": dependency.strength,
        "notes": dependency.notes,
    })
}

fn with_dependencies(goal: &Goal, dependencies: &[GoalDependency]) -> Value {
    let mut value = goal_json(goal);
    value["dependencies"] = dependencies.iter().map(dependency_json).collect();
    value
}

/// Response shared by the single-field updaters.
fn field_updated(goal: &Goal, field: &str, value: Value, message: String) -> Value {
    let mut out = Map::new();
    out.insert("goal_id".into(), json!(goal.id));
    out.insert(field.into(), value);
    out.insert("updated_at".into(), json!(goal.updated_at));
    out.insert("success_message".into(), Value::String(message));
    Value::Object(out)
}

fn status_text(status: GoalStatus) -> &'static str {
    match status {
        GoalStatus::Done => "completed",
        GoalStatus::Canceled => "canceled",
        other => other.as_str(),
    }
}

fn create_message(goal: &Goal) -> String {
    let mut message = format!("Created goal: {}", goal.title);
    if let Some(category) = goal.category {
        message.push_str(&format!(" in {}", category));
    }
    if goal.priority != 3 {
        message.push_str(&format!(" (priority {}/5)", goal.priority));
    }
    if let Some(deadline) = goal.deadline {
        message.push_str(&format!(" by {}", long_date(&deadline)));
    }
    message
}

/// Priority high first, then the nearest deadline; undated goals go last.
fn availability_order(a: &Goal, b: &Goal) -> Ordering {
    b.priority.cmp(&a.priority).then_with(|| match (a.deadline, b.deadline) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    })
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

fn dependency_rejection(err: anyhow::Error) -> ToolError {
    match err.downcast_ref::<DependencyError>() {
        Some(reason) => ToolError::Rejected(reason.to_string()),
        None => ToolError::Failed(err),
    }
}

pub struct GoalTools {
    ctx: ToolContext,
}

impl GoalTools {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }

    pub async fn create_goal(&self, args: CreateGoalArgs) -> Value {
        respond("create goal", self.try_create_goal(args).await)
    }

    async fn try_create_goal(&self, args: CreateGoalArgs) -> ToolOutcome {
        let category = parse_optional_choice::<GoalCategory>(args.category.as_deref())?;
        let deadline = match blank_to_none(args.deadline) {
            Some(raw) => Some(parse_deadline(&raw)?),
            None => None,
        };

        let mut new = NewGoal::new(self.ctx.user_id, args.title).with_chat(self.ctx.chat_id);
        new.description = args.description;
        new.category = category;
        new.priority = args.priority;
        new.deadline = deadline;
        new.estimated_duration_days = args.estimated_duration_days;
        new.difficulty_level = args.difficulty_level;
        new.motivation = args.motivation;
        new.success_criteria = args.success_criteria;

        let goal = self
            .ctx
            .transaction(move |conn| Ok(GoalRepository::new(conn).create_goal(new)?))
            .await?;

        let mut value = goal_json(&goal);
        value["success_message"] = Value::String(create_message(&goal));
        Ok(value)
    }

    pub async fn update_goal_status(&self, args: UpdateGoalStatusArgs) -> Value {
        respond("update goal status", self.try_update_goal_status(args).await)
    }

    async fn try_update_goal_status(&self, args: UpdateGoalStatusArgs) -> ToolOutcome {
        let goal_id = parse_id("goal_id", &args.goal_id)?;
        let requested = args.status;
        let user_id = self.ctx.user_id;

        // Ownership is checked before the status value.
        let (goal, status) = self
            .ctx
            .transaction(move |conn| {
                let repo = GoalRepository::new(conn);
                if repo.get_user_goal(user_id, goal_id)?.is_none() {
                    return Err(not_owned("Goal", &goal_id.to_string()));
                }
                let status = parse_choice::<GoalStatus>(&requested)?;
                let goal = repo
                    .change_goal_status(goal_id, status)?
                    .ok_or_else(|| not_owned("Goal", &goal_id.to_string()))?;
                Ok((goal, status))
            })
            .await?;

        // The stored status may differ from the request: a goal still waiting
        // on a requirement stays blocked when set back to todo.
        Ok(json!({
            "goal_id": goal.id,
            "title": goal.title,
            "status": goal.status,
            "requested_status": status,
            "updated_at": goal.updated_at,
            "success_message": format!(
                "Updated goal '{}' status to {}",
                goal.title,
                status_text(status)
            ),
        }))
    }

    pub async fn create_goal_dependency(&self, args: CreateDependencyArgs) -> Value {
        respond(
            "create goal dependency",
            self.try_create_goal_dependency(args).await,
        )
    }

    async fn try_create_goal_dependency(&self, args: CreateDependencyArgs) -> ToolOutcome {
        let parent_id = parse_id("parent_goal_id", &args.parent_goal_id)?;
        let dependent_id = parse_id("dependent_goal_id", &args.dependent_goal_id)?;
        let dependency_type = parse_choice::<DependencyType>(&args.dependency_type)?;
        let strength = args.strength.clamp(1, 5);
        let notes = blank_to_none(args.notes);
        let user_id = self.ctx.user_id;

        self.ctx
            .transaction(move |conn| {
                let repo = GoalRepository::new(conn);
                let parent = repo
                    .get_user_goal(user_id, parent_id)?
                    .ok_or_else(|| not_owned("Parent goal", &parent_id.to_string()))?;
                let dependent = repo
                    .get_user_goal(user_id, dependent_id)?
                    .ok_or_else(|| not_owned("Dependent goal", &dependent_id.to_string()))?;

                let dependency = repo
                    .create_dependency(parent.id, dependent.id, dependency_type, strength, notes)
                    .map_err(dependency_rejection)?;
                let dependent_status = repo
                    .get_by_id(dependent.id)?
                    .map(|goal| goal.status)
                    .unwrap_or(dependent.status);

                Ok(json!({
                    "dependency_id": dependency.id,
                    "parent_goal_id": parent.id,
                    "parent_goal_title": parent.title,
                    "dependent_goal_id": dependent.id,
                    "dependent_goal_title": dependent.title,
                    "dependency_type": dependency.dependency_type,
                    "strength": dependency.strength,
                    "notes": dependency.notes,
                    "created_at": dependency.created_at,
                    "dependent_status": dependent_status,
                    "success_message": format!(
                        "Created dependency: '{}' {} '{}'",
                        dependent.title, dependency_type, parent.title
                    ),
                }))
            })
            .await
    }

    pub async fn delete_goal_dependency(&self, args: DeleteDependencyArgs) -> Value {
        respond(
            "delete goal dependency",
            self.try_delete_goal_dependency(args).await,
        )
    }

    async fn try_delete_goal_dependency(&self, args: DeleteDependencyArgs) -> ToolOutcome {
        let dependency_id = parse_id("dependency_id", &args.dependency_id)?;
        let user_id = self.ctx.user_id;

        self.ctx
            .transaction(move |conn| {
                let repo = GoalRepository::new(conn);
                let missing = || not_owned("Dependency", &dependency_id.to_string());
                let dependency = repo.get_dependency(dependency_id)?.ok_or_else(missing)?;
                let dependent = repo
                    .get_user_goal(user_id, dependency.dependent_goal_id)?
                    .ok_or_else(missing)?;
                let parent_title = repo
                    .get_by_id(dependency.parent_goal_id)?
                    .map(|goal| goal.title)
                    .unwrap_or_default();

                repo.delete_dependency(&dependency)?;
                let dependent_status = repo
                    .get_by_id(dependent.id)?
                    .map(|goal| goal.status)
                    .unwrap_or(dependent.status);

                Ok(json!({
                    "dependency_id": dependency.id,
                    "dependent_goal_id": dependent.id,
                    "dependent_status": dependent_status,
                    "success_message": format!(
                        "Removed dependency between '{}' and '{}'",
                        dependent.title, parent_title
                    ),
                }))
            })
            .await
    }

    pub async fn get_user_goals(&self, args: GetUserGoalsArgs) -> Value {
        respond("get goals", self.try_get_user_goals(args).await)
    }

    async fn try_get_user_goals(&self, args: GetUserGoalsArgs) -> ToolOutcome {
        let status = parse_optional_choice::<GoalStatus>(args.status.as_deref())?;
        let include_dependencies = args.include_dependencies;
        let user_id = self.ctx.user_id;

        self.ctx
            .transaction(move |conn| {
                let repo = GoalRepository::new(conn);
                let goals = repo.get_user_goals(
                    user_id,
                    &GoalFilter {
                        status,
                        ..Default::default()
                    },
                )?;

                let mut listed = Vec::with_capacity(goals.len());
                for goal in &goals {
                    if include_dependencies {
                        let dependencies = repo.get_goal_dependencies(goal.id)?;
                        listed.push(with_dependencies(goal, &dependencies));
                    } else {
                        listed.push(goal_json(goal));
                    }
                }

                Ok(json!({
                    "goals": listed,
                    "total": goals.len(),
                    "filter_status": status,
                }))
            })
            .await
    }

    pub async fn get_goal_by_id(&self, args: GoalIdArgs) -> Value {
        respond("get goal", self.try_get_goal_by_id(args).await)
    }

    async fn try_get_goal_by_id(&self, args: GoalIdArgs) -> ToolOutcome {
        let goal_id = parse_id("goal_id", &args.goal_id)?;
        let user_id = self.ctx.user_id;

        self.ctx
            .transaction(move |conn| {
                let repo = GoalRepository::new(conn);
                let goal = repo
                    .get_user_goal(user_id, goal_id)?
                    .ok_or_else(|| not_owned("Goal", &goal_id.to_string()))?;
                let dependencies = repo.get_goal_dependencies(goal.id)?;
                let dependents: Vec<Value> = repo
                    .get_goal_dependents(goal.id)?
                    .iter()
                    .map(|dep| {
                        json!({
                            "dependency_id": dep.id,
                            "dependent_goal_id": dep.dependent_goal_id,
                            "dependency_type": dep.dependency_type,
                            "strength": dep.strength,
                        })
                    })
                    .collect();

                let mut value = with_dependencies(&goal, &dependencies);
                value["dependents"] = Value::Array(dependents);
                Ok(value)
            })
            .await
    }

    pub async fn get_available_goals(&self, _args: NoArgs) -> Value {
        respond("get available goals", self.try_get_available_goals().await)
    }

    async fn try_get_available_goals(&self) -> ToolOutcome {
        let user_id = self.ctx.user_id;
        let mut goals = self
            .ctx
            .transaction(move |conn| {
                Ok(GoalRepository::new(conn).get_user_goals(
                    user_id,
                    &GoalFilter {
                        status: Some(GoalStatus::Todo),
                        ..Default::default()
                    },
                )?)
            })
            .await?;
        goals.sort_by(availability_order);

        Ok(json!({
            "available_goals": goals.iter().map(goal_json).collect::<Vec<_>>(),
            "total": goals.len(),
        }))
    }

    // ---------- Field updates ----------

    async fn update_owned_goal<F>(&self, raw_id: &str, apply: F) -> ToolOutcome<Goal>
    where
        F: FnOnce(&GoalRepository<'_>, Uuid) -> anyhow::Result<Option<Goal>> + Send + 'static,
    {
        let goal_id = parse_id("goal_id", raw_id)?;
        let user_id = self.ctx.user_id;
        self.ctx
            .transaction(move |conn| {
                let repo = GoalRepository::new(conn);
                if repo.get_user_goal(user_id, goal_id)?.is_none() {
                    return Err(not_owned("Goal", &goal_id.to_string()));
                }
                apply(&repo, goal_id)?.ok_or_else(|| not_owned("Goal", &goal_id.to_string()))
            })
            .await
    }

    pub async fn update_goal_title(&self, args: UpdateTitleArgs) -> Value {
        let title = args.title;
        let outcome = self
            .update_owned_goal(&args.goal_id, move |repo, id| repo.update_goal_title(id, title))
            .await
            .map(|goal| {
                let message = format!("Updated goal title to '{}'", goal.title);
                field_updated(&goal, "title", json!(goal.title), message)
            });
        respond("update goal title", outcome)
    }

    pub async fn update_goal_description(&self, args: UpdateDescriptionArgs) -> Value {
        let description = blank_to_none(args.description);
        let outcome = self
            .update_owned_goal(&args.goal_id, move |repo, id| {
                repo.update_goal_description(id, description)
            })
            .await
            .map(|goal| {
                field_updated(
                    &goal,
                    "description",
                    json!(goal.description),
                    "Updated goal description".to_string(),
                )
            });
        respond("update goal description", outcome)
    }

    pub async fn update_goal_priority(&self, args: UpdatePriorityArgs) -> Value {
        let priority = args.priority;
        let outcome = self
            .update_owned_goal(&args.goal_id, move |repo, id| {
                repo.update_goal_priority(id, priority)
            })
            .await
            .map(|goal| {
                let message = format!("Updated goal priority to {}/5", goal.priority);
                field_updated(&goal, "priority", json!(goal.priority), message)
            });
        respond("update goal priority", outcome)
    }

    pub async fn update_goal_deadline(&self, args: UpdateDeadlineArgs) -> Value {
        let deadline: Option<NaiveDate> = match blank_to_none(args.deadline) {
            Some(raw) => match parse_deadline(&raw) {
                Ok(date) => Some(date),
                Err(err) => return respond("update goal deadline", Err(err)),
            },
            None => None,
        };
        let outcome = self
            .update_owned_goal(&args.goal_id, move |repo, id| {
                repo.update_goal_deadline(id, deadline)
            })
            .await
            .map(|goal| {
                let shown = goal
                    .deadline
                    .as_ref()
                    .map(long_date)
                    .unwrap_or_else(|| "removed".to_string());
                let message = format!("Updated goal deadline to {}", shown);
                field_updated(&goal, "deadline", json!(goal.deadline), message)
            });
        respond("update goal deadline", outcome)
    }

    pub async fn update_goal_category(&self, args: UpdateCategoryArgs) -> Value {
        let category = match parse_optional_choice::<GoalCategory>(args.category.as_deref()) {
            Ok(category) => category,
            Err(err) => return respond("update goal category", Err(err)),
        };
        let outcome = self
            .update_owned_goal(&args.goal_id, move |repo, id| {
                repo.update_goal_category(id, category)
            })
            .await
            .map(|goal| {
                let shown = goal.category.map(|c| c.as_str()).unwrap_or("none");
                let message = format!("Updated goal category to {}", shown);
                field_updated(&goal, "category", json!(goal.category), message)
            });
        respond("update goal category", outcome)
    }

    pub async fn update_goal_motivation(&self, args: UpdateMotivationArgs) -> Value {
        let motivation = blank_to_none(args.motivation);
        let outcome = self
            .update_owned_goal(&args.goal_id, move |repo, id| {
                repo.update_goal_motivation(id, motivation)
            })
            .await
            .map(|goal| {
                field_updated(
                    &goal,
                    "motivation",
                    json!(goal.motivation),
                    "Updated goal motivation".to_string(),
                )
            });
        respond("update goal motivation", outcome)
    }

    pub async fn update_goal_success_criteria(&self, args: UpdateSuccessCriteriaArgs) -> Value {
        let criteria = blank_to_none(args.success_criteria);
        let outcome = self
            .update_owned_goal(&args.goal_id, move |repo, id| {
                repo.update_goal_success_criteria(id, criteria)
            })
            .await
            .map(|goal| {
                field_updated(
                    &goal,
                    "success_criteria",
                    json!(goal.success_criteria),
                    "Updated goal success criteria".to_string(),
                )
            });
        respond("update goal success criteria", outcome)
    }

    pub async fn update_goal_difficulty(&self, args: UpdateDifficultyArgs) -> Value {
        let difficulty = args.difficulty_level;
        let outcome = self
            .update_owned_goal(&args.goal_id, move |repo, id| {
                repo.update_goal_difficulty(id, difficulty)
            })
            .await
            .map(|goal| {
                let message = format!("Updated goal difficulty to {}/10", goal.difficulty_level);
                field_updated(
                    &goal,
                    "difficulty_level",
                    json!(goal.difficulty_level),
                    message,
                )
            });
        respond("update goal difficulty", outcome)
    }

    pub async fn update_goal_duration(&self, args: UpdateDurationArgs) -> Value {
        let days = args.estimated_duration_days;
        let outcome = self
            .update_owned_goal(&args.goal_id, move |repo, id| repo.update_goal_duration(id, days))
            .await
            .map(|goal| {
                let shown = goal
                    .estimated_duration_days
                    .map(|d| format!("{} days", d))
                    .unwrap_or_else(|| "not set".to_string());
                let message = format!("Updated goal duration to {}", shown);
                field_updated(
                    &goal,
                    "estimated_duration_days",
                    json!(goal.estimated_duration_days),
                    message,
                )
            });
        respond("update goal duration", outcome)
    }
}

fn goal_id_param() -> Value {
    json!({"type": "string", "description": "UUID of the goal"})
}

fn single_field_schema(field: &str, field_schema: Value, required: bool) -> Value {
    let mut properties = Map::new();
    properties.insert("goal_id".into(), goal_id_param());
    properties.insert(field.into(), field_schema);
    let required: Vec<&str> = if required {
        vec!["goal_id", field]
    } else {
        vec!["goal_id"]
    };
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

pub fn register(registry: &mut ToolRegistry, tools: Arc<GoalTools>) {
    registry.register_typed(
        "create_goal",
        "Create a new goal for the user",
        json!({
            "type": "object",
            "properties": {
                "title": {"type": "string", "description": "Short title of the goal"},
                "description": {"type": "string", "description": "Detailed description"},
                "priority": {"type": "integer", "minimum": 1, "maximum": 5, "description": "Priority from 1 (low) to 5 (high), default 3"},
                "category": {"type": "string", "enum": GoalCategory::VALUES},
                "deadline": {"type": "string", "description": "Deadline as YYYY-MM-DD"},
                "estimated_duration_days": {"type": "integer", "minimum": 1},
                "difficulty_level": {"type": "integer", "minimum": 0, "maximum": 10},
                "motivation": {"type": "string", "description": "Why the goal matters to the user"},
                "success_criteria": {"type": "string", "description": "How the user will know it is achieved"}
            },
            "required": ["title"]
        }),
        bind!(tools, create_goal),
    );

    registry.register_typed(
        "update_goal_status",
        "Update the status of a goal. Completing or canceling a goal unblocks the goals that require it",
        json!({
            "type": "object",
            "properties": {
                "goal_id": goal_id_param(),
                "status": {"type": "string", "enum": GoalStatus::VALUES}
            },
            "required": ["goal_id", "status"]
        }),
        bind!(tools, update_goal_status),
    );

    registry.register_typed(
        "create_goal_dependency",
        "Create a dependency between two goals. With 'requires' the dependent goal stays blocked until the parent is done",
        json!({
            "type": "object",
            "properties": {
                "parent_goal_id": {"type": "string", "description": "UUID of the goal that must come first"},
                "dependent_goal_id": {"type": "string", "description": "UUID of the goal that depends on the parent"},
                "dependency_type": {"type": "string", "enum": DependencyType::VALUES, "default": "requires"},
                "strength": {"type": "integer", "minimum": 1, "maximum": 5, "default": 1},
                "notes": {"type": "string"}
            },
            "required": ["parent_goal_id", "dependent_goal_id"]
        }),
        bind!(tools, create_goal_dependency),
    );

    registry.register_typed(
        "delete_goal_dependency",
        "Remove a dependency between two goals",
        json!({
            "type": "object",
            "properties": {
                "dependency_id": {"type": "string", "description": "UUID of the dependency"}
            },
            "required": ["dependency_id"]
        }),
        bind!(tools, delete_goal_dependency),
    );

    registry.register_typed(
        "get_user_goals",
        "Get the user's goals, optionally filtered by status",
        json!({
            "type": "object",
            "properties": {
                "status": {"type": "string", "enum": GoalStatus::VALUES},
                "include_dependencies": {"type": "boolean", "default": true}
            }
        }),
        bind!(tools, get_user_goals),
    );

    registry.register_typed(
        "get_goal_by_id",
        "Get a specific goal with its dependencies",
        json!({
            "type": "object",
            "properties": {"goal_id": goal_id_param()},
            "required": ["goal_id"]
        }),
        bind!(tools, get_goal_by_id),
    );

    registry.register_typed(
        "get_available_goals",
        "Get goals the user can work on now (not blocked), most important first",
        json!({"type": "object", "properties": {}}),
        bind!(tools, get_available_goals),
    );

    registry.register_typed(
        "update_goal_title",
        "Update the title of a goal",
        single_field_schema("title", json!({"type": "string"}), true),
        bind!(tools, update_goal_title),
    );
    registry.register_typed(
        "update_goal_description",
        "Update the description of a goal",
        single_field_schema("description", json!({"type": "string"}), true),
        bind!(tools, update_goal_description),
    );
    registry.register_typed(
        "update_goal_priority",
        "Update the priority of a goal (1-5)",
        single_field_schema(
            "priority",
            json!({"type": "integer", "minimum": 1, "maximum": 5}),
            true,
        ),
        bind!(tools, update_goal_priority),
    );
    registry.register_typed(
        "update_goal_deadline",
        "Update or remove the deadline of a goal",
        single_field_schema(
            "deadline",
            json!({"type": "string", "description": "YYYY-MM-DD, omit to remove"}),
            false,
        ),
        bind!(tools, update_goal_deadline),
    );
    registry.register_typed(
        "update_goal_category",
        "Update or clear the category of a goal",
        single_field_schema(
            "category",
            json!({"type": "string", "enum": GoalCategory::VALUES}),
            false,
        ),
        bind!(tools, update_goal_category),
    );
    registry.register_typed(
        "update_goal_motivation",
        "Update why the goal matters to the user",
        single_field_schema("motivation", json!({"type": "string"}), true),
        bind!(tools, update_goal_motivation),
    );
    registry.register_typed(
        "update_goal_success_criteria",
        "Update how success of the goal is measured",
        single_field_schema("success_criteria", json!({"type": "string"}), true),
        bind!(tools, update_goal_success_criteria),
    );
    registry.register_typed(
        "update_goal_difficulty",
        "Update the difficulty of a goal (0-10)",
        single_field_schema(
            "difficulty_level",
            json!({"type": "integer", "minimum": 0, "maximum": 10}),
            true,
        ),
        bind!(tools, update_goal_difficulty),
    );
    registry.register_typed(
        "update_goal_duration",
        "Update the estimated duration of a goal in days",
        single_field_schema(
            "estimated_duration_days",
            json!({"type": "integer", "minimum": 1}),
            false,
        ),
        bind!(tools, update_goal_duration),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::Persistence;

    fn tools() -> GoalTools {
        let db = Persistence::in_memory().unwrap();
        GoalTools::new(ToolContext::new(db, Uuid::new_v4(), Uuid::new_v4()))
    }

    fn create_args(title: &str) -> CreateGoalArgs {
        serde_json::from_value(json!({ "title": title })).unwrap()
    }

    #[tokio::test]
    async fn create_message_mentions_non_default_fields() {
        let tools = tools();
        let args: CreateGoalArgs = serde_json::from_value(json!({
            "title": "Learn Rust",
            "category": "learning",
            "priority": 5,
            "deadline": "2025-03-05"
        }))
        .unwrap();
        let value = tools.create_goal(args).await;
        assert_eq!(
            value["success_message"],
            "Created goal: Learn Rust in learning (priority 5/5) by March 05, 2025"
        );
        assert_eq!(value["status"], "todo");

        let plain = tools.create_goal(create_args("Walk")).await;
        assert_eq!(plain["success_message"], "Created goal: Walk");
    }

    #[tokio::test]
    async fn invalid_category_is_rejected() {
        let tools = tools();
        let args: CreateGoalArgs =
            serde_json::from_value(json!({"title": "x", "category": "hobby"})).unwrap();
        let value = tools.create_goal(args).await;
        assert!(value["error"]
            .as_str()
            .unwrap()
            .starts_with("Invalid category: hobby. Must be one of ['career'"));
    }

    #[tokio::test]
    async fn foreign_goal_is_not_updated() {
        let owner = tools();
        let goal = owner.create_goal(create_args("Mine")).await;
        let goal_id = goal["goal_id"].as_str().unwrap().to_string();

        let stranger = GoalTools::new(ToolContext::new(
            owner.ctx.persistence.clone(),
            Uuid::new_v4(),
            Uuid::new_v4(),
        ));
        let value = stranger
            .update_goal_title(UpdateTitleArgs {
                goal_id: goal_id.clone(),
                title: "Stolen".into(),
            })
            .await;
        assert_eq!(
            value["error"],
            format!("Goal {} not found or not owned by user", goal_id)
        );

        let reloaded = owner
            .get_goal_by_id(GoalIdArgs {
                goal_id: goal_id.clone(),
            })
            .await;
        assert_eq!(reloaded["title"], "Mine");
    }

    #[tokio::test]
    async fn field_update_messages() {
        let tools = tools();
        let goal = tools.create_goal(create_args("Garden")).await;
        let goal_id = goal["goal_id"].as_str().unwrap().to_string();

        let value = tools
            .update_goal_priority(UpdatePriorityArgs {
                goal_id: goal_id.clone(),
                priority: 8,
            })
            .await;
        assert_eq!(value["success_message"], "Updated goal priority to 5/5");
        assert_eq!(value["priority"], 5);

        let value = tools
            .update_goal_deadline(UpdateDeadlineArgs {
                goal_id: goal_id.clone(),
                deadline: None,
            })
            .await;
        assert_eq!(value["success_message"], "Updated goal deadline to removed");

        let value = tools
            .update_goal_category(UpdateCategoryArgs {
                goal_id: goal_id.clone(),
                category: None,
            })
            .await;
        assert_eq!(value["success_message"], "Updated goal category to none");

        let value = tools
            .update_goal_duration(UpdateDurationArgs {
                goal_id,
                estimated_duration_days: Some(14),
            })
            .await;
        assert_eq!(value["success_message"], "Updated goal duration to 14 days");
    }

    #[tokio::test]
    async fn available_goals_sort_undated_last() {
        let tools = tools();
        for (title, deadline) in [("undated", None), ("later", Some("2030-01-02")), ("sooner", Some("2030-01-01"))] {
            let mut args = create_args(title);
            args.deadline = deadline.map(String::from);
            tools.create_goal(args).await;
        }
        let value = tools.get_available_goals(NoArgs::default()).await;
        let titles: Vec<&str> = value["available_goals"]
            .as_array()
            .unwrap()
            .iter()
            .map(|g| g["title"].as_str().unwrap())
            .collect();
        assert_eq!(titles, vec!["sooner", "later", "undated"]);
        assert_eq!(value["total"], 3);
    }

    #[tokio::test]
    async fn duplicate_dependency_is_reported() {
        let tools = tools();
        let a = tools.create_goal(create_args("A")).await;
        let b = tools.create_goal(create_args("B")).await;
        let args = || CreateDependencyArgs {
            parent_goal_id: a["goal_id"].as_str().unwrap().to_string(),
            dependent_goal_id: b["goal_id"].as_str().unwrap().to_string(),
            dependency_type: "related".into(),
            strength: 9,
            notes: None,
        };
        let first = tools.create_goal_dependency(args()).await;
        assert_eq!(first["strength"], 5);
        assert_eq!(first["dependent_status"], "todo");
        assert_eq!(first["success_message"], "Created dependency: 'B' related 'A'");

        let second = tools.create_goal_dependency(args()).await;
        assert_eq!(
            second["error"],
            "Dependency already exists between these goals"
        );
    }
}
