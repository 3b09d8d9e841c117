//! Goal storage and the dependency graph engine.
//!
//! A goal is `blocked` while at least one `requires` edge points at it from a
//! parent that is neither done nor canceled. The engine only ever moves goals
//! between `todo` and `blocked`; done and canceled are left alone.

use anyhow::{Context, Result};
use duckdb::{params, Connection, Row};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use super::{
    date_to_sql, enum_from_sql, now_utc, opt_date_from_sql, opt_enum_from_sql, opt_uuid_from_sql,
    ts_from_sql, ts_to_sql, uuid_from_sql,
};
use crate::types::{
    DependencyType, Goal, GoalCategory, GoalDependency, GoalFilter, GoalStats, GoalStatus,
    GoalUpdate, NewGoal,
};

/// Graph constraints checked before an edge is written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DependencyError {
    #[error("A goal cannot depend on itself")]
    SelfDependency,
    #[error("Dependency strength must be between 1 and 5, got {0}")]
    InvalidStrength(i32),
    #[error("Dependency already exists between these goals")]
    Duplicate,
}

const GOAL_COLUMNS: &str = "id, user_id, chat_id, title, description, category, status, priority, \
     estimated_duration_days, difficulty_level, CAST(deadline AS TEXT), motivation, \
     success_criteria, CAST(created_at AS TEXT), CAST(updated_at AS TEXT)";

const DEPENDENCY_COLUMNS: &str =
    "id, parent_goal_id, dependent_goal_id, dependency_type, strength, notes, CAST(created_at AS TEXT)";

fn goal_from_row(row: &Row) -> duckdb::Result<Goal> {
    let id: String = row.get(0)?;
    let user_id: String = row.get(1)?;
    let status: String = row.get(6)?;
    let created_at: String = row.get(13)?;
    let updated_at: String = row.get(14)?;
    Ok(Goal {
        id: uuid_from_sql(0, &id)?,
        user_id: uuid_from_sql(1, &user_id)?,
        chat_id: opt_uuid_from_sql(2, row.get(2)?)?,
        title: row.get(3)?,
        description: row.get(4)?,
        category: opt_enum_from_sql(5, row.get(5)?)?,
        status: enum_from_sql(6, &status)?,
        priority: row.get(7)?,
        estimated_duration_days: row.get(8)?,
        difficulty_level: row.get(9)?,
        deadline: opt_date_from_sql(10, row.get(10)?)?,
        motivation: row.get(11)?,
        success_criteria: row.get(12)?,
        created_at: ts_from_sql(13, &created_at)?,
        updated_at: ts_from_sql(14, &updated_at)?,
    })
}

fn dependency_from_row(row: &Row) -> duckdb::Result<GoalDependency> {
    let id: String = row.get(0)?;
    let parent: String = row.get(1)?;
    let dependent: String = row.get(2)?;
    let dependency_type: String = row.get(3)?;
    let created_at: String = row.get(6)?;
    Ok(GoalDependency {
        id: uuid_from_sql(0, &id)?,
        parent_goal_id: uuid_from_sql(1, &parent)?,
        dependent_goal_id: uuid_from_sql(2, &dependent)?,
        dependency_type: enum_from_sql(3, &dependency_type)?,
        strength: row.get(4)?,
        notes: row.get(5)?,
        created_at: ts_from_sql(6, &created_at)?,
    })
}

/// Repository over a borrowed connection or an open transaction.
pub struct GoalRepository<'a> {
    conn: &'a Connection,
}

impl<'a> GoalRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    // ---------- Goals ----------

    pub fn create_goal(&self, new: NewGoal) -> Result<Goal> {
        let now = now_utc();
        let goal = Goal {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            chat_id: new.chat_id,
            title: new.title,
            description: new.description,
            category: new.category,
            status: GoalStatus::Todo,
            priority: new.priority.clamp(1, 5),
            estimated_duration_days: new.estimated_duration_days,
            difficulty_level: new.difficulty_level.clamp(0, 10),
            deadline: new.deadline,
            motivation: new.motivation,
            success_criteria: new.success_criteria,
            created_at: now,
            updated_at: now,
        };

        self.conn
            .execute(
                "INSERT INTO goals (id, user_id, chat_id, title, description, category, status, priority, \
                 estimated_duration_days, difficulty_level, deadline, motivation, success_criteria, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, CAST(? AS DATE), ?, ?, CAST(? AS TIMESTAMP), CAST(? AS TIMESTAMP))",
                params![
                    goal.id.to_string(),
                    goal.user_id.to_string(),
                    goal.chat_id.map(|c| c.to_string()),
                    goal.title,
                    goal.description,
                    goal.category.map(|c| c.as_str()),
                    goal.status.as_str(),
                    goal.priority,
                    goal.estimated_duration_days,
                    goal.difficulty_level,
                    goal.deadline.as_ref().map(date_to_sql),
                    goal.motivation,
                    goal.success_criteria,
                    ts_to_sql(&goal.created_at),
                    ts_to_sql(&goal.updated_at),
                ],
            )
            .context("inserting goal")?;

        info!(goal_id = %goal.id, user_id = %goal.user_id, title = %goal.title, "goal_created");
        Ok(goal)
    }

    pub fn get_by_id(&self, goal_id: Uuid) -> Result<Option<Goal>> {
        let sql = format!("SELECT {} FROM goals WHERE id = ?", GOAL_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params![goal_id.to_string()])?;
        if let Some(row) = rows.next()? {
            Ok(Some(goal_from_row(row)?))
        } else {
            Ok(None)
        }
    }

    /// Goal by id, only when it belongs to `user_id`.
    pub fn get_user_goal(&self, user_id: Uuid, goal_id: Uuid) -> Result<Option<Goal>> {
        Ok(self
            .get_by_id(goal_id)?
            .filter(|goal| goal.user_id == user_id))
    }

    /// Goals ordered by priority (high first), then newest first.
    pub fn get_user_goals(&self, user_id: Uuid, filter: &GoalFilter) -> Result<Vec<Goal>> {
        let mut sql = format!("SELECT {} FROM goals WHERE user_id = ?", GOAL_COLUMNS);
        let mut args: Vec<String> = vec![user_id.to_string()];

        if let Some(status) = filter.status {
            sql.push_str(" AND status = ?");
            args.push(status.as_str().to_string());
        } else if let Some(statuses) = filter.statuses.as_ref().filter(|s| !s.is_empty()) {
            let marks = vec!["?"; statuses.len()].join(", ");
            sql.push_str(&format!(" AND status IN ({})", marks));
            args.extend(statuses.iter().map(|s| s.as_str().to_string()));
        }

        sql.push_str(" ORDER BY priority DESC, created_at DESC");

        if let Some(limit) = filter.limit {
            sql.push_str(&format!(
                " LIMIT {} OFFSET {}",
                limit.max(0),
                filter.offset.unwrap_or(0).max(0)
            ));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(duckdb::params_from_iter(args.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(goal_from_row(row)?);
        }
        Ok(out)
    }

    /// Apply a partial update. Returns `None` when the goal does not exist.
    pub fn update_goal(&self, goal_id: Uuid, update: GoalUpdate) -> Result<Option<Goal>> {
        let Some(mut goal) = self.get_by_id(goal_id)? else {
            return Ok(None);
        };

        if let Some(title) = update.title {
            goal.title = title;
        }
        if let Some(description) = update.description {
            goal.description = description;
        }
        if let Some(category) = update.category {
            goal.category = category;
        }
        if let Some(status) = update.status {
            goal.status = status;
        }
        if let Some(priority) = update.priority {
            goal.priority = priority.clamp(1, 5);
        }
        if let Some(days) = update.estimated_duration_days {
            goal.estimated_duration_days = days;
        }
        if let Some(difficulty) = update.difficulty_level {
            goal.difficulty_level = difficulty.clamp(0, 10);
        }
        if let Some(deadline) = update.deadline {
            goal.deadline = deadline;
        }
        if let Some(motivation) = update.motivation {
            goal.motivation = motivation;
        }
        if let Some(criteria) = update.success_criteria {
            goal.success_criteria = criteria;
        }
        goal.updated_at = now_utc();

        self.conn
            .execute(
                "UPDATE goals SET title = ?, description = ?, category = ?, status = ?, priority = ?, \
                 estimated_duration_days = ?, difficulty_level = ?, deadline = CAST(? AS DATE), \
                 motivation = ?, success_criteria = ?, updated_at = CAST(? AS TIMESTAMP) WHERE id = ?",
                params![
                    goal.title,
                    goal.description,
                    goal.category.map(|c| c.as_str()),
                    goal.status.as_str(),
                    goal.priority,
                    goal.estimated_duration_days,
                    goal.difficulty_level,
                    goal.deadline.as_ref().map(date_to_sql),
                    goal.motivation,
                    goal.success_criteria,
                    ts_to_sql(&goal.updated_at),
                    goal.id.to_string(),
                ],
            )
            .context("updating goal")?;

        Ok(Some(goal))
    }

    pub fn update_goal_title(&self, goal_id: Uuid, title: String) -> Result<Option<Goal>> {
        self.update_goal(
            goal_id,
            GoalUpdate {
                title: Some(title),
                ..Default::default()
            },
        )
    }

    pub fn update_goal_description(
        &self,
        goal_id: Uuid,
        description: Option<String>,
    ) -> Result<Option<Goal>> {
        self.update_goal(
            goal_id,
            GoalUpdate {
                description: Some(description),
                ..Default::default()
            },
        )
    }

    /// Priority is clamped to 1..=5.
    pub fn update_goal_priority(&self, goal_id: Uuid, priority: i32) -> Result<Option<Goal>> {
        self.update_goal(
            goal_id,
            GoalUpdate {
                priority: Some(priority),
                ..Default::default()
            },
        )
    }

    pub fn update_goal_deadline(
        &self,
        goal_id: Uuid,
        deadline: Option<chrono::NaiveDate>,
    ) -> Result<Option<Goal>> {
        self.update_goal(
            goal_id,
            GoalUpdate {
                deadline: Some(deadline),
                ..Default::default()
            },
        )
    }

    pub fn update_goal_category(
        &self,
        goal_id: Uuid,
        category: Option<GoalCategory>,
    ) -> Result<Option<Goal>> {
        self.update_goal(
            goal_id,
            GoalUpdate {
                category: Some(category),
                ..Default::default()
            },
        )
    }

    pub fn update_goal_motivation(
        &self,
        goal_id: Uuid,
        motivation: Option<String>,
    ) -> Result<Option<Goal>> {
        self.update_goal(
            goal_id,
            GoalUpdate {
                motivation: Some(motivation),
                ..Default::default()
            },
        )
    }

    pub fn update_goal_success_criteria(
        &self,
        goal_id: Uuid,
        success_criteria: Option<String>,
    ) -> Result<Option<Goal>> {
        self.update_goal(
            goal_id,
            GoalUpdate {
                success_criteria: Some(success_criteria),
                ..Default::default()
            },
        )
    }

    /// Difficulty is clamped to 0..=10.
    pub fn update_goal_difficulty(&self, goal_id: Uuid, difficulty: i32) -> Result<Option<Goal>> {
        self.update_goal(
            goal_id,
            GoalUpdate {
                difficulty_level: Some(difficulty),
                ..Default::default()
            },
        )
    }

    pub fn update_goal_duration(&self, goal_id: Uuid, days: Option<i32>) -> Result<Option<Goal>> {
        self.update_goal(
            goal_id,
            GoalUpdate {
                estimated_duration_days: Some(days),
                ..Default::default()
            },
        )
    }

    /// Persist a caller-chosen status, then let the engine react.
    ///
    /// Finishing a goal re-evaluates the goals that require it; moving it back
    /// to `todo` re-evaluates the goal itself, which may land it in `blocked`.
    /// Returns the goal as stored after propagation.
    pub fn change_goal_status(&self, goal_id: Uuid, status: GoalStatus) -> Result<Option<Goal>> {
        if self
            .update_goal(
                goal_id,
                GoalUpdate {
                    status: Some(status),
                    ..Default::default()
                },
            )?
            .is_none()
        {
            return Ok(None);
        }

        match status {
            GoalStatus::Done | GoalStatus::Canceled => {
                self.recalculate_dependent_goals_status(goal_id)?;
            }
            GoalStatus::Todo => {
                self.recalculate_goal_status_after_dependency_change(goal_id)?;
            }
            GoalStatus::Blocked => {}
        }

        self.get_by_id(goal_id)
    }

    /// Remove a goal and every edge touching it. Goals it used to gate are re-evaluated.
    pub fn delete_goal(&self, goal_id: Uuid) -> Result<bool> {
        let former_dependents: Vec<Uuid> = self
            .get_goal_dependents(goal_id)?
            .into_iter()
            .map(|dep| dep.dependent_goal_id)
            .collect();

        self.conn.execute(
            "DELETE FROM goal_dependencies WHERE parent_goal_id = ? OR dependent_goal_id = ?",
            params![goal_id.to_string(), goal_id.to_string()],
        )?;
        let removed = self
            .conn
            .execute("DELETE FROM goals WHERE id = ?", params![goal_id.to_string()])?;

        for dependent in former_dependents {
            self.recalculate_goal_status_after_dependency_change(dependent)?;
        }
        Ok(removed > 0)
    }

    pub fn get_goal_stats(&self, user_id: Uuid) -> Result<GoalStats> {
        let uid = user_id.to_string();
        let total: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM goals WHERE user_id = ?",
            params![uid],
            |row| row.get(0),
        )?;

        let mut by_status = BTreeMap::new();
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM goals WHERE user_id = ? GROUP BY status")?;
        let mut rows = stmt.query(params![uid])?;
        while let Some(row) = rows.next()? {
            by_status.insert(row.get::<_, String>(0)?, row.get::<_, i64>(1)?);
        }

        let mut by_category = BTreeMap::new();
        let mut stmt = self.conn.prepare(
            "SELECT category, COUNT(*) FROM goals WHERE user_id = ? AND category IS NOT NULL GROUP BY category",
        )?;
        let mut rows = stmt.query(params![uid])?;
        while let Some(row) = rows.next()? {
            by_category.insert(row.get::<_, String>(0)?, row.get::<_, i64>(1)?);
        }

        Ok(GoalStats {
            total,
            by_status,
            by_category,
        })
    }

    // ---------- Dependencies ----------

    /// Insert the edge `parent -> dependent` and re-evaluate the dependent.
    ///
    /// Every edge type triggers the re-evaluation, but only `requires` edges
    /// can cause a block.
    pub fn create_dependency(
        &self,
        parent_goal_id: Uuid,
        dependent_goal_id: Uuid,
        dependency_type: DependencyType,
        strength: i32,
        notes: Option<String>,
    ) -> Result<GoalDependency> {
        if parent_goal_id == dependent_goal_id {
            return Err(DependencyError::SelfDependency.into());
        }
        if !(1..=5).contains(&strength) {
            return Err(DependencyError::InvalidStrength(strength).into());
        }
        if self
            .find_dependency(parent_goal_id, dependent_goal_id)?
            .is_some()
        {
            return Err(DependencyError::Duplicate.into());
        }

        let dependency = GoalDependency {
            id: Uuid::new_v4(),
            parent_goal_id,
            dependent_goal_id,
            dependency_type,
            strength,
            notes,
            created_at: now_utc(),
        };

        self.conn
            .execute(
                "INSERT INTO goal_dependencies (id, parent_goal_id, dependent_goal_id, dependency_type, strength, notes, created_at) \
                 VALUES (?, ?, ?, ?, ?, ?, CAST(? AS TIMESTAMP))",
                params![
                    dependency.id.to_string(),
                    parent_goal_id.to_string(),
                    dependent_goal_id.to_string(),
                    dependency_type.as_str(),
                    strength,
                    dependency.notes,
                    ts_to_sql(&dependency.created_at),
                ],
            )
            .context("inserting goal dependency")?;

        debug!(
            parent = %parent_goal_id,
            dependent = %dependent_goal_id,
            kind = dependency_type.as_str(),
            "dependency created"
        );

        self.recalculate_goal_status_after_dependency_change(dependent_goal_id)?;
        Ok(dependency)
    }

    /// Edges where `goal_id` is the dependent, i.e. what the goal depends on.
    pub fn get_goal_dependencies(&self, goal_id: Uuid) -> Result<Vec<GoalDependency>> {
        self.query_dependencies("dependent_goal_id", goal_id)
    }

    /// Edges where `goal_id` is the parent, i.e. what depends on the goal.
    pub fn get_goal_dependents(&self, goal_id: Uuid) -> Result<Vec<GoalDependency>> {
        self.query_dependencies("parent_goal_id", goal_id)
    }

    pub fn get_dependency(&self, dependency_id: Uuid) -> Result<Option<GoalDependency>> {
        let sql = format!(
            "SELECT {} FROM goal_dependencies WHERE id = ?",
            DEPENDENCY_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params![dependency_id.to_string()])?;
        if let Some(row) = rows.next()? {
            Ok(Some(dependency_from_row(row)?))
        } else {
            Ok(None)
        }
    }

    /// Remove the edge and re-evaluate its former dependent.
    pub fn delete_dependency(&self, dependency: &GoalDependency) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM goal_dependencies WHERE id = ?",
                params![dependency.id.to_string()],
            )
            .context("deleting goal dependency")?;
        self.recalculate_goal_status_after_dependency_change(dependency.dependent_goal_id)?;
        Ok(())
    }

    fn find_dependency(&self, parent: Uuid, dependent: Uuid) -> Result<Option<GoalDependency>> {
        let sql = format!(
            "SELECT {} FROM goal_dependencies WHERE parent_goal_id = ? AND dependent_goal_id = ?",
            DEPENDENCY_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params![parent.to_string(), dependent.to_string()])?;
        if let Some(row) = rows.next()? {
            Ok(Some(dependency_from_row(row)?))
        } else {
            Ok(None)
        }
    }

    fn query_dependencies(&self, column: &str, goal_id: Uuid) -> Result<Vec<GoalDependency>> {
        let sql = format!(
            "SELECT {} FROM goal_dependencies WHERE {} = ? ORDER BY created_at",
            DEPENDENCY_COLUMNS, column
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params![goal_id.to_string()])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(dependency_from_row(row)?);
        }
        Ok(out)
    }

    // ---------- Status propagation ----------

    /// Re-derive `todo`/`blocked` for one goal from its `requires` parents.
    ///
    /// Returns the resulting status, or `None` when the goal does not exist.
    pub fn recalculate_goal_status_after_dependency_change(
        &self,
        goal_id: Uuid,
    ) -> Result<Option<GoalStatus>> {
        let Some(goal) = self.get_by_id(goal_id)? else {
            return Ok(None);
        };

        let unmet: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM goal_dependencies d \
             JOIN goals p ON p.id = d.parent_goal_id \
             WHERE d.dependent_goal_id = ? AND d.dependency_type = ? \
             AND p.status NOT IN (?, ?)",
            params![
                goal_id.to_string(),
                DependencyType::Requires.as_str(),
                GoalStatus::Done.as_str(),
                GoalStatus::Canceled.as_str(),
            ],
            |row| row.get(0),
        )?;
        let should_block = unmet > 0;

        let next = match goal.status {
            GoalStatus::Todo if should_block => GoalStatus::Blocked,
            GoalStatus::Blocked if !should_block => GoalStatus::Todo,
            current => current,
        };

        if next != goal.status {
            self.conn
                .execute(
                    "UPDATE goals SET status = ?, updated_at = CAST(? AS TIMESTAMP) WHERE id = ?",
                    params![next.as_str(), ts_to_sql(&now_utc()), goal_id.to_string()],
                )
                .context("updating derived goal status")?;
            info!(goal_id = %goal_id, from = goal.status.as_str(), to = next.as_str(), "goal status recalculated");
        }

        Ok(Some(next))
    }

    /// Re-evaluate the direct `requires` dependents of `parent_goal_id`.
    ///
    /// One hop only: a dependent that flips does not cascade to its own
    /// dependents. Returns the ids whose status changed.
    pub fn recalculate_dependent_goals_status(&self, parent_goal_id: Uuid) -> Result<Vec<Uuid>> {
        if self.get_by_id(parent_goal_id)?.is_none() {
            return Ok(Vec::new());
        }

        let mut changed = Vec::new();
        for dependency in self.get_goal_dependents(parent_goal_id)? {
            if dependency.dependency_type != DependencyType::Requires {
                continue;
            }
            let before = self
                .get_by_id(dependency.dependent_goal_id)?
                .map(|goal| goal.status);
            let after =
                self.recalculate_goal_status_after_dependency_change(dependency.dependent_goal_id)?;
            if before != after {
                changed.push(dependency.dependent_goal_id);
            }
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::Persistence;

    fn goal(repo: &GoalRepository<'_>, user: Uuid, title: &str) -> Goal {
        repo.create_goal(NewGoal::new(user, title)).unwrap()
    }

    #[test]
    fn create_goal_clamps_ranges() {
        let db = Persistence::in_memory().unwrap();
        let conn = db.conn();
        let repo = GoalRepository::new(&conn);
        let mut new = NewGoal::new(Uuid::new_v4(), "Run a marathon");
        new.priority = 9;
        new.difficulty_level = -4;
        let created = repo.create_goal(new).unwrap();
        assert_eq!(created.priority, 5);
        assert_eq!(created.difficulty_level, 0);

        let loaded = repo.get_by_id(created.id).unwrap().unwrap();
        assert_eq!(loaded, created);
    }

    #[test]
    fn update_clears_nullable_fields() {
        let db = Persistence::in_memory().unwrap();
        let conn = db.conn();
        let repo = GoalRepository::new(&conn);
        let user = Uuid::new_v4();
        let g = repo
            .create_goal(NewGoal::new(user, "Read").with_category(GoalCategory::Learning))
            .unwrap();

        let updated = repo.update_goal_category(g.id, None).unwrap().unwrap();
        assert_eq!(updated.category, None);
        assert!(updated.updated_at >= g.updated_at);
    }

    #[test]
    fn update_of_missing_goal_is_none() {
        let db = Persistence::in_memory().unwrap();
        let conn = db.conn();
        let repo = GoalRepository::new(&conn);
        assert!(repo
            .update_goal_title(Uuid::new_v4(), "x".into())
            .unwrap()
            .is_none());
    }

    #[test]
    fn requires_edge_blocks_and_unblocks() {
        let db = Persistence::in_memory().unwrap();
        let conn = db.conn();
        let repo = GoalRepository::new(&conn);
        let user = Uuid::new_v4();
        let parent = goal(&repo, user, "Learn Rust");
        let child = goal(&repo, user, "Ship crate");

        repo.create_dependency(parent.id, child.id, DependencyType::Requires, 1, None)
            .unwrap();
        assert_eq!(
            repo.get_by_id(child.id).unwrap().unwrap().status,
            GoalStatus::Blocked
        );

        let changed = repo.change_goal_status(parent.id, GoalStatus::Done).unwrap();
        assert_eq!(changed.unwrap().status, GoalStatus::Done);
        assert_eq!(
            repo.get_by_id(child.id).unwrap().unwrap().status,
            GoalStatus::Todo
        );
    }

    #[test]
    fn deleting_edge_unblocks_dependent() {
        let db = Persistence::in_memory().unwrap();
        let conn = db.conn();
        let repo = GoalRepository::new(&conn);
        let user = Uuid::new_v4();
        let parent = goal(&repo, user, "A");
        let child = goal(&repo, user, "B");
        let dep = repo
            .create_dependency(parent.id, child.id, DependencyType::Requires, 2, None)
            .unwrap();

        repo.delete_dependency(&dep).unwrap();
        assert!(repo.get_dependency(dep.id).unwrap().is_none());
        assert_eq!(
            repo.get_by_id(child.id).unwrap().unwrap().status,
            GoalStatus::Todo
        );
    }

    #[test]
    fn invalid_strength_is_rejected() {
        let db = Persistence::in_memory().unwrap();
        let conn = db.conn();
        let repo = GoalRepository::new(&conn);
        let user = Uuid::new_v4();
        let a = goal(&repo, user, "A");
        let b = goal(&repo, user, "B");
        let err = repo
            .create_dependency(a.id, b.id, DependencyType::Related, 0, None)
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<DependencyError>(),
            Some(&DependencyError::InvalidStrength(0))
        );
    }

    #[test]
    fn recalculating_missing_goal_is_a_noop() {
        let db = Persistence::in_memory().unwrap();
        let conn = db.conn();
        let repo = GoalRepository::new(&conn);
        assert_eq!(
            repo.recalculate_goal_status_after_dependency_change(Uuid::new_v4())
                .unwrap(),
            None
        );
        assert!(repo
            .recalculate_dependent_goals_status(Uuid::new_v4())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn deleting_a_parent_goal_frees_its_dependents() {
        let db = Persistence::in_memory().unwrap();
        let conn = db.conn();
        let repo = GoalRepository::new(&conn);
        let user = Uuid::new_v4();
        let parent = goal(&repo, user, "A");
        let child = goal(&repo, user, "B");
        repo.create_dependency(parent.id, child.id, DependencyType::Requires, 1, None)
            .unwrap();

        assert!(repo.delete_goal(parent.id).unwrap());
        assert!(repo.get_goal_dependencies(child.id).unwrap().is_empty());
        assert_eq!(
            repo.get_by_id(child.id).unwrap().unwrap().status,
            GoalStatus::Todo
        );
    }

    #[test]
    fn stats_group_by_status_and_category() {
        let db = Persistence::in_memory().unwrap();
        let conn = db.conn();
        let repo = GoalRepository::new(&conn);
        let user = Uuid::new_v4();
        repo.create_goal(NewGoal::new(user, "A").with_category(GoalCategory::Health))
            .unwrap();
        repo.create_goal(NewGoal::new(user, "B").with_category(GoalCategory::Health))
            .unwrap();
        let c = goal(&repo, user, "C");
        repo.change_goal_status(c.id, GoalStatus::Done).unwrap();
        goal(&repo, Uuid::new_v4(), "someone else");

        let stats = repo.get_goal_stats(user).unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.by_status.get("todo"), Some(&2));
        assert_eq!(stats.by_status.get("done"), Some(&1));
        assert_eq!(stats.by_category.get("health"), Some(&2));
        assert_eq!(stats.by_category.len(), 1);
    }

    #[test]
    fn listing_orders_by_priority_then_recency() {
        let db = Persistence::in_memory().unwrap();
        let conn = db.conn();
        let repo = GoalRepository::new(&conn);
        let user = Uuid::new_v4();
        repo.create_goal(NewGoal::new(user, "low").with_priority(1))
            .unwrap();
        repo.create_goal(NewGoal::new(user, "high").with_priority(5))
            .unwrap();
        repo.create_goal(NewGoal::new(user, "mid").with_priority(3))
            .unwrap();

        let titles: Vec<String> = repo
            .get_user_goals(user, &GoalFilter::default())
            .unwrap()
            .into_iter()
            .map(|g| g.title)
            .collect();
        assert_eq!(titles, vec!["high", "mid", "low"]);

        let page = repo
            .get_user_goals(
                user,
                &GoalFilter {
                    limit: Some(1),
                    offset: Some(1),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].title, "mid");
    }
}
