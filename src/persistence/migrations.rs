use anyhow::{Context, Result};
use duckdb::Connection;

pub fn run(conn: &Connection) -> Result<()> {
    // Schema version table, then each migration in order.
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        );
        "#,
    )
    .context("creating schema_migrations table")?;

    let current = current_version(conn)?;
    let mut migrations_applied = false;

    if current < 1 {
        apply_v1(conn)?;
        set_version(conn, 1)?;
        migrations_applied = true;
    }

    if current < 2 {
        apply_v2(conn)?;
        set_version(conn, 2)?;
        migrations_applied = true;
    }

    if current < 3 {
        apply_v3(conn)?;
        set_version(conn, 3)?;
        migrations_applied = true;
    }

    // Merge the WAL so schema changes are not replayed on the next open.
    if migrations_applied {
        conn.execute_batch("FORCE CHECKPOINT;")
            .context("forcing checkpoint after migrations")?;
    }

    Ok(())
}

pub fn current_version(conn: &Connection) -> Result<i64> {
    let mut stmt = conn.prepare("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")?;
    let v: i64 = stmt.query_row([], |row| row.get(0))?;
    Ok(v)
}

fn set_version(conn: &Connection, v: i64) -> Result<()> {
    conn.execute("INSERT INTO schema_migrations (version) VALUES (?)", [v])?;
    Ok(())
}

fn apply_v1(conn: &Connection) -> Result<()> {
    // Conversations
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS chats (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            title TEXT,
            model TEXT NOT NULL,
            last_seq BIGINT NOT NULL DEFAULT 0,
            last_active_at TIMESTAMP,
            created_at TIMESTAMP NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_chats_user ON chats(user_id);

        CREATE TABLE IF NOT EXISTS messages (
            id TEXT PRIMARY KEY,
            chat_id TEXT NOT NULL,
            seq BIGINT NOT NULL,
            role TEXT NOT NULL,
            content TEXT NOT NULL,
            request_id TEXT,
            created_at TIMESTAMP NOT NULL,
            UNIQUE (chat_id, seq)
        );

        CREATE INDEX IF NOT EXISTS idx_messages_chat_request ON messages(chat_id, request_id);
        "#,
    )
    .context("applying v1 schema (chats, messages)")
}

fn apply_v2(conn: &Connection) -> Result<()> {
    // Goal graph
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS goals (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            chat_id TEXT,
            title TEXT NOT NULL,
            description TEXT,
            category TEXT,
            status TEXT NOT NULL DEFAULT 'todo',
            priority INTEGER NOT NULL DEFAULT 3,
            estimated_duration_days INTEGER,
            difficulty_level INTEGER NOT NULL DEFAULT 0,
            deadline DATE,
            motivation TEXT,
            success_criteria TEXT,
            created_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_goals_user ON goals(user_id);

        CREATE TABLE IF NOT EXISTS goal_dependencies (
            id TEXT PRIMARY KEY,
            parent_goal_id TEXT NOT NULL,
            dependent_goal_id TEXT NOT NULL,
            dependency_type TEXT NOT NULL DEFAULT 'requires',
            strength INTEGER NOT NULL DEFAULT 1,
            notes TEXT,
            created_at TIMESTAMP NOT NULL,
            CHECK (parent_goal_id <> dependent_goal_id),
            CHECK (strength BETWEEN 1 AND 5),
            UNIQUE (parent_goal_id, dependent_goal_id)
        );

        CREATE INDEX IF NOT EXISTS idx_goal_deps_dependent ON goal_dependencies(dependent_goal_id);
        "#,
    )
    .context("applying v2 schema (goals, goal_dependencies)")
}

fn apply_v3(conn: &Connection) -> Result<()> {
    // Planning records
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS events (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            goal_id TEXT,
            title TEXT NOT NULL,
            description TEXT,
            location TEXT,
            event_type TEXT NOT NULL DEFAULT 'personal',
            status TEXT NOT NULL DEFAULT 'scheduled',
            start_time TIMESTAMP NOT NULL,
            end_time TIMESTAMP NOT NULL,
            created_at TIMESTAMP NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_events_user_start ON events(user_id, start_time);

        CREATE TABLE IF NOT EXISTS notifications (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            chat_id TEXT NOT NULL,
            goal_id TEXT,
            message TEXT NOT NULL,
            notification_type TEXT NOT NULL,
            scheduled_for TIMESTAMP NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            sent_at TIMESTAMP,
            context TEXT,
            created_at TIMESTAMP NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id);

        CREATE TABLE IF NOT EXISTS mental_states (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            poll_date DATE NOT NULL,
            mood TEXT,
            readiness_level INTEGER,
            notes TEXT,
            question_asked_at TIMESTAMP NOT NULL,
            responded_at TIMESTAMP,
            UNIQUE (user_id, poll_date)
        );
        "#,
    )
    .context("applying v3 schema (events, notifications, mental_states)")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();
        assert_eq!(current_version(&conn).unwrap(), 3);
    }

    #[test]
    fn dependency_constraints_exist_at_table_level() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();

        let self_edge = conn.execute(
            "INSERT INTO goal_dependencies (id, parent_goal_id, dependent_goal_id, created_at) \
             VALUES ('d1', 'g1', 'g1', CAST('2025-01-01 00:00:00' AS TIMESTAMP))",
            [],
        );
        assert!(self_edge.is_err());

        let weak = conn.execute(
            "INSERT INTO goal_dependencies (id, parent_goal_id, dependent_goal_id, strength, created_at) \
             VALUES ('d2', 'g1', 'g2', 9, CAST('2025-01-01 00:00:00' AS TIMESTAMP))",
            [],
        );
        assert!(weak.is_err());
    }
}
