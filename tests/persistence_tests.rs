use aimi::persistence::events::NewEvent;
use aimi::persistence::mental_states::MentalStateResponse;
use aimi::persistence::notifications::NewNotification;
use aimi::persistence::{
    migrations, now_utc, ChatRepository, EventRepository, GoalRepository,
    MentalStateRepository, NotificationRepository, Persistence,
};
use aimi::types::{
    DependencyType, EventType, GoalCategory, GoalStatus, MessageRole, Mood, NewGoal,
    NotificationStatus, NotificationType,
};
use chrono::Duration;
use tempfile::tempdir;
use uuid::Uuid;

fn temp_db_path() -> std::path::PathBuf {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.duckdb");
    // Keep directory alive by leaking it for test duration to avoid drop before use
    Box::leak(Box::new(dir));
    path
}

#[test]
fn db_initializes_and_tables_exist() {
    let path = temp_db_path();
    let p = Persistence::new(&path).expect("init db");
    let conn = p.conn();
    for table in [
        "chats",
        "messages",
        "goals",
        "goal_dependencies",
        "events",
        "notifications",
        "mental_states",
    ] {
        let sql = format!("SELECT COUNT(*) FROM {}", table);
        let mut stmt = conn.prepare(&sql).unwrap();
        let count: i64 = stmt.query_row([], |row| row.get(0)).unwrap();
        assert_eq!(count, 0, "table {} should start empty", table);
    }
}

#[test]
fn migrations_are_idempotent_across_reopen() {
    let path = temp_db_path();
    let version = {
        let p = Persistence::new(&path).unwrap();
        let v = migrations::current_version(&p.conn()).unwrap();
        p.checkpoint().unwrap();
        v
    };
    let reopened = Persistence::new(&path).unwrap();
    assert_eq!(migrations::current_version(&reopened.conn()).unwrap(), version);
}

#[test]
fn chats_and_messages_survive_reopen() {
    let path = temp_db_path();
    let (chat_id, user_id) = (Uuid::new_v4(), Uuid::new_v4());
    {
        let p = Persistence::new(&path).unwrap();
        let conn = p.conn();
        let repo = ChatRepository::new(&conn);
        repo.create_chat(chat_id, user_id, Some("Morning".to_string()), "mock-model")
            .unwrap();
        repo.append_message(chat_id, MessageRole::User, "hello", None)
            .unwrap();
        repo.append_message(chat_id, MessageRole::Assistant, "hi!", None)
            .unwrap();
        drop(conn);
        p.checkpoint().unwrap();
    }

    let p = Persistence::new(&path).unwrap();
    let conn = p.conn();
    let repo = ChatRepository::new(&conn);
    let chat = repo.get_user_chat(chat_id, user_id).unwrap().unwrap();
    assert_eq!(chat.title.as_deref(), Some("Morning"));
    assert_eq!(chat.last_seq, 2);
    let messages = repo.list_messages(chat_id, 10, 0).unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].content, "hello");
    assert_eq!(messages[1].role, MessageRole::Assistant);
    assert_eq!(repo.next_sequence(chat_id).unwrap(), 3);
}

#[test]
fn deleting_chat_removes_messages() {
    let p = Persistence::in_memory().unwrap();
    let conn = p.conn();
    let repo = ChatRepository::new(&conn);
    let chat_id = Uuid::new_v4();
    repo.create_chat(chat_id, Uuid::new_v4(), None, "mock-model")
        .unwrap();
    repo.append_message(chat_id, MessageRole::User, "bye", None)
        .unwrap();

    assert!(repo.delete_chat(chat_id).unwrap());
    assert_eq!(repo.count_messages(chat_id).unwrap(), 0);
    assert!(repo.get_by_id(chat_id).unwrap().is_none());
}

#[test]
fn failed_transaction_rolls_back() {
    let p = Persistence::in_memory().unwrap();
    let user = Uuid::new_v4();

    let result: anyhow::Result<()> = p.transaction(|conn| {
        GoalRepository::new(conn).create_goal(NewGoal::new(user, "Half written"))?;
        anyhow::bail!("abort");
    });
    assert!(result.is_err());

    let conn = p.conn();
    let stats = GoalRepository::new(&conn).get_goal_stats(user).unwrap();
    assert_eq!(stats.total, 0);
}

#[test]
fn goal_stats_group_by_status_and_category() {
    let p = Persistence::in_memory().unwrap();
    let conn = p.conn();
    let repo = GoalRepository::new(&conn);
    let user = Uuid::new_v4();
    let parent = repo
        .create_goal(NewGoal::new(user, "Learn").with_category(GoalCategory::Learning))
        .unwrap();
    let child = repo
        .create_goal(NewGoal::new(user, "Apply").with_category(GoalCategory::Career))
        .unwrap();
    repo.create_goal(NewGoal::new(user, "Uncategorized")).unwrap();
    repo.create_dependency(parent.id, child.id, DependencyType::Requires, 3, None)
        .unwrap();

    let stats = repo.get_goal_stats(user).unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.by_status.get("todo"), Some(&2));
    assert_eq!(stats.by_status.get("blocked"), Some(&1));
    assert_eq!(stats.by_category.get("learning"), Some(&1));
    assert_eq!(stats.by_category.get("career"), Some(&1));

    let fetched = repo.get_by_id(child.id).unwrap().unwrap();
    assert_eq!(fetched.status, GoalStatus::Blocked);
}

#[test]
fn upcoming_events_skip_the_past() {
    let p = Persistence::in_memory().unwrap();
    let conn = p.conn();
    let repo = EventRepository::new(&conn);
    let user = Uuid::new_v4();
    let now = now_utc();
    for (title, offset) in [("Yesterday", -24), ("Soon", 2), ("Later", 48)] {
        let start = now + Duration::hours(offset);
        repo.create_event(NewEvent {
            user_id: user,
            goal_id: None,
            title: title.to_string(),
            description: None,
            location: None,
            event_type: EventType::Meeting,
            start_time: start,
            end_time: start + Duration::hours(1),
        })
        .unwrap();
    }

    let upcoming = repo.get_upcoming_events(user, now, 5).unwrap();
    let titles: Vec<&str> = upcoming.iter().map(|e| e.title.as_str()).collect();
    assert_eq!(titles, vec!["Soon", "Later"]);
}

#[test]
fn pending_notifications_are_due_only() {
    let p = Persistence::in_memory().unwrap();
    let conn = p.conn();
    let repo = NotificationRepository::new(&conn);
    let user = Uuid::new_v4();
    let now = now_utc();
    let due = repo
        .create_notification(NewNotification {
            user_id: user,
            chat_id: Uuid::new_v4(),
            goal_id: None,
            message: "Stretch".to_string(),
            notification_type: NotificationType::RestSuggestion,
            scheduled_for: now - Duration::minutes(5),
            context: None,
        })
        .unwrap();
    repo.create_notification(NewNotification {
        user_id: user,
        chat_id: Uuid::new_v4(),
        goal_id: None,
        message: "Tomorrow".to_string(),
        notification_type: NotificationType::GoalReminder,
        scheduled_for: now + Duration::days(1),
        context: None,
    })
    .unwrap();

    let pending = repo.get_pending_notifications(Some(user), now, None).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, due.id);

    let sent = repo
        .update_notification_status(due.id, NotificationStatus::Sent, Some(now))
        .unwrap()
        .unwrap();
    assert_eq!(sent.status, NotificationStatus::Sent);
    assert_eq!(sent.sent_at, Some(now));
    assert!(repo
        .get_pending_notifications(Some(user), now, None)
        .unwrap()
        .is_empty());
}

#[test]
fn latest_response_respects_window() {
    let p = Persistence::in_memory().unwrap();
    let conn = p.conn();
    let repo = MentalStateRepository::new(&conn);
    let user = Uuid::new_v4();
    let now = now_utc();
    let poll = repo.create_mental_state(user, now.date_naive()).unwrap();

    assert!(repo
        .get_latest_response(user, now - Duration::days(8))
        .unwrap()
        .is_none());

    repo.respond(
        poll.id,
        MentalStateResponse {
            mood: Some(Mood::Good),
            readiness_level: Some(7),
            notes: None,
            responded_at: Some(now),
        },
    )
    .unwrap();

    let latest = repo
        .get_latest_response(user, now - Duration::days(8))
        .unwrap()
        .unwrap();
    assert_eq!(latest.mood, Some(Mood::Good));
    assert!(repo
        .get_latest_response(user, now + Duration::minutes(1))
        .unwrap()
        .is_none());
}
