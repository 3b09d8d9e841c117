use aimi::persistence::Persistence;
use aimi::tools::{FunctionCall, ToolRegistry};
use serde_json::{json, Value};
use uuid::Uuid;

fn registry() -> ToolRegistry {
    ToolRegistry::for_user(
        Persistence::in_memory().unwrap(),
        Uuid::new_v4(),
        Uuid::new_v4(),
    )
}

#[test]
fn full_tool_set_is_registered() {
    let registry = registry();
    assert_eq!(registry.len(), 33);

    for name in [
        "create_goal",
        "update_goal_status",
        "create_goal_dependency",
        "delete_goal_dependency",
        "get_available_goals",
        "create_event",
        "get_upcoming_events",
        "create_notification",
        "get_pending_notifications",
        "record_mood",
        "get_mood_trends",
        "suggest_goal_breakdown",
        "find_potential_goal_connections",
    ] {
        assert!(registry.has(name), "missing tool {name}");
    }
}

#[test]
fn every_schema_is_an_object_function() {
    let registry = registry();
    for schema in registry.get_tool_schemas() {
        assert_eq!(schema["type"], "function");
        let function = &schema["function"];
        assert!(function["name"].as_str().is_some_and(|n| !n.is_empty()));
        assert!(function["description"].as_str().is_some_and(|d| !d.is_empty()));
        assert_eq!(function["parameters"]["type"], "object", "{}", function["name"]);
    }
}

#[test]
fn status_schema_lists_goal_statuses() {
    let registry = registry();
    let tool = registry.get("update_goal_status").unwrap();
    assert_eq!(
        tool.parameters["properties"]["status"]["enum"],
        json!(["todo", "blocked", "done", "canceled"])
    );
}

#[tokio::test]
async fn unknown_call_does_not_stop_the_batch() {
    let registry = registry();
    let outcomes = registry
        .process_function_calls(&[
            FunctionCall::new("launch_rocket", json!({})),
            FunctionCall::new("create_goal", json!({ "title": "Learn Python" })),
        ])
        .await;

    assert_eq!(outcomes.len(), 2);
    assert_eq!(
        outcomes[0].result,
        Some(json!({ "error": "Unknown function: launch_rocket" }))
    );
    let created = outcomes[1].result.as_ref().unwrap();
    assert_eq!(created["title"], "Learn Python");
    assert_eq!(created["status"], "todo");
    assert_eq!(created["success_message"], "Created goal: Learn Python");
}

#[tokio::test]
async fn calls_run_in_order_and_see_earlier_writes() {
    let registry = registry();
    let created = registry
        .call_function("create_goal", json!({ "title": "Run 5k", "priority": 5 }))
        .await;
    let goal_id = created["goal_id"].as_str().unwrap().to_string();

    let outcomes = registry
        .process_function_calls(&[
            FunctionCall::new(
                "update_goal_title",
                Value::String(json!({ "goal_id": goal_id, "title": "Run 10k" }).to_string()),
            ),
            FunctionCall::new("get_goal_by_id", json!({ "goal_id": goal_id })),
        ])
        .await;

    assert_eq!(outcomes[1].result.as_ref().unwrap()["title"], "Run 10k");
}

#[tokio::test]
async fn missing_required_argument_is_reported_per_call() {
    let registry = registry();
    let result = registry.call_function("create_goal", json!({})).await;
    let message = result["error"].as_str().unwrap();
    assert!(message.starts_with("Error calling create_goal:"), "{message}");
}

#[tokio::test]
async fn guidance_tools_need_no_state() {
    let registry = registry();
    let result = registry
        .call_function(
            "suggest_goal_breakdown",
            json!({ "goal_title": "Learn Spanish" }),
        )
        .await;
    assert!(result.get("error").is_none(), "{result}");
}
