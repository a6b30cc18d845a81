//! Worker engine tests: tool loop, strict parsing, collaboration handling

use raid_core::{ResultStatus, TaskMessage};
use raid_engine::worker::{handle_collab_message, CollabContext};
use raid_engine::*;
use raid_fabric::{Broker, CollabMessage, InMemoryBroker};
use raid_tools::create_registry_for;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

fn engine_with(responses: Vec<&str>, max_steps: u32) -> WorkerEngine {
    let backend = Arc::new(ScriptedBackend::new(responses));
    let tools = Arc::new(create_registry_for(
        &["calculator".to_string()],
        std::env::temp_dir(),
    ));
    WorkerEngine::new(backend, tools, "calc-worker", "You are a calculator agent.", max_steps)
}

fn task(prompt: &str) -> TaskMessage {
    TaskMessage::new("calculator_agent", prompt, vec!["calculator".to_string()], Default::default())
}

// ===========================================================================
// Tool loop
// ===========================================================================

#[tokio::test]
async fn tool_then_final_answer() {
    let engine = engine_with(
        vec![
            r#"{"thought": "compute it", "action": {"tool": "calculator", "parameters": {"expression": "85 * 0.15"}}}"#,
            r#"{"thought": "done", "final_answer": "15% of 85 is 12.75"}"#,
        ],
        20,
    );

    let t = task("Compute 15% of 85");
    let result = engine.process_task(&t).await;

    assert_eq!(result.status, ResultStatus::Success);
    assert!(result.result.as_deref().unwrap().contains("12.75"));
    assert_eq!(result.task_id, t.task_id);
    assert_eq!(result.correlation_id, t.correlation_id);
}

#[tokio::test]
async fn immediate_final_answer() {
    let engine = engine_with(
        vec![r#"{"thought": "trivial", "final_answer": "4"}"#],
        20,
    );
    let result = engine.process_task(&task("what is 2+2")).await;
    assert_eq!(result.status, ResultStatus::Success);
    assert_eq!(result.result.as_deref(), Some("4"));
}

#[tokio::test]
async fn missing_tool_becomes_observation_and_loop_recovers() {
    let engine = engine_with(
        vec![
            r#"{"thought": "try it", "action": {"tool": "crystal_ball", "parameters": {}}}"#,
            r#"{"thought": "no such tool, answering directly", "final_answer": "done anyway"}"#,
        ],
        20,
    );
    let result = engine.process_task(&task("gaze")).await;
    assert_eq!(result.status, ResultStatus::Success);
}

#[tokio::test]
async fn max_steps_yields_error_result() {
    let step = r#"{"thought": "loop", "action": {"tool": "calculator", "parameters": {"expression": "1+1"}}}"#;
    let engine = engine_with(vec![step, step, step], 3);

    let t = task("never finish");
    let result = engine.process_task(&t).await;
    assert_eq!(result.status, ResultStatus::Error);
    assert!(result.error.as_deref().unwrap().contains("max steps (3)"));
    assert_eq!(result.correlation_id, t.correlation_id);
}

// ===========================================================================
// Strict parse flavour
// ===========================================================================

#[tokio::test]
async fn unparseable_response_is_error_observation_not_conclusion() {
    // A direct-answer-looking reply must NOT be salvaged in the worker:
    // the strict flavour records an error and keeps going.
    let engine = engine_with(
        vec![
            "The tip is $12.75.",
            r#"{"thought": "retrying with the format", "final_answer": "12.75"}"#,
        ],
        20,
    );
    let result = engine.process_task(&task("compute the tip")).await;
    assert_eq!(result.status, ResultStatus::Success);
    assert_eq!(result.result.as_deref(), Some("12.75"));

    // Two model calls were needed: the garbage one and the recovery
}

#[tokio::test]
async fn persistent_garbage_exhausts_steps() {
    let engine = engine_with(vec!["nope", "still nope"], 2);
    let result = engine.process_task(&task("x")).await;
    assert_eq!(result.status, ResultStatus::Error);
}

#[tokio::test]
async fn model_failure_on_first_step_is_error_result() {
    let engine = engine_with(vec![], 5);
    let result = engine.process_task(&task("x")).await;
    assert_eq!(result.status, ResultStatus::Error);
    assert!(result
        .error
        .as_deref()
        .unwrap()
        .contains("model invocation failed"));
}

// ===========================================================================
// Collaboration context
// ===========================================================================

#[tokio::test]
async fn data_share_is_stored_under_sender_key() {
    let context = CollabContext::default();
    let broker = InMemoryBroker::new();

    let mut data = HashMap::new();
    data.insert("totals".to_string(), serde_json::json!("905.5"));
    let msg = CollabMessage::data_share("analyst", "g-1", data, None);

    handle_collab_message("me", "g-1", &context, &broker, msg).await;

    assert_eq!(
        context.get("analyst_totals").await,
        Some(serde_json::json!("905.5"))
    );
    let rendered = context.render().await;
    assert!(rendered.contains("analyst_totals"));
}

#[tokio::test]
async fn status_update_is_stored() {
    let context = CollabContext::default();
    let broker = InMemoryBroker::new();
    let msg = CollabMessage::status_update("analyst", "g-1", "halfway there");

    handle_collab_message("me", "g-1", &context, &broker, msg).await;
    assert_eq!(
        context.get("analyst_status").await,
        Some(serde_json::json!("halfway there"))
    );
}

#[tokio::test]
async fn validation_request_is_acknowledged_with_data_share() {
    let context = CollabContext::default();
    let broker = InMemoryBroker::new();
    let mut sub = broker.subscribe("collab:g-1").await.unwrap();

    let mut msg = CollabMessage::status_update("requester", "g-1", "please review");
    msg.message_type = raid_fabric::CollabMessageType::Validation;

    handle_collab_message("me", "g-1", &context, &broker, msg).await;

    let payload = tokio::time::timeout(Duration::from_secs(1), sub.recv())
        .await
        .unwrap()
        .unwrap();
    let reply: CollabMessage = serde_json::from_str(&payload).unwrap();
    assert_eq!(reply.sender, "me");
    assert_eq!(reply.target.as_deref(), Some("requester"));
    let data = reply.data.unwrap();
    assert_eq!(data.get("validation_status"), Some(&serde_json::json!("reviewed")));
    assert_eq!(data.get("validation_agent"), Some(&serde_json::json!("me")));
}

#[tokio::test]
async fn calculation_request_answered_from_local_context() {
    let context = CollabContext::default();
    context
        .store("last_calculation".to_string(), serde_json::json!("Result: 42"))
        .await;

    let broker = InMemoryBroker::new();
    let mut sub = broker.subscribe("collab:g-1").await.unwrap();

    let msg = CollabMessage::request_data("requester", "g-1", "me", "send me your calculation");
    handle_collab_message("me", "g-1", &context, &broker, msg).await;

    let payload = tokio::time::timeout(Duration::from_secs(1), sub.recv())
        .await
        .unwrap()
        .unwrap();
    let reply: CollabMessage = serde_json::from_str(&payload).unwrap();
    let data = reply.data.unwrap();
    assert_eq!(
        data.get("calculation_result"),
        Some(&serde_json::json!("Result: 42"))
    );
}

#[tokio::test]
async fn calculation_request_without_data_is_silent() {
    let context = CollabContext::default();
    let broker = InMemoryBroker::new();
    let mut sub = broker.subscribe("collab:g-1").await.unwrap();

    let msg = CollabMessage::request_data("requester", "g-1", "me", "send me your calculation");
    handle_collab_message("me", "g-1", &context, &broker, msg).await;

    let got = tokio::time::timeout(Duration::from_millis(100), sub.recv()).await;
    assert!(got.is_err(), "no reply expected without stored data");
}

#[tokio::test]
async fn calculator_result_feeds_collab_context() {
    let backend = Arc::new(ScriptedBackend::new(vec![
        r#"{"thought": "compute", "action": {"tool": "calculator", "parameters": {"expression": "6 * 7"}}}"#,
        r#"{"thought": "done", "final_answer": "42"}"#,
    ]));
    let tools = Arc::new(create_registry_for(
        &["calculator".to_string()],
        std::env::temp_dir(),
    ));
    let context = Arc::new(CollabContext::default());
    let engine = WorkerEngine::new(backend, tools, "calc", "prompt", 20)
        .with_collab(context.clone());

    engine.process_task(&task("6 times 7")).await;

    let stored = context.get("last_calculation").await.unwrap();
    assert!(stored.as_str().unwrap().contains("42"));
}

// ===========================================================================
// System prompt assembly
// ===========================================================================

#[tokio::test]
async fn transcript_system_prompt_names_tools_and_format() {
    let backend = Arc::new(ScriptedBackend::new(vec![
        r#"{"thought": "t", "final_answer": "done"}"#,
    ]));
    let scripted = backend.clone();
    let tools = Arc::new(create_registry_for(
        &["calculator".to_string()],
        std::env::temp_dir(),
    ));
    let engine = WorkerEngine::new(backend, tools, "w", "Base worker prompt.", 20);

    engine.process_task(&task("anything")).await;

    let transcripts = scripted.transcripts();
    let system = &transcripts[0][0];
    assert_eq!(system.role, "system");
    assert!(system.content.starts_with("Base worker prompt."));
    assert!(system.content.contains("- calculator:"));
    assert!(system.content.contains("final_answer"));
    // Task prompt is the first user message
    assert_eq!(transcripts[0][1].role, "user");
    assert_eq!(transcripts[0][1].content, "anything");
}
