//! Tests for raid-core: wire messages, status serde, config defaults

use raid_core::*;

// ===========================================================================
// TaskMessage
// ===========================================================================

#[test]
fn task_message_mints_fresh_ids() {
    let a = TaskMessage::new("calculator_agent", "2+2", vec![], Default::default());
    let b = TaskMessage::new("calculator_agent", "2+2", vec![], Default::default());
    assert_ne!(a.task_id, b.task_id);
    assert_ne!(a.correlation_id, b.correlation_id);
    assert_ne!(a.task_id, a.correlation_id);
}

#[test]
fn task_message_roundtrip() {
    let mut options = serde_json::Map::new();
    options.insert("model".into(), serde_json::json!("gpt-4o"));
    options.insert("temperature".into(), serde_json::json!(0.3));

    let task = TaskMessage::new(
        "calculator_agent",
        "Compute 15% of 85",
        vec!["calculator".to_string()],
        options,
    );
    let json = serde_json::to_string(&task).unwrap();
    let back: TaskMessage = serde_json::from_str(&json).unwrap();
    assert_eq!(task, back);
}

#[test]
fn task_message_wire_fields() {
    let task = TaskMessage::new("p", "do it", vec!["calculator".into()], Default::default());
    let value: serde_json::Value = serde_json::to_value(&task).unwrap();
    for field in [
        "task_id",
        "correlation_id",
        "profile",
        "prompt",
        "tools",
        "model_options",
        "created_at",
    ] {
        assert!(value.get(field).is_some(), "missing wire field {field}");
    }
    // RFC-3339 timestamp
    let ts = value["created_at"].as_str().unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(ts).is_ok());
}

// ===========================================================================
// ResultMessage
// ===========================================================================

#[test]
fn result_status_serializes_lowercase() {
    assert_eq!(
        serde_json::to_string(&ResultStatus::Success).unwrap(),
        r#""success""#
    );
    assert_eq!(
        serde_json::to_string(&ResultStatus::Error).unwrap(),
        r#""error""#
    );
    assert_eq!(
        serde_json::to_string(&ResultStatus::Timeout).unwrap(),
        r#""timeout""#
    );
}

#[test]
fn result_message_roundtrip() {
    let mut usage = std::collections::HashMap::new();
    usage.insert("prompt_tokens".to_string(), 120u64);
    usage.insert("completion_tokens".to_string(), 45u64);

    let result = ResultMessage::success("t-1", "c-1", "12.75", Some(usage));
    let json = serde_json::to_string(&result).unwrap();
    let back: ResultMessage = serde_json::from_str(&json).unwrap();
    assert_eq!(result, back);
}

#[test]
fn result_message_error_omits_result_field() {
    let result = ResultMessage::error("t-1", "c-1", "boom");
    let value = serde_json::to_value(&result).unwrap();
    assert!(value.get("result").is_none());
    assert_eq!(value["error"], "boom");
    assert_eq!(value["status"], "error");
}

#[test]
fn result_message_timeout_carries_reason() {
    let result = ResultMessage::timeout("t-1", "c-1", 30);
    assert_eq!(result.status, ResultStatus::Timeout);
    assert!(result.error.as_deref().unwrap().contains("30 seconds"));
    assert_eq!(result.correlation_id, "c-1");
}

// ===========================================================================
// Config
// ===========================================================================

#[test]
fn broker_config_url() {
    let config = BrokerConfig::default();
    assert_eq!(config.url(), "redis://localhost:6379/0");

    let with_password = BrokerConfig {
        password: Some("hunter2".to_string()),
        ..Default::default()
    };
    assert_eq!(with_password.url(), "redis://:hunter2@localhost:6379/0");
}

#[test]
fn llm_config_defaults() {
    let config = LlmBackendConfig::default();
    assert_eq!(config.provider, "openai");
    assert_eq!(config.max_tokens, 1000);
}

// ===========================================================================
// Error display
// ===========================================================================

#[test]
fn capacity_error_names_count_and_limit() {
    let err = Error::CapacityExceeded {
        current: 5,
        limit: 5,
    };
    let text = err.to_string();
    assert!(text.contains('5'));
    assert!(text.contains("capacity"));
}
