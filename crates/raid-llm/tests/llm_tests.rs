//! Tests for raid-llm: message constructors, factory wiring, request shapes

use raid_core::LlmBackendConfig;
use raid_llm::*;

#[test]
fn message_constructors_set_roles() {
    assert_eq!(LlmMessage::system("s").role, "system");
    assert_eq!(LlmMessage::user("u").role, "user");
    assert_eq!(LlmMessage::assistant("a").role, "assistant");
}

#[test]
fn message_serializes_flat() {
    let msg = LlmMessage::user("hello");
    let json = serde_json::to_value(&msg).unwrap();
    assert_eq!(json["role"], "user");
    assert_eq!(json["content"], "hello");
}

#[test]
fn factory_openai_requires_api_key() {
    let config = LlmBackendConfig {
        provider: "openai".to_string(),
        api_key: None,
        ..Default::default()
    };
    assert!(create_backend(&config).is_err());
}

#[test]
fn factory_ollama_requires_base_url() {
    let config = LlmBackendConfig {
        provider: "ollama".to_string(),
        base_url: None,
        ..Default::default()
    };
    assert!(create_backend(&config).is_err());
}

#[test]
fn factory_rejects_unknown_provider() {
    let config = LlmBackendConfig {
        provider: "carrier-pigeon".to_string(),
        ..Default::default()
    };
    assert!(create_backend(&config).is_err());
}

#[test]
fn factory_builds_configured_backends() {
    let openai = create_backend(&LlmBackendConfig {
        provider: "openai".to_string(),
        api_key: Some("sk-test".to_string()),
        model: "gpt-4o".to_string(),
        ..Default::default()
    })
    .unwrap();
    assert_eq!(openai.name(), "openai");
    assert_eq!(openai.model(), "gpt-4o");

    let ollama = create_backend(&LlmBackendConfig {
        provider: "ollama".to_string(),
        base_url: Some("http://localhost:11434".to_string()),
        model: "qwen3:30b".to_string(),
        ..Default::default()
    })
    .unwrap();
    assert_eq!(ollama.name(), "ollama");
    assert_eq!(ollama.model(), "qwen3:30b");
}

#[tokio::test]
async fn health_check_false_when_unreachable() {
    // Nothing listens on this port
    let backend = OllamaBackend::new("qwen3:30b", "http://127.0.0.1:59999");
    assert!(!backend.health_check().await);
}

#[test]
fn usage_roundtrip() {
    let usage = Usage {
        prompt_tokens: 10,
        completion_tokens: 5,
        total_tokens: 15,
    };
    let json = serde_json::to_string(&usage).unwrap();
    let back: Usage = serde_json::from_str(&json).unwrap();
    assert_eq!(usage, back);
}
