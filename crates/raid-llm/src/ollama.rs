//! Ollama chat backend

use crate::backend::{LlmBackend, LlmError, LlmResult};
use crate::types::{GenerateOptions, LlmMessage, LlmResponse, Usage};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

pub struct OllamaBackend {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaBackend {
    pub fn new(model: impl Into<String>, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }
}

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: &'a [LlmMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: Option<OllamaMessage>,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: u64,
    #[serde(default)]
    eval_count: u64,
}

#[derive(Deserialize)]
struct OllamaMessage {
    content: String,
}

#[async_trait::async_trait]
impl LlmBackend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        messages: &[LlmMessage],
        options: &GenerateOptions,
    ) -> LlmResult<LlmResponse> {
        let mut opts = serde_json::Map::new();
        if let Some(max) = options.max_tokens {
            opts.insert("num_predict".to_string(), json!(max));
        }
        if let Some(temp) = options.temperature {
            opts.insert("temperature".to_string(), json!(temp));
        }

        let body = OllamaChatRequest {
            model: &self.model,
            messages,
            stream: false,
            options: if opts.is_empty() {
                None
            } else {
                Some(serde_json::Value::Object(opts))
            },
        };

        debug!("ollama request: model={} messages={}", self.model, messages.len());

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(LlmError::RequestFailed(format!("{status}: {error_text}")));
        }

        let parsed: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        Ok(LlmResponse {
            content: parsed.message.map(|m| m.content).unwrap_or_default(),
            finish_reason: parsed.done_reason.unwrap_or_else(|| "stop".to_string()),
            usage: Some(Usage {
                prompt_tokens: parsed.prompt_eval_count,
                completion_tokens: parsed.eval_count,
                total_tokens: parsed.prompt_eval_count + parsed.eval_count,
            }),
            model: self.model.clone(),
        })
    }

    async fn health_check(&self) -> bool {
        self.client
            .get(format!("{}/api/version", self.base_url))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}
