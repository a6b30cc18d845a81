//! Backend factory keyed by provider name

use crate::backend::LlmBackend;
use crate::ollama::OllamaBackend;
use crate::openai::OpenAiBackend;
use raid_core::{Error, LlmBackendConfig, Result};
use std::sync::Arc;

/// Construct a backend from configuration.
///
/// Profile `llm_config` maps merge over the process-level config before this
/// is called, so the factory only sees resolved values.
pub fn create_backend(config: &LlmBackendConfig) -> Result<Arc<dyn LlmBackend>> {
    match config.provider.as_str() {
        "openai" => {
            let api_key = config
                .api_key
                .as_deref()
                .ok_or_else(|| Error::config("OpenAI API key is required"))?;
            let mut backend = OpenAiBackend::new(&config.model, api_key)
                .with_defaults(config.max_tokens, config.temperature);
            if let Some(url) = &config.base_url {
                backend = backend.with_base_url(url);
            }
            Ok(Arc::new(backend))
        }
        "ollama" => {
            let base_url = config
                .base_url
                .as_deref()
                .ok_or_else(|| Error::config("Ollama base URL is required"))?;
            Ok(Arc::new(OllamaBackend::new(&config.model, base_url)))
        }
        other => Err(Error::config(format!("unsupported LLM provider: {other}"))),
    }
}
