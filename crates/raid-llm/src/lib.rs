//! Raid LLM - model backend abstraction and implementations

pub mod backend;
pub mod factory;
pub mod ollama;
pub mod openai;
pub mod types;

pub use backend::{LlmBackend, LlmError, LlmResult};
pub use factory::create_backend;
pub use ollama::OllamaBackend;
pub use openai::OpenAiBackend;
pub use types::{GenerateOptions, LlmMessage, LlmResponse, Usage};
