//! Scripted model backend for deterministic tests

use raid_llm::{GenerateOptions, LlmBackend, LlmError, LlmMessage, LlmResponse, LlmResult, Usage};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Replays a fixed sequence of responses and records every transcript it was
/// asked to complete.
pub struct ScriptedBackend {
    responses: Mutex<VecDeque<String>>,
    transcripts: Mutex<Vec<Vec<LlmMessage>>>,
    healthy: bool,
}

impl ScriptedBackend {
    pub fn new(responses: Vec<&str>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(String::from).collect()),
            transcripts: Mutex::new(Vec::new()),
            healthy: true,
        }
    }

    pub fn unhealthy() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            transcripts: Mutex::new(Vec::new()),
            healthy: false,
        }
    }

    /// Transcripts seen so far, in call order.
    pub fn transcripts(&self) -> Vec<Vec<LlmMessage>> {
        self.transcripts.lock().expect("transcripts").clone()
    }

    pub fn calls(&self) -> usize {
        self.transcripts.lock().expect("transcripts").len()
    }
}

#[async_trait::async_trait]
impl LlmBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-test-model"
    }

    async fn generate(
        &self,
        messages: &[LlmMessage],
        _options: &GenerateOptions,
    ) -> LlmResult<LlmResponse> {
        self.transcripts
            .lock()
            .expect("transcripts")
            .push(messages.to_vec());

        let next = self.responses.lock().expect("responses").pop_front();
        match next {
            Some(content) => Ok(LlmResponse {
                content,
                finish_reason: "stop".to_string(),
                usage: Some(Usage {
                    prompt_tokens: 10,
                    completion_tokens: 10,
                    total_tokens: 20,
                }),
                model: "scripted-test-model".to_string(),
            }),
            None => Err(LlmError::RequestFailed(
                "scripted backend exhausted".to_string(),
            )),
        }
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }
}
