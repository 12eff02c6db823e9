use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard, PoisonError},
};

use crate::{LanguageModel, LanguageModelError, LanguageModelInput, LanguageModelResult, ModelResponse};

/// One scripted reply: either a response or an error.
pub enum MockGenerateResult {
    Response(ModelResponse),
    Error(LanguageModelError),
}

impl MockGenerateResult {
    /// A reply made of a single text part.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Response(ModelResponse::from_text(text))
    }

    pub fn error(error: LanguageModelError) -> Self {
        Self::Error(error)
    }
}

impl From<ModelResponse> for MockGenerateResult {
    fn from(response: ModelResponse) -> Self {
        Self::Response(response)
    }
}

impl From<LanguageModelError> for MockGenerateResult {
    fn from(error: LanguageModelError) -> Self {
        Self::Error(error)
    }
}

#[derive(Default)]
struct Script {
    replies: VecDeque<MockGenerateResult>,
    inputs: Vec<LanguageModelInput>,
}

/// Replays scripted replies in order and records every input it receives.
/// Running out of replies is an `Invariant` error.
pub struct MockLanguageModel {
    model_id: String,
    script: Mutex<Script>,
}

impl Default for MockLanguageModel {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLanguageModel {
    pub fn new() -> Self {
        Self {
            model_id: "mock-model".to_string(),
            script: Mutex::new(Script::default()),
        }
    }

    #[must_use]
    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    // A panic inside a test must not hide the inputs recorded before it.
    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn enqueue_generate_results<I>(&self, results: I) -> &Self
    where
        I: IntoIterator<Item = MockGenerateResult>,
    {
        self.script().replies.extend(results);
        self
    }

    pub fn enqueue_generate(&self, result: impl Into<MockGenerateResult>) -> &Self {
        self.script().replies.push_back(result.into());
        self
    }

    /// Every input passed to `generate`, oldest first.
    pub fn tracked_generate_inputs(&self) -> Vec<LanguageModelInput> {
        self.script().inputs.clone()
    }

    pub fn last_input(&self) -> Option<LanguageModelInput> {
        self.script().inputs.last().cloned()
    }

    /// Replies not yet consumed.
    pub fn pending_results(&self) -> usize {
        self.script().replies.len()
    }
}

#[async_trait::async_trait]
impl LanguageModel for MockLanguageModel {
    fn provider(&self) -> &'static str {
        "mock"
    }

    fn model_id(&self) -> String {
        self.model_id.clone()
    }

    async fn generate(&self, input: LanguageModelInput) -> LanguageModelResult<ModelResponse> {
        let reply = {
            let mut script = self.script();
            script.inputs.push(input);
            script.replies.pop_front()
        };

        match reply {
            Some(MockGenerateResult::Response(response)) => Ok(response),
            Some(MockGenerateResult::Error(error)) => Err(error),
            None => Err(LanguageModelError::Invariant(
                "mock",
                "script exhausted: no reply left for this request".into(),
            )),
        }
    }
}
