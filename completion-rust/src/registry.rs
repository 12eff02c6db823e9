use crate::{
    openai::{OpenAIChatModel, OpenAIChatModelOptions},
    LanguageModel, LanguageModelError, LanguageModelResult,
};
use std::{env, sync::Arc};

const DEFAULT_MODEL_ID: &str = "gpt-4o";

/// Credentials and model selection for the completion service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionSettings {
    pub api_key: Option<String>,
    pub model_id: Option<String>,
    pub base_url: Option<String>,
}

impl CompletionSettings {
    /// Read `OPENAI_API_KEY`, `OPENAI_MODEL` and `OPENAI_BASE_URL`.
    /// Blank values are treated as unset.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            api_key: non_blank_var("OPENAI_API_KEY"),
            model_id: non_blank_var("OPENAI_MODEL"),
            base_url: non_blank_var("OPENAI_BASE_URL"),
        }
    }

    #[must_use]
    pub fn model_id(&self) -> &str {
        self.model_id.as_deref().unwrap_or(DEFAULT_MODEL_ID)
    }
}

fn non_blank_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Store the configured language models and hand out the one matching the
/// selected model ID.
pub struct LanguageModelRegistry {
    language_models: Vec<Arc<dyn LanguageModel>>,
    default_model_id: String,
}

impl LanguageModelRegistry {
    /// Build the registry from settings. Without an API key the registry is
    /// empty and callers fall back to their deterministic strategies.
    #[must_use]
    pub fn new(settings: &CompletionSettings) -> Self {
        let mut language_models: Vec<Arc<dyn LanguageModel>> = Vec::new();

        if let Some(api_key) = &settings.api_key {
            language_models.push(Arc::new(OpenAIChatModel::new(
                settings.model_id(),
                OpenAIChatModelOptions {
                    api_key: api_key.clone(),
                    base_url: settings.base_url.clone(),
                    client: None,
                },
            )));
        }

        Self {
            language_models,
            default_model_id: settings.model_id().to_string(),
        }
    }

    pub fn get_model(&self, model_id: &str) -> Option<Arc<dyn LanguageModel>> {
        self.language_models
            .iter()
            .find(|model| model.model_id() == model_id)
            .cloned()
    }

    /// The model selected by the settings, or `MissingCredentials` when no
    /// key was configured.
    pub fn default_model(&self) -> LanguageModelResult<Arc<dyn LanguageModel>> {
        self.get_model(&self.default_model_id)
            .ok_or(LanguageModelError::MissingCredentials("OPENAI_API_KEY"))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.language_models.is_empty()
    }
}
