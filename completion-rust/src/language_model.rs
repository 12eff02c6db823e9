use crate::{LanguageModelInput, LanguageModelResult, ModelResponse};

/// A completion service that turns instructions and messages into a model
/// response. Implementations must be shareable across request tasks.
#[async_trait::async_trait]
pub trait LanguageModel: Send + Sync {
    fn provider(&self) -> &'static str;
    fn model_id(&self) -> String;
    async fn generate(&self, input: LanguageModelInput) -> LanguageModelResult<ModelResponse>;
}
