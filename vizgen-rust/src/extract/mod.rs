//! Turn a free-text request into a [`ChartSpec`].

mod chain;
mod completion;
mod keyword;

pub use chain::StrategyChain;
pub use completion::{parse_spec, CompletionStrategy};
pub use keyword::KeywordStrategy;

use crate::{ChartSpec, ExtractionError};
use async_trait::async_trait;

/// What the caller asked for. `viz_type` and `complexity` are optional hints
/// that only the completion strategy uses.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExtractionRequest {
    pub prompt: String,
    pub viz_type: Option<String>,
    pub complexity: Option<String>,
}

impl ExtractionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }
}

#[async_trait]
pub trait SpecStrategy: Send + Sync {
    /// Short name used in logs and in exhausted-chain errors.
    fn name(&self) -> &'static str;

    async fn extract(&self, request: &ExtractionRequest) -> Result<ChartSpec, ExtractionError>;
}
