use super::{ExtractionRequest, SpecStrategy};
use crate::{ChartSpec, ExtractionError};
use async_trait::async_trait;
use std::sync::Arc;

/// Strategies tried in order; the first success wins.
#[derive(Clone, Default)]
pub struct StrategyChain {
    strategies: Vec<Arc<dyn SpecStrategy>>,
}

impl StrategyChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn then(mut self, strategy: impl SpecStrategy + 'static) -> Self {
        self.strategies.push(Arc::new(strategy));
        self
    }

    #[must_use]
    pub fn then_arc(mut self, strategy: Arc<dyn SpecStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }
}

#[async_trait]
impl SpecStrategy for StrategyChain {
    fn name(&self) -> &'static str {
        "chain"
    }

    async fn extract(&self, request: &ExtractionRequest) -> Result<ChartSpec, ExtractionError> {
        let mut reasons = Vec::with_capacity(self.strategies.len());

        for strategy in &self.strategies {
            match strategy.extract(request).await {
                Ok(spec) => {
                    tracing::debug!(strategy = strategy.name(), concept = %spec.concept, "spec extracted");
                    return Ok(spec);
                }
                Err(err) => {
                    tracing::warn!(strategy = strategy.name(), error = %err, "extraction strategy failed");
                    reasons.push(format!("{}: {err}", strategy.name()));
                }
            }
        }

        Err(ExtractionError::Exhausted(reasons))
    }
}
