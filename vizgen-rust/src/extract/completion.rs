use super::{ExtractionRequest, SpecStrategy};
use crate::{instruction, ChartSpec, ExtractionError};
use async_trait::async_trait;
use std::sync::Arc;
use viz_completion::{LanguageModel, LanguageModelInput};

/// Extraction through the completion service with a few-shot instruction.
pub struct CompletionStrategy {
    model: Arc<dyn LanguageModel>,
    temperature: Option<f64>,
}

impl CompletionStrategy {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self {
            model,
            temperature: None,
        }
    }

    #[must_use]
    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

#[async_trait]
impl SpecStrategy for CompletionStrategy {
    fn name(&self) -> &'static str {
        "completion"
    }

    async fn extract(&self, request: &ExtractionRequest) -> Result<ChartSpec, ExtractionError> {
        let input = LanguageModelInput::single_turn(
            instruction::SPEC_SYSTEM_PROMPT,
            instruction::spec_user_prompt(request),
        )
        .with_temperature(self.temperature);

        let response = self.model.generate(input).await?;
        parse_spec(&response.text())
    }
}

/// Parse completion output as a spec. When the whole text is not JSON, the
/// span from the first `{` to the last `}` is tried instead.
pub fn parse_spec(text: &str) -> Result<ChartSpec, ExtractionError> {
    let text = text.trim();
    let first_error = match serde_json::from_str::<ChartSpec>(text) {
        Ok(spec) => return Ok(spec),
        Err(err) => err,
    };

    let block = text
        .find('{')
        .zip(text.rfind('}'))
        .filter(|(start, end)| start < end)
        .map(|(start, end)| &text[start..=end]);

    match block {
        Some(block) => serde_json::from_str(block)
            .map_err(|err| ExtractionError::Malformed(err.to_string())),
        None => Err(ExtractionError::Malformed(first_error.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ParamValue;

    #[test]
    fn parses_bare_json() {
        let spec = parse_spec(
            r#"{"concept":"poisson_distribution","chart_type":"pmf","library":"plotly","params":{"lambda":4},"title":"泊松分布 PMF"}"#,
        )
        .unwrap();
        assert_eq!(spec.concept, "poisson_distribution");
        assert_eq!(spec.params["lambda"], ParamValue::Number(4.0));
    }

    #[test]
    fn recovers_json_wrapped_in_prose() {
        let spec = parse_spec(
            "Sure!\n```json\n{\"concept\":\"matrix_transform\",\"chart_type\":\"scatter\",\"library\":\"plotly\",\"params\":{\"A\":[[2,0],[0,1]]},\"title\":\"t\"}\n```",
        )
        .unwrap();
        assert_eq!(spec.concept, "matrix_transform");
    }

    #[test]
    fn missing_fields_are_malformed() {
        let err = parse_spec(r#"{"concept":"x","chart_type":"pdf"}"#).unwrap_err();
        assert!(matches!(err, ExtractionError::Malformed(_)));
        let err = parse_spec("no json here").unwrap_err();
        assert!(matches!(err, ExtractionError::Malformed(_)));
    }
}
