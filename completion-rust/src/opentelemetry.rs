use crate::{LanguageModelInput, LanguageModelResult, ModelResponse};
use opentelemetry::trace::Status;
use std::{future::Future, time::Instant};
use tracing::info_span;
use tracing_futures::Instrument;
use tracing_opentelemetry::OpenTelemetrySpanExt;

/// Run one completion request inside a `viz_completion.generate` span that
/// carries the `gen_ai.*` request and usage attributes.
pub async fn trace_generate<F, Fut>(
    provider: &str,
    model_id: &str,
    input: LanguageModelInput,
    request: F,
) -> LanguageModelResult<ModelResponse>
where
    F: FnOnce(LanguageModelInput) -> Fut,
    Fut: Future<Output = LanguageModelResult<ModelResponse>>,
{
    let span = info_span!("viz_completion.generate", provider, model = model_id);
    span.set_attribute("gen_ai.operation.name", "chat");
    span.set_attribute("gen_ai.provider.name", provider.to_string());
    span.set_attribute("gen_ai.request.model", model_id.to_string());
    if let Some(temperature) = input.temperature {
        span.set_attribute("gen_ai.request.temperature", temperature);
    }
    if let Some(max_tokens) = input.max_tokens {
        span.set_attribute("gen_ai.request.max_tokens", i64::from(max_tokens));
    }

    let started = Instant::now();
    let result = request(input).instrument(span.clone()).await;

    match &result {
        Ok(ModelResponse {
            usage: Some(usage), ..
        }) => {
            span.set_attribute("gen_ai.usage.input_tokens", i64::from(usage.input_tokens));
            span.set_attribute("gen_ai.usage.output_tokens", i64::from(usage.output_tokens));
        }
        Ok(_) => {}
        Err(error) => {
            span.set_attribute("exception.message", error.to_string());
            span.set_status(Status::error(error.to_string()));
            tracing::warn!(parent: &span, error = %error, "completion request failed");
        }
    }
    span.set_attribute(
        "viz_completion.duration_seconds",
        started.elapsed().as_secs_f64(),
    );

    result
}
