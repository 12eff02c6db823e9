use crate::{AttemptStage, ProgramOutcome, ResolveResponse, VizError};
use opentelemetry::trace::Status;
use std::{error::Error, future::Future, time::Instant};
use tracing::{info_span, Span};
use tracing_futures::Instrument;
use tracing_opentelemetry::OpenTelemetrySpanExt;

#[derive(Clone, Copy)]
pub enum PipelineMethod {
    ResolveOrGenerate,
    GenerateProgram,
}

impl PipelineMethod {
    fn as_str(self) -> &'static str {
        match self {
            Self::ResolveOrGenerate => "resolve_or_generate",
            Self::GenerateProgram => "generate_program",
        }
    }
}

pub struct PipelineSpan {
    span: Span,
    start_time: Instant,
}

impl PipelineSpan {
    pub fn new(method: PipelineMethod, prompt: &str) -> Self {
        let span = match method {
            PipelineMethod::ResolveOrGenerate => info_span!("vizgen.resolve_or_generate"),
            PipelineMethod::GenerateProgram => info_span!("vizgen.generate_program"),
        };
        span.set_attribute("vizgen.method", method.as_str());
        span.set_attribute("vizgen.prompt.chars", to_i64(prompt.chars().count()));

        Self {
            span,
            start_time: Instant::now(),
        }
    }

    pub fn span(&self) -> Span {
        self.span.clone()
    }

    pub fn on_resolve(&mut self, response: &ResolveResponse) {
        self.span
            .set_attribute("vizgen.resolve.kind", response.kind.as_str());
        self.span
            .set_attribute("vizgen.resolve.source", response.source.as_str());
    }

    pub fn on_program(&mut self, outcome: &ProgramOutcome) {
        self.span
            .set_attribute("vizgen.program.domain", outcome.domain.as_str());
        self.span
            .set_attribute("vizgen.program.attempts", to_i64(outcome.attempts.len()));
        self.span
            .set_attribute("vizgen.program.fallback_used", outcome.fallback_used);
    }

    pub fn on_error(&mut self, error: &(dyn Error + 'static)) {
        self.span
            .set_attribute("exception.message", error.to_string());
        self.span.set_status(Status::error(error.to_string()));
    }

    pub fn on_end(&mut self) {
        self.span.set_attribute(
            "vizgen.duration_seconds",
            self.start_time.elapsed().as_secs_f64(),
        );
    }
}

fn to_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

pub async fn trace_resolve<Fut>(prompt: &str, future: Fut) -> Result<ResolveResponse, VizError>
where
    Fut: Future<Output = Result<ResolveResponse, VizError>> + Send,
{
    let mut span = PipelineSpan::new(PipelineMethod::ResolveOrGenerate, prompt);
    let result = future.instrument(span.span()).await;

    match &result {
        Ok(response) => span.on_resolve(response),
        Err(error) => span.on_error(error),
    }

    span.on_end();
    result
}

pub async fn trace_program<Fut>(prompt: &str, future: Fut) -> ProgramOutcome
where
    Fut: Future<Output = ProgramOutcome> + Send,
{
    let mut span = PipelineSpan::new(PipelineMethod::GenerateProgram, prompt);
    let outcome = future.instrument(span.span()).await;
    span.on_program(&outcome);
    span.on_end();
    outcome
}

/// Span covering one pass through generate, safety check, execute and
/// quality check.
pub fn attempt_span(stage: AttemptStage, number: usize) -> Span {
    let span = info_span!("vizgen.attempt", stage = stage.as_str(), number);
    span.set_attribute("vizgen.attempt.stage", stage.as_str());
    span
}

/// Mark an attempt span as failed.
pub fn fail_attempt(span: &Span, error: &(dyn Error + 'static)) {
    span.set_attribute("exception.message", error.to_string());
    span.set_status(Status::error(error.to_string()));
}
