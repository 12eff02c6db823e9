use crate::{
    opentelemetry::{attempt_span, fail_attempt},
    program::{Figure, Trace, TraceKind},
    template::plotly_page,
    Artifact, AttemptError, Domain, ProgramOutcome, ProgramSynthesizer,
};
use serde_json::json;
use tracing::{info, warn, Instrument, Span};

/// Last-resort script; passes both gates.
pub const FALLBACK_PROGRAM: &str = "import numpy as np
import plotly.express as px
x = np.arange(0, 10)
y = x
fig = px.line(x=x, y=y, title='Fallback Chart')
";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptStage {
    Initial,
    Repair,
    Fallback,
}

impl AttemptStage {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Repair => "repair",
            Self::Fallback => "fallback",
        }
    }
}

/// One pass through the pipeline; `error` is `None` when it succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
    pub stage: AttemptStage,
    pub source: String,
    pub error: Option<String>,
}

enum State {
    Generate {
        stage: AttemptStage,
        repair: Option<(String, String)>,
    },
    SafetyCheck {
        stage: AttemptStage,
        source: String,
    },
    Execute {
        stage: AttemptStage,
        source: String,
    },
    QualityCheck {
        stage: AttemptStage,
        source: String,
        figure: Figure,
    },
    Repair {
        source: String,
        error: String,
    },
    Fallback,
    Done {
        source: String,
        figure: Figure,
        fallback_used: bool,
    },
}

/// Drives `Generate -> SafetyCheck -> Execute -> QualityCheck -> Done`.
/// The first failure moves to `Repair`, which regenerates with the error
/// and previous source; a second failure moves to `Fallback`. Only `Done`
/// is terminal.
pub struct RepairLoop<'a> {
    synth: &'a ProgramSynthesizer,
    prompt: &'a str,
    domain: Domain,
    attempts: Vec<AttemptRecord>,
    span: Span,
}

impl<'a> RepairLoop<'a> {
    #[must_use]
    pub fn new(synth: &'a ProgramSynthesizer, prompt: &'a str) -> Self {
        Self {
            synth,
            prompt,
            domain: Domain::classify(prompt),
            attempts: Vec::new(),
            span: Span::none(),
        }
    }

    pub async fn run(mut self) -> ProgramOutcome {
        let mut state = State::Generate {
            stage: AttemptStage::Initial,
            repair: None,
        };
        loop {
            state = match state {
                State::Done {
                    source,
                    figure,
                    fallback_used,
                } => return self.finish(source, &figure, fallback_used),
                state => self.step(state).await,
            };
        }
    }

    async fn step(&mut self, state: State) -> State {
        match state {
            State::Generate { stage, repair } => {
                self.span = attempt_span(stage, self.attempts.len() + 1);
                let repair = repair.as_ref().map(|(e, s)| (e.as_str(), s.as_str()));
                let generated = self
                    .synth
                    .generate(self.domain, self.prompt, repair)
                    .instrument(self.span.clone())
                    .await;
                match generated {
                    Ok(source) => State::SafetyCheck { stage, source },
                    Err(err) => self.fail(stage, String::new(), &err.into()),
                }
            }
            State::SafetyCheck { stage, source } => match self.synth.check_safety(&source) {
                Ok(()) => State::Execute { stage, source },
                Err(err) => self.fail(stage, source, &err),
            },
            State::Execute { stage, source } => {
                let executed = self
                    .synth
                    .execute(&source)
                    .instrument(self.span.clone())
                    .await;
                match executed {
                    Ok(figure) => State::QualityCheck {
                        stage,
                        source,
                        figure,
                    },
                    Err(err) => self.fail(stage, source, &err.into()),
                }
            }
            State::QualityCheck {
                stage,
                source,
                figure,
            } => match self.synth.check_quality(&source, &figure) {
                Ok(()) => {
                    self.record(stage, &source, None);
                    State::Done {
                        source,
                        figure,
                        fallback_used: false,
                    }
                }
                Err(err) => self.fail(stage, source, &err),
            },
            State::Repair { source, error } => State::Generate {
                stage: AttemptStage::Repair,
                repair: Some((error, source)),
            },
            State::Fallback => self.fallback().await,
            done @ State::Done { .. } => done,
        }
    }

    fn fail(&mut self, stage: AttemptStage, source: String, err: &AttemptError) -> State {
        fail_attempt(&self.span, err);
        warn!(parent: &self.span, stage = stage.as_str(), error = %err, "program attempt failed");
        let error = err.to_string();
        self.record(stage, &source, Some(error.clone()));
        match stage {
            AttemptStage::Initial => State::Repair { source, error },
            AttemptStage::Repair | AttemptStage::Fallback => State::Fallback,
        }
    }

    fn record(&mut self, stage: AttemptStage, source: &str, error: Option<String>) {
        self.attempts.push(AttemptRecord {
            stage,
            source: source.to_string(),
            error,
        });
    }

    async fn fallback(&mut self) -> State {
        self.span = attempt_span(AttemptStage::Fallback, self.attempts.len() + 1);
        let source = FALLBACK_PROGRAM.to_string();
        let figure = match self
            .synth
            .execute(&source)
            .instrument(self.span.clone())
            .await
        {
            Ok(figure) => {
                if let Err(err) = self.synth.check_quality(&source, &figure) {
                    warn!(parent: &self.span, error = %err, "fallback figure below quality bar");
                }
                self.record(AttemptStage::Fallback, &source, None);
                figure
            }
            Err(err) => {
                let err = AttemptError::from(err);
                fail_attempt(&self.span, &err);
                warn!(parent: &self.span, error = %err, "fallback program failed, drawing it directly");
                self.record(AttemptStage::Fallback, &source, Some(err.to_string()));
                fallback_figure()
            }
        };
        State::Done {
            source,
            figure,
            fallback_used: true,
        }
    }

    fn finish(self, source: String, figure: &Figure, fallback_used: bool) -> ProgramOutcome {
        let title = figure.title().unwrap_or(self.prompt);
        let artifact = Artifact::new(plotly_page(title, figure), self.prompt);
        info!(
            domain = self.domain.as_str(),
            attempts = self.attempts.len(),
            fallback_used,
            "program pipeline finished"
        );
        ProgramOutcome {
            artifact,
            source,
            domain: self.domain,
            attempts: self.attempts,
            fallback_used,
        }
    }
}

/// What [`FALLBACK_PROGRAM`] draws, built without the interpreter.
fn fallback_figure() -> Figure {
    let x: Vec<f64> = (0..10).map(f64::from).collect();
    Figure::new()
        .with_trace(Trace::xy(TraceKind::Scatter, x.clone(), x).mode("lines"))
        .with_layout("title", json!("Fallback Chart"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::{execute, Limits};

    #[test]
    fn fallback_program_passes_both_gates() {
        let figure = execute(FALLBACK_PROGRAM, Limits::default()).unwrap();
        crate::gate::SafetyGate::new()
            .unwrap()
            .check(FALLBACK_PROGRAM)
            .unwrap();
        crate::gate::QualityGate::default()
            .check(FALLBACK_PROGRAM, &figure)
            .unwrap();
        assert_eq!(figure, fallback_figure());
    }
}
