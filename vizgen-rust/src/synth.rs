use crate::{
    gate::{QualityGate, SafetyGate},
    instruction,
    normalize,
    opentelemetry::trace_program,
    program::{self, Figure, Limits},
    Artifact, AttemptError, AttemptRecord, ExecutionError, RepairLoop,
};
use std::sync::Arc;
use viz_completion::{LanguageModel, LanguageModelError, LanguageModelInput};

const LINEAR_ALGEBRA_KEYWORDS: &[&str] = &[
    "行列式",
    "矩阵",
    "向量",
    "线性代数",
    "determinant",
    "matrix",
    "vector",
    "linearalgebra",
];

const DISTRIBUTION_KEYWORDS: &[&str] = &[
    "分布",
    "泊松",
    "poisson",
    "超几何",
    "二项",
    "正态",
    "distribution",
    "binomial",
    "normal",
    "hypergeometric",
];

/// Used in place of a completion when no model is configured.
pub const DETERMINISTIC_PROGRAM: &str = "import numpy as np
import plotly.express as px
x = np.linspace(0, 10, 50)
y = np.sin(x)
fig = px.line(x=x, y=y, title='Fallback Line Chart')
";

/// Subject area of a program request; only selects instruction text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    LinearAlgebra,
    Distribution,
    General,
}

impl Domain {
    #[must_use]
    pub fn classify(prompt: &str) -> Self {
        let prompt = normalize(prompt);
        if LINEAR_ALGEBRA_KEYWORDS.iter().any(|k| prompt.contains(k)) {
            Self::LinearAlgebra
        } else if DISTRIBUTION_KEYWORDS.iter().any(|k| prompt.contains(k)) {
            Self::Distribution
        } else {
            Self::General
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LinearAlgebra => "linear_algebra",
            Self::Distribution => "distribution",
            Self::General => "general",
        }
    }
}

/// Result of the program pipeline. Always carries an artifact.
#[derive(Debug, Clone)]
pub struct ProgramOutcome {
    pub artifact: Artifact,
    pub source: String,
    pub domain: Domain,
    pub attempts: Vec<AttemptRecord>,
    pub fallback_used: bool,
}

/// Turns a request into a figure script, checks it and runs it.
#[derive(Clone)]
pub struct ProgramSynthesizer {
    model: Option<Arc<dyn LanguageModel>>,
    temperature: Option<f64>,
    safety: Arc<SafetyGate>,
    quality: QualityGate,
    limits: Limits,
}

impl ProgramSynthesizer {
    pub fn new(model: Option<Arc<dyn LanguageModel>>) -> Result<Self, regex::Error> {
        Ok(Self {
            model,
            temperature: None,
            safety: Arc::new(SafetyGate::new()?),
            quality: QualityGate::default(),
            limits: Limits::default(),
        })
    }

    #[must_use]
    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    #[must_use]
    pub fn min_points(mut self, min_points: usize) -> Self {
        self.quality = QualityGate::new(min_points);
        self
    }

    #[must_use]
    pub fn limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Generate, check and execute a figure script for `prompt`, repairing
    /// once and then falling back. Never fails.
    pub async fn synthesize_and_execute(&self, prompt: &str) -> ProgramOutcome {
        trace_program(prompt, RepairLoop::new(self, prompt).run()).await
    }

    /// Ask the model for a script; `repair` carries the previous error and
    /// source.
    pub(crate) async fn generate(
        &self,
        domain: Domain,
        prompt: &str,
        repair: Option<(&str, &str)>,
    ) -> Result<String, LanguageModelError> {
        let Some(model) = &self.model else {
            return Ok(DETERMINISTIC_PROGRAM.to_string());
        };
        let user_prompt = match repair {
            Some((error, source)) => instruction::repair_prompt(error, source),
            None => instruction::program_user_prompt(prompt),
        };
        let input = LanguageModelInput::single_turn(
            instruction::program_system_prompt(domain),
            user_prompt,
        )
        .with_temperature(self.temperature);
        let response = model.generate(input).await?;
        Ok(extract_code(&response.text()))
    }

    pub(crate) fn check_safety(&self, source: &str) -> Result<(), AttemptError> {
        Ok(self.safety.check(source)?)
    }

    /// Run the script on the blocking pool; the interpreter's own deadline
    /// bounds the time spent there.
    pub(crate) async fn execute(&self, source: &str) -> Result<Figure, ExecutionError> {
        let source = source.to_string();
        let limits = self.limits;
        tokio::task::spawn_blocking(move || program::execute(&source, limits))
            .await
            .map_err(|err| ExecutionError::Aborted(err.to_string()))?
    }

    pub(crate) fn check_quality(&self, source: &str, figure: &Figure) -> Result<(), AttemptError> {
        Ok(self.quality.check(source, figure)?)
    }
}

/// The first fenced code block of a completion, or the whole text.
#[must_use]
pub fn extract_code(text: &str) -> String {
    let Some(start) = text.find("```") else {
        return text.trim().to_string();
    };
    let after_fence = &text[start + 3..];
    // skip the info string (`python`, `py`, ...)
    let body = match after_fence.find('\n') {
        Some(newline) => &after_fence[newline + 1..],
        None => after_fence,
    };
    let body = body.find("```").map_or(body, |end| &body[..end]);
    body.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_domains() {
        assert_eq!(Domain::classify("计算矩阵的行列式"), Domain::LinearAlgebra);
        assert_eq!(Domain::classify("Linear Algebra basics"), Domain::LinearAlgebra);
        assert_eq!(Domain::classify("泊松分布的概率"), Domain::Distribution);
        assert_eq!(Domain::classify("sine wave"), Domain::General);
    }

    #[test]
    fn extracts_first_fenced_block() {
        let text = "Here you go:\n```python\nimport plotly\nfig = 1\n```\nand\n```\nother\n```";
        assert_eq!(extract_code(text), "import plotly\nfig = 1");
        assert_eq!(extract_code("  fig = 2  "), "fig = 2");
    }
}
