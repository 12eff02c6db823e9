use super::{ExtractionRequest, SpecStrategy};
use crate::{ChartSpec, ExtractionError, ParamValue};
use async_trait::async_trait;
use regex::Regex;

/// Concepts in priority order with the keywords that select them.
const KEYWORDS: &[(&str, &[&str])] = &[
    ("normal_distribution", &["正态", "高斯", "gaussian", "normal"]),
    ("poisson_distribution", &["泊松", "poisson"]),
    ("binomial_distribution", &["二项", "binomial"]),
    ("beta_distribution", &["beta", "贝塔"]),
    ("exponential_distribution", &["指数", "exponential"]),
    ("uniform_distribution", &["均匀", "uniform"]),
    ("matrix_transform", &["矩阵变换", "线性变换", "matrix", "transform"]),
];

/// Deterministic extraction from a fixed keyword table. Works without any
/// completion service.
pub struct KeywordStrategy {
    alpha: Regex,
    beta: Regex,
}

impl KeywordStrategy {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            alpha: Regex::new(r"alpha\s*=\s*(\d+\.?\d*)")?,
            beta: Regex::new(r"beta\s*=\s*(\d+\.?\d*)")?,
        })
    }

    /// The chart spec for the first concept whose keywords occur in the prompt.
    #[must_use]
    pub fn spec_for(&self, prompt: &str) -> Option<ChartSpec> {
        let lowered = prompt.to_lowercase();
        let concept = KEYWORDS
            .iter()
            .find(|(_, words)| words.iter().any(|word| lowered.contains(word)))
            .map(|(concept, _)| *concept)?;

        let spec = match concept {
            "normal_distribution" => ChartSpec::new(concept, "pdf", "plotly", "标准正态分布")
                .with_param("mu", 0.0)
                .with_param("sigma", 1.0),
            "poisson_distribution" => {
                ChartSpec::new(concept, "pmf", "plotly", "泊松分布 PMF").with_param("lambda", 4.0)
            }
            "binomial_distribution" => ChartSpec::new(concept, "pmf", "plotly", "二项分布 PMF")
                .with_param("n", 20.0)
                .with_param("p", 0.4),
            "beta_distribution" => ChartSpec::new(concept, "pdf", "plotly", "Beta 分布 PDF")
                .with_param("alpha", capture(&self.alpha, &lowered).unwrap_or(2.0))
                .with_param("beta", capture(&self.beta, &lowered).unwrap_or(5.0)),
            "exponential_distribution" => {
                ChartSpec::new(concept, "pdf", "plotly", "指数分布 PDF").with_param("lambda", 1.0)
            }
            "uniform_distribution" => ChartSpec::new(concept, "pdf", "plotly", "均匀分布 PDF")
                .with_param("a", 0.0)
                .with_param("b", 1.0),
            _ => ChartSpec::new(concept, "scatter", "plotly", "二维矩阵变换").with_param(
                "A",
                ParamValue::List(vec![
                    ParamValue::List(vec![ParamValue::Number(1.0), ParamValue::Number(0.0)]),
                    ParamValue::List(vec![ParamValue::Number(0.0), ParamValue::Number(1.0)]),
                ]),
            ),
        };
        Some(spec)
    }
}

fn capture(re: &Regex, text: &str) -> Option<f64> {
    re.captures(text)?.get(1)?.as_str().parse().ok()
}

#[async_trait]
impl SpecStrategy for KeywordStrategy {
    fn name(&self) -> &'static str {
        "keyword"
    }

    async fn extract(&self, request: &ExtractionRequest) -> Result<ChartSpec, ExtractionError> {
        self.spec_for(&request.prompt)
            .ok_or(ExtractionError::NoConcept)
    }
}
