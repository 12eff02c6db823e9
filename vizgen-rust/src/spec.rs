use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, str::FromStr};

/// A parameter value of a chart spec: a number or a (possibly nested) list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Number(f64),
    List(Vec<ParamValue>),
}

impl ParamValue {
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::List(_) => None,
        }
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

/// Structured description of what to render, as produced by an extraction
/// strategy. All five fields are required on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    pub concept: String,
    pub chart_type: String,
    pub library: String,
    pub params: BTreeMap<String, ParamValue>,
    pub title: String,
}

impl ChartSpec {
    pub fn new(
        concept: impl Into<String>,
        chart_type: impl Into<String>,
        library: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            concept: concept.into(),
            chart_type: chart_type.into(),
            library: library.into(),
            params: BTreeMap::new(),
            title: title.into(),
        }
    }

    #[must_use]
    pub fn with_param(mut self, name: &str, value: impl Into<ParamValue>) -> Self {
        self.params.insert(name.to_string(), value.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Pdf,
    Pmf,
    Cdf,
    Hist,
    Line,
    Scatter,
    Bar,
    Surface3d,
}

impl ChartType {
    pub const ALL: [Self; 8] = [
        Self::Pdf,
        Self::Pmf,
        Self::Cdf,
        Self::Hist,
        Self::Line,
        Self::Scatter,
        Self::Bar,
        Self::Surface3d,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Pmf => "pmf",
            Self::Cdf => "cdf",
            Self::Hist => "hist",
            Self::Line => "line",
            Self::Scatter => "scatter",
            Self::Bar => "bar",
            Self::Surface3d => "surface3d",
        }
    }
}

impl FromStr for ChartType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|chart_type| chart_type.as_str() == wanted)
            .ok_or_else(|| s.to_string())
    }
}

impl fmt::Display for ChartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Library {
    Plotly,
    Threejs,
}

impl Library {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plotly => "plotly",
            Self::Threejs => "threejs",
        }
    }
}

impl FromStr for Library {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "plotly" => Ok(Self::Plotly),
            "threejs" | "three.js" | "three" => Ok(Self::Threejs),
            _ => Err(s.to_string()),
        }
    }
}

impl fmt::Display for Library {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The chart types and rendering libraries a deployment accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowList {
    pub chart_types: Vec<ChartType>,
    pub libraries: Vec<Library>,
}

impl Default for AllowList {
    fn default() -> Self {
        Self {
            chart_types: ChartType::ALL.to_vec(),
            libraries: vec![Library::Plotly, Library::Threejs],
        }
    }
}

impl AllowList {
    #[must_use]
    pub fn allows_chart(&self, chart_type: ChartType) -> bool {
        self.chart_types.contains(&chart_type)
    }

    #[must_use]
    pub fn allows_library(&self, library: Library) -> bool {
        self.libraries.contains(&library)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalParams {
    pub mu: f64,
    pub sigma: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateParams {
    pub lambda: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinomialParams {
    pub n: u32,
    pub p: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BetaParams {
    pub alpha: f64,
    pub beta: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UniformParams {
    pub a: f64,
    pub b: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatrixParams {
    pub matrix: [[f64; 2]; 2],
}

/// The closed set of concepts the renderer knows, each with typed
/// parameters. Anything else renders through the generic template.
#[derive(Debug, Clone, PartialEq)]
pub enum ConceptPlot {
    Normal(NormalParams),
    Poisson(RateParams),
    Binomial(BinomialParams),
    Beta(BetaParams),
    Exponential(RateParams),
    Uniform(UniformParams),
    MatrixTransform(MatrixParams),
    Generic { concept: String },
}

impl ConceptPlot {
    #[must_use]
    pub fn concept_id(&self) -> &str {
        match self {
            Self::Normal(_) => "normal_distribution",
            Self::Poisson(_) => "poisson_distribution",
            Self::Binomial(_) => "binomial_distribution",
            Self::Beta(_) => "beta_distribution",
            Self::Exponential(_) => "exponential_distribution",
            Self::Uniform(_) => "uniform_distribution",
            Self::MatrixTransform(_) => "matrix_transform",
            Self::Generic { concept } => concept,
        }
    }
}

/// A spec that passed validation. Only [`crate::validate`] builds one.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedSpec {
    pub plot: ConceptPlot,
    pub chart_type: ChartType,
    pub library: Library,
    pub title: String,
}

impl ValidatedSpec {
    #[must_use]
    pub fn concept(&self) -> &str {
        self.plot.concept_id()
    }
}
