use std::{path::PathBuf, time::Duration};
use thiserror::Error;
use viz_completion::LanguageModelError;

/// Error surfaced by the resolve-or-generate pipeline.
#[derive(Debug, Error)]
pub enum VizError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}

impl VizError {
    /// Whether the failure is about the request itself rather than the
    /// service. Client errors never mutate the registry.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidRequest(_) | Self::Extraction(_) | Self::Validation(_)
        )
    }
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("no known concept matched the prompt")]
    NoConcept,
    #[error("completion service error: {0}")]
    Completion(#[from] LanguageModelError),
    #[error("completion output is not a chart spec: {0}")]
    Malformed(String),
    #[error("could not extract a chart spec ({})", .0.join("; "))]
    Exhausted(Vec<String>),
}

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("unsupported {field}: {value}")]
    NotAllowed { field: &'static str, value: String },
    #[error("spec is missing {field}")]
    Missing { field: &'static str },
    #[error("invalid parameter {name}: {reason}")]
    InvalidParam { name: String, reason: String },
}

impl ValidationError {
    /// Name of the offending spec field.
    #[must_use]
    pub fn field(&self) -> &str {
        match self {
            Self::NotAllowed { field, .. } | Self::Missing { field } => field,
            Self::InvalidParam { .. } => "params",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("rendered markup is missing required anchor {anchor}")]
pub struct RenderError {
    pub anchor: &'static str,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("program uses forbidden capability {category} ({matched:?})")]
pub struct SafetyViolation {
    pub category: &'static str,
    pub matched: String,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("syntax error on line {line}: {message}")]
    Syntax { line: usize, message: String },
    #[error("line {line}: name '{name}' is not defined")]
    UnknownName { line: usize, name: String },
    #[error("line {line}: module '{module}' is not available")]
    UnsupportedImport { line: usize, module: String },
    #[error("line {line}: {message}")]
    Type { line: usize, message: String },
    #[error("execution exceeded the {0:?} deadline")]
    Timeout(Duration),
    #[error("program exceeded the budget of {0} statements")]
    StatementBudget(usize),
    #[error("line {line}: array of {len} elements exceeds the limit of {limit}")]
    TooLarge { line: usize, len: usize, limit: usize },
    #[error("program did not assign '{0}'")]
    MissingOutput(String),
    #[error("'{name}' is a {found}, not a figure")]
    NotAFigure { name: String, found: &'static str },
    #[error("execution aborted: {0}")]
    Aborted(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QualityGateFailure {
    #[error("program does not import plotly")]
    MissingPlotlyImport,
    #[error("figure has {points} plotted points, need more than {minimum}")]
    TooFewPoints { points: usize, minimum: usize },
}

/// Why one program-synthesis attempt failed. Never surfaced past the
/// repair loop.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error("generation failed: {0}")]
    Generation(#[from] LanguageModelError),
    #[error("safety violation: {0}")]
    Safety(#[from] SafetyViolation),
    #[error("execution failed: {0}")]
    Execution(#[from] ExecutionError),
    #[error("quality gate failed: {0}")]
    Quality(#[from] QualityGateFailure),
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("registry serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("registry changed concurrently {attempts} times, giving up")]
    Conflict { attempts: usize },
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to write artifact {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no free artifact filename for {0}")]
    Exhausted(String),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}
