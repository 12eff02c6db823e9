use crate::{AllowList, ChartType, Library};
use std::{env, path::PathBuf, str::FromStr, time::Duration};
use thiserror::Error;
use viz_completion::CompletionSettings;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid value {value:?} for {key}: {reason}")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
    pub reason: String,
}

/// How a cache miss is turned into an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SynthesisMode {
    /// Render a declarative template for the validated spec.
    #[default]
    Template,
    /// Ask the completion service for a figure script and execute it.
    Program,
}

impl FromStr for SynthesisMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "template" => Ok(Self::Template),
            "program" => Ok(Self::Program),
            _ => Err("expected template or program".to_string()),
        }
    }
}

/// Which registry entry wins when several match a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchPolicy {
    /// The first matching entry in registry order.
    #[default]
    FirstMatch,
    /// The entry whose matched key is longest; ties go to registry order.
    LongestMatch,
}

impl FromStr for MatchPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "first" | "first_match" => Ok(Self::FirstMatch),
            "longest" | "longest_match" => Ok(Self::LongestMatch),
            _ => Err("expected first or longest".to_string()),
        }
    }
}

/// Service configuration.
/// # Default Values
/// - `temperature`: 0.2
/// - `allow`: every chart type, `plotly` and `threejs`
/// - `registry_path`: `app/modules/ai_visualizer/registry/registry.json`
/// - `output_dir`: `app/modules/ai_visualizer/generated`
/// - `url_prefix`: `app/modules/ai_visualizer/generated`
/// - `module`: `ai_visualizer`
/// - `synthesis_mode`: `Template`
/// - `match_policy`: `FirstMatch`
/// - `exec_timeout`: 2s
/// - `min_points`: 3
/// - `bind_addr`: `0.0.0.0:8000`
/// - `app_url`: `http://localhost:3000`
#[derive(Debug, Clone, PartialEq)]
pub struct VizConfig {
    pub completion: CompletionSettings,
    /// Sampling temperature for every completion request.
    pub temperature: f64,
    pub allow: AllowList,
    pub registry_path: PathBuf,
    pub output_dir: PathBuf,
    /// Prefix joined with the artifact filename to form the stored URL.
    pub url_prefix: String,
    /// Value of the `module` field on generated registry entries.
    pub module: String,
    pub synthesis_mode: SynthesisMode,
    pub match_policy: MatchPolicy,
    /// Wall-clock deadline for one figure-script execution.
    pub exec_timeout: Duration,
    /// A figure must hold more than this many points to pass the quality gate.
    pub min_points: usize,
    pub bind_addr: String,
    /// Origin allowed by the HTTP adapter's CORS layer.
    pub app_url: String,
}

impl Default for VizConfig {
    fn default() -> Self {
        Self {
            completion: CompletionSettings::default(),
            temperature: 0.2,
            allow: AllowList::default(),
            registry_path: PathBuf::from("app/modules/ai_visualizer/registry/registry.json"),
            output_dir: PathBuf::from("app/modules/ai_visualizer/generated"),
            url_prefix: "app/modules/ai_visualizer/generated".to_string(),
            module: "ai_visualizer".to_string(),
            synthesis_mode: SynthesisMode::default(),
            match_policy: MatchPolicy::default(),
            exec_timeout: Duration::from_millis(2000),
            min_points: 3,
            bind_addr: "0.0.0.0:8000".to_string(),
            app_url: "http://localhost:3000".to_string(),
        }
    }
}

impl VizConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::from_lookup(|key| env::var(key).ok())?;
        config.completion = CompletionSettings::from_env();
        Ok(config)
    }

    /// Build the configuration from an arbitrary key lookup. Blank values
    /// count as unset. Completion credentials are not read here.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut config = Self::default();

        if let Some(value) = get("LLM_TEMPERATURE") {
            config.temperature = parse("LLM_TEMPERATURE", &value)?;
        }
        if let Some(value) = get("VIZ_ALLOWED_CHARTS") {
            config.allow.chart_types = parse_list::<ChartType>("VIZ_ALLOWED_CHARTS", &value)?;
        }
        if let Some(value) = get("VIZ_ALLOWED_LIBS") {
            config.allow.libraries = parse_list::<Library>("VIZ_ALLOWED_LIBS", &value)?;
        }
        if let Some(value) = get("VIZ_REGISTRY_PATH") {
            config.registry_path = PathBuf::from(value);
        }
        if let Some(value) = get("VIZ_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(value);
        }
        if let Some(value) = get("VIZ_URL_PREFIX") {
            config.url_prefix = value.trim_end_matches('/').to_string();
        }
        if let Some(value) = get("VIZ_MODULE") {
            config.module = value;
        }
        if let Some(value) = get("VIZ_SYNTHESIS_MODE") {
            config.synthesis_mode = parse("VIZ_SYNTHESIS_MODE", &value)?;
        }
        if let Some(value) = get("VIZ_MATCH_POLICY") {
            config.match_policy = parse("VIZ_MATCH_POLICY", &value)?;
        }
        if let Some(value) = get("VIZ_EXEC_TIMEOUT_MS") {
            config.exec_timeout = Duration::from_millis(parse("VIZ_EXEC_TIMEOUT_MS", &value)?);
        }
        if let Some(value) = get("VIZ_MIN_POINTS") {
            config.min_points = parse("VIZ_MIN_POINTS", &value)?;
        }
        if let Some(value) = get("VIZ_BIND_ADDR") {
            config.bind_addr = value;
        }
        if let Some(value) = get("APP_URL") {
            config.app_url = value;
        }

        Ok(config)
    }
}

fn parse<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: ToString,
{
    value.trim().parse().map_err(|err: T::Err| ConfigError {
        key,
        value: value.to_string(),
        reason: err.to_string(),
    })
}

fn parse_list<T>(key: &'static str, value: &str) -> Result<Vec<T>, ConfigError>
where
    T: FromStr,
    T::Err: ToString,
{
    let items = value
        .split(',')
        .filter(|item| !item.trim().is_empty())
        .map(|item| parse(key, item))
        .collect::<Result<Vec<T>, _>>()?;

    if items.is_empty() {
        return Err(ConfigError {
            key,
            value: value.to_string(),
            reason: "list is empty".to_string(),
        });
    }
    Ok(items)
}
