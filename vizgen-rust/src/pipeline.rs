use crate::{
    extract::{CompletionStrategy, ExtractionRequest, KeywordStrategy, SpecStrategy, StrategyChain},
    opentelemetry::trace_resolve,
    program::Limits,
    render, slugify, validate, AllowList, Artifact, ArtifactMeta, GenerationResult,
    JsonFileRegistry, MatchPolicy, Persister, ProgramOutcome, ProgramSynthesizer, RegistryEntry,
    RegistryStore, Resolver, SynthesisMode, VizConfig, VizError,
};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, sync::Arc};
use viz_completion::{LanguageModel, LanguageModelRegistry};

const MIN_PROMPT_CHARS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ResolveRequest {
    pub prompt: String,
    #[serde(rename = "vizType", default)]
    pub viz_type: Option<String>,
    #[serde(default)]
    pub complexity: Option<String>,
}

impl ResolveRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            viz_type: None,
            complexity: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolveKind {
    Existing,
    Generated,
}

impl ResolveKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Existing => "existing",
            Self::Generated => "generated",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolveSource {
    Registry,
    Generator,
}

impl ResolveSource {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Registry => "registry",
            Self::Generator => "generator",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolveResponse {
    pub kind: ResolveKind,
    pub url: String,
    pub source: ResolveSource,
}

/// Parameters required to create a [`Visualizer`].
/// # Default Values
/// - `model`: `None` (keyword extraction and the deterministic program)
/// - `strategies`: `None` (completion when a model is set, then keyword)
/// - `allow`: every chart type, `plotly` and `threejs`
/// - `match_policy`: `FirstMatch`
/// - `synthesis_mode`: `Template`
/// - `temperature`: `None`
/// - `output_dir`, `url_prefix`, `module`: as in [`VizConfig`]
/// - `limits`: [`Limits::default`]
/// - `min_points`: 3
pub struct VisualizerParams {
    pub store: Arc<dyn RegistryStore>,
    /// Completion service used for spec extraction and program synthesis.
    pub model: Option<Arc<dyn LanguageModel>>,
    /// Explicit extraction chain, replacing the default one.
    pub strategies: Option<StrategyChain>,
    pub allow: AllowList,
    pub match_policy: MatchPolicy,
    pub synthesis_mode: SynthesisMode,
    pub temperature: Option<f64>,
    pub output_dir: PathBuf,
    /// Prefix of the URL stored for each artifact.
    pub url_prefix: String,
    pub module: String,
    pub limits: Limits,
    pub min_points: usize,
}

impl VisualizerParams {
    pub fn new(store: Arc<dyn RegistryStore>) -> Self {
        let config = VizConfig::default();
        Self {
            store,
            model: None,
            strategies: None,
            allow: config.allow,
            match_policy: config.match_policy,
            synthesis_mode: config.synthesis_mode,
            temperature: None,
            output_dir: config.output_dir,
            url_prefix: config.url_prefix,
            module: config.module,
            limits: Limits::default(),
            min_points: config.min_points,
        }
    }

    /// Everything the configuration describes: a JSON file registry and,
    /// when credentials are present, the configured model.
    #[must_use]
    pub fn from_config(config: &VizConfig) -> Self {
        let model = LanguageModelRegistry::new(&config.completion)
            .default_model()
            .ok();
        Self {
            store: Arc::new(JsonFileRegistry::new(config.registry_path.clone())),
            model,
            strategies: None,
            allow: config.allow.clone(),
            match_policy: config.match_policy,
            synthesis_mode: config.synthesis_mode,
            temperature: Some(config.temperature),
            output_dir: config.output_dir.clone(),
            url_prefix: config.url_prefix.clone(),
            module: config.module.clone(),
            limits: Limits {
                timeout: config.exec_timeout,
                ..Limits::default()
            },
            min_points: config.min_points,
        }
    }

    #[must_use]
    pub fn model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.model = Some(model);
        self
    }

    #[must_use]
    pub fn strategies(mut self, strategies: StrategyChain) -> Self {
        self.strategies = Some(strategies);
        self
    }

    #[must_use]
    pub fn allow(mut self, allow: AllowList) -> Self {
        self.allow = allow;
        self
    }

    #[must_use]
    pub fn match_policy(mut self, match_policy: MatchPolicy) -> Self {
        self.match_policy = match_policy;
        self
    }

    #[must_use]
    pub fn synthesis_mode(mut self, synthesis_mode: SynthesisMode) -> Self {
        self.synthesis_mode = synthesis_mode;
        self
    }

    #[must_use]
    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    #[must_use]
    pub fn output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    #[must_use]
    pub fn url_prefix(mut self, url_prefix: impl Into<String>) -> Self {
        self.url_prefix = url_prefix.into();
        self
    }

    #[must_use]
    pub fn module(mut self, module: impl Into<String>) -> Self {
        self.module = module.into();
        self
    }

    #[must_use]
    pub fn limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    #[must_use]
    pub fn min_points(mut self, min_points: usize) -> Self {
        self.min_points = min_points;
        self
    }

    pub fn build(self) -> Result<Visualizer, VizError> {
        Visualizer::new(self)
    }
}

/// The resolve-or-generate engine: a registry lookup in front of spec
/// extraction, synthesis and persistence.
pub struct Visualizer {
    store: Arc<dyn RegistryStore>,
    resolver: Resolver,
    extractor: StrategyChain,
    allow: AllowList,
    synthesis_mode: SynthesisMode,
    synth: ProgramSynthesizer,
    persister: Persister,
}

impl Visualizer {
    pub fn new(params: VisualizerParams) -> Result<Self, VizError> {
        let extractor = match params.strategies {
            Some(chain) => chain,
            None => {
                let mut chain = StrategyChain::new();
                if let Some(model) = &params.model {
                    let mut strategy = CompletionStrategy::new(model.clone());
                    if let Some(temperature) = params.temperature {
                        strategy = strategy.temperature(temperature);
                    }
                    chain = chain.then(strategy);
                }
                chain.then(KeywordStrategy::new()?)
            }
        };

        let mut synth = ProgramSynthesizer::new(params.model)?
            .min_points(params.min_points)
            .limits(params.limits);
        if let Some(temperature) = params.temperature {
            synth = synth.temperature(temperature);
        }

        Ok(Self {
            persister: Persister::new(
                params.output_dir,
                params.url_prefix,
                params.module,
                params.store.clone(),
            ),
            store: params.store,
            resolver: Resolver::new(params.match_policy),
            extractor,
            allow: params.allow,
            synthesis_mode: params.synthesis_mode,
            synth,
        })
    }

    /// The registry entry a prompt resolves to, if any.
    pub async fn resolve(&self, prompt: &str) -> Option<RegistryEntry> {
        let registry = self.store.load().await;
        self.resolver.resolve(&registry, prompt).cloned()
    }

    /// Entries whose title or an alias contains `q`; all entries when `q`
    /// is blank.
    pub async fn query(&self, q: Option<&str>) -> Vec<RegistryEntry> {
        self.store.load().await.query(q)
    }

    /// Return the stored artifact for a prompt, or synthesize, persist and
    /// register a new one. Extraction and validation failures leave the
    /// registry and the output directory untouched.
    pub async fn resolve_or_generate(
        &self,
        request: ResolveRequest,
    ) -> Result<ResolveResponse, VizError> {
        let prompt = request.prompt.trim().to_string();
        trace_resolve(&prompt, async {
            check_prompt(&prompt)?;

            if let Some(entry) = self.resolve(&prompt).await {
                if let Some(url) = entry.url {
                    tracing::info!(id = %entry.id, "registry hit");
                    return Ok(ResolveResponse {
                        kind: ResolveKind::Existing,
                        url,
                        source: ResolveSource::Registry,
                    });
                }
                tracing::warn!(id = %entry.id, "registry hit has no url, generating");
            }

            let result = self
                .generate(ExtractionRequest {
                    prompt: prompt.clone(),
                    viz_type: request.viz_type,
                    complexity: request.complexity,
                })
                .await?;
            Ok(ResolveResponse {
                kind: ResolveKind::Generated,
                url: result.url,
                source: ResolveSource::Generator,
            })
        })
        .await
    }

    /// The miss path: extract, validate, synthesize, persist.
    pub async fn generate(&self, request: ExtractionRequest) -> Result<GenerationResult, VizError> {
        let spec = self.extractor.extract(&request).await?;
        let spec = validate(&spec, &self.allow)?;

        let artifact = match self.synthesis_mode {
            SynthesisMode::Template => render(&spec)?,
            SynthesisMode::Program => {
                let outcome = self.synth.synthesize_and_execute(&request.prompt).await;
                Artifact {
                    concept_slug: slugify(spec.concept()),
                    ..outcome.artifact
                }
            }
        };

        let meta = ArtifactMeta {
            id: spec.concept().to_string(),
            title: spec.title.clone(),
            prompt: request.prompt,
        };
        Ok(self.persister.persist(&artifact, meta).await?)
    }

    /// Run the program pipeline alone; nothing is persisted.
    pub async fn generate_program(&self, prompt: &str) -> Result<ProgramOutcome, VizError> {
        let prompt = prompt.trim();
        check_prompt(prompt)?;
        Ok(self.synth.synthesize_and_execute(prompt).await)
    }
}

fn check_prompt(prompt: &str) -> Result<(), VizError> {
    if prompt.chars().count() < MIN_PROMPT_CHARS {
        return Err(VizError::InvalidRequest(format!(
            "prompt must be at least {MIN_PROMPT_CHARS} characters"
        )));
    }
    Ok(())
}
