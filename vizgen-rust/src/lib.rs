mod artifact;
mod config;
mod errors;
pub mod extract;
pub mod gate;
mod instruction;
mod normalize;
mod opentelemetry;
mod persist;
mod pipeline;
pub mod program;
mod registry;
mod repair;
mod resolver;
mod spec;
mod stats;
mod synth;
mod template;
mod validate;

pub use artifact::Artifact;
pub use config::{ConfigError, MatchPolicy, SynthesisMode, VizConfig};
pub use errors::*;
pub use normalize::{normalize, slugify};
pub use persist::{artifact_filename, ArtifactMeta, GenerationResult, Persister};
pub use pipeline::{
    ResolveKind, ResolveRequest, ResolveResponse, ResolveSource, Visualizer, VisualizerParams,
};
pub use registry::{EntryKind, JsonFileRegistry, Registry, RegistryEntry, RegistryStore};
pub use repair::{AttemptRecord, AttemptStage, RepairLoop, FALLBACK_PROGRAM};
pub use resolver::Resolver;
pub use spec::*;
pub use synth::{extract_code, Domain, ProgramOutcome, ProgramSynthesizer, DETERMINISTIC_PROGRAM};
pub use template::render;
pub use validate::validate;
