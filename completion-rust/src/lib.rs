mod client_utils;
pub mod completion_test;
mod errors;
mod language_model;
pub mod openai;
mod opentelemetry;
mod registry;
mod types;
mod types_ext;

pub use errors::*;
pub use language_model::LanguageModel;
pub use registry::{CompletionSettings, LanguageModelRegistry};
pub use types::*;
