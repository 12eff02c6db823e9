use thiserror::Error;

#[derive(Error, Debug)]
pub enum LanguageModelError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// Credentials for the provider were not configured.
    #[error("Missing credentials: {0} is not set")]
    MissingCredentials(&'static str),
    /// The request to the provider failed or the parsing of the response
    /// failed.
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// The request returns a non-OK status code
    #[error("Status error: {1} (Status {0})")]
    StatusCode(reqwest::StatusCode, String),
    /// The response from the provider was unexpected. (e.g. no choices returned
    /// in an `OpenAI` completion)
    #[error("Invariant from {0}: {1}")]
    Invariant(&'static str, String),
    /// The model refused to process the input. (e.g. `OpenAI` refusal)
    #[error("Refusal: {0}")]
    Refusal(String),
}

pub type LanguageModelResult<T> = Result<T, LanguageModelError>;
