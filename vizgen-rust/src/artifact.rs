use crate::slugify;
use chrono::{DateTime, Local};

/// Rendered markup plus the identity its filename is derived from.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub markup: String,
    pub concept_slug: String,
    pub created_at: DateTime<Local>,
}

impl Artifact {
    #[must_use]
    pub fn new(markup: impl Into<String>, concept: &str) -> Self {
        Self {
            markup: markup.into(),
            concept_slug: slugify(concept),
            created_at: Local::now(),
        }
    }

    #[must_use]
    pub fn with_created_at(mut self, created_at: DateTime<Local>) -> Self {
        self.created_at = created_at;
        self
    }
}
