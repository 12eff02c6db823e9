use crate::{LanguageModelInput, Message, ModelResponse, Part, TextPart, UserMessage};

impl TextPart {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(TextPart::new(text))
    }
}

impl Message {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self::User(UserMessage {
            content: vec![Part::text(text)],
        })
    }
}

impl ModelResponse {
    /// Create a response holding a single text part.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            content: vec![Part::text(text)],
            usage: None,
        }
    }

    /// Concatenate every text part of the response.
    #[must_use]
    pub fn text(&self) -> String {
        self.content
            .iter()
            .map(|part| match part {
                Part::Text(text_part) => text_part.text.as_str(),
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

impl LanguageModelInput {
    /// A single-turn input: one system instruction and one user message.
    pub fn single_turn(system_prompt: impl Into<String>, user_text: impl Into<String>) -> Self {
        Self {
            system_prompt: Some(system_prompt.into()),
            messages: vec![Message::user_text(user_text)],
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: Option<f64>) -> Self {
        self.temperature = temperature;
        self
    }
}
