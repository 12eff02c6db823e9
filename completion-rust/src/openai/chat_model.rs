use super::chat_api::{
    ChatCompletionRequestMessage, CompletionUsage, CreateChatCompletionRequest,
    CreateChatCompletionResponse,
};
use crate::{
    client_utils, LanguageModel, LanguageModelError, LanguageModelInput, LanguageModelResult,
    Message, ModelResponse, ModelUsage, Part,
};
use reqwest::{
    header::{self, HeaderMap, HeaderValue},
    Client,
};

const PROVIDER: &str = "openai";

/// A model served through an `OpenAI`-compatible `/chat/completions`
/// endpoint.
pub struct OpenAIChatModel {
    model_id: String,
    api_key: String,
    base_url: String,
    client: Client,
}

#[derive(Clone, Default)]
pub struct OpenAIChatModelOptions {
    pub base_url: Option<String>,
    pub api_key: String,
    pub client: Option<Client>,
}

impl OpenAIChatModel {
    #[must_use]
    pub fn new(model_id: impl Into<String>, options: OpenAIChatModelOptions) -> Self {
        let OpenAIChatModelOptions {
            base_url,
            api_key,
            client,
        } = options;

        let base_url = base_url
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string())
            .trim_end_matches('/')
            .to_string();
        let client = client.unwrap_or_else(Client::new);

        Self {
            model_id: model_id.into(),
            api_key,
            base_url,
            client,
        }
    }

    fn request_headers(&self) -> LanguageModelResult<HeaderMap> {
        let mut headers = HeaderMap::new();

        let auth_header =
            HeaderValue::from_str(&format!("Bearer {}", self.api_key)).map_err(|error| {
                LanguageModelError::InvalidInput(format!(
                    "Invalid OpenAI API key header value: {error}"
                ))
            })?;
        headers.insert(header::AUTHORIZATION, auth_header);

        Ok(headers)
    }
}

#[async_trait::async_trait]
impl LanguageModel for OpenAIChatModel {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    fn model_id(&self) -> String {
        self.model_id.clone()
    }

    async fn generate(&self, input: LanguageModelInput) -> LanguageModelResult<ModelResponse> {
        crate::opentelemetry::trace_generate(
            self.provider(),
            &self.model_id(),
            input,
            |input| async move {
                let request = convert_to_openai_create_params(input, &self.model_id);
                let headers = self.request_headers()?;

                let response: CreateChatCompletionResponse = client_utils::send_json(
                    &self.client,
                    &format!("{}/chat/completions", self.base_url),
                    &request,
                    headers,
                )
                .await?;

                let choice = response.choices.into_iter().next().ok_or_else(|| {
                    LanguageModelError::Invariant(PROVIDER, "No choices in response".to_string())
                })?;

                let message = choice.message;

                if let Some(refusal) = &message.refusal {
                    if !refusal.is_empty() {
                        return Err(LanguageModelError::Refusal(refusal.clone()));
                    }
                }

                let text = message.content.ok_or_else(|| {
                    LanguageModelError::Invariant(
                        PROVIDER,
                        "No content in response message".to_string(),
                    )
                })?;

                let usage = response.usage.map(map_openai_usage).transpose()?;

                Ok(ModelResponse {
                    content: vec![Part::text(text)],
                    usage,
                })
            },
        )
        .await
    }
}

fn convert_to_openai_create_params(
    input: LanguageModelInput,
    model_id: &str,
) -> CreateChatCompletionRequest {
    let mut messages = Vec::with_capacity(input.messages.len() + 1);

    if let Some(system_prompt) = input.system_prompt {
        messages.push(ChatCompletionRequestMessage::System {
            content: system_prompt,
        });
    }

    for message in input.messages {
        messages.push(match message {
            Message::User(user) => ChatCompletionRequestMessage::User {
                content: join_text_parts(&user.content),
            },
            Message::Assistant(assistant) => ChatCompletionRequestMessage::Assistant {
                content: join_text_parts(&assistant.content),
            },
        });
    }

    CreateChatCompletionRequest {
        model: model_id.to_string(),
        messages,
        max_tokens: input.max_tokens,
        temperature: input.temperature,
    }
}

fn join_text_parts(parts: &[Part]) -> String {
    parts
        .iter()
        .map(|part| match part {
            Part::Text(text_part) => text_part.text.as_str(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn map_openai_usage(usage: CompletionUsage) -> LanguageModelResult<ModelUsage> {
    let input_tokens = u32::try_from(usage.prompt_tokens).map_err(|_| {
        LanguageModelError::Invariant(
            PROVIDER,
            "OpenAI prompt_tokens exceeded u32 range".to_string(),
        )
    })?;
    let output_tokens = u32::try_from(usage.completion_tokens).map_err(|_| {
        LanguageModelError::Invariant(
            PROVIDER,
            "OpenAI completion_tokens exceeded u32 range".to_string(),
        )
    })?;

    Ok(ModelUsage {
        input_tokens,
        output_tokens,
    })
}
