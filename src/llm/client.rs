use crate::completer::TextGenerator;
use crate::error::{CropProfileError, Result};
use crate::llm::types::*;
use async_trait::async_trait;
use log::debug;
use reqwest::Client;

const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Messages API client.
#[derive(Clone)]
pub struct AnthropicClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl AnthropicClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: ANTHROPIC_BASE_URL.to_string(),
        }
    }

    /// Reads the key from `ANTHROPIC_API_KEY`.
    pub fn from_env() -> Result<Self> {
        match std::env::var("ANTHROPIC_API_KEY") {
            Ok(key) if !key.trim().is_empty() => Ok(Self::new(key.trim().to_string())),
            _ => Err(CropProfileError::MissingApiKey),
        }
    }

    /// Points the client at another host (proxies, local mocks).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl TextGenerator for AnthropicClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation> {
        let url = format!("{}/v1/messages", self.base_url);

        let payload = MessagesRequest {
            model: &request.model,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            messages: vec![Message {
                role: "user",
                content: &request.prompt,
            }],
        };

        let res = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&payload)
            .send()
            .await?;
        let status = res.status();

        if !status.is_success() {
            let body = res.text().await?;
            return Err(CropProfileError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let body: MessagesResponse = res.json().await?;
        debug!(
            "Messages API usage: {} input / {} output tokens",
            body.usage.input_tokens, body.usage.output_tokens
        );

        let text = body.first_text().ok_or_else(|| {
            CropProfileError::ResponseParse("model returned no text content".to_string())
        })?;

        Ok(Generation {
            text: text.to_string(),
            usage: body.usage,
        })
    }
}
