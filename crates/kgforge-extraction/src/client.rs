use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use kgforge_core::config::LlmConfig;
use kgforge_core::error::{KgError, Result};
use kgforge_core::extraction::{ChatMessage, ExtractionEndpoint};

/// Client for an OpenAI-compatible `chat/completions` endpoint.
pub struct ChatCompletionsClient {
    client: reqwest::Client,
    endpoint: Url,
    api_key: String,
    model: String,
}

// ── Chat completions request/response types ────────────────────────────────

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ReplyMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

// ── Implementation ─────────────────────────────────────────────────────────

impl ChatCompletionsClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let mut base = config.base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let endpoint = Url::parse(&base)
            .and_then(|u| u.join("chat/completions"))
            .map_err(|e| KgError::Config(format!("Invalid LLM_BASE_URL '{}': {e}", config.base_url)))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl ExtractionEndpoint for ChatCompletionsClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<Option<String>> {
        let request = CompletionRequest {
            model: &self.model,
            messages,
        };

        tracing::debug!(
            model = %self.model,
            messages = messages.len(),
            "Sending extraction request"
        );

        let mut builder = self.client.post(self.endpoint.clone()).json(&request);
        if !self.api_key.is_empty() {
            builder = builder.bearer_auth(&self.api_key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| KgError::Extraction(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".to_string());
            return Err(KgError::Extraction(format!(
                "Completion endpoint returned status {status}: {body}"
            )));
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| KgError::Extraction(format!("Failed to parse completion response: {e}")))?;

        let Some(choice) = completion.choices.into_iter().next() else {
            return Ok(None);
        };

        tracing::debug!(
            finish_reason = ?choice.finish_reason,
            "Received extraction response"
        );

        Ok(choice.message.content.filter(|text| !text.trim().is_empty()))
    }
}
