//! Client for OpenAI-compatible `/chat/completions` endpoints.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use coordination::{
    CompletionGateway, CompletionRequest, CompletionResponse, GatewayError, GatewayResult,
};
use tracing::debug;

/// Sampling defaults applied when a request leaves them unset.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 500;

/// A chat-completions backend speaking the OpenAI wire format.
pub struct ChatCompletionsClient {
    backend: &'static str,
    endpoint: String,
    api_key: String,
    headers: Vec<(&'static str, String)>,
    timeout: Duration,
    client: reqwest::Client,
}

impl ChatCompletionsClient {
    /// `base_url` is the API root, e.g. `https://api.openai.com/v1`.
    pub fn new(
        backend: &'static str,
        base_url: &str,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> GatewayResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::RequestFailed {
                backend: backend.to_string(),
                message: format!("failed to create HTTP client: {e}"),
            })?;
        Ok(Self {
            backend,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: api_key.into(),
            headers: Vec::new(),
            timeout,
            client,
        })
    }

    /// Send an extra header with every request.
    pub fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    pub fn backend(&self) -> &'static str {
        self.backend
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// JSON body for a request, sending `model` as the model id.
    pub fn request_body(request: &CompletionRequest, model: &str) -> serde_json::Value {
        serde_json::json!({
            "model": model,
            "messages": request.messages_with_system(),
            "temperature": request.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        })
    }

    /// Post a request using an explicit model id.
    pub async fn complete_as(
        &self,
        request: &CompletionRequest,
        model: &str,
    ) -> GatewayResult<CompletionResponse> {
        let start = Instant::now();
        let body = Self::request_body(request, model);
        debug!(backend = self.backend, model, messages = request.messages.len(), "Calling backend");

        let mut builder = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json");
        for (name, value) in &self.headers {
            builder = builder.header(*name, value);
        }

        let response = builder.json(&body).send().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::Timeout(self.timeout)
            } else {
                GatewayError::RequestFailed {
                    backend: self.backend.to_string(),
                    message: e.to_string(),
                }
            }
        })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Status {
                backend: self.backend.to_string(),
                status,
                body,
            });
        }

        let resp_json: serde_json::Value =
            response.json().await.map_err(|e| GatewayError::Parse {
                backend: self.backend.to_string(),
                message: e.to_string(),
            })?;

        let content = extract_content(self.backend, &resp_json)?;
        let served_model = resp_json["model"].as_str().unwrap_or(model).to_string();
        debug!(backend = self.backend, chars = content.len(), "Response received");

        Ok(CompletionResponse {
            content,
            model: served_model,
            served_by: self.backend.to_string(),
            degraded: false,
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }
}

/// First choice's message text. A body without one is malformed.
pub fn extract_content(backend: &str, resp_json: &serde_json::Value) -> GatewayResult<String> {
    resp_json["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| GatewayError::Parse {
            backend: backend.to_string(),
            message: "response has no choices[0].message.content".to_string(),
        })
}

#[async_trait]
impl CompletionGateway for ChatCompletionsClient {
    async fn complete(&self, request: &CompletionRequest) -> GatewayResult<CompletionResponse> {
        self.complete_as(request, &request.model).await
    }
}

/// The OpenAI backend proper.
pub fn openai_client(
    base_url: &str,
    api_key: impl Into<String>,
    timeout: Duration,
) -> GatewayResult<ChatCompletionsClient> {
    ChatCompletionsClient::new("openai", base_url, api_key, timeout)
}
