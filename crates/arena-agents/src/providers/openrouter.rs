//! OpenRouter: one OpenAI-compatible endpoint in front of many vendors.

use async_trait::async_trait;
use coordination::{CompletionGateway, CompletionRequest, CompletionResponse, GatewayResult};

use super::openai::ChatCompletionsClient;
use crate::config::GatewayConfig;

/// Vendor prefix OpenRouter expects for a persona provider tag.
fn vendor_prefix(provider: &str) -> Option<&'static str> {
    match provider.to_ascii_lowercase().as_str() {
        "openai" => Some("openai"),
        "google" | "gemini" => Some("google"),
        "deepseek" => Some("deepseek"),
        "grok" | "xai" | "x-ai" => Some("x-ai"),
        "anthropic" | "claude" => Some("anthropic"),
        "mistral" => Some("mistralai"),
        "meta" | "llama" => Some("meta-llama"),
        _ => None,
    }
}

/// OpenRouter model id for a persona's provider and model.
///
/// Already-qualified ids (`vendor/model`) pass through, as do models of
/// unknown providers.
pub fn qualified_model(provider: &str, model: &str) -> String {
    if model.contains('/') {
        return model.to_string();
    }
    match vendor_prefix(provider) {
        Some(prefix) => format!("{prefix}/{model}"),
        None => model.to_string(),
    }
}

pub struct OpenRouterClient {
    inner: ChatCompletionsClient,
}

impl OpenRouterClient {
    pub fn new(config: &GatewayConfig, api_key: impl Into<String>) -> GatewayResult<Self> {
        let inner = ChatCompletionsClient::new(
            "openrouter",
            &config.openrouter_base_url,
            api_key,
            config.request_timeout,
        )?
        .with_header("HTTP-Referer", config.app_referer.clone())
        .with_header("X-Title", config.app_title.clone());
        Ok(Self { inner })
    }

    pub fn endpoint(&self) -> &str {
        self.inner.endpoint()
    }
}

#[async_trait]
impl CompletionGateway for OpenRouterClient {
    async fn complete(&self, request: &CompletionRequest) -> GatewayResult<CompletionResponse> {
        let model = qualified_model(&request.provider, &request.model);
        self.inner.complete_as(request, &model).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_model() {
        assert_eq!(qualified_model("openai", "gpt-4o"), "openai/gpt-4o");
        assert_eq!(qualified_model("grok", "grok-2"), "x-ai/grok-2");
        assert_eq!(qualified_model("DeepSeek", "deepseek-chat"), "deepseek/deepseek-chat");
        assert_eq!(
            qualified_model("openai", "meta-llama/llama-3-70b"),
            "meta-llama/llama-3-70b"
        );
        assert_eq!(qualified_model("custom", "my-model"), "my-model");
    }

    #[test]
    fn test_client_uses_configured_base_url() {
        let config = GatewayConfig {
            openrouter_base_url: "http://localhost:9999/api/v1".into(),
            ..Default::default()
        };
        let client = OpenRouterClient::new(&config, "sk-or").unwrap();
        assert_eq!(client.endpoint(), "http://localhost:9999/api/v1/chat/completions");
    }
}
