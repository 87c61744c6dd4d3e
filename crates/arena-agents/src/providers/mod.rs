//! HTTP completion backends and gateway assembly.
//!
//! OpenRouter, when configured, serves every provider tag. Without it the
//! OpenAI backend serves `openai` personas and everything else goes to the
//! stub. The assembled router is always wrapped in a
//! [`ResilientGateway`](coordination::ResilientGateway), so a slow or
//! failing backend degrades to simulated text instead of an error.

pub mod openai;
pub mod openrouter;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use coordination::{
    CompletionGateway, CompletionRequest, CompletionResponse, GatewayResult, ResilientGateway,
    SharedGateway, StubGateway,
};
use tracing::info;

use crate::config::ArenaConfig;
pub use openai::{openai_client, ChatCompletionsClient};
pub use openrouter::{qualified_model, OpenRouterClient};

/// Which backend serves a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    OpenRouter,
    OpenAi,
    Stub,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenRouter => write!(f, "openrouter"),
            Self::OpenAi => write!(f, "openai"),
            Self::Stub => write!(f, "stub"),
        }
    }
}

/// Dispatches each request to a backend by provider tag.
pub struct ProviderRouter {
    openrouter: Option<SharedGateway>,
    openai: Option<SharedGateway>,
    stub: SharedGateway,
}

impl ProviderRouter {
    pub fn new() -> Self {
        Self {
            openrouter: None,
            openai: None,
            stub: Arc::new(StubGateway::new()),
        }
    }

    pub fn with_openrouter(mut self, gateway: SharedGateway) -> Self {
        self.openrouter = Some(gateway);
        self
    }

    pub fn with_openai(mut self, gateway: SharedGateway) -> Self {
        self.openai = Some(gateway);
        self
    }

    pub fn with_stub(mut self, gateway: SharedGateway) -> Self {
        self.stub = gateway;
        self
    }

    pub fn route(&self, provider: &str) -> BackendKind {
        if self.openrouter.is_some() {
            BackendKind::OpenRouter
        } else if self.openai.is_some() && provider.eq_ignore_ascii_case("openai") {
            BackendKind::OpenAi
        } else {
            BackendKind::Stub
        }
    }

    fn backend(&self, kind: BackendKind) -> &SharedGateway {
        match kind {
            BackendKind::OpenRouter => self.openrouter.as_ref().unwrap_or(&self.stub),
            BackendKind::OpenAi => self.openai.as_ref().unwrap_or(&self.stub),
            BackendKind::Stub => &self.stub,
        }
    }
}

impl Default for ProviderRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompletionGateway for ProviderRouter {
    async fn complete(&self, request: &CompletionRequest) -> GatewayResult<CompletionResponse> {
        let kind = self.route(&request.provider);
        self.backend(kind).complete(request).await
    }
}

/// Build the router from configured credentials.
pub fn build_router(config: &ArenaConfig) -> GatewayResult<ProviderRouter> {
    let gateway = &config.gateway;
    let mut router = ProviderRouter::new();

    if let Some(key) = &gateway.openrouter_api_key {
        router = router.with_openrouter(Arc::new(OpenRouterClient::new(gateway, key.clone())?));
    }
    if let Some(key) = &gateway.openai_api_key {
        router = router.with_openai(Arc::new(openai_client(
            &gateway.openai_base_url,
            key.clone(),
            gateway.request_timeout,
        )?));
    }
    Ok(router)
}

/// Full gateway: router behind timeout and stub fallback.
pub fn build_gateway(config: &ArenaConfig) -> GatewayResult<SharedGateway> {
    let router = build_router(config)?;
    info!(
        openrouter = config.gateway.openrouter_api_key.is_some(),
        openai = config.gateway.openai_api_key.is_some(),
        timeout_secs = config.resilience.timeout.as_secs(),
        "Completion gateway assembled"
    );
    if !config.gateway.has_credentials() {
        info!("No API keys configured, every reply will be simulated");
    }
    Ok(ResilientGateway::new(Arc::new(router), config.resilience.clone()).shared())
}
