//! Resilient gateway: timeout and graceful degradation.
//!
//! ```text
//! complete()
//!   ├─ Primary succeeds within timeout → response { degraded: false }
//!   ├─ Primary fails or times out, fallback succeeds → response { degraded: true }
//!   └─ Both fail → fixed fallback text { degraded: true, served_by: "none" }
//! ```
//!
//! The wrapper never returns an error, so callers on the turn path do not
//! need a failure branch for transient upstream problems.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::warn;

use super::stub::StubGateway;
use super::{
    CompletionGateway, CompletionRequest, CompletionResponse, GatewayError, GatewayResult,
    SharedGateway,
};

/// Text returned when every tier failed.
pub const FALLBACK_TEXT: &str = "[fallback] The backend is unavailable right now.";

/// Tuning for [`ResilientGateway`].
#[derive(Debug, Clone)]
pub struct ResilienceConfig {
    /// Upper bound on a single primary call
    pub timeout: Duration,
    /// Text used when the fallback tier also fails
    pub fallback_text: String,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            fallback_text: FALLBACK_TEXT.to_string(),
        }
    }
}

/// Wraps a primary backend with a per-call timeout and a fallback tier.
pub struct ResilientGateway {
    primary: SharedGateway,
    fallback: SharedGateway,
    config: ResilienceConfig,
}

impl ResilientGateway {
    /// Wrap `primary`, degrading to the stub backend.
    pub fn new(primary: SharedGateway, config: ResilienceConfig) -> Self {
        Self {
            primary,
            fallback: Arc::new(StubGateway::new()),
            config,
        }
    }

    pub fn with_fallback(mut self, fallback: SharedGateway) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn shared(self) -> SharedGateway {
        Arc::new(self)
    }

    async fn call_primary(&self, request: &CompletionRequest) -> GatewayResult<CompletionResponse> {
        match tokio::time::timeout(self.config.timeout, self.primary.complete(request)).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout(self.config.timeout)),
        }
    }
}

#[async_trait]
impl CompletionGateway for ResilientGateway {
    async fn complete(&self, request: &CompletionRequest) -> GatewayResult<CompletionResponse> {
        let start = Instant::now();
        let primary_err = match self.call_primary(request).await {
            Ok(response) => return Ok(response),
            Err(e) => e,
        };

        warn!(
            provider = %request.provider,
            model = %request.model,
            error = %primary_err,
            "Primary completion failed, degrading to fallback"
        );

        match self.fallback.complete(request).await {
            Ok(mut response) => {
                response.degraded = true;
                Ok(response)
            }
            Err(fallback_err) => {
                warn!(error = %fallback_err, "Fallback completion failed");
                Ok(CompletionResponse {
                    content: self.config.fallback_text.clone(),
                    model: request.model.clone(),
                    served_by: "none".to_string(),
                    degraded: true,
                    latency_ms: start.elapsed().as_millis() as u64,
                })
            }
        }
    }
}
