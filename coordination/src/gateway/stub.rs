//! Offline backend that answers with a clearly marked simulated reply.

use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::{CompletionGateway, CompletionRequest, CompletionResponse, GatewayResult};

/// Marker prefix carried by every stub reply.
pub const SIMULATED_MARKER: &str = "[simulated:";

/// Backend used when no credentials are configured or the primary fails.
#[derive(Debug, Clone, Default)]
pub struct StubGateway {
    latency: Option<Duration>,
}

impl StubGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long before answering, to mimic a real backend.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// The simulated text for a request.
    pub fn reply_for(request: &CompletionRequest) -> String {
        format!(
            "{SIMULATED_MARKER}{}/{}] I received your message. Context: {} messages",
            request.provider,
            request.model,
            request.messages.len()
        )
    }
}

/// Whether a reply was produced by the stub.
pub fn is_simulated(content: &str) -> bool {
    content.starts_with(SIMULATED_MARKER)
}

#[async_trait]
impl CompletionGateway for StubGateway {
    async fn complete(&self, request: &CompletionRequest) -> GatewayResult<CompletionResponse> {
        let start = Instant::now();
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        Ok(CompletionResponse {
            content: Self::reply_for(request),
            model: request.model.clone(),
            served_by: "stub".to_string(),
            degraded: false,
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }
}
