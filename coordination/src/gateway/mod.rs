//! Completion gateway: uniform access to LLM chat backends.
//!
//! The engines only see [`CompletionGateway`]. Concrete HTTP backends live in
//! the `arena-agents` crate; this module carries the wire-neutral request and
//! response types, the offline [`StubGateway`], and the [`ResilientGateway`]
//! wrapper that bounds every call with a timeout and degrades to the stub.

pub mod resilient;
pub mod stub;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use resilient::{ResilienceConfig, ResilientGateway};
pub use stub::StubGateway;

/// Role of a chat message on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for ChatRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// One completion call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Backend provider tag (e.g. "openai", "deepseek")
    pub provider: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Ordered history, oldest first
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            system_prompt: None,
            messages: Vec::new(),
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_messages(mut self, messages: Vec<ChatMessage>) -> Self {
        self.messages = messages;
        self
    }

    pub fn with_message(mut self, message: ChatMessage) -> Self {
        self.messages.push(message);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Messages for backends without a separate system parameter: the system
    /// prompt, when present and non-empty, becomes the first message.
    pub fn messages_with_system(&self) -> Vec<ChatMessage> {
        let mut out = Vec::with_capacity(self.messages.len() + 1);
        if let Some(prompt) = self.system_prompt.as_deref().filter(|p| !p.is_empty()) {
            out.push(ChatMessage::system(prompt));
        }
        out.extend(self.messages.iter().cloned());
        out
    }
}

/// Text returned by a backend, with provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub content: String,
    /// Model reported by the backend (or requested, when not reported)
    pub model: String,
    /// Which backend produced the text
    pub served_by: String,
    /// True when the text came from a fallback instead of the primary backend
    #[serde(default)]
    pub degraded: bool,
    pub latency_ms: u64,
}

/// Errors from completion backends.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("missing API key for {provider}")]
    MissingApiKey { provider: String },

    #[error("request to {backend} failed: {message}")]
    RequestFailed { backend: String, message: String },

    #[error("{backend} returned HTTP {status}: {body}")]
    Status {
        backend: String,
        status: u16,
        body: String,
    },

    #[error("could not parse {backend} response: {message}")]
    Parse { backend: String, message: String },

    #[error("completion timed out after {0:?}")]
    Timeout(Duration),

    #[error("no completion backend available: {0}")]
    Unavailable(String),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// A chat-completion backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionGateway: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> GatewayResult<CompletionResponse>;
}

/// Shared reference to a gateway
pub type SharedGateway = Arc<dyn CompletionGateway>;
