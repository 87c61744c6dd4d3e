//! Runtime configuration assembled from environment variables.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. Environment variable overrides (e.g. `ARENA_JUDGE_MODEL`)
//! 2. Built-in defaults of the engine configs in `coordination`
//!
//! | Variable                      | Effect                                   |
//! |-------------------------------|------------------------------------------|
//! | `OPENAI_API_KEY`              | enables the OpenAI backend               |
//! | `OPENROUTER_API_KEY`          | enables OpenRouter (preferred)           |
//! | `ARENA_OPENAI_BASE_URL`       | OpenAI-compatible base URL               |
//! | `ARENA_OPENROUTER_BASE_URL`   | OpenRouter base URL                      |
//! | `ARENA_REQUEST_TIMEOUT_SECS`  | per-call timeout before stub fallback    |
//! | `ARENA_CONTEXT_WINDOW`        | utterances sent as debate context        |
//! | `ARENA_CONTINUE_PROBABILITY`  | chance a reply follows each utterance    |
//! | `ARENA_JUDGE_MODEL`           | model used to judge matches              |

use std::env;
use std::time::Duration;

use coordination::{DebateConfig, MatchConfig, ResilienceConfig};

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
/// Sent as `HTTP-Referer` / `X-Title` so OpenRouter can attribute traffic.
const DEFAULT_APP_REFERER: &str = "https://synthetic-arena.app";
const DEFAULT_APP_TITLE: &str = "Synthetic Arena";

const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
const ENV_OPENROUTER_API_KEY: &str = "OPENROUTER_API_KEY";
const ENV_OPENAI_BASE_URL: &str = "ARENA_OPENAI_BASE_URL";
const ENV_OPENROUTER_BASE_URL: &str = "ARENA_OPENROUTER_BASE_URL";
const ENV_REQUEST_TIMEOUT_SECS: &str = "ARENA_REQUEST_TIMEOUT_SECS";
const ENV_CONTEXT_WINDOW: &str = "ARENA_CONTEXT_WINDOW";
const ENV_CONTINUE_PROBABILITY: &str = "ARENA_CONTINUE_PROBABILITY";
const ENV_JUDGE_MODEL: &str = "ARENA_JUDGE_MODEL";

/// Credentials and endpoints for the HTTP backends.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub openai_api_key: Option<String>,
    pub openrouter_api_key: Option<String>,
    pub openai_base_url: String,
    pub openrouter_base_url: String,
    /// Client-side HTTP timeout. The resilience layer enforces the same bound.
    pub request_timeout: Duration,
    pub app_referer: String,
    pub app_title: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openrouter_api_key: None,
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            openrouter_base_url: DEFAULT_OPENROUTER_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            app_referer: DEFAULT_APP_REFERER.to_string(),
            app_title: DEFAULT_APP_TITLE.to_string(),
        }
    }
}

impl GatewayConfig {
    /// Whether any real backend has credentials.
    pub fn has_credentials(&self) -> bool {
        self.openai_api_key.is_some() || self.openrouter_api_key.is_some()
    }
}

/// Everything the binary injects into the engines.
#[derive(Debug, Clone, Default)]
pub struct ArenaConfig {
    pub gateway: GatewayConfig,
    pub resilience: ResilienceConfig,
    pub debate: DebateConfig,
    pub matches: MatchConfig,
}

impl ArenaConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Unparseable values keep
    /// their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config = Self::default();

        config.gateway.openai_api_key = var(ENV_OPENAI_API_KEY);
        config.gateway.openrouter_api_key = var(ENV_OPENROUTER_API_KEY);
        if let Some(url) = var(ENV_OPENAI_BASE_URL) {
            config.gateway.openai_base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(url) = var(ENV_OPENROUTER_BASE_URL) {
            config.gateway.openrouter_base_url = url.trim_end_matches('/').to_string();
        }

        if let Some(secs) = var(ENV_REQUEST_TIMEOUT_SECS).and_then(|v| v.parse::<u64>().ok()) {
            let timeout = Duration::from_secs(secs.max(1));
            config.gateway.request_timeout = timeout;
            config.resilience.timeout = timeout;
        }

        if let Some(window) = var(ENV_CONTEXT_WINDOW).and_then(|v| v.parse::<usize>().ok()) {
            config.debate.context_window = window.max(1);
        }
        if let Some(p) = var(ENV_CONTINUE_PROBABILITY).and_then(|v| v.parse::<f64>().ok()) {
            if p.is_finite() {
                config.debate.continue_probability = p.clamp(0.0, 1.0);
            }
        }

        if let Some(model) = var(ENV_JUDGE_MODEL) {
            config.matches.judge.model = model;
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from(pairs: &[(&str, &str)]) -> ArenaConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ArenaConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_without_env() {
        let config = from(&[]);
        assert!(!config.gateway.has_credentials());
        assert_eq!(config.gateway.openai_base_url, DEFAULT_OPENAI_BASE_URL);
        assert_eq!(config.gateway.openrouter_base_url, DEFAULT_OPENROUTER_BASE_URL);
        assert_eq!(config.resilience.timeout, Duration::from_secs(60));
        assert_eq!(config.debate.context_window, 15);
        assert_eq!(config.matches.judge.model, "gpt-3.5-turbo");
    }

    #[test]
    fn test_overrides_applied() {
        let config = from(&[
            (ENV_OPENROUTER_API_KEY, "sk-or"),
            (ENV_OPENAI_BASE_URL, "http://localhost:8080/v1/"),
            (ENV_REQUEST_TIMEOUT_SECS, "5"),
            (ENV_CONTEXT_WINDOW, "4"),
            (ENV_CONTINUE_PROBABILITY, "0.5"),
            (ENV_JUDGE_MODEL, "gpt-4o-mini"),
        ]);
        assert_eq!(config.gateway.openrouter_api_key.as_deref(), Some("sk-or"));
        assert!(config.gateway.openai_api_key.is_none());
        assert_eq!(config.gateway.openai_base_url, "http://localhost:8080/v1");
        assert_eq!(config.gateway.request_timeout, Duration::from_secs(5));
        assert_eq!(config.resilience.timeout, Duration::from_secs(5));
        assert_eq!(config.debate.context_window, 4);
        assert_eq!(config.debate.continue_probability, 0.5);
        assert_eq!(config.matches.judge.model, "gpt-4o-mini");
    }

    #[test]
    fn test_bad_values_keep_defaults() {
        let config = from(&[
            (ENV_OPENAI_API_KEY, "   "),
            (ENV_REQUEST_TIMEOUT_SECS, "soon"),
            (ENV_CONTINUE_PROBABILITY, "3.5"),
            (ENV_CONTEXT_WINDOW, "0"),
        ]);
        assert!(config.gateway.openai_api_key.is_none());
        assert_eq!(config.gateway.request_timeout, Duration::from_secs(60));
        assert_eq!(config.debate.continue_probability, 1.0);
        assert_eq!(config.debate.context_window, 1);
    }
}
