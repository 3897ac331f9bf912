//! Upstream HTTP client for OpenAI-compatible chat-completion endpoints.
//!
//! One long-lived `reqwest::Client` is shared across all requests and
//! providers; per-model URL and bearer key come from the model config.

use powergate_core::error::ProxyError;
use powergate_core::model::ModelConfig;
use std::time::Duration;

const CHAT_COMPLETIONS_SUFFIX: &str = "/chat/completions";

/// A shared HTTP client for upstream providers.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: reqwest::Client,
    fallback_key: Option<String>,
}

impl UpstreamClient {
    /// Create a client with the given total request timeout.
    ///
    /// The timeout also bounds streaming responses; a stream cut off by
    /// it is treated like any other transport failure by the refund
    /// guard.
    pub fn new(timeout: Duration) -> Result<Self, ProxyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProxyError::UpstreamTransport(format!("client build: {e}")))?;
        Ok(Self {
            client,
            fallback_key: None,
        })
    }

    /// Bearer key used for models configured without their own.
    pub fn with_fallback_key(mut self, key: Option<String>) -> Self {
        self.fallback_key = key;
        self
    }

    /// The chat-completions endpoint for a configured base URL.
    ///
    /// The suffix is appended only when absent, so both bare base URLs
    /// and full endpoint URLs are accepted.
    pub fn endpoint_url(api_url: &str) -> String {
        if api_url.ends_with(CHAT_COMPLETIONS_SUFFIX) {
            api_url.to_string()
        } else {
            format!(
                "{}{CHAT_COMPLETIONS_SUFFIX}",
                api_url.trim_end_matches('/')
            )
        }
    }

    fn bearer_key<'a>(&'a self, model: &'a ModelConfig) -> &'a str {
        if model.api_key.is_empty() {
            self.fallback_key.as_deref().unwrap_or_default()
        } else {
            &model.api_key
        }
    }

    /// POST a chat-completion payload to the model's endpoint.
    pub async fn post(
        &self,
        model: &ModelConfig,
        payload: &serde_json::Value,
    ) -> Result<reqwest::Response, reqwest::Error> {
        self.client
            .post(Self::endpoint_url(&model.api_url))
            .header("Authorization", format!("Bearer {}", self.bearer_key(model)))
            .header("Content-Type", "application/json")
            .json(payload)
            .send()
            .await
    }
}
