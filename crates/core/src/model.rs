//! Managed model configuration.
//!
//! Model entries are owned by the admin-managed configuration store; the
//! proxy reads them but never mutates them.

use serde::{Deserialize, Serialize};

/// Configuration for one managed upstream model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Store identifier — what callers pass as `model`.
    pub id: i64,

    /// Display name for listings.
    pub name: String,

    /// The real upstream model string (e.g. "gpt-4o").
    pub model_id: String,

    /// Provider label ("openai", "deepseek", ...).
    pub provider: String,

    /// Upstream base URL; `/chat/completions` is appended only if absent.
    pub api_url: String,

    /// Bearer key for the upstream call. Never exposed on listing surfaces.
    pub api_key: String,

    /// Credits debited per request. Must be >= 0.
    pub power_cost: i64,

    /// Upstream context window in tokens.
    pub context_length: i64,

    /// Disabled models must never be charged or forwarded.
    pub enabled: bool,
}

impl ModelConfig {
    /// The input-token budget reserved for context assembly: half the
    /// context window, leaving the rest as generation headroom.
    pub fn context_budget(&self) -> usize {
        (self.context_length / 2).max(0) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(context_length: i64) -> ModelConfig {
        ModelConfig {
            id: 1,
            name: "Test".into(),
            model_id: "test-model".into(),
            provider: "openai".into(),
            api_url: "https://api.example.com/v1".into(),
            api_key: "sk-test".into(),
            power_cost: 10,
            context_length,
            enabled: true,
        }
    }

    #[test]
    fn context_budget_is_half_the_window() {
        assert_eq!(model(4096).context_budget(), 2048);
        assert_eq!(model(16385).context_budget(), 8192);
    }

    #[test]
    fn context_budget_never_negative() {
        assert_eq!(model(0).context_budget(), 0);
    }
}
