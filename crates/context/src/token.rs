//! Token estimation.
//!
//! Uses a character-based heuristic: ~4 characters per token for BPE
//! tokenizers (GPT, DeepSeek, Claude families) on English text, accurate
//! within ~10%. Counts are a versioned approximation contract, not an
//! exact match for any vendor tokenizer: the same scheme always produces
//! the same count, so charged costs are reproducible across runs.

use powergate_core::message::Message;
use tracing::warn;

/// Per-message wire-format overhead in tokens.
///
/// Approximates the ChatML framing `<|start|>{role}\n{content}<|end|>\n`.
pub const MESSAGE_OVERHEAD: usize = 4;

/// Fixed overhead for priming the assistant reply.
pub const REPLY_PRIMING: usize = 3;

/// A named approximation scheme. Bump the name when constants change so
/// recorded costs stay attributable to the scheme that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Scheme {
    name: &'static str,
    chars_per_token: usize,
}

const DEFAULT_SCHEME: Scheme = Scheme {
    name: "general-v1",
    chars_per_token: 4,
};

const SCHEMES: &[(&str, Scheme)] = &[
    (
        "gpt-",
        Scheme {
            name: "openai-bpe-v1",
            chars_per_token: 4,
        },
    ),
    (
        "deepseek",
        Scheme {
            name: "deepseek-bpe-v1",
            chars_per_token: 4,
        },
    ),
    (
        "claude",
        Scheme {
            name: "claude-bpe-v1",
            chars_per_token: 4,
        },
    ),
];

/// Deterministic token counter for one model family.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    scheme: Scheme,
}

impl Tokenizer {
    /// Select the scheme for an upstream model string.
    ///
    /// Unknown families fall back to the general-purpose scheme; the
    /// fallback is diagnosed but never fatal.
    pub fn for_model(model_id: &str) -> Self {
        let lower = model_id.to_ascii_lowercase();
        for (prefix, scheme) in SCHEMES {
            if lower.starts_with(prefix) {
                return Self { scheme: *scheme };
            }
        }
        warn!(model = %model_id, scheme = DEFAULT_SCHEME.name, "No tokenizer scheme for model, using default");
        Self {
            scheme: DEFAULT_SCHEME,
        }
    }

    /// The name of the active approximation scheme.
    pub fn scheme_name(&self) -> &'static str {
        self.scheme.name
    }

    /// Estimate the token count for a string. Rounds up; empty is zero.
    pub fn count(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        let ratio = self.scheme.chars_per_token;
        (text.len() + ratio - 1) / ratio
    }

    /// Estimate tokens for a single message including per-message overhead.
    ///
    /// A `name` field costs its own tokens minus one: the role slot is
    /// always present and the name replaces part of it.
    pub fn count_message(&self, message: &Message) -> usize {
        let mut tokens = MESSAGE_OVERHEAD + self.count(message.role.as_str())
            + self.count(&message.content);
        if let Some(name) = &message.name {
            tokens += self.count(name);
            tokens = tokens.saturating_sub(1);
        }
        tokens
    }

    /// Estimate tokens for a message list, including reply priming.
    pub fn count_messages<'a, I>(&self, messages: I) -> usize
    where
        I: IntoIterator<Item = &'a Message>,
    {
        messages
            .into_iter()
            .map(|m| self.count_message(m))
            .sum::<usize>()
            + REPLY_PRIMING
    }
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self {
            scheme: DEFAULT_SCHEME,
        }
    }
}
