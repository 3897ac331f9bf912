//! Context assembly — tiered, budget-aware trimming of a `ContextFrame`.
//!
//! Three priority tiers, processed strictly in order:
//!
//! 1. **Mandatory** (system prompts, character definition, scenario, user
//!    input) — always included verbatim, never trimmed
//! 2. **Medium** (active lore, pre-sorted most relevant first) — greedy
//!    front-to-back, stop at first overflow
//! 3. **Low** (history) — greedy newest-first, re-reversed to chronological
//!
//! Reserving the mandatory tier first and then filling greedily
//! newest-first guarantees recency bias for conversational coherence
//! while keeping identity, persona, and scenario non-negotiable.
//!
//! # Determinism
//!
//! Assembly is deterministic: identical inputs always produce identical
//! outputs. No random or time-dependent logic.

use crate::token::Tokenizer;
use powergate_core::frame::ContextFrame;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// What the assembler did to a frame.
///
/// `overflow` is the soft signal that the mandatory tier alone exceeded
/// the budget: the mandatory content is authoritative and was kept
/// verbatim, lore and history were emptied, and the caller decides how to
/// degrade. Overflow is never an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrimReport {
    /// Token cost of the mandatory tier (including reply priming).
    pub mandatory_tokens: usize,
    /// Token cost of the lore entries that survived.
    pub lore_tokens: usize,
    /// Token cost of the history messages that survived.
    pub history_tokens: usize,
    /// Lore entries dropped at the budget boundary.
    pub lore_dropped: usize,
    /// History messages dropped at the budget boundary.
    pub history_dropped: usize,
    /// The budget the frame was trimmed against.
    pub budget: usize,
    /// True when the mandatory tier alone exceeded the budget.
    pub overflow: bool,
}

impl TrimReport {
    /// Total token cost of the trimmed frame.
    pub fn total_tokens(&self) -> usize {
        self.mandatory_tokens + self.lore_tokens + self.history_tokens
    }
}

/// The context assembler. Stateless — create one per model and reuse it.
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    tokenizer: Tokenizer,
}

impl ContextAssembler {
    pub fn new(tokenizer: Tokenizer) -> Self {
        Self { tokenizer }
    }

    /// Trim `frame` in place so its total token cost fits `max_tokens`.
    ///
    /// The mandatory tier is costed first; lore then history fill the
    /// remainder greedily with no partial inclusion, no reordering, and
    /// no backtracking. History is walked newest → oldest and the kept
    /// suffix is restored to chronological order.
    pub fn assemble(&self, frame: &mut ContextFrame, max_tokens: usize) -> TrimReport {
        let mandatory_tokens = self.tokenizer.count_messages(frame.mandatory_messages());

        if mandatory_tokens > max_tokens {
            warn!(
                mandatory_tokens,
                max_tokens, "Mandatory context exceeds token budget, dropping lore and history"
            );
            let lore_dropped = frame.active_lore.len();
            let history_dropped = frame.history.len();
            frame.active_lore.clear();
            frame.history.clear();
            return TrimReport {
                mandatory_tokens,
                lore_tokens: 0,
                history_tokens: 0,
                lore_dropped,
                history_dropped,
                budget: max_tokens,
                overflow: true,
            };
        }

        let mut remaining = max_tokens - mandatory_tokens;

        // Medium tier: lore, most relevant first, stop at first overflow.
        let mut lore_tokens = 0;
        let mut kept_lore = Vec::new();
        let lore_total = frame.active_lore.len();
        for lore in frame.active_lore.drain(..) {
            let cost = self.tokenizer.count_message(&lore);
            if cost > remaining {
                break;
            }
            remaining -= cost;
            lore_tokens += cost;
            kept_lore.push(lore);
        }
        let lore_dropped = lore_total - kept_lore.len();
        frame.active_lore = kept_lore;

        // Low tier: history, newest first, stop at first overflow.
        let mut history_tokens = 0;
        let mut kept_history = Vec::new();
        let history_total = frame.history.len();
        for msg in frame.history.drain(..).rev() {
            let cost = self.tokenizer.count_message(&msg);
            if cost > remaining {
                break;
            }
            remaining -= cost;
            history_tokens += cost;
            kept_history.push(msg);
        }
        let history_dropped = history_total - kept_history.len();
        // Restore chronological order
        kept_history.reverse();
        frame.history = kept_history;

        TrimReport {
            mandatory_tokens,
            lore_tokens,
            history_tokens,
            lore_dropped,
            history_dropped,
            budget: max_tokens,
            overflow: false,
        }
    }
}
