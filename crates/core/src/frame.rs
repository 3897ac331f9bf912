//! The `ContextFrame` — the pre-compilation representation of what the
//! model will see, as ordered tiered groups.
//!
//! Group order is also emission order after compilation:
//! system prompts, character definition, scenario, active lore, history,
//! user input. `history` is chronological (oldest → newest) both before
//! and after trimming.

use crate::message::{Message, Role};
use serde::{Deserialize, Serialize};

/// A structured view of one request's context, grouped by priority tier.
///
/// Lifecycle: constructed per request from caller-supplied messages,
/// mutated in place by token-budget trimming, consumed exactly once by
/// the Prompt Compiler, then discarded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextFrame {
    /// Base system instructions. Mandatory tier.
    #[serde(default)]
    pub system_prompts: Vec<Message>,

    /// Persona / character card content. Mandatory tier.
    #[serde(default)]
    pub character_definition: Vec<Message>,

    /// Current scene or room rules. Mandatory tier.
    #[serde(default)]
    pub scenario: Vec<Message>,

    /// Retrieved lore entries, pre-sorted most relevant first. Medium tier.
    #[serde(default)]
    pub active_lore: Vec<Message>,

    /// Conversation history, oldest → newest. Low tier.
    #[serde(default)]
    pub history: Vec<Message>,

    /// The message being answered. Mandatory tier.
    #[serde(default)]
    pub user_input: Option<Message>,
}

impl ContextFrame {
    /// Build a frame from a flat, chronological message list.
    ///
    /// Convention: a leading system message becomes `system_prompts`, a
    /// trailing user message becomes `user_input`, and everything in
    /// between is `history`. The flat proxy case is thus the degenerate
    /// frame with empty character/scenario/lore groups.
    pub fn from_messages(messages: Vec<Message>) -> Self {
        let mut frame = Self::default();
        let mut messages = messages;

        if messages.first().is_some_and(|m| m.role == Role::System) {
            frame.system_prompts.push(messages.remove(0));
        }
        if messages.last().is_some_and(|m| m.role == Role::User) {
            frame.user_input = messages.pop();
        }
        frame.history = messages;
        frame
    }

    /// The mandatory-tier messages in concatenation order:
    /// system prompts, character definition, scenario, user input.
    pub fn mandatory_messages(&self) -> Vec<&Message> {
        self.system_prompts
            .iter()
            .chain(self.character_definition.iter())
            .chain(self.scenario.iter())
            .chain(self.user_input.iter())
            .collect()
    }

    /// Total number of messages across all groups.
    pub fn len(&self) -> usize {
        self.system_prompts.len()
            + self.character_definition.len()
            + self.scenario.len()
            + self.active_lore.len()
            + self.history.len()
            + usize::from(self.user_input.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_messages_extracts_leading_system() {
        let frame = ContextFrame::from_messages(vec![
            Message::system("rules"),
            Message::user("one"),
            Message::assistant("two"),
            Message::user("three"),
        ]);
        assert_eq!(frame.system_prompts.len(), 1);
        assert_eq!(frame.user_input.as_ref().unwrap().content, "three");
        assert_eq!(frame.history.len(), 2);
        assert_eq!(frame.history[0].content, "one");
    }

    #[test]
    fn from_messages_without_system_or_input() {
        let frame = ContextFrame::from_messages(vec![
            Message::user("a"),
            Message::assistant("b"),
        ]);
        assert!(frame.system_prompts.is_empty());
        assert!(frame.user_input.is_none());
        assert_eq!(frame.history.len(), 2);
    }

    #[test]
    fn from_messages_single_user_message() {
        let frame = ContextFrame::from_messages(vec![Message::user("only")]);
        assert!(frame.history.is_empty());
        assert_eq!(frame.user_input.as_ref().unwrap().content, "only");
    }

    #[test]
    fn mandatory_order_is_system_character_scenario_input() {
        let mut frame = ContextFrame::default();
        frame.system_prompts.push(Message::system("s"));
        frame.character_definition.push(Message::system("c"));
        frame.scenario.push(Message::system("sc"));
        frame.user_input = Some(Message::user("u"));
        frame.active_lore.push(Message::system("lore"));

        let mandatory: Vec<&str> = frame
            .mandatory_messages()
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(mandatory, vec!["s", "c", "sc", "u"]);
    }

    #[test]
    fn len_counts_all_groups() {
        let mut frame = ContextFrame::default();
        assert!(frame.is_empty());
        frame.history.push(Message::user("h"));
        frame.user_input = Some(Message::user("u"));
        assert_eq!(frame.len(), 2);
    }
}
