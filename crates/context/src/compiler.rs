//! Prompt compilation — flattening a trimmed `ContextFrame` into the
//! ordered message list the upstream API expects.
//!
//! Pure structural work: no token accounting here. Group order is fixed
//! (system prompts, character definition, scenario, lore, history, user
//! input). Lore entries are re-tagged `role=system` with a distinguishing
//! prefix so the model treats them as authoritative context rather than
//! conversation.

use powergate_core::frame::ContextFrame;
use powergate_core::message::{Role, WireMessage};

/// Content prefix marking an injected lore entry.
const LORE_PREFIX: &str = "[Lore/Info]: ";

/// Compile a frame into wire messages, consuming it.
pub fn compile(frame: ContextFrame) -> Vec<WireMessage> {
    let mut compiled = Vec::with_capacity(frame.len());

    let passthrough = frame
        .system_prompts
        .into_iter()
        .chain(frame.character_definition)
        .chain(frame.scenario);
    for msg in passthrough {
        compiled.push(WireMessage {
            role: msg.role,
            content: msg.content,
        });
    }

    for lore in frame.active_lore {
        compiled.push(WireMessage {
            role: Role::System,
            content: format!("{LORE_PREFIX}{}", lore.content),
        });
    }

    for msg in frame.history {
        compiled.push(WireMessage {
            role: msg.role,
            content: msg.content,
        });
    }

    if let Some(input) = frame.user_input {
        compiled.push(WireMessage {
            role: input.role,
            content: input.content,
        });
    }

    compiled
}

#[cfg(test)]
mod tests {
    use super::*;
    use powergate_core::message::Message;

    #[test]
    fn groups_emit_in_fixed_order() {
        let mut frame = ContextFrame::default();
        frame.system_prompts.push(Message::system("sys"));
        frame.character_definition.push(Message::system("char"));
        frame.scenario.push(Message::system("scene"));
        frame.active_lore.push(Message::system("dragon facts"));
        frame.history.push(Message::user("hello"));
        frame.history.push(Message::assistant("hi"));
        frame.user_input = Some(Message::user("go on"));

        let wire = compile(frame);
        let contents: Vec<&str> = wire.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(
            contents,
            vec![
                "sys",
                "char",
                "scene",
                "[Lore/Info]: dragon facts",
                "hello",
                "hi",
                "go on"
            ]
        );
    }

    #[test]
    fn lore_is_retagged_as_system() {
        let mut frame = ContextFrame::default();
        frame.active_lore.push(Message::user("smuggled lore"));

        let wire = compile(frame);
        assert_eq!(wire.len(), 1);
        assert_eq!(wire[0].role, Role::System);
        assert!(wire[0].content.starts_with("[Lore/Info]: "));
    }

    #[test]
    fn history_roles_pass_through() {
        let mut frame = ContextFrame::default();
        frame.history.push(Message::user("q"));
        frame.history.push(Message::assistant("a"));

        let wire = compile(frame);
        assert_eq!(wire[0].role, Role::User);
        assert_eq!(wire[1].role, Role::Assistant);
    }

    #[test]
    fn empty_frame_compiles_to_nothing() {
        assert!(compile(ContextFrame::default()).is_empty());
    }

    #[test]
    fn missing_user_input_is_omitted() {
        let mut frame = ContextFrame::default();
        frame.history.push(Message::user("only history"));
        let wire = compile(frame);
        assert_eq!(wire.len(), 1);
        assert_eq!(wire[0].content, "only history");
    }
}
