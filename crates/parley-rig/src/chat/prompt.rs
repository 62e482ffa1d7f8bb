//! Prompt assembly.

use super::HistoryTurn;
use crate::provider::{Prompt, PromptMessage};

/// System prompt used when the session has no override.
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are an intelligent AI assistant that helps users solve all kinds of problems.";

/// Context placeholder used when retrieval found nothing.
pub const EMPTY_CONTEXT: &str = "No relevant search results were found.";

/// Builds the prompt of a turn: system message with the retrieved context,
/// the remembered history, then the new input.
pub fn assemble(
    system_prompt: Option<&str>,
    history: &[HistoryTurn],
    search_context: &str,
    input: &str,
) -> Prompt {
    let system_prompt = system_prompt
        .filter(|prompt| !prompt.trim().is_empty())
        .unwrap_or(DEFAULT_SYSTEM_PROMPT);
    let context = if search_context.is_empty() {
        EMPTY_CONTEXT
    } else {
        search_context
    };

    let mut messages = Vec::with_capacity(history.len() * 2 + 2);
    messages.push(PromptMessage::system(format!(
        "{system_prompt}\n\nHere are some related search results for reference:\n\n{context}\n\n"
    )));
    for turn in history {
        messages.push(PromptMessage::user(&turn.input));
        messages.push(PromptMessage::assistant(&turn.output));
    }
    messages.push(PromptMessage::user(input));

    Prompt::new(messages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::PromptRole;

    #[test]
    fn layout_is_system_history_input() {
        let history = vec![HistoryTurn {
            input: "hi".into(),
            output: "hello".into(),
        }];
        let prompt = assemble(Some("Be brief."), &history, "ctx", "next");

        let roles: Vec<PromptRole> = prompt.messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                PromptRole::System,
                PromptRole::User,
                PromptRole::Assistant,
                PromptRole::User,
            ]
        );
        assert!(prompt.messages[0].content.starts_with("Be brief.\n\n"));
        assert!(prompt.messages[0].content.contains("\n\nctx\n\n"));
        assert_eq!(prompt.input(), Some("next"));
    }

    #[test]
    fn defaults_apply_to_blank_values() {
        let prompt = assemble(Some("  "), &[], "", "q");
        let system = &prompt.messages[0].content;
        assert!(system.starts_with(DEFAULT_SYSTEM_PROMPT));
        assert!(system.contains(EMPTY_CONTEXT));
    }
}
