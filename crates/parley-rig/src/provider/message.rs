//! Provider-neutral prompt representation.

use serde::{Deserialize, Serialize};

/// Author of a prompt message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptRole {
    System,
    User,
    Assistant,
}

/// A single message of a prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: PromptRole,
    pub content: String,
}

impl PromptMessage {
    /// Creates a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::System,
            content: content.into(),
        }
    }

    /// Creates a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::User,
            content: content.into(),
        }
    }

    /// Creates an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::Assistant,
            content: content.into(),
        }
    }
}

/// An ordered list of messages: one system message, the history, and the new input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    pub messages: Vec<PromptMessage>,
}

impl Prompt {
    /// Creates a prompt from its messages.
    pub fn new(messages: Vec<PromptMessage>) -> Self {
        Self { messages }
    }

    /// Returns the concatenated system messages, if any.
    pub fn system(&self) -> Option<String> {
        let system: Vec<&str> = self
            .messages
            .iter()
            .filter(|m| m.role == PromptRole::System)
            .map(|m| m.content.as_str())
            .collect();
        (!system.is_empty()).then(|| system.join("\n\n"))
    }

    /// Returns the last user message, which is the input being answered.
    pub fn input(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == PromptRole::User)
            .map(|m| m.content.as_str())
    }

    /// Returns the non-system messages preceding the final user input.
    pub fn history(&self) -> &[PromptMessage] {
        let start = self
            .messages
            .iter()
            .position(|m| m.role != PromptRole::System)
            .unwrap_or(self.messages.len());
        let end = self
            .messages
            .iter()
            .rposition(|m| m.role == PromptRole::User)
            .unwrap_or(start)
            .max(start);
        &self.messages[start..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_system_history_and_input() {
        let prompt = Prompt::new(vec![
            PromptMessage::system("be helpful"),
            PromptMessage::user("hi"),
            PromptMessage::assistant("hello"),
            PromptMessage::user("how are you?"),
        ]);

        assert_eq!(prompt.system().as_deref(), Some("be helpful"));
        assert_eq!(prompt.input(), Some("how are you?"));
        assert_eq!(prompt.history().len(), 2);
        assert_eq!(prompt.history()[1], PromptMessage::assistant("hello"));
    }

    #[test]
    fn history_is_empty_without_prior_turns() {
        let prompt = Prompt::new(vec![
            PromptMessage::system("sys"),
            PromptMessage::user("question"),
        ]);
        assert!(prompt.history().is_empty());
    }
}
