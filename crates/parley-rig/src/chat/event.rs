//! Events pushed to the caller during a chat turn.

use serde::{Deserialize, Serialize};

use super::Source;
use crate::Result;

/// Reserved payload that ends a successful turn.
pub const DONE_SENTINEL: &str = "[DONE]";

/// One frame of the push channel.
///
/// Every variant except [`ChatEvent::Done`] serializes as
/// `{"type": "...", "content": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "lowercase")]
pub enum ChatEvent {
    /// Progress of the retrieval step.
    Status(String),
    /// Answer token.
    Content(String),
    /// Reasoning trace token.
    Reasoning(String),
    /// JSON-encoded citation array, sent once after the last token.
    Sources(String),
    /// The turn failed; no further frames follow.
    Error(String),
    /// The turn completed and was persisted.
    Done,
}

impl ChatEvent {
    /// Creates a status event.
    pub fn status(message: impl Into<String>) -> Self {
        Self::Status(message.into())
    }

    /// Creates a sources event carrying the encoded citations.
    pub fn sources(sources: &[Source]) -> Result<Self> {
        Ok(Self::Sources(serde_json::to_string(sources)?))
    }

    /// Returns the `type` discriminator.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Status(_) => "status",
            Self::Content(_) => "content",
            Self::Reasoning(_) => "reasoning",
            Self::Sources(_) => "sources",
            Self::Error(_) => "error",
            Self::Done => "done",
        }
    }

    /// Returns whether no frame follows this one.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error(_))
    }

    /// Returns the frame payload: the JSON object, or the end sentinel.
    pub fn payload(&self) -> String {
        if let Self::Done = self {
            return DONE_SENTINEL.to_owned();
        }
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"type":"{}","content":""}}"#, self.kind())
        })
    }

    /// Renders the event as a server-sent event frame.
    pub fn to_sse_frame(&self) -> String {
        format!("data: {}\n\n", self.payload())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::SourceKind;

    #[test]
    fn frames_are_typed_json() {
        let event = ChatEvent::Content("Par".into());
        assert_eq!(event.to_sse_frame(), "data: {\"type\":\"content\",\"content\":\"Par\"}\n\n");
        assert_eq!(ChatEvent::Done.to_sse_frame(), "data: [DONE]\n\n");
    }

    #[test]
    fn sources_content_is_encoded_array() {
        let event = ChatEvent::sources(&[Source::new(SourceKind::Web, "https://a.com")]).unwrap();
        let ChatEvent::Sources(content) = &event else {
            panic!("expected sources");
        };
        assert_eq!(content, r#"[{"type":"web","url":"https://a.com"}]"#);

        let parsed: serde_json::Value = serde_json::from_str(&event.payload()).unwrap();
        assert_eq!(parsed["type"], "sources");
    }

    #[test]
    fn terminal_events() {
        assert!(ChatEvent::Done.is_terminal());
        assert!(ChatEvent::Error("boom".into()).is_terminal());
        assert!(!ChatEvent::status("Searching web resources...").is_terminal());
    }
}
