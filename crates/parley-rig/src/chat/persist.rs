//! Durable write of a completed turn.

use super::{RetrievedContext, Source};
use crate::rag::TempDocuments;
use crate::store::{ConversationStore, MessageDraft, MessageRecord, MessageRole};
use crate::{Result, TRACING_TARGET_CHAT};

/// A finished turn waiting to be stored.
#[derive(Debug)]
pub(crate) struct CompletedTurn<'a> {
    pub session_id: &'a str,
    pub client_id: &'a str,
    pub message: &'a str,
    pub retrieved: &'a RetrievedContext,
    pub used_temp_documents: bool,
    pub content: String,
    pub reasoning: String,
    /// Deduplicated citations.
    pub sources: &'a [Source],
}

/// Removes a single leading blank line some models emit before the answer.
pub(crate) fn strip_leading_blank_line(content: &str) -> &str {
    content.strip_prefix("\n\n").unwrap_or(content)
}

/// Stores the user message, purges the temporary documents the turn read
/// when they were used, then stores the assistant message.
///
/// A cleanup failure is logged and does not fail the turn.
pub(crate) async fn persist_turn(
    store: &dyn ConversationStore,
    temp: &TempDocuments,
    turn: CompletedTurn<'_>,
) -> Result<(MessageRecord, MessageRecord)> {
    let mut user = MessageDraft::new(turn.session_id, turn.client_id, MessageRole::User, turn.message);
    if turn.used_temp_documents {
        let snapshot = turn.retrieved.temp_files.clone().unwrap_or_default();
        user.temp_files = Some(serde_json::to_value(snapshot)?);
        user.search_context = Some(turn.retrieved.search_context.clone());
    }
    let user = store.append_message(user).await?;

    if turn.used_temp_documents
        && let Err(error) = temp
            .cleanup_files(
                turn.session_id,
                turn.client_id,
                &turn.retrieved.temp_file_records,
            )
            .await
    {
        tracing::error!(
            target: TRACING_TARGET_CHAT,
            session_id = turn.session_id,
            error = %error,
            "Failed to clean up temporary documents"
        );
    }

    let mut assistant = MessageDraft::new(
        turn.session_id,
        turn.client_id,
        MessageRole::Assistant,
        strip_leading_blank_line(&turn.content),
    );
    assistant.reasoning = Some(turn.reasoning).filter(|reasoning| !reasoning.is_empty());
    assistant.sources = Some(serde_json::to_value(turn.sources)?);
    let assistant = store.append_message(assistant).await?;

    tracing::debug!(
        target: TRACING_TARGET_CHAT,
        session_id = turn.session_id,
        user_message = %user.id,
        assistant_message = %assistant.id,
        "Turn persisted"
    );
    Ok((user, assistant))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_one_leading_blank_line_is_removed() {
        assert_eq!(strip_leading_blank_line("\n\nParis"), "Paris");
        assert_eq!(strip_leading_blank_line("\n\n\n\nParis"), "\n\nParis");
        assert_eq!(strip_leading_blank_line("\nParis"), "\nParis");
    }
}
