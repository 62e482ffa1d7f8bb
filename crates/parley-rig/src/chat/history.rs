//! Conversation memory rebuilt from persisted messages.

use crate::Result;
use crate::store::{ConversationStore, MessageRecord};

/// One remembered exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryTurn {
    /// User text, with the retrieval context of that turn spliced in.
    pub input: String,
    /// Assistant answer.
    pub output: String,
}

/// Pairs each user message with the assistant message directly after it and
/// keeps the `max_pairs` most recent pairs in chronological order.
///
/// Messages without a partner, such as a user message whose reply was never
/// stored, are skipped.
pub fn reconstruct(messages: &[MessageRecord], max_pairs: usize) -> Vec<HistoryTurn> {
    let mut turns = Vec::new();
    let mut index = 0;
    while index < messages.len() {
        let user = &messages[index];
        match messages.get(index + 1) {
            Some(reply) if user.role.is_user() && reply.role.is_assistant() => {
                turns.push(HistoryTurn {
                    input: user_input(user),
                    output: reply.content.clone(),
                });
                index += 2;
            }
            _ => index += 1,
        }
    }

    let skip = turns.len().saturating_sub(max_pairs);
    turns.split_off(skip)
}

fn user_input(message: &MessageRecord) -> String {
    match message.search_context.as_deref() {
        Some(context) if !context.is_empty() => {
            format!("{}\n\nRelated context:\n{context}", message.content)
        }
        _ => message.content.clone(),
    }
}

/// Loads the session's newest `2 * max_pairs` messages and rebuilds its memory.
pub(crate) async fn load(
    store: &dyn ConversationStore,
    session_id: &str,
    client_id: &str,
    max_pairs: usize,
) -> Result<Vec<HistoryTurn>> {
    let messages = store
        .recent_messages(session_id, client_id, max_pairs.saturating_mul(2))
        .await?;
    Ok(reconstruct(&messages, max_pairs))
}

#[cfg(test)]
mod tests {
    use jiff::Timestamp;
    use uuid::Uuid;

    use super::*;
    use crate::store::{MessageDraft, MessageRole};
    use crate::testing::InMemoryStore;

    fn message(role: MessageRole, content: &str) -> MessageRecord {
        MessageRecord {
            id: Uuid::now_v7(),
            session_id: "s".into(),
            client_id: "c".into(),
            role,
            content: content.into(),
            reasoning: None,
            search_context: None,
            sources: None,
            temp_files: None,
            created_at: Timestamp::now(),
        }
    }

    fn pairs(n: usize) -> Vec<MessageRecord> {
        (0..n)
            .flat_map(|i| {
                [
                    message(MessageRole::User, &format!("q{i}")),
                    message(MessageRole::Assistant, &format!("a{i}")),
                ]
            })
            .collect()
    }

    #[test]
    fn keeps_most_recent_pairs_in_order() {
        let turns = reconstruct(&pairs(25), 20);
        assert_eq!(turns.len(), 20);
        assert_eq!(turns[0].input, "q5");
        assert_eq!(turns[19].output, "a24");

        assert_eq!(reconstruct(&pairs(3), 20).len(), 3);
    }

    #[test]
    fn orphaned_user_message_is_skipped() {
        let mut messages = pairs(1);
        messages.push(message(MessageRole::User, "unanswered"));
        messages.extend(pairs(1));

        let turns = reconstruct(&messages, 20);
        assert_eq!(turns.len(), 2);
        assert!(turns.iter().all(|t| t.input != "unanswered"));
    }

    #[test]
    fn search_context_is_spliced_into_input() {
        let mut user = message(MessageRole::User, "What was the revenue?");
        user.search_context = Some("Revenue was $5M.".into());
        let turns = reconstruct(&[user, message(MessageRole::Assistant, "$5M")], 20);
        assert_eq!(
            turns[0].input,
            "What was the revenue?\n\nRelated context:\nRevenue was $5M."
        );
    }

    #[tokio::test]
    async fn load_reads_only_the_newest_window() {
        let store = InMemoryStore::new();
        let session = store.create_session("c", None, None).await.unwrap();
        for i in 0..25 {
            for (role, content) in [
                (MessageRole::User, format!("q{i}")),
                (MessageRole::Assistant, format!("a{i}")),
            ] {
                let draft = MessageDraft::new(&session.session_id, "c", role, content);
                store.append_message(draft).await.unwrap();
            }
        }

        let turns = load(&store, &session.session_id, "c", 20).await.unwrap();
        assert_eq!(turns.len(), 20);
        assert_eq!(turns[0].input, "q5");
        assert_eq!(turns[19].output, "a24");

        let recent = store
            .recent_messages(&session.session_id, "c", 3)
            .await
            .unwrap();
        let contents: Vec<&str> = recent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["a23", "q24", "a24"]);

        let turns = load(&store, &session.session_id, "c", 0).await.unwrap();
        assert!(turns.is_empty());
    }
}
