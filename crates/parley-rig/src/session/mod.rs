//! Session management for chat conversations.
//!
//! Sessions, their messages and their temporary file records live in the
//! [`ConversationStore`]; deleting a session also purges its temporary
//! documents from disk.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::rag::{SessionDocument, TempDocuments};
use crate::store::{
    ConversationStore, MessageRecord, OffsetPagination, SessionChanges, SessionRecord,
    SessionSummary,
};
use crate::{Error, Result, TRACING_TARGET_SESSION};

/// Default number of messages per page.
pub const DEFAULT_PAGE_SIZE: i64 = 20;

/// Request to create a new session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSession {
    pub role_name: Option<String>,
    /// System prompt override.
    pub system_prompt: Option<String>,
}

impl CreateSession {
    /// Creates a request without role or prompt.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the role name.
    pub fn with_role_name(mut self, role_name: impl Into<String>) -> Self {
        self.role_name = Some(role_name.into());
        self
    }

    /// Sets a custom system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }
}

/// Pagination details of a message page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub has_more: bool,
}

/// A session with one page of its messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMessages {
    pub session: SessionRecord,
    /// Messages in ascending time order; page one holds the most recent ones.
    pub messages: Vec<MessageRecord>,
    pub pagination: PageInfo,
    /// Active temporary documents.
    pub temp_files: Vec<SessionDocument>,
}

/// Session CRUD on top of the conversation store.
#[derive(Clone)]
pub struct SessionService {
    store: Arc<dyn ConversationStore>,
    temp: Arc<TempDocuments>,
}

impl SessionService {
    /// Creates the session service.
    pub fn new(store: Arc<dyn ConversationStore>, temp: Arc<TempDocuments>) -> Self {
        Self { store, temp }
    }

    /// Creates a session for the client.
    pub async fn create(&self, client_id: &str, request: CreateSession) -> Result<SessionRecord> {
        let session = self
            .store
            .create_session(client_id, request.role_name, request.system_prompt)
            .await?;
        tracing::info!(
            target: TRACING_TARGET_SESSION,
            client_id,
            session_id = %session.session_id,
            "Session created"
        );
        Ok(session)
    }

    /// Lists the client's sessions, most recently updated first.
    pub async fn list(&self, client_id: &str) -> Result<Vec<SessionSummary>> {
        let sessions = self.store.list_sessions(client_id).await?;
        tracing::debug!(
            target: TRACING_TARGET_SESSION,
            client_id,
            session_count = sessions.len(),
            "Sessions listed"
        );
        Ok(sessions)
    }

    /// Returns one page of a session's messages with its active temporary files.
    pub async fn session_messages(
        &self,
        session_id: &str,
        client_id: &str,
        page: i64,
        page_size: i64,
    ) -> Result<SessionMessages> {
        let session = self.find(session_id, client_id).await?;
        let pagination = OffsetPagination::from_page(page, page_size);
        let result = self
            .store
            .page_messages(session_id, client_id, pagination)
            .await?;
        let temp_files = self.temp.session_documents(session_id, client_id).await?;

        let info = PageInfo {
            total: result.total,
            page: pagination.page_number(),
            page_size: pagination.limit,
            has_more: result.has_more(&pagination),
        };

        Ok(SessionMessages {
            session,
            messages: result.items,
            pagination: info,
            temp_files,
        })
    }

    /// Updates the role name and system prompt of a session.
    pub async fn update(
        &self,
        session_id: &str,
        client_id: &str,
        changes: SessionChanges,
    ) -> Result<SessionRecord> {
        if changes.is_empty() {
            return self.find(session_id, client_id).await;
        }

        let session = self
            .store
            .update_session(session_id, client_id, changes)
            .await?
            .ok_or_else(|| Error::not_found("Session not found"))?;
        tracing::info!(target: TRACING_TARGET_SESSION, session_id, "Session updated");
        Ok(session)
    }

    /// Deletes a session, its messages and its temporary documents.
    pub async fn delete(&self, session_id: &str, client_id: &str) -> Result<()> {
        if !self.store.delete_session(session_id, client_id).await? {
            return Err(Error::not_found("Session not found"));
        }

        if let Err(error) = self.temp.cleanup_session(session_id, client_id).await {
            tracing::warn!(
                target: TRACING_TARGET_SESSION,
                session_id,
                error = %error,
                "Failed to purge temporary documents of deleted session"
            );
        }

        tracing::info!(target: TRACING_TARGET_SESSION, session_id, "Session deleted");
        Ok(())
    }

    async fn find(&self, session_id: &str, client_id: &str) -> Result<SessionRecord> {
        self.store
            .find_session(session_id, client_id)
            .await?
            .ok_or_else(|| Error::not_found("Session not found"))
    }
}

impl std::fmt::Debug for SessionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionService").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::rag::UploadedFile;
    use crate::store::{MessageDraft, MessageRole};
    use crate::testing::{FakeEmbedder, InMemoryStore};
    use crate::{RagConfig, StorageConfig};

    struct Fixture {
        _dir: TempDir,
        store: Arc<InMemoryStore>,
        temp: Arc<TempDocuments>,
        sessions: SessionService,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(InMemoryStore::new());
        let temp = Arc::new(
            TempDocuments::new(
                store.clone(),
                Arc::new(FakeEmbedder::default()),
                StorageConfig::new(dir.path()),
                &RagConfig::default(),
            )
            .unwrap(),
        );
        let sessions = SessionService::new(store.clone(), temp.clone());
        Fixture {
            _dir: dir,
            store,
            temp,
            sessions,
        }
    }

    #[tokio::test]
    async fn create_and_page_messages() {
        let f = fixture();
        let session = f
            .sessions
            .create("c", CreateSession::new().with_role_name("Tutor"))
            .await
            .unwrap();
        assert_eq!(session.role_name.as_deref(), Some("Tutor"));

        for i in 0..3 {
            let role = if i % 2 == 0 { MessageRole::User } else { MessageRole::Assistant };
            let draft = MessageDraft::new(&session.session_id, "c", role, format!("m{i}"));
            f.store.append_message(draft).await.unwrap();
        }

        let page = f
            .sessions
            .session_messages(&session.session_id, "c", 1, 2)
            .await
            .unwrap();
        let contents: Vec<&str> = page.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m1", "m2"]);
        assert_eq!(
            page.pagination,
            PageInfo {
                total: 3,
                page: 1,
                page_size: 2,
                has_more: true,
            }
        );

        let summaries = f.sessions.list("c").await.unwrap();
        assert_eq!(summaries[0].message_count, 3);
        assert_eq!(summaries[0].first_message.as_deref(), Some("m0"));
    }

    #[tokio::test]
    async fn foreign_session_is_not_found() {
        let f = fixture();
        let session = f.sessions.create("a", CreateSession::new()).await.unwrap();

        let error = f
            .sessions
            .session_messages(&session.session_id, "b", 1, DEFAULT_PAGE_SIZE)
            .await
            .unwrap_err();
        assert_eq!(error.to_string(), "Session not found");
        assert!(f.sessions.delete(&session.session_id, "b").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn update_only_touches_given_fields() {
        let f = fixture();
        let session = f
            .sessions
            .create("c", CreateSession::new().with_role_name("Tutor").with_system_prompt("Teach."))
            .await
            .unwrap();

        let changes = SessionChanges {
            system_prompt: Some(None),
            ..SessionChanges::default()
        };
        let updated = f
            .sessions
            .update(&session.session_id, "c", changes)
            .await
            .unwrap();
        assert_eq!(updated.role_name.as_deref(), Some("Tutor"));
        assert!(updated.system_prompt.is_none());
    }

    #[tokio::test]
    async fn delete_cascades_to_temp_documents() {
        let f = fixture();
        let session = f.sessions.create("c", CreateSession::new()).await.unwrap();
        let upload = f
            .temp
            .upload(&session.session_id, "c", UploadedFile::new("a.txt", "text/plain", "x"))
            .await
            .unwrap();
        assert!(upload.path.exists());

        f.sessions.delete(&session.session_id, "c").await.unwrap();
        assert!(!upload.path.exists());
        assert!(f.store.find_session(&session.session_id, "c").await.unwrap().is_none());
        assert!(
            f.store
                .temp_file_rows(&session.session_id)
                .iter()
                .all(|file| file.deleted_at.is_some())
        );
    }
}
