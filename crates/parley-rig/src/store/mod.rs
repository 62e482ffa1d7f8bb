//! Conversation persistence seam.
//!
//! The chat core talks to [`ConversationStore`]; [`PgConversationStore`] is the
//! PostgreSQL implementation.

mod postgres;

use async_trait::async_trait;
use jiff::Timestamp;
pub use parley_postgres::types::{MessageRole, OffsetPage, OffsetPagination};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use self::postgres::PgConversationStore;
use crate::Result;

/// A conversation owned by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: String,
    pub client_id: String,
    pub role_name: Option<String>,
    pub system_prompt: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl SessionRecord {
    /// Returns the system prompt override, if set and non-blank.
    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt
            .as_deref()
            .filter(|prompt| !prompt.trim().is_empty())
    }
}

/// A session with a summary of its messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    #[serde(flatten)]
    pub session: SessionRecord,
    pub first_message: Option<String>,
    pub last_message: Option<String>,
    pub message_count: i64,
}

/// Editable session fields. `Some(None)` clears a field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionChanges {
    pub role_name: Option<Option<String>>,
    pub system_prompt: Option<Option<String>>,
}

impl SessionChanges {
    /// Returns whether nothing would change.
    pub fn is_empty(&self) -> bool {
        self.role_name.is_none() && self.system_prompt.is_none()
    }
}

/// A persisted message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub id: Uuid,
    pub session_id: String,
    pub client_id: String,
    pub role: MessageRole,
    pub content: String,
    pub reasoning: Option<String>,
    pub search_context: Option<String>,
    pub sources: Option<serde_json::Value>,
    pub temp_files: Option<serde_json::Value>,
    pub created_at: Timestamp,
}

/// A message about to be persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageDraft {
    pub session_id: String,
    pub client_id: String,
    pub role: MessageRole,
    pub content: String,
    pub reasoning: Option<String>,
    pub search_context: Option<String>,
    pub sources: Option<serde_json::Value>,
    pub temp_files: Option<serde_json::Value>,
}

impl MessageDraft {
    /// Creates a draft with only the required fields set.
    pub fn new(
        session_id: impl Into<String>,
        client_id: impl Into<String>,
        role: MessageRole,
        content: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            client_id: client_id.into(),
            role,
            content: content.into(),
            reasoning: None,
            search_context: None,
            sources: None,
            temp_files: None,
        }
    }
}

/// A temporary document attached to a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TempFileRecord {
    pub id: Uuid,
    pub filename: String,
    pub original_filename: String,
    pub mime_type: String,
    pub size: i64,
    pub path: String,
    pub session_id: String,
    pub client_id: String,
    pub is_short_document: bool,
    pub full_content: Option<String>,
    pub created_at: Timestamp,
    pub deleted_at: Option<Timestamp>,
}

/// A temporary document record about to be persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct TempFileDraft {
    pub filename: String,
    pub original_filename: String,
    pub mime_type: String,
    pub size: i64,
    pub path: String,
    pub session_id: String,
    pub client_id: String,
    pub is_short_document: bool,
    pub full_content: Option<String>,
}

/// A document uploaded for reading, with its cached analyses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReaderFileRecord {
    pub id: Uuid,
    /// Stored filename, unique among the client's reader files.
    pub filename: String,
    pub mime_type: String,
    pub size: i64,
    pub path: String,
    pub client_id: String,
    pub summary: Option<String>,
    pub deep_reading: Option<String>,
    pub mind_map: Option<String>,
    pub created_at: Timestamp,
}

impl ReaderFileRecord {
    /// Returns the cached analysis of that kind, if one was generated.
    pub fn analysis(&self, kind: ReaderAnalysis) -> Option<&str> {
        let cached = match kind {
            ReaderAnalysis::Summary => &self.summary,
            ReaderAnalysis::DeepReading => &self.deep_reading,
            ReaderAnalysis::MindMap => &self.mind_map,
        };
        cached.as_deref().filter(|content| !content.is_empty())
    }
}

/// A reader file record about to be persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ReaderFileDraft {
    pub filename: String,
    pub mime_type: String,
    pub size: i64,
    pub path: String,
    pub client_id: String,
}

/// Kinds of generated reading analyses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReaderAnalysis {
    /// Whole-document summary.
    Summary,
    /// Page-by-page close reading.
    DeepReading,
    /// Heading-only markdown outline.
    MindMap,
}

/// Durable storage of sessions, messages, temporary file and reader file records.
///
/// Every lookup is scoped by the owning client.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Creates a session with a fresh public token.
    async fn create_session(
        &self,
        client_id: &str,
        role_name: Option<String>,
        system_prompt: Option<String>,
    ) -> Result<SessionRecord>;

    /// Finds a session owned by the client.
    async fn find_session(&self, session_id: &str, client_id: &str)
    -> Result<Option<SessionRecord>>;

    /// Lists the client's sessions, most recently updated first.
    async fn list_sessions(&self, client_id: &str) -> Result<Vec<SessionSummary>>;

    /// Applies changes. Returns `None` when the session does not exist.
    async fn update_session(
        &self,
        session_id: &str,
        client_id: &str,
        changes: SessionChanges,
    ) -> Result<Option<SessionRecord>>;

    /// Deletes a session and its messages, soft-deleting its temporary files.
    async fn delete_session(&self, session_id: &str, client_id: &str) -> Result<bool>;

    /// Appends a message to its session.
    async fn append_message(&self, draft: MessageDraft) -> Result<MessageRecord>;

    /// Lists a session's messages in ascending creation order.
    async fn session_messages(&self, session_id: &str, client_id: &str)
    -> Result<Vec<MessageRecord>>;

    /// Returns the `limit` most recent messages in ascending creation order.
    async fn recent_messages(
        &self,
        session_id: &str,
        client_id: &str,
        limit: usize,
    ) -> Result<Vec<MessageRecord>>;

    /// Returns one page of messages; page one holds the most recent ones.
    async fn page_messages(
        &self,
        session_id: &str,
        client_id: &str,
        pagination: OffsetPagination,
    ) -> Result<OffsetPage<MessageRecord>>;

    /// Deletes a message owned by the client. Returns whether it existed.
    async fn delete_message(&self, message_id: Uuid, client_id: &str) -> Result<bool>;

    /// Records an uploaded temporary file.
    async fn create_temp_file(&self, draft: TempFileDraft) -> Result<TempFileRecord>;

    /// Lists a session's active temporary files, newest first.
    async fn active_temp_files(&self, session_id: &str, client_id: &str)
    -> Result<Vec<TempFileRecord>>;

    /// Soft-deletes a session's active temporary files.
    async fn soft_delete_temp_files(&self, session_id: &str, client_id: &str) -> Result<usize>;

    /// Soft-deletes the given active temporary files of a session.
    async fn soft_delete_temp_files_by_ids(
        &self,
        session_id: &str,
        client_id: &str,
        file_ids: &[Uuid],
    ) -> Result<usize>;

    /// Records an uploaded reader file.
    async fn create_reader_file(&self, draft: ReaderFileDraft) -> Result<ReaderFileRecord>;

    /// Lists the client's reader files, newest first.
    async fn reader_files(&self, client_id: &str) -> Result<Vec<ReaderFileRecord>>;

    /// Finds a reader file owned by the client.
    async fn find_reader_file(
        &self,
        filename: &str,
        client_id: &str,
    ) -> Result<Option<ReaderFileRecord>>;

    /// Soft-deletes a reader file. Returns whether it existed.
    async fn delete_reader_file(&self, filename: &str, client_id: &str) -> Result<bool>;

    /// Caches a generated analysis. Returns whether the file still exists.
    async fn save_reader_analysis(
        &self,
        filename: &str,
        client_id: &str,
        kind: ReaderAnalysis,
        content: &str,
    ) -> Result<bool>;
}
