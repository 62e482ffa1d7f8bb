//! PostgreSQL conversation store.

use async_trait::async_trait;
use parley_postgres::PgClient;
use parley_postgres::model::{
    Message, NewMessage, NewReaderFile, NewSession, NewSessionTempFile, ReaderFile, Session,
    SessionOverview, SessionTempFile, UpdateSession,
};
use parley_postgres::query::{
    MessageRepository, ReaderAnalysisColumn, ReaderFileRepository, SessionRepository,
    SessionTempFileRepository,
};
use uuid::Uuid;

use super::{
    ConversationStore, MessageDraft, MessageRecord, OffsetPage, OffsetPagination, ReaderAnalysis,
    ReaderFileDraft, ReaderFileRecord, SessionChanges, SessionRecord, SessionSummary,
    TempFileDraft, TempFileRecord,
};
use crate::Result;

/// [`ConversationStore`] backed by the parley PostgreSQL schema.
#[derive(Debug, Clone)]
pub struct PgConversationStore {
    db: PgClient,
}

impl PgConversationStore {
    /// Creates a store using the given client.
    pub fn new(db: PgClient) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ConversationStore for PgConversationStore {
    async fn create_session(
        &self,
        client_id: &str,
        role_name: Option<String>,
        system_prompt: Option<String>,
    ) -> Result<SessionRecord> {
        let mut conn = self.db.get_connection().await?;
        let session = conn
            .create_session(NewSession {
                session_id: Uuid::new_v4().to_string(),
                client_id: client_id.to_owned(),
                role_name,
                system_prompt,
            })
            .await?;
        Ok(session.into())
    }

    async fn find_session(
        &self,
        session_id: &str,
        client_id: &str,
    ) -> Result<Option<SessionRecord>> {
        let mut conn = self.db.get_connection().await?;
        let session = conn.find_session(session_id, client_id).await?;
        Ok(session.map(Into::into))
    }

    async fn list_sessions(&self, client_id: &str) -> Result<Vec<SessionSummary>> {
        let mut conn = self.db.get_connection().await?;
        let overviews = conn.list_session_overviews(client_id).await?;
        Ok(overviews.into_iter().map(Into::into).collect())
    }

    async fn update_session(
        &self,
        session_id: &str,
        client_id: &str,
        changes: SessionChanges,
    ) -> Result<Option<SessionRecord>> {
        let mut conn = self.db.get_connection().await?;
        let updates = UpdateSession {
            role_name: changes.role_name,
            system_prompt: changes.system_prompt,
            updated_at: None,
        };
        let session = conn.update_session(session_id, client_id, updates).await?;
        Ok(session.map(Into::into))
    }

    async fn delete_session(&self, session_id: &str, client_id: &str) -> Result<bool> {
        let mut conn = self.db.get_connection().await?;
        Ok(conn.delete_session_cascade(session_id, client_id).await?)
    }

    async fn append_message(&self, draft: MessageDraft) -> Result<MessageRecord> {
        let mut conn = self.db.get_connection().await?;
        let message = conn
            .append_session_message(NewMessage {
                id: Uuid::now_v7(),
                session_id: draft.session_id,
                client_id: draft.client_id,
                role: draft.role,
                content: draft.content,
                reasoning: draft.reasoning,
                search_context: draft.search_context,
                sources: draft.sources,
                temp_files: draft.temp_files,
            })
            .await?;
        Ok(message.into())
    }

    async fn session_messages(
        &self,
        session_id: &str,
        client_id: &str,
    ) -> Result<Vec<MessageRecord>> {
        let mut conn = self.db.get_connection().await?;
        let messages = conn.list_session_messages(session_id, client_id).await?;
        Ok(messages.into_iter().map(Into::into).collect())
    }

    async fn recent_messages(
        &self,
        session_id: &str,
        client_id: &str,
        limit: usize,
    ) -> Result<Vec<MessageRecord>> {
        let mut conn = self.db.get_connection().await?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let messages = conn
            .list_recent_session_messages(session_id, client_id, limit)
            .await?;
        Ok(messages.into_iter().map(Into::into).collect())
    }

    async fn page_messages(
        &self,
        session_id: &str,
        client_id: &str,
        pagination: OffsetPagination,
    ) -> Result<OffsetPage<MessageRecord>> {
        let mut conn = self.db.get_connection().await?;
        let page = conn
            .page_session_messages(session_id, client_id, pagination)
            .await?;
        Ok(page.map(Into::into))
    }

    async fn delete_message(&self, message_id: Uuid, client_id: &str) -> Result<bool> {
        let mut conn = self.db.get_connection().await?;
        Ok(conn.delete_message(message_id, client_id).await?)
    }

    async fn create_temp_file(&self, draft: TempFileDraft) -> Result<TempFileRecord> {
        let mut conn = self.db.get_connection().await?;
        let file = conn
            .create_session_temp_file(NewSessionTempFile {
                filename: draft.filename,
                original_filename: draft.original_filename,
                mime_type: draft.mime_type,
                size: draft.size,
                path: draft.path,
                session_id: draft.session_id,
                client_id: draft.client_id,
                is_short_document: draft.is_short_document,
                full_content: draft.full_content,
            })
            .await?;
        Ok(file.into())
    }

    async fn active_temp_files(
        &self,
        session_id: &str,
        client_id: &str,
    ) -> Result<Vec<TempFileRecord>> {
        let mut conn = self.db.get_connection().await?;
        let files = conn
            .list_active_session_temp_files(session_id, client_id)
            .await?;
        Ok(files.into_iter().map(Into::into).collect())
    }

    async fn soft_delete_temp_files(&self, session_id: &str, client_id: &str) -> Result<usize> {
        let mut conn = self.db.get_connection().await?;
        Ok(conn
            .soft_delete_session_temp_files(session_id, client_id)
            .await?)
    }

    async fn soft_delete_temp_files_by_ids(
        &self,
        session_id: &str,
        client_id: &str,
        file_ids: &[Uuid],
    ) -> Result<usize> {
        let mut conn = self.db.get_connection().await?;
        Ok(conn
            .soft_delete_session_temp_files_by_ids(session_id, client_id, file_ids)
            .await?)
    }

    async fn create_reader_file(&self, draft: ReaderFileDraft) -> Result<ReaderFileRecord> {
        let mut conn = self.db.get_connection().await?;
        let file = conn
            .create_reader_file(NewReaderFile {
                filename: draft.filename,
                mime_type: draft.mime_type,
                size: draft.size,
                path: draft.path,
                client_id: draft.client_id,
            })
            .await?;
        Ok(file.into())
    }

    async fn reader_files(&self, client_id: &str) -> Result<Vec<ReaderFileRecord>> {
        let mut conn = self.db.get_connection().await?;
        let files = conn.list_reader_files(client_id).await?;
        Ok(files.into_iter().map(Into::into).collect())
    }

    async fn find_reader_file(
        &self,
        filename: &str,
        client_id: &str,
    ) -> Result<Option<ReaderFileRecord>> {
        let mut conn = self.db.get_connection().await?;
        let file = conn.find_reader_file(filename, client_id).await?;
        Ok(file.map(Into::into))
    }

    async fn delete_reader_file(&self, filename: &str, client_id: &str) -> Result<bool> {
        let mut conn = self.db.get_connection().await?;
        Ok(conn.soft_delete_reader_file(filename, client_id).await?)
    }

    async fn save_reader_analysis(
        &self,
        filename: &str,
        client_id: &str,
        kind: ReaderAnalysis,
        content: &str,
    ) -> Result<bool> {
        let column = match kind {
            ReaderAnalysis::Summary => ReaderAnalysisColumn::Summary,
            ReaderAnalysis::DeepReading => ReaderAnalysisColumn::DeepReading,
            ReaderAnalysis::MindMap => ReaderAnalysisColumn::MindMap,
        };
        let mut conn = self.db.get_connection().await?;
        Ok(conn
            .save_reader_analysis(filename, client_id, column, content)
            .await?)
    }
}

impl From<ReaderFile> for ReaderFileRecord {
    fn from(file: ReaderFile) -> Self {
        Self {
            id: file.id,
            filename: file.filename,
            mime_type: file.mime_type,
            size: file.size,
            path: file.path,
            client_id: file.client_id,
            summary: file.summary,
            deep_reading: file.deep_reading,
            mind_map: file.mind_map,
            created_at: file.created_at.into(),
        }
    }
}

impl From<Session> for SessionRecord {
    fn from(session: Session) -> Self {
        Self {
            session_id: session.session_id,
            client_id: session.client_id,
            role_name: session.role_name,
            system_prompt: session.system_prompt,
            created_at: session.created_at.into(),
            updated_at: session.updated_at.into(),
        }
    }
}

impl From<SessionOverview> for SessionSummary {
    fn from(overview: SessionOverview) -> Self {
        Self {
            session: overview.session.into(),
            first_message: overview.first_message,
            last_message: overview.last_message,
            message_count: overview.message_count,
        }
    }
}

impl From<Message> for MessageRecord {
    fn from(message: Message) -> Self {
        Self {
            id: message.id,
            session_id: message.session_id,
            client_id: message.client_id,
            role: message.role,
            content: message.content,
            reasoning: message.reasoning,
            search_context: message.search_context,
            sources: message.sources,
            temp_files: message.temp_files,
            created_at: message.created_at.into(),
        }
    }
}

impl From<SessionTempFile> for TempFileRecord {
    fn from(file: SessionTempFile) -> Self {
        Self {
            id: file.id,
            filename: file.filename,
            original_filename: file.original_filename,
            mime_type: file.mime_type,
            size: file.size,
            path: file.path,
            session_id: file.session_id,
            client_id: file.client_id,
            is_short_document: file.is_short_document,
            full_content: file.full_content,
            created_at: file.created_at.into(),
            deleted_at: file.deleted_at.map(Into::into),
        }
    }
}
