//! Test doubles for the chat pipeline's external seams.
//!
//! This module provides deterministic stand-ins for the language model, the
//! embedding model, web search and the conversation store, so the chat
//! pipeline can be exercised without network access or a database.
//!
//! # Feature Flag
//!
//! This module is only available when the `test-utils` feature is enabled:
//!
//! ```toml
//! [dev-dependencies]
//! parley-rig = { version = "...", features = ["test-utils"] }
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use parley_rig::provider::ModelDelta;
//! use parley_rig::testing::{FakeEmbedder, InMemoryStore, ScriptedModel};
//!
//! let model = ScriptedModel::new(vec![ModelDelta::Content("Hello".into())]);
//! let embedder = FakeEmbedder::default();
//! let store = InMemoryStore::new();
//! ```

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::StreamExt;
use jiff::{SignedDuration, Timestamp};
use tokio::sync::Notify;
use uuid::Uuid;

use crate::provider::{DeltaStream, Embedder, LanguageModel, ModelDelta, Prompt};
use crate::store::{
    ConversationStore, MessageDraft, MessageRecord, OffsetPage, OffsetPagination, ReaderAnalysis,
    ReaderFileDraft, ReaderFileRecord, SessionChanges, SessionRecord, SessionSummary,
    TempFileDraft, TempFileRecord,
};
use crate::web::{WebResult, WebSearch};
use crate::{Error, Result};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// How a [`ScriptedModel`] stream ends.
#[derive(Debug, Clone, Default)]
enum StreamEnding {
    /// The stream finishes after the scripted deltas.
    #[default]
    Complete,
    /// Opening the stream fails.
    FailOnOpen(String),
    /// The scripted deltas are followed by an error.
    FailAfterDeltas(String),
    /// The scripted deltas are followed by a stream that never ends.
    Hang,
    /// The first delta is sent, the rest wait until the gate is notified.
    Gated(Arc<Notify>),
}

/// A language model that replays scripted deltas.
///
/// Every prompt it receives is recorded for inspection.
#[derive(Debug)]
pub struct ScriptedModel {
    model_name: String,
    deltas: Vec<ModelDelta>,
    ending: StreamEnding,
    completion: String,
    prompts: Mutex<Vec<Prompt>>,
}

impl ScriptedModel {
    /// Creates a model streaming `deltas` on every call.
    pub fn new(deltas: Vec<ModelDelta>) -> Self {
        Self {
            model_name: "scripted".to_owned(),
            deltas,
            ending: StreamEnding::Complete,
            completion: String::new(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Creates a model streaming the given content tokens.
    pub fn from_tokens(tokens: &[&str]) -> Self {
        Self::new(
            tokens
                .iter()
                .map(|token| ModelDelta::Content((*token).to_owned()))
                .collect(),
        )
    }

    /// Sets the answer returned by [`LanguageModel::complete`].
    pub fn with_completion(mut self, completion: impl Into<String>) -> Self {
        self.completion = completion.into();
        self
    }

    /// Makes opening the stream fail with a provider error.
    pub fn failing_on_open(mut self, message: impl Into<String>) -> Self {
        self.ending = StreamEnding::FailOnOpen(message.into());
        self
    }

    /// Appends a provider error after the scripted deltas.
    pub fn failing_after_deltas(mut self, message: impl Into<String>) -> Self {
        self.ending = StreamEnding::FailAfterDeltas(message.into());
        self
    }

    /// Keeps the stream open forever after the scripted deltas.
    pub fn hanging(mut self) -> Self {
        self.ending = StreamEnding::Hang;
        self
    }

    /// Holds every delta after the first until `gate` is notified.
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.ending = StreamEnding::Gated(gate);
        self
    }

    /// Returns every prompt received so far.
    pub fn prompts(&self) -> Vec<Prompt> {
        lock(&self.prompts).clone()
    }

    /// Returns the most recent prompt.
    pub fn last_prompt(&self) -> Option<Prompt> {
        lock(&self.prompts).last().cloned()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn stream(&self, prompt: &Prompt) -> Result<DeltaStream> {
        lock(&self.prompts).push(prompt.clone());

        let deltas = futures::stream::iter(self.deltas.clone().into_iter().map(Ok));
        let stream = match &self.ending {
            StreamEnding::Complete => deltas.boxed(),
            StreamEnding::FailOnOpen(message) => {
                return Err(Error::provider(&self.model_name, message));
            }
            StreamEnding::FailAfterDeltas(message) => {
                let error = Error::provider(&self.model_name, message);
                deltas.chain(futures::stream::once(async { Err(error) })).boxed()
            }
            StreamEnding::Hang => deltas.chain(futures::stream::pending()).boxed(),
            StreamEnding::Gated(gate) => {
                let gate = Arc::clone(gate);
                let mut rest = self.deltas.clone().into_iter().map(Ok);
                let first: Vec<_> = rest.next().into_iter().collect();
                let rest: Vec<_> = rest.collect();
                let released = async move {
                    gate.notified().await;
                    futures::stream::iter(rest)
                };
                futures::stream::iter(first)
                    .chain(futures::stream::once(released).flatten())
                    .boxed()
            }
        };
        Ok(stream)
    }

    async fn complete(&self, prompt: &Prompt) -> Result<String> {
        lock(&self.prompts).push(prompt.clone());
        if let StreamEnding::FailOnOpen(message) = &self.ending {
            return Err(Error::provider(&self.model_name, message));
        }
        Ok(self.completion.clone())
    }
}

/// Dimensions of [`FakeEmbedder`] vectors.
pub const FAKE_EMBEDDING_DIMENSIONS: usize = 64;

/// A deterministic bag-of-words embedder.
///
/// Each lowercase alphanumeric token is hashed into one of
/// [`FAKE_EMBEDDING_DIMENSIONS`] buckets, so texts sharing words score higher.
#[derive(Debug, Default)]
pub struct FakeEmbedder {
    calls: AtomicUsize,
}

impl FakeEmbedder {
    /// Returns how many embedding batches were requested.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn embed(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; FAKE_EMBEDDING_DIMENSIONS];
        let tokens = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|token| !token.is_empty());
        for token in tokens {
            let mut hasher = DefaultHasher::new();
            token.to_lowercase().hash(&mut hasher);
            vector[(hasher.finish() % FAKE_EMBEDDING_DIMENSIONS as u64) as usize] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    fn model_name(&self) -> &str {
        "fake-embedding"
    }

    fn ndims(&self) -> usize {
        FAKE_EMBEDDING_DIMENSIONS
    }

    async fn embed_texts(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|text| Self::embed(text)).collect())
    }
}

/// A web search returning fixed results and counting its queries.
#[derive(Debug, Default)]
pub struct StaticWebSearch {
    results: Vec<WebResult>,
    queries: Mutex<Vec<String>>,
}

impl StaticWebSearch {
    /// Creates a search returning `results` for every query.
    pub fn new(results: Vec<WebResult>) -> Self {
        Self {
            results,
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Returns the queries received so far.
    pub fn queries(&self) -> Vec<String> {
        lock(&self.queries).clone()
    }
}

#[async_trait]
impl WebSearch for StaticWebSearch {
    async fn search(&self, query: &str) -> Result<Vec<WebResult>> {
        lock(&self.queries).push(query.to_owned());
        Ok(self.results.clone())
    }
}

/// A web search that always fails.
#[derive(Debug, Clone)]
pub struct FailingWebSearch {
    message: String,
}

impl FailingWebSearch {
    /// Creates a search failing with `message`.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl WebSearch for FailingWebSearch {
    async fn search(&self, _query: &str) -> Result<Vec<WebResult>> {
        Err(Error::retrieval(&self.message))
    }
}

#[derive(Debug, Default)]
struct StoreState {
    ticks: i64,
    sessions: Vec<SessionRecord>,
    messages: Vec<MessageRecord>,
    temp_files: Vec<TempFileRecord>,
    reader_files: Vec<ReaderFileRecord>,
}

impl StoreState {
    fn session_mut(&mut self, session_id: &str, client_id: &str) -> Option<&mut SessionRecord> {
        self.sessions
            .iter_mut()
            .find(|s| s.session_id == session_id && s.client_id == client_id)
    }

    fn reader_file_mut(&mut self, filename: &str, client_id: &str) -> Option<&mut ReaderFileRecord> {
        self.reader_files
            .iter_mut()
            .find(|f| f.filename == filename && f.client_id == client_id)
    }
}

/// A [`ConversationStore`] kept in memory.
///
/// Timestamps advance by one millisecond per write, so ordering by creation
/// time is always strict.
#[derive(Debug)]
pub struct InMemoryStore {
    epoch: Timestamp,
    state: Mutex<StoreState>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            epoch: Timestamp::now(),
            state: Mutex::new(StoreState::default()),
        }
    }

    fn tick(&self, state: &mut StoreState) -> Timestamp {
        state.ticks += 1;
        self.epoch + SignedDuration::from_millis(state.ticks)
    }

    /// Returns every temporary file row of a session, including soft-deleted ones.
    pub fn temp_file_rows(&self, session_id: &str) -> Vec<TempFileRecord> {
        lock(&self.state)
            .temp_files
            .iter()
            .filter(|file| file.session_id == session_id)
            .cloned()
            .collect()
    }

    /// Returns every message of a session regardless of its owner.
    pub fn message_rows(&self, session_id: &str) -> Vec<MessageRecord> {
        lock(&self.state)
            .messages
            .iter()
            .filter(|message| message.session_id == session_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn create_session(
        &self,
        client_id: &str,
        role_name: Option<String>,
        system_prompt: Option<String>,
    ) -> Result<SessionRecord> {
        let mut state = lock(&self.state);
        let now = self.tick(&mut state);
        let session = SessionRecord {
            session_id: Uuid::new_v4().to_string(),
            client_id: client_id.to_owned(),
            role_name,
            system_prompt,
            created_at: now,
            updated_at: now,
        };
        state.sessions.push(session.clone());
        Ok(session)
    }

    async fn find_session(
        &self,
        session_id: &str,
        client_id: &str,
    ) -> Result<Option<SessionRecord>> {
        let mut state = lock(&self.state);
        Ok(state.session_mut(session_id, client_id).map(|s| s.clone()))
    }

    async fn list_sessions(&self, client_id: &str) -> Result<Vec<SessionSummary>> {
        let state = lock(&self.state);
        let mut sessions: Vec<&SessionRecord> = state
            .sessions
            .iter()
            .filter(|s| s.client_id == client_id)
            .collect();
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        Ok(sessions
            .into_iter()
            .map(|session| {
                let messages: Vec<&MessageRecord> = state
                    .messages
                    .iter()
                    .filter(|m| m.session_id == session.session_id && m.client_id == client_id)
                    .collect();
                SessionSummary {
                    session: session.clone(),
                    first_message: messages.first().map(|m| m.content.clone()),
                    last_message: messages.last().map(|m| m.content.clone()),
                    message_count: messages.len() as i64,
                }
            })
            .collect())
    }

    async fn update_session(
        &self,
        session_id: &str,
        client_id: &str,
        changes: SessionChanges,
    ) -> Result<Option<SessionRecord>> {
        let mut state = lock(&self.state);
        let now = self.tick(&mut state);
        let Some(session) = state.session_mut(session_id, client_id) else {
            return Ok(None);
        };
        if let Some(role_name) = changes.role_name {
            session.role_name = role_name;
        }
        if let Some(system_prompt) = changes.system_prompt {
            session.system_prompt = system_prompt;
        }
        session.updated_at = now;
        Ok(Some(session.clone()))
    }

    async fn delete_session(&self, session_id: &str, client_id: &str) -> Result<bool> {
        let mut state = lock(&self.state);
        let now = self.tick(&mut state);
        let before = state.sessions.len();
        state
            .sessions
            .retain(|s| !(s.session_id == session_id && s.client_id == client_id));
        if state.sessions.len() == before {
            return Ok(false);
        }

        state
            .messages
            .retain(|m| !(m.session_id == session_id && m.client_id == client_id));
        for file in state.temp_files.iter_mut().filter(|f| {
            f.session_id == session_id && f.client_id == client_id && f.deleted_at.is_none()
        }) {
            file.deleted_at = Some(now);
        }
        Ok(true)
    }

    async fn append_message(&self, draft: MessageDraft) -> Result<MessageRecord> {
        let mut state = lock(&self.state);
        let now = self.tick(&mut state);
        let Some(session) = state.session_mut(&draft.session_id, &draft.client_id) else {
            return Err(Error::not_found("Session not found"));
        };
        session.updated_at = now;

        let message = MessageRecord {
            id: Uuid::now_v7(),
            session_id: draft.session_id,
            client_id: draft.client_id,
            role: draft.role,
            content: draft.content,
            reasoning: draft.reasoning,
            search_context: draft.search_context,
            sources: draft.sources,
            temp_files: draft.temp_files,
            created_at: now,
        };
        state.messages.push(message.clone());
        Ok(message)
    }

    async fn session_messages(
        &self,
        session_id: &str,
        client_id: &str,
    ) -> Result<Vec<MessageRecord>> {
        let state = lock(&self.state);
        Ok(state
            .messages
            .iter()
            .filter(|m| m.session_id == session_id && m.client_id == client_id)
            .cloned()
            .collect())
    }

    async fn recent_messages(
        &self,
        session_id: &str,
        client_id: &str,
        limit: usize,
    ) -> Result<Vec<MessageRecord>> {
        let messages = self.session_messages(session_id, client_id).await?;
        let skip = messages.len().saturating_sub(limit);
        Ok(messages.into_iter().skip(skip).collect())
    }

    async fn page_messages(
        &self,
        session_id: &str,
        client_id: &str,
        pagination: OffsetPagination,
    ) -> Result<OffsetPage<MessageRecord>> {
        let messages = self.session_messages(session_id, client_id).await?;
        let total = messages.len() as i64;
        let mut items: Vec<MessageRecord> = messages
            .into_iter()
            .rev()
            .skip(pagination.offset as usize)
            .take(pagination.limit as usize)
            .collect();
        items.reverse();
        Ok(OffsetPage::new(items, total))
    }

    async fn delete_message(&self, message_id: Uuid, client_id: &str) -> Result<bool> {
        let mut state = lock(&self.state);
        let before = state.messages.len();
        state
            .messages
            .retain(|m| !(m.id == message_id && m.client_id == client_id));
        Ok(state.messages.len() != before)
    }

    async fn create_temp_file(&self, draft: TempFileDraft) -> Result<TempFileRecord> {
        let mut state = lock(&self.state);
        let now = self.tick(&mut state);
        let file = TempFileRecord {
            id: Uuid::new_v4(),
            filename: draft.filename,
            original_filename: draft.original_filename,
            mime_type: draft.mime_type,
            size: draft.size,
            path: draft.path,
            session_id: draft.session_id,
            client_id: draft.client_id,
            is_short_document: draft.is_short_document,
            full_content: draft.full_content,
            created_at: now,
            deleted_at: None,
        };
        state.temp_files.push(file.clone());
        Ok(file)
    }

    async fn active_temp_files(
        &self,
        session_id: &str,
        client_id: &str,
    ) -> Result<Vec<TempFileRecord>> {
        let state = lock(&self.state);
        let mut files: Vec<TempFileRecord> = state
            .temp_files
            .iter()
            .filter(|f| {
                f.session_id == session_id && f.client_id == client_id && f.deleted_at.is_none()
            })
            .cloned()
            .collect();
        files.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(files)
    }

    async fn soft_delete_temp_files(&self, session_id: &str, client_id: &str) -> Result<usize> {
        let mut state = lock(&self.state);
        let now = self.tick(&mut state);
        let mut deleted = 0;
        for file in state.temp_files.iter_mut().filter(|f| {
            f.session_id == session_id && f.client_id == client_id && f.deleted_at.is_none()
        }) {
            file.deleted_at = Some(now);
            deleted += 1;
        }
        Ok(deleted)
    }

    async fn soft_delete_temp_files_by_ids(
        &self,
        session_id: &str,
        client_id: &str,
        file_ids: &[Uuid],
    ) -> Result<usize> {
        let mut state = lock(&self.state);
        let now = self.tick(&mut state);
        let mut deleted = 0;
        for file in state.temp_files.iter_mut().filter(|f| {
            f.session_id == session_id
                && f.client_id == client_id
                && f.deleted_at.is_none()
                && file_ids.contains(&f.id)
        }) {
            file.deleted_at = Some(now);
            deleted += 1;
        }
        Ok(deleted)
    }

    async fn create_reader_file(&self, draft: ReaderFileDraft) -> Result<ReaderFileRecord> {
        let mut state = lock(&self.state);
        let now = self.tick(&mut state);
        let file = ReaderFileRecord {
            id: Uuid::new_v4(),
            filename: draft.filename,
            mime_type: draft.mime_type,
            size: draft.size,
            path: draft.path,
            client_id: draft.client_id,
            summary: None,
            deep_reading: None,
            mind_map: None,
            created_at: now,
        };
        state.reader_files.push(file.clone());
        Ok(file)
    }

    async fn reader_files(&self, client_id: &str) -> Result<Vec<ReaderFileRecord>> {
        let state = lock(&self.state);
        let mut files: Vec<ReaderFileRecord> = state
            .reader_files
            .iter()
            .filter(|f| f.client_id == client_id)
            .cloned()
            .collect();
        files.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(files)
    }

    async fn find_reader_file(
        &self,
        filename: &str,
        client_id: &str,
    ) -> Result<Option<ReaderFileRecord>> {
        let state = lock(&self.state);
        Ok(state
            .reader_files
            .iter()
            .find(|f| f.filename == filename && f.client_id == client_id)
            .cloned())
    }

    async fn delete_reader_file(&self, filename: &str, client_id: &str) -> Result<bool> {
        let mut state = lock(&self.state);
        let before = state.reader_files.len();
        state
            .reader_files
            .retain(|f| !(f.filename == filename && f.client_id == client_id));
        Ok(state.reader_files.len() != before)
    }

    async fn save_reader_analysis(
        &self,
        filename: &str,
        client_id: &str,
        kind: ReaderAnalysis,
        content: &str,
    ) -> Result<bool> {
        let mut state = lock(&self.state);
        let Some(file) = state.reader_file_mut(filename, client_id) else {
            return Ok(false);
        };
        let slot = match kind {
            ReaderAnalysis::Summary => &mut file.summary,
            ReaderAnalysis::DeepReading => &mut file.deep_reading,
            ReaderAnalysis::MindMap => &mut file.mind_map,
        };
        *slot = Some(content.to_owned());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MessageRole;

    #[tokio::test]
    async fn fake_embeddings_favour_shared_words() {
        let embedder = FakeEmbedder::default();
        let vectors = embedder
            .embed_texts(vec![
                "revenue grew".to_owned(),
                "Revenue GREW".to_owned(),
                "cats sleep".to_owned(),
            ])
            .await
            .unwrap();
        assert_eq!(vectors[0], vectors[1]);
        assert_ne!(vectors[0], vectors[2]);
        assert_eq!(embedder.calls(), 1);
    }

    #[tokio::test]
    async fn store_pages_newest_first() {
        let store = InMemoryStore::new();
        let session = store.create_session("c", None, None).await.unwrap();
        for i in 0..5 {
            let draft = MessageDraft::new(&session.session_id, "c", MessageRole::User, i.to_string());
            store.append_message(draft).await.unwrap();
        }

        let page = store
            .page_messages(&session.session_id, "c", OffsetPagination::from_page(1, 2))
            .await
            .unwrap();
        let contents: Vec<&str> = page.items.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["3", "4"]);
        assert_eq!(page.total, 5);
    }

    #[tokio::test]
    async fn store_scopes_sessions_by_client() {
        let store = InMemoryStore::new();
        let session = store.create_session("a", None, None).await.unwrap();
        assert!(store.find_session(&session.session_id, "b").await.unwrap().is_none());
        assert!(!store.delete_session(&session.session_id, "b").await.unwrap());
        assert!(store.delete_session(&session.session_id, "a").await.unwrap());
    }
}
