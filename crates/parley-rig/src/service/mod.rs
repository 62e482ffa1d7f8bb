//! High-level service wiring the chat pipeline together.
//!
//! This module provides:
//! - [`RigService`] - Main entry point for the parley binary
//! - [`RigComponents`] - The external seams a service is assembled from
//! - Configuration types for every group of settings

mod config;

use std::sync::Arc;

use parley_postgres::PgClient;

pub use self::config::{
    EmbeddingConfig, LlmConfig, RagConfig, RigConfig, StorageConfig, WebSearchConfig,
};
use crate::chat::ChatService;
use crate::provider::{Embedder, ModelRegistry, RigEmbedder};
use crate::rag::{KnowledgeBackend, KnowledgeBase, TempDocuments};
use crate::reader::ReaderService;
use crate::session::SessionService;
use crate::store::{ConversationStore, PgConversationStore};
use crate::web::{ExaSearch, WebSearch};
use crate::{Result, TRACING_TARGET};

/// External collaborators of a [`RigService`].
pub struct RigComponents {
    pub models: Arc<ModelRegistry>,
    pub embedder: Arc<dyn Embedder>,
    pub web: Arc<dyn WebSearch>,
    pub store: Arc<dyn ConversationStore>,
    pub knowledge: KnowledgeBackend,
}

/// Inner state for [`RigService`].
struct RigServiceInner {
    chat: ChatService,
    sessions: SessionService,
    temp: Arc<TempDocuments>,
    knowledge: Arc<KnowledgeBase>,
    reader: ReaderService,
}

/// Main entry point for retrieval-augmented chat.
///
/// This type is cheap to clone and can be shared across threads.
///
/// Provides a high-level API for:
/// - Streaming chat turns with web, knowledge base and temporary document retrieval
/// - Managing sessions and their messages
/// - Uploading temporary documents and maintaining the knowledge base
/// - Streaming summaries, deep readings and mind maps of reader documents
#[derive(Clone)]
pub struct RigService {
    inner: Arc<RigServiceInner>,
}

impl RigService {
    /// Creates the service with the OpenAI-compatible provider, Exa web search
    /// and PostgreSQL for conversations and the knowledge base.
    pub fn from_config(config: &RigConfig, db: PgClient) -> Result<Self> {
        config.validate()?;

        let models = Arc::new(ModelRegistry::from_config(&config.llm)?);
        let embedder = RigEmbedder::new(
            &config.llm.llm_api_key,
            config.embedding.base_url(&config.llm),
            &config.embedding.embedding_model,
            config.embedding.embedding_dimensions,
        )?;
        let web = ExaSearch::from_config(&config.web_search)?;

        let components = RigComponents {
            models,
            embedder: Arc::new(embedder),
            web: Arc::new(web),
            store: Arc::new(PgConversationStore::new(db.clone())),
            knowledge: KnowledgeBackend::Postgres(db),
        };
        Self::from_components(components, config)
    }

    /// Creates the service from explicit collaborators.
    pub fn from_components(components: RigComponents, config: &RigConfig) -> Result<Self> {
        config.rag.validate()?;

        let temp = Arc::new(TempDocuments::new(
            Arc::clone(&components.store),
            Arc::clone(&components.embedder),
            config.storage.clone(),
            &config.rag,
        )?);
        let knowledge = Arc::new(KnowledgeBase::new(
            components.knowledge,
            components.embedder,
            config.storage.clone(),
            &config.rag,
        )?);

        let reader = ReaderService::new(
            Arc::clone(&components.models),
            Arc::clone(&components.store),
            config.storage.clone(),
        );
        let chat = ChatService::new(
            components.models,
            Arc::clone(&components.store),
            Arc::clone(&temp),
            Arc::clone(&knowledge),
            components.web,
            &config.rag,
        );
        let sessions = SessionService::new(components.store, Arc::clone(&temp));

        tracing::info!(
            target: TRACING_TARGET,
            default_model = chat.models().default_chat_id(),
            data_dir = %config.storage.root().display(),
            "Rig service initialized"
        );

        Ok(Self {
            inner: Arc::new(RigServiceInner {
                chat,
                sessions,
                temp,
                knowledge,
                reader,
            }),
        })
    }

    /// Returns the chat service.
    pub fn chat(&self) -> &ChatService {
        &self.inner.chat
    }

    /// Returns the session service.
    pub fn sessions(&self) -> &SessionService {
        &self.inner.sessions
    }

    /// Returns the temporary document store.
    pub fn temp_documents(&self) -> &TempDocuments {
        &self.inner.temp
    }

    /// Returns the knowledge base.
    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.inner.knowledge
    }

    /// Returns the document reader.
    pub fn reader(&self) -> &ReaderService {
        &self.inner.reader
    }

    /// Returns the model registry.
    pub fn models(&self) -> &ModelRegistry {
        self.inner.chat.models()
    }
}

impl std::fmt::Debug for RigService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RigService")
            .field("chat", &self.inner.chat)
            .field("knowledge", &self.inner.knowledge)
            .finish_non_exhaustive()
    }
}
