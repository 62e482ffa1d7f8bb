//! Document ingestion, indexing and retrieval.
//!
//! Two document scopes exist:
//!
//! - [`TempDocuments`]: one temporary document per session, inlined when short
//!   and otherwise chunked into a session-scoped [`LocalVectorStore`].
//! - [`KnowledgeBase`]: long-lived per-client documents, indexed in Postgres
//!   with pgvector ([`PgVectorStore`]) or in a [`LocalVectorStore`].
//!
//! Both share the [`extract`] loaders, the [`Splitter`] and the rig-core
//! vector store traits behind [`VectorStore`].

mod cache;
mod document;
pub mod extract;
mod index;
mod knowledge;
mod lock;
mod splitter;
pub(crate) mod storage;
mod temp;

pub use self::cache::HandleCache;
pub use self::document::{Document, Metadata, ScoredDocument};
pub use self::index::{DeleteFilter, LocalVectorStore, PgFilter, PgVectorStore, VectorStore};
pub use self::knowledge::{
    DEFAULT_SEARCH_LIMIT, KnowledgeBackend, KnowledgeBase, KnowledgeFile, KnowledgeUpload,
};
pub use self::lock::SessionLocks;
pub use self::splitter::Splitter;
pub use self::storage::UploadedFile;
pub use self::temp::{SessionDocument, TempDocuments, TempUpload};
