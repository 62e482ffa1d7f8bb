//! Vector stores over embedded documents.
//!
//! Both stores implement rig-core's [`VectorStoreIndex`] and
//! [`InsertDocuments`]:
//!
//! - [`LocalVectorStore`]: rig's in-memory store persisted as JSON, used for
//!   session documents and the local knowledge base
//! - [`PgVectorStore`]: the `knowledge_chunks` table with pgvector
//!
//! [`VectorStore`] is the handle the document managers cache and call.

mod local;
mod pgvector;

use std::sync::Arc;

use rig::embeddings::EmbeddingsBuilder;
use rig::vector_store::{InsertDocuments, VectorSearchRequest, VectorStoreIndex};
use uuid::Uuid;

pub use self::local::LocalVectorStore;
pub use self::pgvector::{PgFilter, PgVectorStore};
use super::{Document, ScoredDocument};
use crate::Result;
use crate::provider::EmbeddingProvider;

/// Documents removed from a vector store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteFilter {
    /// Every document of the store.
    All,
    /// The documents with these identifiers.
    Ids(Vec<Uuid>),
    /// The documents chunked from this stored file.
    Filename(String),
}

impl DeleteFilter {
    /// Returns whether the document is selected by the filter.
    pub fn matches(&self, document: &Document) -> bool {
        match self {
            Self::All => true,
            Self::Ids(ids) => ids.contains(&document.id),
            Self::Filename(filename) => document.filename() == Some(filename.as_str()),
        }
    }
}

/// A cached, cheaply cloneable handle to one owner's vector store.
#[derive(Debug, Clone)]
pub enum VectorStore {
    /// File-persisted in-memory store.
    Local(Arc<LocalVectorStore>),
    /// pgvector-backed knowledge store.
    Postgres(Arc<PgVectorStore>),
}

impl VectorStore {
    fn provider(&self) -> &EmbeddingProvider {
        match self {
            Self::Local(store) => store.provider(),
            Self::Postgres(store) => store.provider(),
        }
    }

    /// Embeds and stores the documents. Returns their identifiers.
    pub async fn add_documents(&self, documents: Vec<Document>) -> Result<Vec<Uuid>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let ids = documents.iter().map(|document| document.id).collect();
        let embedded = EmbeddingsBuilder::new(self.provider().clone())
            .documents(documents)?
            .build()
            .await?;

        match self {
            Self::Local(store) => store.insert_documents(embedded).await?,
            Self::Postgres(store) => store.insert_documents(embedded).await?,
        }
        Ok(ids)
    }

    /// Returns up to `k` documents closest to the query, best first.
    pub async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<ScoredDocument>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let samples = u64::try_from(k).unwrap_or(u64::MAX);
        let results = match self {
            Self::Local(store) => {
                let req = VectorSearchRequest::builder()
                    .query(query)
                    .samples(samples)
                    .build()?;
                store.top_n::<Document>(req).await?
            }
            Self::Postgres(store) => {
                let req = VectorSearchRequest::<PgFilter>::builder()
                    .query(query)
                    .samples(samples)
                    .build()?;
                store.top_n::<Document>(req).await?
            }
        };

        Ok(results
            .into_iter()
            .map(|(score, _, document)| ScoredDocument { document, score })
            .collect())
    }

    /// Removes documents. Returns how many were removed.
    pub async fn delete(&self, filter: DeleteFilter) -> Result<usize> {
        match self {
            Self::Local(store) => store.delete(&filter).await,
            Self::Postgres(store) => store.delete(&filter).await,
        }
    }

    /// Returns the number of stored documents.
    pub async fn len(&self) -> Result<usize> {
        match self {
            Self::Local(store) => Ok(store.len().await),
            Self::Postgres(store) => store.len().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delete_filter_selects_documents() {
        let document = Document::new("x").with_metadata("filename", "a.txt");
        assert!(DeleteFilter::All.matches(&document));
        assert!(DeleteFilter::Ids(vec![document.id]).matches(&document));
        assert!(!DeleteFilter::Ids(vec![Uuid::new_v4()]).matches(&document));
        assert!(DeleteFilter::Filename("a.txt".into()).matches(&document));
        assert!(!DeleteFilter::Filename("b.txt".into()).matches(&document));
    }
}
