//! File-persisted vector store built on rig's in-memory store.

use std::path::{Path, PathBuf};

use rig::embeddings::{Embedding, EmbeddingModel};
use rig::one_or_many::OneOrMany;
use rig::vector_store::in_memory_store::{InMemoryVectorIndex, InMemoryVectorStore};
use rig::vector_store::request::{Filter, VectorSearchRequest};
use rig::vector_store::{InsertDocuments, VectorStoreError, VectorStoreIndex};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::DeleteFilter;
use crate::provider::EmbeddingProvider;
use crate::rag::Document;
use crate::{Error, Result, TRACING_TARGET_RAG};

const INDEX_FILE: &str = "index.json";

#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    id: String,
    document: Document,
    embeddings: OneOrMany<Embedding>,
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexFile {
    embedding_model: String,
    ndims: usize,
    entries: Vec<StoredEntry>,
}

type Entry = (String, Document, OneOrMany<Embedding>);
type Index = InMemoryVectorIndex<EmbeddingProvider, Document>;

/// [`InMemoryVectorStore`] of one session or client, saved as JSON in its
/// directory after every write.
///
/// Implements rig-core's [`VectorStoreIndex`] and [`InsertDocuments`].
/// Documents are keyed by their identifier.
pub struct LocalVectorStore {
    dir: PathBuf,
    provider: EmbeddingProvider,
    index: RwLock<Index>,
}

impl LocalVectorStore {
    /// Opens the store persisted in `dir`, or an empty one if none was saved.
    pub async fn open(dir: impl Into<PathBuf>, provider: EmbeddingProvider) -> Result<Self> {
        let dir = dir.into();
        let path = dir.join(INDEX_FILE);

        let store = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let file: IndexFile = serde_json::from_slice(&bytes)?;
                if file.embedding_model != provider.model_name() || file.ndims != provider.ndims() {
                    return Err(Error::storage(format!(
                        "index was built with embedding model {} ({} dims)",
                        file.embedding_model, file.ndims
                    )));
                }
                tracing::debug!(
                    target: TRACING_TARGET_RAG,
                    path = %path.display(),
                    entries = file.entries.len(),
                    "Vector store loaded"
                );
                InMemoryVectorStore::from_documents_with_ids(
                    file.entries
                        .into_iter()
                        .map(|entry| (entry.id, entry.document, entry.embeddings)),
                )
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                InMemoryVectorStore::from_documents_with_ids(Vec::<Entry>::new())
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            dir,
            index: RwLock::new(store.index(provider.clone())),
            provider,
        })
    }

    /// Returns whether a store has been persisted in `dir`.
    pub async fn exists(dir: &Path) -> bool {
        tokio::fs::try_exists(dir.join(INDEX_FILE))
            .await
            .unwrap_or(false)
    }

    /// Returns the directory of the store.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the embedding model of the store.
    pub fn provider(&self) -> &EmbeddingProvider {
        &self.provider
    }

    /// Returns the number of stored documents.
    pub async fn len(&self) -> usize {
        self.index.read().await.len()
    }

    /// Removes documents. Returns how many were removed.
    pub async fn delete(&self, filter: &DeleteFilter) -> Result<usize> {
        let mut index = self.index.write().await;
        let before = index.len();

        let kept: Vec<Entry> = index
            .iter()
            .filter(|(_, (document, _))| !filter.matches(document))
            .map(|(id, (document, embeddings))| {
                (id.clone(), document.clone(), embeddings.clone())
            })
            .collect();

        let removed = before - kept.len();
        if removed > 0 {
            index.store = InMemoryVectorStore::from_documents_with_ids(kept);
            self.persist(&index).await?;
        }
        Ok(removed)
    }

    async fn persist(&self, index: &Index) -> Result<()> {
        let file = IndexFile {
            embedding_model: self.provider.model_name().to_owned(),
            ndims: self.provider.ndims(),
            entries: index
                .iter()
                .map(|(id, (document, embeddings))| StoredEntry {
                    id: id.clone(),
                    document: document.clone(),
                    embeddings: embeddings.clone(),
                })
                .collect(),
        };

        tokio::fs::create_dir_all(&self.dir).await?;
        let bytes = serde_json::to_vec(&file)?;
        let tmp = self.dir.join(format!("{INDEX_FILE}.tmp"));
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, self.dir.join(INDEX_FILE)).await?;
        Ok(())
    }
}

fn datastore_error(error: Error) -> VectorStoreError {
    VectorStoreError::DatastoreError(Box::new(std::io::Error::other(format!(
        "failed to persist vector store: {error}"
    ))))
}

impl InsertDocuments for LocalVectorStore {
    async fn insert_documents<Doc: Serialize + rig::Embed + Send>(
        &self,
        documents: Vec<(Doc, OneOrMany<Embedding>)>,
    ) -> std::result::Result<(), VectorStoreError> {
        if documents.is_empty() {
            return Ok(());
        }

        let entries = documents
            .into_iter()
            .map(|(doc, embeddings)| {
                let document: Document = serde_json::from_value(serde_json::to_value(&doc)?)?;
                Ok((document.id.to_string(), document, embeddings))
            })
            .collect::<std::result::Result<Vec<_>, serde_json::Error>>()?;
        let added = entries.len();

        let mut index = self.index.write().await;
        index.store.add_documents_with_ids(entries);
        self.persist(&index).await.map_err(datastore_error)?;

        tracing::debug!(
            target: TRACING_TARGET_RAG,
            dir = %self.dir.display(),
            added,
            total = index.len(),
            "Documents indexed"
        );
        Ok(())
    }
}

impl VectorStoreIndex for LocalVectorStore {
    type Filter = Filter<serde_json::Value>;

    async fn top_n<T: for<'a> Deserialize<'a> + Send>(
        &self,
        req: VectorSearchRequest<Self::Filter>,
    ) -> std::result::Result<Vec<(f64, String, T)>, VectorStoreError> {
        let index = self.index.read().await;
        if index.is_empty() || req.samples() == 0 {
            return Ok(Vec::new());
        }

        let mut results = index.top_n::<T>(req).await?;
        results.sort_by(|a, b| b.0.total_cmp(&a.0));
        Ok(results)
    }

    async fn top_n_ids(
        &self,
        req: VectorSearchRequest<Self::Filter>,
    ) -> std::result::Result<Vec<(f64, String)>, VectorStoreError> {
        let index = self.index.read().await;
        if index.is_empty() || req.samples() == 0 {
            return Ok(Vec::new());
        }

        let mut results = index.top_n_ids(req).await?;
        results.sort_by(|a, b| b.0.total_cmp(&a.0));
        Ok(results)
    }
}

impl std::fmt::Debug for LocalVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalVectorStore")
            .field("dir", &self.dir)
            .field("provider", &self.provider)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rig::embeddings::EmbeddingsBuilder;
    use tempfile::TempDir;

    use super::*;
    use crate::testing::FakeEmbedder;

    async fn insert(store: &LocalVectorStore, documents: Vec<Document>) {
        let embedded = EmbeddingsBuilder::new(store.provider().clone())
            .documents(documents)
            .unwrap()
            .build()
            .await
            .unwrap();
        store.insert_documents(embedded).await.unwrap();
    }

    fn request(query: &str, samples: u64) -> VectorSearchRequest {
        VectorSearchRequest::builder()
            .query(query)
            .samples(samples)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn top_n_returns_closest_first() {
        let dir = TempDir::new().unwrap();
        let provider = EmbeddingProvider::new(Arc::new(FakeEmbedder::default()));
        let store = LocalVectorStore::open(dir.path(), provider).await.unwrap();

        insert(
            &store,
            vec![
                Document::new("cats sleep all day"),
                Document::new("the revenue grew in 2023"),
                Document::new("revenue fell"),
            ],
        )
        .await;

        let results = store
            .top_n::<Document>(request("revenue grew 2023", 2))
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].2.content, "the revenue grew in 2023");
        assert!(results[0].0 >= results[1].0);
        assert_eq!(results[0].1, results[0].2.id.to_string());
    }

    #[tokio::test]
    async fn persists_and_reloads() {
        let dir = TempDir::new().unwrap();
        let provider = EmbeddingProvider::new(Arc::new(FakeEmbedder::default()));
        {
            let store = LocalVectorStore::open(dir.path(), provider.clone())
                .await
                .unwrap();
            insert(&store, vec![Document::new("a").with_metadata("filename", "a.txt")]).await;
        }

        assert!(LocalVectorStore::exists(dir.path()).await);
        let store = LocalVectorStore::open(dir.path(), provider).await.unwrap();
        assert_eq!(store.len().await, 1);

        let removed = store
            .delete(&DeleteFilter::Filename("a.txt".into()))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn empty_store_skips_embedding() {
        let dir = TempDir::new().unwrap();
        let embedder = Arc::new(FakeEmbedder::default());
        let store = LocalVectorStore::open(dir.path(), EmbeddingProvider::new(embedder.clone()))
            .await
            .unwrap();
        assert!(store.top_n_ids(request("q", 3)).await.unwrap().is_empty());
        assert_eq!(embedder.calls(), 0);
    }
}
