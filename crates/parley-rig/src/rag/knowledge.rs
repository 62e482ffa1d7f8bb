//! Per-client knowledge base.

use std::path::PathBuf;
use std::sync::Arc;

use jiff::Timestamp;
use parley_postgres::PgClient;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::storage::{self, UploadedFile};
use super::{
    DeleteFilter, Document, HandleCache, LocalVectorStore, PgVectorStore, ScoredDocument,
    Splitter, VectorStore, extract,
};
use crate::provider::{Embedder, EmbeddingProvider};
use crate::{Error, RagConfig, Result, StorageConfig, TRACING_TARGET_RAG};

/// Default number of results of [`KnowledgeBase::search`].
pub const DEFAULT_SEARCH_LIMIT: usize = 5;

/// Stored files lose their upload MIME type, so reindexing detects by extension.
const UNKNOWN_MIME_TYPE: &str = "application/octet-stream";

/// Where knowledge base vectors live.
#[derive(Debug, Clone)]
pub enum KnowledgeBackend {
    /// The `knowledge_chunks` table with pgvector.
    Postgres(PgClient),
    /// A file-persisted in-memory store per client under the data directory.
    Local,
}

/// A file stored in a client's knowledge base.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeFile {
    pub filename: String,
    pub path: PathBuf,
    pub size: u64,
    pub created_at: Option<Timestamp>,
    /// Lowercase extension, empty when the file has none.
    #[serde(rename = "type")]
    pub kind: String,
}

/// Result of a knowledge base upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnowledgeUpload {
    /// Stored filename after collision handling.
    pub filename: String,
    pub path: PathBuf,
    /// Number of indexed chunks.
    pub chunks: usize,
}

/// Long-lived documents a client can search from any session.
pub struct KnowledgeBase {
    backend: KnowledgeBackend,
    provider: EmbeddingProvider,
    storage: StorageConfig,
    splitter: Splitter,
    cache: HandleCache,
}

impl KnowledgeBase {
    /// Creates the knowledge base.
    pub fn new(
        backend: KnowledgeBackend,
        embedder: Arc<dyn Embedder>,
        storage: StorageConfig,
        config: &RagConfig,
    ) -> Result<Self> {
        Ok(Self {
            backend,
            provider: EmbeddingProvider::new(embedder),
            storage,
            splitter: Splitter::new(config.chunk_size, config.chunk_overlap)?,
            cache: HandleCache::new(config.vector_cache_capacity),
        })
    }

    async fn index(&self, client_id: &str) -> Result<VectorStore> {
        let provider = self.provider.clone();
        match &self.backend {
            KnowledgeBackend::Postgres(db) => {
                let db = db.clone();
                self.cache
                    .get_or_open(client_id, || async move {
                        let store = PgVectorStore::new(provider, db, client_id);
                        Ok(VectorStore::Postgres(Arc::new(store)))
                    })
                    .await
            }
            KnowledgeBackend::Local => {
                let dir = self.storage.knowledge_index_dir(client_id);
                self.cache
                    .get_or_open(client_id, || async move {
                        let store = LocalVectorStore::open(dir, provider).await?;
                        Ok(VectorStore::Local(Arc::new(store)))
                    })
                    .await
            }
        }
    }

    /// Adds documents to the client's knowledge base.
    pub async fn add_documents(
        &self,
        client_id: &str,
        documents: Vec<Document>,
    ) -> Result<Vec<Uuid>> {
        let documents = documents
            .into_iter()
            .map(|document| document.with_metadata("client_id", client_id))
            .collect();
        self.index(client_id).await?.add_documents(documents).await
    }

    /// Returns the `limit` documents closest to the query.
    #[tracing::instrument(skip(self, query), target = TRACING_TARGET_RAG)]
    pub async fn search(
        &self,
        client_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<ScoredDocument>> {
        self.index(client_id)
            .await?
            .similarity_search(query, limit)
            .await
    }

    /// Removes every document of the client. Returns how many were removed.
    pub async fn clear(&self, client_id: &str) -> Result<usize> {
        let removed = self.index(client_id).await?.delete(DeleteFilter::All).await?;
        tracing::info!(target: TRACING_TARGET_RAG, client_id, removed, "Knowledge base cleared");
        Ok(removed)
    }

    /// Removes one document.
    pub async fn delete_document(&self, client_id: &str, document_id: Uuid) -> Result<()> {
        let removed = self
            .index(client_id)
            .await?
            .delete(DeleteFilter::Ids(vec![document_id]))
            .await?;
        if removed == 0 {
            return Err(Error::not_found("Document not found"));
        }
        Ok(())
    }

    /// Stores, extracts, chunks and indexes a file.
    ///
    /// `chunk_size` overrides the configured chunk size. On failure the
    /// stored file is removed.
    #[tracing::instrument(
        skip(self, file),
        target = TRACING_TARGET_RAG,
        fields(filename = %file.original_filename, size = file.size())
    )]
    pub async fn upload_file(
        &self,
        client_id: &str,
        file: UploadedFile,
        chunk_size: Option<usize>,
    ) -> Result<KnowledgeUpload> {
        let splitter = match chunk_size {
            Some(size) => self.splitter.with_chunk_size(size)?,
            None => self.splitter,
        };

        let filename = storage::sanitize_filename(&file.original_filename)?;
        let dir = self.storage.uploads_dir(client_id);
        let (filename, path) = storage::unique_path(&dir, &filename).await?;
        storage::write_file(&path, &file.data).await?;

        let uploaded_at = Timestamp::now();
        let result = self
            .index_file(client_id, &splitter, &filename, &file, uploaded_at, &path)
            .await;

        match result {
            Ok(chunks) => {
                tracing::info!(
                    target: TRACING_TARGET_RAG,
                    client_id,
                    filename = %filename,
                    chunks,
                    "Knowledge file indexed"
                );
                Ok(KnowledgeUpload {
                    filename,
                    path,
                    chunks,
                })
            }
            Err(error) => {
                tracing::error!(
                    target: TRACING_TARGET_RAG,
                    client_id,
                    error = %error,
                    "Failed to index knowledge file"
                );
                storage::remove_file_quietly(&path).await;
                Err(error)
            }
        }
    }

    async fn index_file(
        &self,
        client_id: &str,
        splitter: &Splitter,
        filename: &str,
        file: &UploadedFile,
        uploaded_at: Timestamp,
        path: &std::path::Path,
    ) -> Result<usize> {
        let documents = extract::load(path, &file.mime_type).await?;
        let uploaded_at = uploaded_at.to_string();
        let chunks: Vec<Document> = splitter
            .split_documents(&documents)?
            .into_iter()
            .map(|chunk| {
                chunk
                    .with_metadata("filename", filename)
                    .with_metadata("original_filename", file.original_filename.as_str())
                    .with_metadata("uploaded_at", uploaded_at.as_str())
                    .with_metadata("mime_type", file.mime_type.as_str())
            })
            .collect();

        let count = chunks.len();
        self.add_documents(client_id, chunks).await?;
        Ok(count)
    }

    /// Lists the client's stored files.
    pub async fn list_files(&self, client_id: &str) -> Result<Vec<KnowledgeFile>> {
        let files = storage::list_files(&self.storage.uploads_dir(client_id)).await?;
        Ok(files
            .into_iter()
            .map(|file| KnowledgeFile {
                kind: storage::extension(&file.filename).unwrap_or_default(),
                filename: file.filename,
                path: file.path,
                size: file.size,
                created_at: file.created_at,
            })
            .collect())
    }

    /// Removes a stored file and its chunks.
    pub async fn delete_file(&self, client_id: &str, filename: &str) -> Result<usize> {
        let filename = storage::sanitize_filename(filename)
            .map_err(|_| Error::not_found("File not found"))?;
        let path = self.storage.uploads_dir(client_id).join(&filename);
        if !tokio::fs::try_exists(&path).await? {
            return Err(Error::not_found("File not found"));
        }

        tokio::fs::remove_file(&path).await?;
        let removed = self
            .index(client_id)
            .await?
            .delete(DeleteFilter::Filename(filename.clone()))
            .await?;

        tracing::info!(
            target: TRACING_TARGET_RAG,
            client_id,
            filename = %filename,
            removed,
            "Knowledge file deleted"
        );
        Ok(removed)
    }

    /// Rebuilds the client's index from the stored files.
    ///
    /// Files that fail to extract are skipped and logged. Returns the number
    /// of indexed chunks.
    #[tracing::instrument(skip(self), target = TRACING_TARGET_RAG)]
    pub async fn reindex(&self, client_id: &str) -> Result<usize> {
        self.clear(client_id).await?;

        let mut total = 0;
        for file in storage::list_files(&self.storage.uploads_dir(client_id)).await? {
            let uploaded_at = file.created_at.unwrap_or_else(Timestamp::now);
            let uploaded =
                UploadedFile::new(file.filename.clone(), UNKNOWN_MIME_TYPE, Vec::new());

            match self
                .index_file(
                    client_id,
                    &self.splitter,
                    &file.filename,
                    &uploaded,
                    uploaded_at,
                    &file.path,
                )
                .await
            {
                Ok(chunks) => total += chunks,
                Err(error) => {
                    tracing::warn!(
                        target: TRACING_TARGET_RAG,
                        filename = %file.filename,
                        error = %error,
                        "Skipping file during reindex"
                    );
                }
            }
        }
        Ok(total)
    }

    /// Returns the number of indexed chunks of the client.
    pub async fn indexed_chunks(&self, client_id: &str) -> Result<usize> {
        self.index(client_id).await?.len().await
    }
}

impl std::fmt::Debug for KnowledgeBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeBase")
            .field("backend", &self.backend)
            .field("storage", &self.storage)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::testing::FakeEmbedder;

    fn knowledge(dir: &TempDir) -> KnowledgeBase {
        let config = RagConfig {
            chunk_size: 100,
            chunk_overlap: 10,
            ..RagConfig::default()
        };
        KnowledgeBase::new(
            KnowledgeBackend::Local,
            Arc::new(FakeEmbedder::default()),
            StorageConfig::new(dir.path()),
            &config,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn upload_search_and_delete_file() {
        let dir = TempDir::new().unwrap();
        let kb = knowledge(&dir);
        let text = "Rust ownership rules prevent data races at compile time. ".repeat(5);

        let upload = kb
            .upload_file("c", UploadedFile::new("rust.txt", "text/plain", text), None)
            .await
            .unwrap();
        assert_eq!(upload.filename, "rust.txt");
        assert!(upload.chunks > 1);

        let hits = kb.search("c", "ownership", 3).await.unwrap();
        assert!(!hits.is_empty());
        assert_eq!(hits[0].document.filename(), Some("rust.txt"));
        assert_eq!(hits[0].document.metadata_str("client_id"), Some("c"));

        let files = kb.list_files("c").await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].kind, "txt");

        let removed = kb.delete_file("c", "rust.txt").await.unwrap();
        assert_eq!(removed, upload.chunks);
        assert_eq!(kb.indexed_chunks("c").await.unwrap(), 0);
        assert!(kb.delete_file("c", "rust.txt").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn clients_are_isolated() {
        let dir = TempDir::new().unwrap();
        let kb = knowledge(&dir);
        kb.add_documents("a", vec![Document::new("alpha secret")])
            .await
            .unwrap();
        assert!(kb.search("b", "alpha", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_document_and_clear() {
        let dir = TempDir::new().unwrap();
        let kb = knowledge(&dir);
        let ids = kb
            .add_documents("c", vec![Document::new("one"), Document::new("two")])
            .await
            .unwrap();

        kb.delete_document("c", ids[0]).await.unwrap();
        assert!(kb.delete_document("c", ids[0]).await.unwrap_err().is_not_found());
        assert_eq!(kb.clear("c").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn reindex_rebuilds_from_files() {
        let dir = TempDir::new().unwrap();
        let kb = knowledge(&dir);
        kb.upload_file("c", UploadedFile::new("a.txt", "text/plain", "alpha"), None)
            .await
            .unwrap();
        kb.clear("c").await.unwrap();

        assert_eq!(kb.reindex("c").await.unwrap(), 1);
        assert_eq!(kb.indexed_chunks("c").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn failed_upload_removes_file() {
        let dir = TempDir::new().unwrap();
        let kb = knowledge(&dir);
        let result = kb
            .upload_file("c", UploadedFile::new("x.doc", "application/msword", vec![1]), None)
            .await;
        assert!(result.is_err());
        assert!(kb.list_files("c").await.unwrap().is_empty());
    }
}
