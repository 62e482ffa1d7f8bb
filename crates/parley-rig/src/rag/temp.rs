//! Session-scoped temporary documents.

use std::path::PathBuf;
use std::sync::Arc;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use super::storage::{self, UploadedFile};
use super::{
    DeleteFilter, Document, HandleCache, LocalVectorStore, ScoredDocument, SessionLocks, Splitter,
    VectorStore, extract,
};
use crate::provider::{Embedder, EmbeddingProvider};
use crate::store::{ConversationStore, TempFileDraft, TempFileRecord};
use crate::{Error, RagConfig, Result, StorageConfig, TRACING_TARGET_RAG};

/// Summary of a temporary document as shown to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDocument {
    /// Original filename.
    pub filename: String,
    /// Lowercase extension, or `unknown`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Size in bytes.
    pub size: i64,
    pub created_at: Timestamp,
}

impl From<&TempFileRecord> for SessionDocument {
    fn from(file: &TempFileRecord) -> Self {
        Self {
            filename: file.original_filename.clone(),
            kind: storage::extension(&file.original_filename)
                .unwrap_or_else(|| "unknown".to_owned()),
            size: file.size,
            created_at: file.created_at,
        }
    }
}

/// Result of a temporary document upload.
#[derive(Debug, Clone)]
pub struct TempUpload {
    /// Where the file was stored.
    pub path: PathBuf,
    /// The session's documents after the upload.
    pub documents: Vec<SessionDocument>,
    /// Whether the text was inlined instead of indexed.
    pub is_short_document: bool,
    /// Inlined text of a short document.
    pub full_content: Option<String>,
}

/// Manages the single temporary document of each session.
///
/// Upload, search and cleanup of one session are serialized by a per-session
/// lock, so a search never observes a half-written store.
pub struct TempDocuments {
    store: Arc<dyn ConversationStore>,
    provider: EmbeddingProvider,
    storage: StorageConfig,
    splitter: Splitter,
    short_document_threshold: usize,
    cache: HandleCache,
    locks: SessionLocks,
}

impl TempDocuments {
    /// Creates the temporary document manager.
    pub fn new(
        store: Arc<dyn ConversationStore>,
        embedder: Arc<dyn Embedder>,
        storage: StorageConfig,
        config: &RagConfig,
    ) -> Result<Self> {
        Ok(Self {
            store,
            provider: EmbeddingProvider::new(embedder),
            storage,
            splitter: Splitter::new(config.chunk_size, config.chunk_overlap)?,
            short_document_threshold: config.short_document_threshold,
            cache: HandleCache::new(config.vector_cache_capacity),
            locks: SessionLocks::new(),
        })
    }

    fn key(session_id: &str, client_id: &str) -> String {
        format!("{client_id}:{session_id}")
    }

    /// Stores a document for the session's next turn, replacing any previous one.
    ///
    /// Documents up to the short-document threshold are inlined; longer ones
    /// are chunked into the session's vector index. On failure the written
    /// file is removed.
    #[tracing::instrument(
        skip(self, file),
        target = TRACING_TARGET_RAG,
        fields(filename = %file.original_filename, size = file.size())
    )]
    pub async fn upload(
        &self,
        session_id: &str,
        client_id: &str,
        file: UploadedFile,
    ) -> Result<TempUpload> {
        if self.store.find_session(session_id, client_id).await?.is_none() {
            return Err(Error::not_found("Session not found"));
        }

        let key = Self::key(session_id, client_id);
        let _guard = self.locks.lock(&key).await;

        self.purge(session_id, client_id, &key).await?;

        let filename = storage::sanitize_filename(&file.original_filename)?;
        let dir = self.storage.temp_dir(client_id, session_id);
        let (filename, path) = storage::unique_path(&dir, &filename).await?;
        storage::write_file(&path, &file.data).await?;

        match self
            .process(session_id, client_id, &file, &filename, &path)
            .await
        {
            Ok(record) => {
                let documents = self.session_documents(session_id, client_id).await?;
                tracing::info!(
                    target: TRACING_TARGET_RAG,
                    session_id,
                    filename = %record.filename,
                    short = record.is_short_document,
                    "Temporary document uploaded"
                );
                Ok(TempUpload {
                    path,
                    documents,
                    is_short_document: record.is_short_document,
                    full_content: record.full_content,
                })
            }
            Err(error) => {
                tracing::error!(
                    target: TRACING_TARGET_RAG,
                    session_id,
                    error = %error,
                    "Failed to process temporary document"
                );
                storage::remove_file_quietly(&path).await;
                Err(error)
            }
        }
    }

    async fn process(
        &self,
        session_id: &str,
        client_id: &str,
        file: &UploadedFile,
        filename: &str,
        path: &std::path::Path,
    ) -> Result<TempFileRecord> {
        let documents = extract::load(path, &file.mime_type).await?;
        let total_len: usize = documents.iter().map(Document::char_len).sum();

        let is_short_document = total_len <= self.short_document_threshold;
        let full_content = if is_short_document {
            tracing::debug!(
                target: TRACING_TARGET_RAG,
                total_len,
                "Short document, skipping vector indexing"
            );
            Some(
                documents
                    .iter()
                    .map(|d| d.content.as_str())
                    .collect::<Vec<_>>()
                    .join("\n\n"),
            )
        } else {
            let uploaded_at = Timestamp::now().to_string();
            let chunks: Vec<Document> = self
                .splitter
                .split_documents(&documents)?
                .into_iter()
                .map(|chunk| {
                    chunk
                        .with_metadata("filename", filename)
                        .with_metadata("original_filename", file.original_filename.as_str())
                        .with_metadata("uploaded_at", uploaded_at.as_str())
                        .with_metadata("mime_type", file.mime_type.as_str())
                        .with_metadata("session_id", session_id)
                        .with_metadata("client_id", client_id)
                })
                .collect();

            tracing::debug!(
                target: TRACING_TARGET_RAG,
                total_len,
                chunks = chunks.len(),
                "Indexing temporary document"
            );
            let index = self.index(session_id, client_id).await?;
            index.add_documents(chunks).await?;
            None
        };

        self.store
            .create_temp_file(TempFileDraft {
                filename: filename.to_owned(),
                original_filename: file.original_filename.clone(),
                mime_type: file.mime_type.clone(),
                size: i64::try_from(file.size()).unwrap_or(i64::MAX),
                path: path.display().to_string(),
                session_id: session_id.to_owned(),
                client_id: client_id.to_owned(),
                is_short_document,
                full_content,
            })
            .await
    }

    async fn index(&self, session_id: &str, client_id: &str) -> Result<VectorStore> {
        let dir = self.storage.temp_index_dir(client_id, session_id);
        let provider = self.provider.clone();
        self.cache
            .get_or_open(&Self::key(session_id, client_id), || async move {
                let store = LocalVectorStore::open(dir, provider).await?;
                Ok(VectorStore::Local(Arc::new(store)))
            })
            .await
    }

    /// Returns whether the session has an open or persisted index.
    async fn has_index(&self, session_id: &str, client_id: &str) -> bool {
        let key = Self::key(session_id, client_id);
        self.cache.contains(&key).await
            || LocalVectorStore::exists(&self.storage.temp_index_dir(client_id, session_id)).await
    }

    /// Removes stored files, the vector index, the cached handle and the records.
    async fn purge(&self, session_id: &str, client_id: &str, key: &str) -> Result<()> {
        let removed_files =
            storage::clear_files(&self.storage.temp_dir(client_id, session_id)).await?;
        storage::remove_dir_if_exists(&self.storage.temp_index_dir(client_id, session_id))
            .await?;
        self.cache.invalidate(key).await;
        let removed_rows = self
            .store
            .soft_delete_temp_files(session_id, client_id)
            .await?;

        if removed_files > 0 || removed_rows > 0 {
            tracing::debug!(
                target: TRACING_TARGET_RAG,
                session_id,
                removed_files,
                removed_rows,
                "Previous temporary document purged"
            );
        }
        Ok(())
    }

    /// Returns the session's active temporary files, newest first.
    pub async fn active_files(
        &self,
        session_id: &str,
        client_id: &str,
    ) -> Result<Vec<TempFileRecord>> {
        self.store.active_temp_files(session_id, client_id).await
    }

    /// Searches the session's vector index.
    ///
    /// A session without a persisted index yields no results.
    pub async fn search(
        &self,
        session_id: &str,
        client_id: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<ScoredDocument>> {
        let key = Self::key(session_id, client_id);
        let _guard = self.locks.lock(&key).await;

        if !self.has_index(session_id, client_id).await {
            return Ok(Vec::new());
        }

        let index = self.index(session_id, client_id).await?;
        index.similarity_search(query, k).await
    }

    /// Lists the session's active temporary documents.
    pub async fn session_documents(
        &self,
        session_id: &str,
        client_id: &str,
    ) -> Result<Vec<SessionDocument>> {
        let files = self.store.active_temp_files(session_id, client_id).await?;
        Ok(files.iter().map(SessionDocument::from).collect())
    }

    /// Soft-deletes the given records and removes their files and chunks.
    ///
    /// Documents uploaded after `files` were read are left in place. The
    /// session's index is dropped once it holds no chunks.
    #[tracing::instrument(skip(self, files), target = TRACING_TARGET_RAG, fields(files = files.len()))]
    pub async fn cleanup_files(
        &self,
        session_id: &str,
        client_id: &str,
        files: &[TempFileRecord],
    ) -> Result<()> {
        if files.is_empty() {
            return Ok(());
        }

        let key = Self::key(session_id, client_id);
        let _guard = self.locks.lock(&key).await;

        let ids: Vec<_> = files.iter().map(|file| file.id).collect();
        let removed_rows = self
            .store
            .soft_delete_temp_files_by_ids(session_id, client_id, &ids)
            .await?;

        for file in files {
            storage::remove_file_quietly(std::path::Path::new(&file.path)).await;
        }

        let mut removed_chunks = 0;
        if self.has_index(session_id, client_id).await {
            let index = self.index(session_id, client_id).await?;
            for file in files.iter().filter(|file| !file.is_short_document) {
                removed_chunks += index
                    .delete(DeleteFilter::Filename(file.filename.clone()))
                    .await?;
            }
            if index.len().await? == 0 {
                self.cache.invalidate(&key).await;
                storage::remove_dir_if_exists(&self.storage.temp_index_dir(client_id, session_id))
                    .await?;
            }
        }

        tracing::debug!(
            target: TRACING_TARGET_RAG,
            session_id,
            removed_rows,
            removed_chunks,
            "Used temporary documents cleaned up"
        );
        Ok(())
    }

    /// Soft-deletes all of the session's records and removes its files and index.
    #[tracing::instrument(skip(self), target = TRACING_TARGET_RAG)]
    pub async fn cleanup_session(&self, session_id: &str, client_id: &str) -> Result<()> {
        let key = Self::key(session_id, client_id);
        let _guard = self.locks.lock(&key).await;

        self.store
            .soft_delete_temp_files(session_id, client_id)
            .await?;
        storage::remove_dir_if_exists(&self.storage.temp_dir(client_id, session_id)).await?;
        storage::remove_dir_if_exists(&self.storage.temp_index_dir(client_id, session_id))
            .await?;
        self.cache.invalidate(&key).await;

        tracing::debug!(target: TRACING_TARGET_RAG, session_id, "Temporary documents cleaned up");
        Ok(())
    }

    /// Returns the number of indexed chunks of the session.
    pub async fn indexed_chunks(&self, session_id: &str, client_id: &str) -> Result<usize> {
        if !self.has_index(session_id, client_id).await {
            return Ok(0);
        }
        self.index(session_id, client_id).await?.len().await
    }
}

impl std::fmt::Debug for TempDocuments {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TempDocuments")
            .field("storage", &self.storage)
            .field("short_document_threshold", &self.short_document_threshold)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::testing::{FakeEmbedder, InMemoryStore};

    struct Fixture {
        _dir: TempDir,
        store: Arc<InMemoryStore>,
        storage: StorageConfig,
        temp: TempDocuments,
        session_id: String,
    }

    async fn fixture(threshold: usize) -> Fixture {
        let dir = TempDir::new().unwrap();
        let storage = StorageConfig::new(dir.path());
        let store = Arc::new(InMemoryStore::new());
        let config = RagConfig {
            chunk_size: 200,
            chunk_overlap: 20,
            short_document_threshold: threshold,
            ..RagConfig::default()
        };
        let temp = TempDocuments::new(
            store.clone(),
            Arc::new(FakeEmbedder::default()),
            storage.clone(),
            &config,
        )
        .unwrap();
        let session = store.create_session("client", None, None).await.unwrap();

        Fixture {
            _dir: dir,
            store,
            storage,
            temp,
            session_id: session.session_id,
        }
    }

    #[tokio::test]
    async fn short_document_is_inlined_without_indexing() {
        let f = fixture(60_000).await;
        let upload = f
            .temp
            .upload(
                &f.session_id,
                "client",
                UploadedFile::new("revenue.txt", "text/plain", "Revenue was $5M in 2023."),
            )
            .await
            .unwrap();

        assert!(upload.is_short_document);
        assert_eq!(upload.full_content.as_deref(), Some("Revenue was $5M in 2023."));
        assert_eq!(upload.documents.len(), 1);
        assert_eq!(upload.documents[0].kind, "txt");
        assert_eq!(f.temp.indexed_chunks(&f.session_id, "client").await.unwrap(), 0);
        assert!(
            !LocalVectorStore::exists(&f.storage.temp_index_dir("client", &f.session_id)).await
        );
    }

    #[tokio::test]
    async fn long_document_is_indexed() {
        let f = fixture(100).await;
        let text = "Quarterly revenue grew steadily across all regions. ".repeat(20);
        let upload = f
            .temp
            .upload(
                &f.session_id,
                "client",
                UploadedFile::new("report.md", "text/markdown", text),
            )
            .await
            .unwrap();

        assert!(!upload.is_short_document);
        assert!(upload.full_content.is_none());
        assert!(f.temp.indexed_chunks(&f.session_id, "client").await.unwrap() > 1);

        let hits = f
            .temp
            .search(&f.session_id, "client", "revenue", 2)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].document.filename(), Some("report.md"));
        assert_eq!(hits[0].document.metadata_str("session_id"), Some(f.session_id.as_str()));
    }

    #[tokio::test]
    async fn second_upload_supersedes_first() {
        let f = fixture(100).await;
        let long = "Alpha document content for indexing. ".repeat(20);
        f.temp
            .upload(&f.session_id, "client", UploadedFile::new("a.txt", "text/plain", long))
            .await
            .unwrap();
        let a_path = f.storage.temp_dir("client", &f.session_id).join("a.txt");
        assert!(a_path.exists());

        f.temp
            .upload(&f.session_id, "client", UploadedFile::new("b.txt", "text/plain", "short"))
            .await
            .unwrap();

        let active = f.store.active_temp_files(&f.session_id, "client").await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].original_filename, "b.txt");
        assert!(!a_path.exists());
        assert_eq!(f.temp.indexed_chunks(&f.session_id, "client").await.unwrap(), 0);
        assert_eq!(f.store.temp_file_rows(&f.session_id).len(), 2);
    }

    #[tokio::test]
    async fn failed_processing_removes_written_file() {
        let f = fixture(60_000).await;
        let error = f
            .temp
            .upload(
                &f.session_id,
                "client",
                UploadedFile::new("old.doc", "application/msword", vec![0xd0, 0xcf]),
            )
            .await
            .err()
            .unwrap();

        assert!(matches!(error, Error::Extraction(_)));
        let dir = f.storage.temp_dir("client", &f.session_id);
        assert!(!dir.join("old.doc").exists());
        assert!(f.temp.active_files(&f.session_id, "client").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let f = fixture(60_000).await;
        let error = f
            .temp
            .upload("missing", "client", UploadedFile::new("a.txt", "text/plain", "x"))
            .await
            .err()
            .unwrap();
        assert!(error.is_not_found());
    }

    #[tokio::test]
    async fn cleanup_removes_everything() {
        let f = fixture(60_000).await;
        f.temp
            .upload(&f.session_id, "client", UploadedFile::new("a.txt", "text/plain", "x"))
            .await
            .unwrap();

        f.temp.cleanup_session(&f.session_id, "client").await.unwrap();
        assert!(f.temp.session_documents(&f.session_id, "client").await.unwrap().is_empty());
        assert!(!f.storage.temp_dir("client", &f.session_id).exists());
    }

    #[tokio::test]
    async fn threshold_is_inclusive() {
        let f = fixture(60_000).await;
        let upload = f
            .temp
            .upload(
                &f.session_id,
                "client",
                UploadedFile::new("exact.txt", "text/plain", "x".repeat(60_000)),
            )
            .await
            .unwrap();
        assert!(upload.is_short_document);
        assert_eq!(f.temp.indexed_chunks(&f.session_id, "client").await.unwrap(), 0);

        let upload = f
            .temp
            .upload(
                &f.session_id,
                "client",
                UploadedFile::new("over.txt", "text/plain", "x".repeat(60_001)),
            )
            .await
            .unwrap();
        assert!(!upload.is_short_document);
        assert!(upload.full_content.is_none());
        assert!(f.temp.indexed_chunks(&f.session_id, "client").await.unwrap() > 0);
    }

    #[tokio::test]
    async fn cleanup_files_spares_newer_uploads() {
        let f = fixture(100).await;
        let long = "Alpha document content for indexing. ".repeat(20);
        f.temp
            .upload(&f.session_id, "client", UploadedFile::new("a.txt", "text/plain", long))
            .await
            .unwrap();
        let used = f.temp.active_files(&f.session_id, "client").await.unwrap();

        let newer = "Beta document content for indexing. ".repeat(20);
        let upload = f
            .temp
            .upload(&f.session_id, "client", UploadedFile::new("b.txt", "text/plain", newer))
            .await
            .unwrap();
        let chunks = f.temp.indexed_chunks(&f.session_id, "client").await.unwrap();
        assert!(chunks > 0);

        f.temp
            .cleanup_files(&f.session_id, "client", &used)
            .await
            .unwrap();

        let active = f.temp.active_files(&f.session_id, "client").await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].original_filename, "b.txt");
        assert!(upload.path.exists());
        assert_eq!(f.temp.indexed_chunks(&f.session_id, "client").await.unwrap(), chunks);

        f.temp
            .cleanup_files(&f.session_id, "client", &active)
            .await
            .unwrap();
        assert!(f.temp.active_files(&f.session_id, "client").await.unwrap().is_empty());
        assert!(!upload.path.exists());
        assert_eq!(f.temp.indexed_chunks(&f.session_id, "client").await.unwrap(), 0);
    }
}
