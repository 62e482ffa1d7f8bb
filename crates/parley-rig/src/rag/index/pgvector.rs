//! Knowledge base vector store using PostgreSQL with pgvector.
//!
//! Provides rig-core compatible [`VectorStoreIndex`] and [`InsertDocuments`]
//! implementations over the `knowledge_chunks` table, always scoped to one
//! client.

use parley_postgres::model::NewKnowledgeChunk;
use parley_postgres::query::KnowledgeChunkRepository;
use parley_postgres::{PgClient, PgConn, Vector};
use rig::embeddings::{Embedding, EmbeddingModel};
use rig::one_or_many::OneOrMany;
use rig::vector_store::request::{FilterError, SearchFilter, VectorSearchRequest};
use rig::vector_store::{InsertDocuments, VectorStoreError, VectorStoreIndex};
use serde::{Deserialize, Serialize};

use super::DeleteFilter;
use crate::provider::EmbeddingProvider;
use crate::rag::Document;
use crate::{Result, TRACING_TARGET_RAG};

/// PostgreSQL-backed vector store of one client's knowledge base.
#[derive(Clone)]
pub struct PgVectorStore {
    provider: EmbeddingProvider,
    db: PgClient,
    client_id: String,
}

impl PgVectorStore {
    /// Creates a store scoped to one client.
    pub fn new(provider: EmbeddingProvider, db: PgClient, client_id: impl Into<String>) -> Self {
        Self {
            provider,
            db,
            client_id: client_id.into(),
        }
    }

    /// Returns the embedding provider.
    pub fn provider(&self) -> &EmbeddingProvider {
        &self.provider
    }

    /// Returns the owning client.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Removes chunks. Returns how many were removed.
    pub async fn delete(&self, filter: &DeleteFilter) -> Result<usize> {
        let mut conn = self.db.get_connection().await?;
        let removed = match filter {
            DeleteFilter::All => conn.delete_client_knowledge_chunks(&self.client_id).await?,
            DeleteFilter::Ids(ids) => {
                conn.delete_knowledge_chunks_by_ids(&self.client_id, ids)
                    .await?
            }
            DeleteFilter::Filename(filename) => {
                conn.delete_knowledge_chunks_by_filename(&self.client_id, filename)
                    .await?
            }
        };
        Ok(removed)
    }

    /// Returns the number of stored chunks.
    pub async fn len(&self) -> Result<usize> {
        let mut conn = self.db.get_connection().await?;
        let count = conn.count_client_knowledge_chunks(&self.client_id).await?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    async fn connection(&self) -> std::result::Result<PgConn, VectorStoreError> {
        self.db.get_connection().await.map_err(|e| {
            VectorStoreError::DatastoreError(Box::new(std::io::Error::other(format!(
                "failed to get connection: {e}"
            ))))
        })
    }
}

/// Filter type for knowledge base queries.
///
/// Only equality on `filename` can be expressed; `and` intersects and `or`
/// unites the filename sets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PgFilter {
    /// Chunks of any of these stored files.
    Filenames(Vec<String>),
    /// A condition the store cannot evaluate.
    Unsupported(String),
}

impl PgFilter {
    fn filenames(&self) -> std::result::Result<&[String], FilterError> {
        match self {
            Self::Filenames(filenames) => Ok(filenames),
            Self::Unsupported(condition) => Err(FilterError::TypeError(condition.clone())),
        }
    }
}

impl SearchFilter for PgFilter {
    type Value = serde_json::Value;

    fn eq(key: String, value: Self::Value) -> Self {
        match (key.as_str(), value) {
            ("filename", serde_json::Value::String(filename)) => Self::Filenames(vec![filename]),
            (_, value) => Self::Unsupported(format!("{key} = {value}")),
        }
    }

    fn gt(key: String, value: Self::Value) -> Self {
        Self::Unsupported(format!("{key} > {value}"))
    }

    fn lt(key: String, value: Self::Value) -> Self {
        Self::Unsupported(format!("{key} < {value}"))
    }

    fn and(self, rhs: Self) -> Self {
        match (self, rhs) {
            (Self::Filenames(lhs), Self::Filenames(rhs)) => {
                Self::Filenames(lhs.into_iter().filter(|f| rhs.contains(f)).collect())
            }
            (unsupported @ Self::Unsupported(_), _) | (_, unsupported @ Self::Unsupported(_)) => {
                unsupported
            }
        }
    }

    fn or(self, rhs: Self) -> Self {
        match (self, rhs) {
            (Self::Filenames(mut lhs), Self::Filenames(rhs)) => {
                for filename in rhs {
                    if !lhs.contains(&filename) {
                        lhs.push(filename);
                    }
                }
                Self::Filenames(lhs)
            }
            (unsupported @ Self::Unsupported(_), _) | (_, unsupported @ Self::Unsupported(_)) => {
                unsupported
            }
        }
    }
}

impl InsertDocuments for PgVectorStore {
    async fn insert_documents<Doc: Serialize + rig::Embed + Send>(
        &self,
        documents: Vec<(Doc, OneOrMany<Embedding>)>,
    ) -> std::result::Result<(), VectorStoreError> {
        if documents.is_empty() {
            return Ok(());
        }

        let model_name = self.provider.model_name();

        let new_chunks = documents
            .into_iter()
            .map(|(doc, embeddings)| {
                let document: Document = serde_json::from_value(serde_json::to_value(&doc)?)?;
                let embedding_vec: Vec<f32> = embeddings
                    .first()
                    .vec
                    .iter()
                    .map(|&x| x as f32)
                    .collect();

                Ok(NewKnowledgeChunk {
                    id: document.id,
                    client_id: self.client_id.clone(),
                    filename: document.filename().unwrap_or_default().to_owned(),
                    content: document.content,
                    metadata: serde_json::Value::Object(document.metadata),
                    embedding: Vector::from(embedding_vec),
                    embedding_model: model_name.to_owned(),
                })
            })
            .collect::<std::result::Result<Vec<_>, serde_json::Error>>()?;

        let mut conn = self.connection().await?;
        let created = conn.create_knowledge_chunks(new_chunks).await.map_err(|e| {
            VectorStoreError::DatastoreError(Box::new(std::io::Error::other(format!(
                "failed to create chunks: {e}"
            ))))
        })?;

        tracing::debug!(
            target: TRACING_TARGET_RAG,
            client_id = %self.client_id,
            added = created.len(),
            "Knowledge chunks stored"
        );
        Ok(())
    }
}

impl PgVectorStore {
    async fn search(
        &self,
        req: &VectorSearchRequest<PgFilter>,
    ) -> std::result::Result<Vec<(f64, Document)>, VectorStoreError> {
        if req.samples() == 0 {
            return Ok(Vec::new());
        }

        let filenames = req
            .filter()
            .as_ref()
            .map(PgFilter::filenames)
            .transpose()?;
        let min_score = req.threshold().unwrap_or(f64::MIN);

        let embedding = self.provider.embed_text(req.query()).await?;
        let query_vector: Vector = embedding
            .vec
            .iter()
            .map(|&x| x as f32)
            .collect::<Vec<_>>()
            .into();

        let mut conn = self.connection().await?;
        let scored_chunks = conn
            .search_knowledge_chunks(
                &self.client_id,
                query_vector,
                filenames,
                i64::try_from(req.samples()).unwrap_or(i64::MAX),
            )
            .await
            .map_err(|e| {
                VectorStoreError::DatastoreError(Box::new(std::io::Error::other(format!(
                    "vector search failed: {e}"
                ))))
            })?;

        Ok(scored_chunks
            .into_iter()
            .filter(|scored| scored.score >= min_score)
            .map(|scored| {
                let metadata = match scored.chunk.metadata {
                    serde_json::Value::Object(map) => map,
                    _ => Default::default(),
                };
                let document = Document {
                    id: scored.chunk.id,
                    content: scored.chunk.content,
                    metadata,
                };
                (scored.score, document)
            })
            .collect())
    }
}

impl VectorStoreIndex for PgVectorStore {
    type Filter = PgFilter;

    async fn top_n<T: for<'a> Deserialize<'a> + Send>(
        &self,
        req: VectorSearchRequest<Self::Filter>,
    ) -> std::result::Result<Vec<(f64, String, T)>, VectorStoreError> {
        self.search(&req)
            .await?
            .into_iter()
            .map(|(score, document)| {
                let id = document.id.to_string();
                let doc: T = serde_json::from_value(serde_json::to_value(document)?)?;
                Ok((score, id, doc))
            })
            .collect()
    }

    async fn top_n_ids(
        &self,
        req: VectorSearchRequest<Self::Filter>,
    ) -> std::result::Result<Vec<(f64, String)>, VectorStoreError> {
        Ok(self
            .search(&req)
            .await?
            .into_iter()
            .map(|(score, document)| (score, document.id.to_string()))
            .collect())
    }
}

impl std::fmt::Debug for PgVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgVectorStore")
            .field("client_id", &self.client_id)
            .field("provider", &self.provider)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn filename_filters_combine() {
        let a = PgFilter::eq("filename".into(), json!("a.txt"));
        let b = PgFilter::eq("filename".into(), json!("b.txt"));

        let either = a.clone().or(b.clone());
        assert_eq!(either.filenames().unwrap(), ["a.txt", "b.txt"]);
        assert!(a.clone().and(b).filenames().unwrap().is_empty());
        assert_eq!(either.and(a).filenames().unwrap(), ["a.txt"]);
    }

    #[test]
    fn unsupported_conditions_are_rejected() {
        let filter = PgFilter::eq("filename".into(), json!("a.txt"))
            .or(PgFilter::gt("size".into(), json!(10)));
        assert!(matches!(filter.filenames(), Err(FilterError::TypeError(_))));
        assert!(PgFilter::eq("page".into(), json!(1)).filenames().is_err());
    }
}
