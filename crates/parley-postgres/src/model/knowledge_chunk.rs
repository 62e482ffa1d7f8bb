//! Knowledge-base chunk model.

use diesel::prelude::*;
use jiff_diesel::Timestamp;
use pgvector::Vector;
use uuid::Uuid;

use crate::schema::knowledge_chunks;

/// A text chunk in a client's knowledge base together with its embedding.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = knowledge_chunks)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct KnowledgeChunk {
    /// Unique chunk identifier.
    pub id: Uuid,
    /// Owning client identifier.
    pub client_id: String,
    /// Stored filename of the source document.
    pub filename: String,
    /// Chunk text.
    pub content: String,
    /// Additional metadata (JSON object).
    pub metadata: serde_json::Value,
    /// Embedding vector.
    pub embedding: Vector,
    /// Model used to produce the embedding.
    pub embedding_model: String,
    /// Timestamp when the chunk was created.
    pub created_at: Timestamp,
}

/// Data for inserting a knowledge-base chunk.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = knowledge_chunks)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewKnowledgeChunk {
    pub id: Uuid,
    pub client_id: String,
    pub filename: String,
    pub content: String,
    pub metadata: serde_json::Value,
    pub embedding: Vector,
    pub embedding_model: String,
}

/// A knowledge chunk with its cosine similarity to a query.
#[derive(Debug, Clone)]
pub struct ScoredKnowledgeChunk {
    /// The matched chunk.
    pub chunk: KnowledgeChunk,
    /// Similarity score (1 - cosine distance).
    pub score: f64,
}
