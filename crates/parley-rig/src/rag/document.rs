//! Documents stored in vector indexes.

use rig::embeddings::{EmbedError, TextEmbedder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Free-form document metadata.
pub type Metadata = serde_json::Map<String, Value>;

/// A piece of text with metadata, as loaded from a file or stored in an index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Identifier assigned when the document is created.
    pub id: Uuid,
    /// Text content.
    pub content: String,
    /// Arbitrary metadata (`filename`, `mime_type`, `sheet`, ...).
    #[serde(default)]
    pub metadata: Metadata,
}

impl Document {
    /// Creates a document with a fresh identifier and empty metadata.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            content: content.into(),
            metadata: Metadata::new(),
        }
    }

    /// Sets one metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Merges the given metadata, overwriting existing keys.
    pub fn with_metadata_map(mut self, metadata: &Metadata) -> Self {
        for (key, value) in metadata {
            self.metadata.insert(key.clone(), value.clone());
        }
        self
    }

    /// Returns a string metadata value.
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    /// Returns the stored filename the document came from.
    #[inline]
    pub fn filename(&self) -> Option<&str> {
        self.metadata_str("filename")
    }

    /// Returns the number of characters of the content.
    #[inline]
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}

impl rig::Embed for Document {
    fn embed(&self, embedder: &mut TextEmbedder) -> Result<(), EmbedError> {
        embedder.embed(self.content.clone());
        Ok(())
    }
}

/// A document returned by a similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredDocument {
    /// The matched document.
    pub document: Document,
    /// Cosine similarity to the query.
    pub score: f64,
}
