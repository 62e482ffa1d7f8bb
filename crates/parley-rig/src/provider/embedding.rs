//! Embeddings through rig-core.

use std::sync::Arc;

use async_trait::async_trait;
use rig::embeddings::{Embedding, EmbeddingError, EmbeddingModel as RigEmbeddingModel};
use rig::prelude::EmbeddingsClient;
use rig::providers::openai;

use super::Embedder;
use crate::{Error, Result};

/// Maximum documents per embedding request.
const MAX_BATCH_SIZE: usize = 64;

/// Embedding model served by an OpenAI-compatible endpoint.
#[derive(Clone)]
pub struct RigEmbedder {
    model: openai::EmbeddingModel,
    model_name: String,
    ndims: usize,
}

impl RigEmbedder {
    /// Creates an embedder for the given endpoint and model.
    pub fn new(api_key: &str, base_url: &str, model_name: &str, ndims: usize) -> Result<Self> {
        let client = openai::Client::builder()
            .api_key(api_key)
            .base_url(base_url)
            .build()
            .map_err(|e| Error::provider("openai", e.to_string()))?;

        Ok(Self {
            model: client.embedding_model_with_ndims(model_name, ndims),
            model_name: model_name.to_owned(),
            ndims,
        })
    }
}

#[async_trait]
impl Embedder for RigEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn ndims(&self) -> usize {
        self.ndims
    }

    async fn embed_texts(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(MAX_BATCH_SIZE) {
            let embeddings = self
                .model
                .embed_texts(batch.to_vec())
                .await
                .map_err(|e| Error::embedding(format!("{}: {e}", self.model_name)))?;

            vectors.extend(
                embeddings
                    .into_iter()
                    .map(|embedding| embedding.vec.into_iter().map(|v| v as f32).collect()),
            );
        }

        if vectors.len() != texts.len() {
            return Err(Error::embedding(format!(
                "expected {} embeddings, received {}",
                texts.len(),
                vectors.len()
            )));
        }
        Ok(vectors)
    }
}

impl std::fmt::Debug for RigEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RigEmbedder")
            .field("model", &self.model_name)
            .field("ndims", &self.ndims)
            .finish()
    }
}

/// rig embedding model backed by any [`Embedder`].
///
/// Vector stores and `EmbeddingsBuilder` take this type, so tests can run
/// them over a deterministic embedder. Cheap to clone.
#[derive(Clone)]
pub struct EmbeddingProvider(Arc<dyn Embedder>);

impl EmbeddingProvider {
    /// Wraps an embedder.
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self(embedder)
    }

    /// Returns the model name.
    pub fn model_name(&self) -> &str {
        self.0.model_name()
    }
}

impl RigEmbeddingModel for EmbeddingProvider {
    type Client = Arc<dyn Embedder>;

    const MAX_DOCUMENTS: usize = MAX_BATCH_SIZE;

    fn make(client: &Self::Client, _model: impl Into<String>, _dims: Option<usize>) -> Self {
        Self(Arc::clone(client))
    }

    fn ndims(&self) -> usize {
        self.0.ndims()
    }

    async fn embed_texts(
        &self,
        texts: impl IntoIterator<Item = String> + Send,
    ) -> std::result::Result<Vec<Embedding>, EmbeddingError> {
        let texts: Vec<String> = texts.into_iter().collect();
        let vectors = self
            .0
            .embed_texts(texts.clone())
            .await
            .map_err(|e| EmbeddingError::ProviderError(e.to_string()))?;

        Ok(texts
            .into_iter()
            .zip(vectors)
            .map(|(document, vector)| Embedding {
                document,
                vec: vector.into_iter().map(f64::from).collect(),
            })
            .collect())
    }
}

impl std::fmt::Debug for EmbeddingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingProvider")
            .field("model", &self.0.model_name())
            .field("ndims", &self.0.ndims())
            .finish()
    }
}
