//! Language model and embedding providers.
//!
//! This module provides:
//! - [`LanguageModel`] and [`Embedder`] - the seams the chat core talks to
//! - [`ModelRegistry`] - immutable registry of configured chat models
//! - [`ChatModel`] - OpenAI-compatible model with SSE streaming and rig-backed completion
//! - [`RigEmbedder`] - rig-backed embedding model
//! - [`EmbeddingProvider`] - rig `EmbeddingModel` over any [`Embedder`], used by the vector stores

mod chat_model;
mod completion;
mod embedding;
mod message;
mod registry;
mod retry;
mod sse;
mod streaming;

use async_trait::async_trait;
use futures::stream::BoxStream;

pub use self::chat_model::{ChatModel, GenerationParams};
pub use self::embedding::{EmbeddingProvider, RigEmbedder};
pub use self::message::{Prompt, PromptMessage, PromptRole};
pub use self::registry::{
    DEFAULT_CHAT_MODEL_ID, DEFAULT_PROMPT_MODEL_ID, ModelDescriptor, ModelRegistry,
};
pub use self::retry::RetryPolicy;
use crate::Result;

/// One token received from a streaming model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelDelta {
    /// Answer text.
    Content(String),
    /// Reasoning trace text.
    Reasoning(String),
}

/// Ordered stream of model deltas.
pub type DeltaStream = BoxStream<'static, Result<ModelDelta>>;

/// A chat model that can stream and complete prompts.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Returns the provider-side model name.
    fn model_name(&self) -> &str;

    /// Opens a token stream for the prompt.
    ///
    /// Deltas are yielded in the order the provider emits them.
    async fn stream(&self, prompt: &Prompt) -> Result<DeltaStream>;

    /// Runs the prompt to completion and returns the answer text.
    async fn complete(&self, prompt: &Prompt) -> Result<String>;
}

/// A model that turns texts into embedding vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the provider-side model name.
    fn model_name(&self) -> &str;

    /// Returns the number of dimensions of every produced vector.
    fn ndims(&self) -> usize;

    /// Embeds a batch of documents, preserving order.
    async fn embed_texts(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;
}
