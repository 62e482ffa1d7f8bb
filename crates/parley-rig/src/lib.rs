#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

pub mod chat;
mod error;
pub mod provider;
pub mod rag;
pub mod reader;
mod service;
pub mod session;
pub mod store;
pub mod web;

#[cfg(any(test, feature = "test-utils"))]
#[cfg_attr(docsrs, doc(cfg(feature = "test-utils")))]
pub mod testing;

pub use error::{Error, Result};
pub use service::{
    EmbeddingConfig, LlmConfig, RagConfig, RigComponents, RigConfig, RigService, StorageConfig,
    WebSearchConfig,
};

/// Tracing target for the main library.
pub const TRACING_TARGET: &str = "parley_rig";

/// Tracing target for chat turns.
pub const TRACING_TARGET_CHAT: &str = "parley_rig::chat";

/// Tracing target for document storage, indexing and retrieval.
pub const TRACING_TARGET_RAG: &str = "parley_rig::rag";

/// Tracing target for model and web search providers.
pub const TRACING_TARGET_PROVIDER: &str = "parley_rig::provider";

/// Tracing target for the document reader.
pub const TRACING_TARGET_READER: &str = "parley_rig::reader";

/// Tracing target for session management.
pub const TRACING_TARGET_SESSION: &str = "parley_rig::session";
