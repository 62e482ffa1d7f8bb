//! Configuration for the rig service.

use std::path::{Path, PathBuf};
use std::time::Duration;

#[cfg(feature = "config")]
use clap::Args;
use serde::{Deserialize, Serialize};

use crate::provider::{DEFAULT_CHAT_MODEL_ID, DEFAULT_PROMPT_MODEL_ID};
use crate::{Error, Result};

/// Configuration for chat turns, retrieval and storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
pub struct RigConfig {
    #[cfg_attr(feature = "config", command(flatten))]
    pub llm: LlmConfig,

    #[cfg_attr(feature = "config", command(flatten))]
    pub embedding: EmbeddingConfig,

    #[cfg_attr(feature = "config", command(flatten))]
    pub web_search: WebSearchConfig,

    #[cfg_attr(feature = "config", command(flatten))]
    pub rag: RagConfig,

    #[cfg_attr(feature = "config", command(flatten))]
    pub storage: StorageConfig,
}

impl RigConfig {
    /// Creates a configuration with defaults and the given LLM API key.
    pub fn new(llm_api_key: impl Into<String>) -> Self {
        Self {
            llm: LlmConfig::new(llm_api_key),
            embedding: EmbeddingConfig::default(),
            web_search: WebSearchConfig::default(),
            rag: RagConfig::default(),
            storage: StorageConfig::default(),
        }
    }

    /// Validates every configuration group.
    pub fn validate(&self) -> Result<()> {
        self.llm.validate()?;
        self.embedding.validate()?;
        self.rag.validate()
    }
}

/// Language model provider settings.
///
/// Sampling parameters and retries apply to every request of the deployment.
#[derive(Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
pub struct LlmConfig {
    /// API key of the OpenAI-compatible provider
    #[cfg_attr(feature = "config", arg(long, env = "LLM_API_KEY", hide_env_values = true))]
    pub llm_api_key: String,

    /// Base URL of the OpenAI-compatible provider
    #[cfg_attr(
        feature = "config",
        arg(
            long,
            env = "LLM_BASE_URL",
            default_value = "https://ark.cn-beijing.volces.com/api/v3"
        )
    )]
    pub llm_base_url: String,

    /// Sampling temperature
    #[cfg_attr(
        feature = "config",
        arg(long, env = "LLM_TEMPERATURE", default_value = "0.7")
    )]
    pub llm_temperature: f64,

    /// Maximum number of generated tokens
    #[cfg_attr(
        feature = "config",
        arg(long, env = "LLM_MAX_TOKENS", default_value = "4096")
    )]
    pub llm_max_tokens: u32,

    /// Retries when opening a model stream
    #[cfg_attr(
        feature = "config",
        arg(long, env = "LLM_MAX_RETRIES", default_value = "3")
    )]
    pub llm_max_retries: u32,

    /// Read timeout of model requests in seconds
    #[cfg_attr(
        feature = "config",
        arg(long, env = "LLM_TIMEOUT_SECS", default_value = "120")
    )]
    pub llm_timeout_secs: u64,

    /// Model used for chat turns when none is requested
    #[cfg_attr(
        feature = "config",
        arg(long, env = "DEFAULT_MODEL_ID", default_value = DEFAULT_CHAT_MODEL_ID)
    )]
    pub default_model_id: String,

    /// Model used to generate system prompts
    #[cfg_attr(
        feature = "config",
        arg(long, env = "PROMPT_MODEL_ID", default_value = DEFAULT_PROMPT_MODEL_ID)
    )]
    pub prompt_model_id: String,
}

impl LlmConfig {
    /// Creates a configuration with default settings.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            llm_api_key: api_key.into(),
            llm_base_url: "https://ark.cn-beijing.volces.com/api/v3".to_owned(),
            llm_temperature: 0.7,
            llm_max_tokens: 4096,
            llm_max_retries: 3,
            llm_timeout_secs: 120,
            default_model_id: DEFAULT_CHAT_MODEL_ID.to_owned(),
            prompt_model_id: DEFAULT_PROMPT_MODEL_ID.to_owned(),
        }
    }

    /// Returns the request timeout.
    #[inline]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.llm_api_key.trim().is_empty() {
            return Err(Error::config("LLM_API_KEY is required"));
        }
        if !(0.0..=2.0).contains(&self.llm_temperature) {
            return Err(Error::config("llm_temperature must be between 0 and 2"));
        }
        if self.llm_max_tokens == 0 {
            return Err(Error::config("llm_max_tokens must be positive"));
        }
        Ok(())
    }
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("llm_base_url", &self.llm_base_url)
            .field("llm_temperature", &self.llm_temperature)
            .field("llm_max_tokens", &self.llm_max_tokens)
            .field("llm_max_retries", &self.llm_max_retries)
            .field("llm_timeout_secs", &self.llm_timeout_secs)
            .field("default_model_id", &self.default_model_id)
            .field("prompt_model_id", &self.prompt_model_id)
            .finish_non_exhaustive()
    }
}

/// Embedding model settings. The LLM API key is reused.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
pub struct EmbeddingConfig {
    /// Embedding model name
    #[cfg_attr(
        feature = "config",
        arg(long, env = "EMBEDDING_MODEL", default_value = "ep-20250309154255-82c9k")
    )]
    pub embedding_model: String,

    /// Number of dimensions of the embedding vectors
    #[cfg_attr(
        feature = "config",
        arg(long, env = "EMBEDDING_DIMENSIONS", default_value = "2560")
    )]
    pub embedding_dimensions: usize,

    /// Embedding API base URL (defaults to the LLM base URL)
    #[cfg_attr(feature = "config", arg(long, env = "EMBEDDING_BASE_URL"))]
    pub embedding_base_url: Option<String>,
}

impl EmbeddingConfig {
    /// Returns the base URL, falling back to the LLM provider's.
    pub fn base_url<'a>(&'a self, llm: &'a LlmConfig) -> &'a str {
        self.embedding_base_url
            .as_deref()
            .unwrap_or(&llm.llm_base_url)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.embedding_model.trim().is_empty() {
            return Err(Error::config("embedding_model cannot be empty"));
        }
        if self.embedding_dimensions == 0 {
            return Err(Error::config("embedding_dimensions must be positive"));
        }
        Ok(())
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            embedding_model: "ep-20250309154255-82c9k".to_owned(),
            embedding_dimensions: 2560,
            embedding_base_url: None,
        }
    }
}

/// Exa web search settings.
#[derive(Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
pub struct WebSearchConfig {
    /// Exa API key (web search fails without it)
    #[cfg_attr(feature = "config", arg(long, env = "EXA_API_KEY", hide_env_values = true))]
    pub exa_api_key: Option<String>,

    /// Exa API base URL
    #[cfg_attr(
        feature = "config",
        arg(long, env = "EXA_BASE_URL", default_value = "https://api.exa.ai")
    )]
    pub exa_base_url: String,

    /// Number of web results per query
    #[cfg_attr(
        feature = "config",
        arg(long, env = "WEB_SEARCH_RESULTS", default_value = "5")
    )]
    pub web_search_results: usize,

    /// Web search request timeout in seconds
    #[cfg_attr(
        feature = "config",
        arg(long = "http-timeout", env = "HTTP_TIMEOUT", default_value = "30")
    )]
    pub http_timeout_secs: u64,
}

impl WebSearchConfig {
    /// Returns the request timeout.
    #[inline]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            exa_api_key: None,
            exa_base_url: "https://api.exa.ai".to_owned(),
            web_search_results: 5,
            http_timeout_secs: 30,
        }
    }
}

impl std::fmt::Debug for WebSearchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSearchConfig")
            .field("exa_api_key", &self.exa_api_key.as_ref().map(|_| "***"))
            .field("exa_base_url", &self.exa_base_url)
            .field("web_search_results", &self.web_search_results)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .finish()
    }
}

/// Chunking, retrieval and caching settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
pub struct RagConfig {
    /// Chunk size in characters
    #[cfg_attr(feature = "config", arg(long, env = "CHUNK_SIZE", default_value = "1000"))]
    pub chunk_size: usize,

    /// Overlap between consecutive chunks in characters
    #[cfg_attr(
        feature = "config",
        arg(long, env = "CHUNK_OVERLAP", default_value = "200")
    )]
    pub chunk_overlap: usize,

    /// Documents up to this many characters are inlined instead of indexed
    #[cfg_attr(
        feature = "config",
        arg(long, env = "SHORT_DOCUMENT_THRESHOLD", default_value = "60000")
    )]
    pub short_document_threshold: usize,

    /// Chunks returned by a temporary document search
    #[cfg_attr(
        feature = "config",
        arg(long, env = "TEMP_SEARCH_RESULTS", default_value = "5")
    )]
    pub temp_search_results: usize,

    /// Chunks returned by a knowledge base search during a chat turn
    #[cfg_attr(
        feature = "config",
        arg(long, env = "KNOWLEDGE_SEARCH_RESULTS", default_value = "3")
    )]
    pub knowledge_search_results: usize,

    /// Number of vector index handles kept in memory
    #[cfg_attr(
        feature = "config",
        arg(long, env = "VECTOR_CACHE_CAPACITY", default_value = "64")
    )]
    pub vector_cache_capacity: usize,

    /// Message pairs loaded as conversation history
    #[cfg_attr(
        feature = "config",
        arg(long, env = "HISTORY_PAIRS", default_value = "20")
    )]
    pub history_pairs: usize,
}

impl RagConfig {
    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::config("chunk_size must be positive"));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(Error::config("chunk_overlap must be smaller than chunk_size"));
        }
        if self.temp_search_results == 0 || self.knowledge_search_results == 0 {
            return Err(Error::config("search result counts must be positive"));
        }
        if self.vector_cache_capacity == 0 {
            return Err(Error::config("vector_cache_capacity must be positive"));
        }
        if self.history_pairs == 0 {
            return Err(Error::config("history_pairs must be positive"));
        }
        Ok(())
    }
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            short_document_threshold: 60_000,
            temp_search_results: 5,
            knowledge_search_results: 3,
            vector_cache_capacity: 64,
            history_pairs: 20,
        }
    }
}

/// On-disk layout of uploaded files and vector indexes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
pub struct StorageConfig {
    /// Root directory for uploads and vector indexes
    #[cfg_attr(feature = "config", arg(long, env = "DATA_DIR", default_value = "."))]
    pub data_dir: PathBuf,
}

impl StorageConfig {
    /// Creates a layout rooted at `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Directory holding a session's temporary uploads.
    pub fn temp_dir(&self, client_id: &str, session_id: &str) -> PathBuf {
        self.data_dir.join("temp").join(client_id).join(session_id)
    }

    /// Directory holding a session's temporary vector index.
    pub fn temp_index_dir(&self, client_id: &str, session_id: &str) -> PathBuf {
        self.data_dir
            .join("vector_store")
            .join("temp")
            .join(client_id)
            .join(session_id)
    }

    /// Directory holding a client's file-backed knowledge base index.
    pub fn knowledge_index_dir(&self, client_id: &str) -> PathBuf {
        self.data_dir
            .join("vector_store")
            .join("knowledge")
            .join(client_id)
    }

    /// Directory holding a client's knowledge base uploads.
    pub fn uploads_dir(&self, client_id: &str) -> PathBuf {
        self.data_dir.join("uploads").join(client_id)
    }

    /// Directory holding a client's reader uploads.
    pub fn reader_dir(&self, client_id: &str) -> PathBuf {
        self.data_dir.join("reader").join(client_id)
    }

    /// Returns the root directory.
    pub fn root(&self) -> &Path {
        &self.data_dir
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::new(".")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = RigConfig::new("key");
        assert!(config.validate().is_ok());
        assert_eq!(config.rag.short_document_threshold, 60_000);
        assert_eq!(config.llm.llm_max_retries, 3);
    }

    #[test]
    fn missing_api_key_is_config_error() {
        let error = RigConfig::new(" ").validate().err().unwrap();
        assert!(error.is_fatal_config());
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk() {
        let rag = RagConfig {
            chunk_overlap: 1000,
            ..RagConfig::default()
        };
        assert!(rag.validate().is_err());
    }

    #[test]
    fn storage_layout() {
        let storage = StorageConfig::new("/data");
        assert_eq!(storage.temp_dir("c", "s"), PathBuf::from("/data/temp/c/s"));
        assert_eq!(
            storage.temp_index_dir("c", "s"),
            PathBuf::from("/data/vector_store/temp/c/s")
        );
        assert_eq!(storage.uploads_dir("c"), PathBuf::from("/data/uploads/c"));
        assert_eq!(
            storage.knowledge_index_dir("c"),
            PathBuf::from("/data/vector_store/knowledge/c")
        );
    }

    #[test]
    fn embedding_base_url_falls_back_to_llm() {
        let llm = LlmConfig::new("key");
        let embedding = EmbeddingConfig::default();
        assert_eq!(embedding.base_url(&llm), llm.llm_base_url);
    }
}
