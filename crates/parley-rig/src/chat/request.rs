//! Chat turn request.

use super::RetrievalFlags;

/// A user message to answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub client_id: String,
    pub message: String,
    /// Existing session; a new one is created when absent.
    pub session_id: Option<String>,
    /// Registry model identifier; the default chat model when absent.
    pub model_id: Option<String>,
    pub retrieval: RetrievalFlags,
}

impl ChatRequest {
    /// Creates a request without retrieval.
    pub fn new(client_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            message: message.into(),
            session_id: None,
            model_id: None,
            retrieval: RetrievalFlags::default(),
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }

    pub fn with_web_search(mut self, enabled: bool) -> Self {
        self.retrieval.web_search = enabled;
        self
    }

    pub fn with_vector_search(mut self, enabled: bool) -> Self {
        self.retrieval.vector_search = enabled;
        self
    }

    pub fn with_temp_doc_search(mut self, enabled: bool) -> Self {
        self.retrieval.temp_doc_search = enabled;
        self
    }
}
