//! OpenAI-compatible chat model.

use std::time::Duration;

use async_trait::async_trait;
use rig::providers::openai;

use super::streaming::{ChatCompletionBody, StreamRequest, open_stream};
use super::{DeltaStream, LanguageModel, ModelDescriptor, Prompt, RetryPolicy, completion};
use crate::{Error, Result, TRACING_TARGET_PROVIDER};

/// Sampling parameters fixed per deployment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub temperature: f64,
    pub max_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 4096,
        }
    }
}

/// A chat model reached over the `chat/completions` protocol.
///
/// Streaming goes through the SSE client in this module; one-shot completion
/// goes through rig-core.
pub struct ChatModel {
    descriptor: ModelDescriptor,
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    params: GenerationParams,
    retry: RetryPolicy,
    completion: openai::CompletionModel,
}

impl ChatModel {
    /// Creates a chat model for the descriptor.
    pub fn new(
        descriptor: ModelDescriptor,
        api_key: impl Into<String>,
        params: GenerationParams,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::config("LLM API key is missing"));
        }

        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .read_timeout(timeout)
            .build()
            .map_err(|e| Error::provider(&descriptor.id, e))?;

        let completion =
            completion::completion_model(&api_key, &descriptor.base_url, &descriptor.model_name)?;
        let endpoint = format!(
            "{}/chat/completions",
            descriptor.base_url.trim_end_matches('/')
        );

        tracing::debug!(
            target: TRACING_TARGET_PROVIDER,
            model_id = %descriptor.id,
            model = %descriptor.model_name,
            "Chat model initialized"
        );

        Ok(Self {
            descriptor,
            http,
            endpoint,
            api_key,
            params,
            retry,
            completion,
        })
    }

    /// Returns the registry descriptor of this model.
    pub fn descriptor(&self) -> &ModelDescriptor {
        &self.descriptor
    }
}

#[async_trait]
impl LanguageModel for ChatModel {
    fn model_name(&self) -> &str {
        &self.descriptor.model_name
    }

    #[tracing::instrument(skip_all, target = TRACING_TARGET_PROVIDER, fields(model_id = %self.descriptor.id))]
    async fn stream(&self, prompt: &Prompt) -> Result<DeltaStream> {
        open_stream(StreamRequest {
            http: &self.http,
            url: &self.endpoint,
            api_key: &self.api_key,
            provider: &self.descriptor.id,
            retry: self.retry,
            body: ChatCompletionBody {
                model: self.descriptor.model_name.clone(),
                messages: prompt.messages.clone(),
                temperature: self.params.temperature,
                max_tokens: self.params.max_tokens,
                stream: true,
            },
        })
        .await
    }

    #[tracing::instrument(skip_all, target = TRACING_TARGET_PROVIDER, fields(model_id = %self.descriptor.id))]
    async fn complete(&self, prompt: &Prompt) -> Result<String> {
        completion::complete(
            &self.completion,
            &self.descriptor.model_name,
            prompt,
            self.params.temperature,
            self.params.max_tokens,
        )
        .await
    }
}

impl std::fmt::Debug for ChatModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatModel")
            .field("id", &self.descriptor.id)
            .field("model", &self.descriptor.model_name)
            .field("endpoint", &self.endpoint)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}
