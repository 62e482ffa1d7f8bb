//! Immutable registry of configured chat models.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{ChatModel, GenerationParams, LanguageModel, RetryPolicy};
use crate::{Error, LlmConfig, Result};

/// Model used for chat turns when the caller does not pick one.
pub const DEFAULT_CHAT_MODEL_ID: &str = "bytedance_deepseek_r1";

/// Model used for system prompt generation when the caller does not pick one.
pub const DEFAULT_PROMPT_MODEL_ID: &str = "bytedance_deepseek_v3";

/// Registry entry describing a selectable model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDescriptor {
    /// Identifier callers select the model by.
    pub id: String,
    /// Human readable title.
    pub title: String,
    /// Provider-side model (or endpoint) name.
    pub model_name: String,
    /// Base URL of the OpenAI-compatible API.
    pub base_url: String,
}

impl ModelDescriptor {
    /// Creates a new descriptor.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        model_name: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            model_name: model_name.into(),
            base_url: base_url.into(),
        }
    }

    /// Returns the built-in model table for the given base URL.
    pub fn builtin(base_url: &str) -> Vec<Self> {
        vec![
            Self::new(
                "bytedance_deepseek_r1",
                "Bytedance DeepSeek R1",
                "ep-20250302171546-xszb9",
                base_url,
            ),
            Self::new(
                "bytedance_deepseek_v3",
                "Bytedance DeepSeek V3",
                "ep-20250309090613-88xr2",
                base_url,
            ),
        ]
    }
}

struct RegisteredModel {
    descriptor: ModelDescriptor,
    model: Arc<dyn LanguageModel>,
}

/// Registry of chat models, built once at startup and shared by reference.
///
/// Looking up an unknown id is a configuration error, never a retryable one.
pub struct ModelRegistry {
    models: HashMap<String, RegisteredModel>,
    order: Vec<String>,
    default_chat: String,
    default_prompt: String,
}

impl ModelRegistry {
    /// Creates a registry, validating ids and defaults.
    pub fn new(
        models: Vec<(ModelDescriptor, Arc<dyn LanguageModel>)>,
        default_chat: impl Into<String>,
        default_prompt: impl Into<String>,
    ) -> Result<Self> {
        let default_chat = default_chat.into();
        let default_prompt = default_prompt.into();

        let mut map = HashMap::with_capacity(models.len());
        let mut order = Vec::with_capacity(models.len());
        for (descriptor, model) in models {
            if map.contains_key(&descriptor.id) {
                return Err(Error::config(format!("duplicate model id: {}", descriptor.id)));
            }
            order.push(descriptor.id.clone());
            map.insert(descriptor.id.clone(), RegisteredModel { descriptor, model });
        }

        for default in [&default_chat, &default_prompt] {
            if !map.contains_key(default) {
                return Err(Error::config(format!("default model not found: {default}")));
            }
        }

        Ok(Self {
            models: map,
            order,
            default_chat,
            default_prompt,
        })
    }

    /// Builds the built-in models from configuration.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let params = GenerationParams {
            temperature: config.llm_temperature,
            max_tokens: config.llm_max_tokens,
        };
        let retry = RetryPolicy::with_max_retries(config.llm_max_retries);
        let timeout = Duration::from_secs(config.llm_timeout_secs);

        let models = ModelDescriptor::builtin(&config.llm_base_url)
            .into_iter()
            .map(|descriptor| {
                let model = ChatModel::new(
                    descriptor.clone(),
                    config.llm_api_key.as_str(),
                    params,
                    retry,
                    timeout,
                )?;
                Ok((descriptor, Arc::new(model) as Arc<dyn LanguageModel>))
            })
            .collect::<Result<Vec<_>>>()?;

        Self::new(models, &config.default_model_id, &config.prompt_model_id)
    }

    /// Resolves a model by id.
    pub fn resolve(&self, id: &str) -> Result<Arc<dyn LanguageModel>> {
        self.models
            .get(id)
            .map(|entry| Arc::clone(&entry.model))
            .ok_or_else(|| Error::config(format!("Model {id} not found in configuration")))
    }

    /// Resolves the chat model, falling back to the default.
    pub fn resolve_chat(&self, id: Option<&str>) -> Result<Arc<dyn LanguageModel>> {
        self.resolve(id.unwrap_or(&self.default_chat))
    }

    /// Resolves the prompt generation model, falling back to the default.
    pub fn resolve_prompt(&self, id: Option<&str>) -> Result<Arc<dyn LanguageModel>> {
        self.resolve(id.unwrap_or(&self.default_prompt))
    }

    /// Returns the descriptors in registration order.
    pub fn list(&self) -> Vec<&ModelDescriptor> {
        self.order
            .iter()
            .filter_map(|id| self.models.get(id))
            .map(|entry| &entry.descriptor)
            .collect()
    }

    /// Returns the default chat model id.
    pub fn default_chat_id(&self) -> &str {
        &self.default_chat
    }

    /// Returns the default prompt generation model id.
    pub fn default_prompt_id(&self) -> &str {
        &self.default_prompt
    }
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("models", &self.order)
            .field("default_chat", &self.default_chat)
            .field("default_prompt", &self.default_prompt)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedModel;

    fn entry(id: &str) -> (ModelDescriptor, Arc<dyn LanguageModel>) {
        (
            ModelDescriptor::new(id, id, format!("{id}-endpoint"), "http://localhost"),
            Arc::new(ScriptedModel::new(Vec::new())),
        )
    }

    #[test]
    fn builtin_table() {
        let models = ModelDescriptor::builtin("https://ark.example/api/v3");
        assert_eq!(models.len(), 2);
        assert_eq!(models[0].id, DEFAULT_CHAT_MODEL_ID);
        assert_eq!(models[0].model_name, "ep-20250302171546-xszb9");
        assert_eq!(models[1].id, DEFAULT_PROMPT_MODEL_ID);
        assert_eq!(models[1].base_url, "https://ark.example/api/v3");
    }

    #[test]
    fn resolves_defaults_and_lists_in_order() {
        let registry = ModelRegistry::new(vec![entry("a"), entry("b")], "a", "b").unwrap();
        assert!(registry.resolve_chat(None).is_ok());
        assert!(registry.resolve_prompt(Some("a")).is_ok());
        let ids: Vec<_> = registry.list().iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
    }

    #[test]
    fn unknown_model_is_fatal_config_error() {
        let registry = ModelRegistry::new(vec![entry("a")], "a", "a").unwrap();
        let error = registry.resolve("missing").err().unwrap();
        assert!(error.is_fatal_config());
        assert!(!error.is_retryable());
    }

    #[test]
    fn rejects_duplicates_and_missing_defaults() {
        assert!(ModelRegistry::new(vec![entry("a"), entry("a")], "a", "a").is_err());
        assert!(ModelRegistry::new(vec![entry("a")], "a", "b").is_err());
    }
}
