//! Non-streaming completion through rig-core.

use rig::completion::{AssistantContent, CompletionModel as RigCompletionModel};
use rig::message::Message;
use rig::one_or_many::OneOrMany;
use rig::prelude::CompletionClient;
use rig::providers::openai;

use super::{Prompt, PromptRole};
use crate::{Error, Result};

/// Builds a rig completion model bound to an OpenAI-compatible endpoint.
pub(crate) fn completion_model(
    api_key: &str,
    base_url: &str,
    model_name: &str,
) -> Result<openai::CompletionModel> {
    let client = openai::Client::builder()
        .api_key(api_key)
        .base_url(base_url)
        .build()
        .map_err(|e| Error::provider("openai", e.to_string()))?
        .completions_api();

    Ok(client.completion_model(model_name))
}

/// Sends the prompt and returns the concatenated answer text.
pub(crate) async fn complete(
    model: &openai::CompletionModel,
    model_name: &str,
    prompt: &Prompt,
    temperature: f64,
    max_tokens: u32,
) -> Result<String> {
    let input = prompt
        .input()
        .ok_or_else(|| Error::invalid_input("prompt has no user message"))?;

    let history: Vec<Message> = prompt
        .history()
        .iter()
        .filter_map(|message| match message.role {
            PromptRole::User => Some(Message::user(message.content.as_str())),
            PromptRole::Assistant => Some(Message::assistant(message.content.as_str())),
            PromptRole::System => None,
        })
        .collect();

    let mut request = model
        .completion_request(input)
        .messages(history)
        .temperature(temperature)
        .max_tokens(u64::from(max_tokens));
    if let Some(system) = prompt.system() {
        request = request.preamble(system);
    }

    let response = request
        .send()
        .await
        .map_err(|e| Error::provider(model_name, e.to_string()))?;

    Ok(extract_text_content(&response.choice))
}

/// Extracts text content from assistant content choices.
fn extract_text_content(choice: &OneOrMany<AssistantContent>) -> String {
    choice
        .iter()
        .filter_map(|content| match content {
            AssistantContent::Text(text) => Some(text.text()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("")
}
