//! Exa search API client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{WebResult, WebSearch};
use crate::{Error, Result, TRACING_TARGET_PROVIDER, WebSearchConfig};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    query: &'a str,
    num_results: usize,
    contents: SearchContents,
}

#[derive(Debug, Serialize)]
struct SearchContents {
    text: bool,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    url: String,
    #[serde(default)]
    text: Option<String>,
}

/// Web search backed by the Exa `/search` endpoint.
#[derive(Clone)]
pub struct ExaSearch {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    num_results: usize,
}

impl ExaSearch {
    /// Creates a client from configuration.
    pub fn from_config(config: &WebSearchConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| Error::config(format!("failed to build web search client: {e}")))?;

        Ok(Self {
            http,
            endpoint: format!("{}/search", config.exa_base_url.trim_end_matches('/')),
            api_key: config.exa_api_key.clone().filter(|key| !key.trim().is_empty()),
            num_results: config.web_search_results,
        })
    }
}

#[async_trait]
impl WebSearch for ExaSearch {
    #[tracing::instrument(skip(self), target = TRACING_TARGET_PROVIDER)]
    async fn search(&self, query: &str) -> Result<Vec<WebResult>> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| Error::retrieval("EXA_API_KEY is not configured"))?;

        let response = self
            .http
            .post(&self.endpoint)
            .header("x-api-key", api_key)
            .json(&SearchRequest {
                query,
                num_results: self.num_results,
                contents: SearchContents { text: true },
            })
            .send()
            .await
            .map_err(|e| Error::retrieval(format!("web search request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::retrieval(format!("web search returned {status}")));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| Error::retrieval(format!("invalid web search response: {e}")))?;

        let results: Vec<_> = body
            .results
            .into_iter()
            .map(|hit| WebResult::new(hit.url, hit.text.unwrap_or_default()))
            .collect();

        tracing::debug!(
            target: TRACING_TARGET_PROVIDER,
            results = results.len(),
            "Web search completed"
        );

        Ok(results)
    }
}

impl std::fmt::Debug for ExaSearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExaSearch")
            .field("endpoint", &self.endpoint)
            .field("num_results", &self.num_results)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_shape() {
        let body = serde_json::to_value(SearchRequest {
            query: "rust",
            num_results: 5,
            contents: SearchContents { text: true },
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({"query": "rust", "numResults": 5, "contents": {"text": true}})
        );
    }

    #[test]
    fn response_without_text_is_empty_content() {
        let body: SearchResponse =
            serde_json::from_str(r#"{"results":[{"url":"https://a.com","title":"A"}]}"#).unwrap();
        assert_eq!(body.results[0].url, "https://a.com");
        assert!(body.results[0].text.is_none());
    }

    #[tokio::test]
    async fn missing_api_key_fails() {
        let search = ExaSearch::from_config(&WebSearchConfig::default()).unwrap();
        let error = search.search("rust").await.err().unwrap();
        assert!(matches!(error, Error::Retrieval(_)));
    }
}
