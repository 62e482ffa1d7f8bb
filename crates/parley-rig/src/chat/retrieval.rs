//! Context aggregation over the three retrieval adapters.
//!
//! Adapters run one after the other, temporary document, then web, then
//! knowledge base, so status frames arrive in a fixed order. A failing adapter
//! is logged, reported with a status frame and contributes nothing.

use std::sync::Arc;

use super::stream::EventSink;
use super::{ChatEvent, Source, SourceKind};
use crate::rag::{KnowledgeBase, SessionDocument, TempDocuments};
use crate::store::TempFileRecord;
use crate::web::WebSearch;
use crate::{Error, Result, TRACING_TARGET_CHAT};

/// Which adapters a turn uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetrievalFlags {
    pub web_search: bool,
    pub vector_search: bool,
    pub temp_doc_search: bool,
}

/// Everything retrieval produced for a turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievedContext {
    /// Labelled context sections, concatenated in adapter order.
    pub search_context: String,
    /// Citations in adapter order, not yet deduplicated.
    pub sources: Vec<Source>,
    /// Snapshot of the session's temporary documents, when that adapter ran.
    pub temp_files: Option<Vec<SessionDocument>>,
    /// Records behind `temp_files`. Only these are cleaned up after the turn.
    pub temp_file_records: Vec<TempFileRecord>,
}

#[derive(Debug, Default)]
struct AdapterOutput {
    context: String,
    sources: Vec<Source>,
}

/// Runs the adapters selected for a turn.
pub(crate) struct ContextAggregator {
    pub temp: Arc<TempDocuments>,
    pub knowledge: Arc<KnowledgeBase>,
    pub web: Arc<dyn WebSearch>,
    pub temp_search_results: usize,
    pub knowledge_search_results: usize,
}

impl ContextAggregator {
    #[tracing::instrument(skip(self, query, sink), target = TRACING_TARGET_CHAT)]
    pub async fn aggregate(
        &self,
        query: &str,
        session_id: &str,
        client_id: &str,
        flags: RetrievalFlags,
        sink: &EventSink,
    ) -> Result<RetrievedContext> {
        let mut retrieved = RetrievedContext::default();

        if flags.temp_doc_search {
            let files = self
                .temp
                .active_files(session_id, client_id)
                .await
                .unwrap_or_else(|error| {
                    tracing::warn!(
                        target: TRACING_TARGET_CHAT,
                        error = %error,
                        "Failed to snapshot temporary documents"
                    );
                    Vec::new()
                });
            retrieved.temp_files = Some(files.iter().map(SessionDocument::from).collect());

            sink.send(ChatEvent::status("Searching temporary documents..."))
                .await?;
            let output = self
                .search_temp(query, session_id, client_id, &files, sink)
                .await;
            retrieved.temp_file_records = files;
            self.merge(&mut retrieved, output, "Temporary document search failed", sink)
                .await?;
        }

        if flags.web_search {
            sink.send(ChatEvent::status("Searching web resources...")).await?;
            let output = self.search_web(query, sink).await;
            self.merge(&mut retrieved, output, "Web search failed", sink)
                .await?;
        }

        if flags.vector_search {
            sink.send(ChatEvent::status("Searching vector database...")).await?;
            let output = self.search_knowledge(query, client_id, sink).await;
            self.merge(&mut retrieved, output, "Vector database search failed", sink)
                .await?;
        }

        tracing::debug!(
            target: TRACING_TARGET_CHAT,
            context_len = retrieved.search_context.len(),
            sources = retrieved.sources.len(),
            "Retrieval finished"
        );
        Ok(retrieved)
    }

    async fn merge(
        &self,
        retrieved: &mut RetrievedContext,
        output: Result<AdapterOutput>,
        failure_status: &str,
        sink: &EventSink,
    ) -> Result<()> {
        match output {
            Ok(output) => {
                retrieved.search_context.push_str(&output.context);
                retrieved.sources.extend(output.sources);
                Ok(())
            }
            Err(Error::Cancelled) => Err(Error::Cancelled),
            Err(error) => {
                tracing::warn!(
                    target: TRACING_TARGET_CHAT,
                    error = %error,
                    "{failure_status}, continuing without it"
                );
                sink.send(ChatEvent::status(failure_status)).await
            }
        }
    }

    async fn search_temp(
        &self,
        query: &str,
        session_id: &str,
        client_id: &str,
        files: &[TempFileRecord],
        sink: &EventSink,
    ) -> Result<AdapterOutput> {
        if let Some(file) = files.first().filter(|file| file.is_short_document) {
            sink.send(ChatEvent::status(
                "Found 1 short documents, using full content",
            ))
            .await?;
            let content = file.full_content.as_deref().unwrap_or_default();
            return Ok(AdapterOutput {
                context: format!(
                    "Session temporary document content:\nSource: {}\nContent: {content}\n\n",
                    file.original_filename
                ),
                sources: vec![Source::new(SourceKind::Temp, file.filename.as_str())],
            });
        }

        let hits: Vec<_> = self
            .temp
            .search(session_id, client_id, query, self.temp_search_results)
            .await?
            .into_iter()
            .filter(|hit| {
                hit.document
                    .filename()
                    .is_some_and(|name| files.iter().any(|file| file.filename == name))
            })
            .collect();
        if hits.first().is_none_or(|hit| hit.document.content.is_empty()) {
            sink.send(ChatEvent::status("No temporary documents found"))
                .await?;
            return Ok(AdapterOutput::default());
        }

        sink.send(ChatEvent::status(format!(
            "Found {} temporary documents",
            hits.len()
        )))
        .await?;

        let contents: Vec<&str> = hits.iter().map(|hit| hit.document.content.as_str()).collect();
        Ok(AdapterOutput {
            context: format!(
                "Session temporary document search results:\n{}\n\n",
                contents.join("\n")
            ),
            sources: hits
                .iter()
                .filter_map(|hit| hit.document.filename())
                .map(|filename| Source::new(SourceKind::Temp, filename))
                .collect(),
        })
    }

    async fn search_web(&self, query: &str, sink: &EventSink) -> Result<AdapterOutput> {
        let results = self.web.search(query).await?;
        if results.is_empty() {
            sink.send(ChatEvent::status("No web resources found")).await?;
            return Ok(AdapterOutput::default());
        }

        sink.send(ChatEvent::status(format!(
            "Found {} web resources",
            results.len()
        )))
        .await?;

        let entries: Vec<String> = results
            .iter()
            .map(|result| format!("Source: {}\nContent: {}", result.url, result.content))
            .collect();
        Ok(AdapterOutput {
            context: format!("Web search results:\n{}\n\n", entries.join("\n\n")),
            sources: results
                .into_iter()
                .map(|result| Source::new(SourceKind::Web, result.url))
                .collect(),
        })
    }

    async fn search_knowledge(
        &self,
        query: &str,
        client_id: &str,
        sink: &EventSink,
    ) -> Result<AdapterOutput> {
        let hits = self
            .knowledge
            .search(client_id, query, self.knowledge_search_results)
            .await?;
        if hits.is_empty() {
            sink.send(ChatEvent::status("No documents found in vector database"))
                .await?;
            return Ok(AdapterOutput::default());
        }

        sink.send(ChatEvent::status(format!(
            "Found {} documents in vector database",
            hits.len()
        )))
        .await?;

        let filename = |hit: &crate::rag::ScoredDocument| {
            hit.document
                .filename()
                .or_else(|| hit.document.metadata_str("source"))
                .unwrap_or("unknown")
                .to_owned()
        };
        let entries: Vec<String> = hits
            .iter()
            .map(|hit| format!("Source: {}\nContent: {}", filename(hit), hit.document.content))
            .collect();
        Ok(AdapterOutput {
            context: format!("Local document search results:\n{}\n\n", entries.join("\n\n")),
            sources: hits
                .iter()
                .map(|hit| Source::new(SourceKind::Vector, filename(hit)))
                .collect(),
        })
    }
}
