//! Document reader: uploaded files with streamed, cached analyses.
//!
//! A client uploads a document once and can then stream three analyses of
//! it: a summary, a page-by-page deep reading and a heading-only mind map.
//! Each finished analysis is stored on the file record and replayed as a
//! single content frame on later requests.

mod prompt;

use std::path::Path;
use std::sync::Arc;

use futures::StreamExt;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::chat::{ChatEvent, EventSink, EventStream, event_channel};
use crate::provider::{LanguageModel, ModelDelta, ModelRegistry, Prompt, PromptMessage};
use crate::rag::storage::{self, UploadedFile};
use crate::rag::{Document, extract};
pub use crate::store::ReaderAnalysis;
use crate::store::{ConversationStore, ReaderFileDraft, ReaderFileRecord};
use crate::{Error, Result, StorageConfig, TRACING_TARGET_READER};

/// A reader file as listed to its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReaderFileInfo {
    pub filename: String,
    pub size: i64,
    pub uploaded_at: Timestamp,
    /// Lowercase extension, or `unknown`.
    #[serde(rename = "type")]
    pub kind: String,
}

impl From<&ReaderFileRecord> for ReaderFileInfo {
    fn from(file: &ReaderFileRecord) -> Self {
        Self {
            filename: file.filename.clone(),
            size: file.size,
            uploaded_at: file.created_at,
            kind: storage::extension(&file.filename).unwrap_or_else(|| "unknown".to_owned()),
        }
    }
}

struct ReaderServiceInner {
    models: Arc<ModelRegistry>,
    store: Arc<dyn ConversationStore>,
    storage: StorageConfig,
}

/// Uploads documents for reading and streams their analyses.
///
/// This type is cheap to clone and can be shared across threads.
#[derive(Clone)]
pub struct ReaderService {
    inner: Arc<ReaderServiceInner>,
}

impl ReaderService {
    /// Creates the reader service.
    pub fn new(
        models: Arc<ModelRegistry>,
        store: Arc<dyn ConversationStore>,
        storage: StorageConfig,
    ) -> Self {
        Self {
            inner: Arc::new(ReaderServiceInner {
                models,
                store,
                storage,
            }),
        }
    }

    /// Stores a document for the client. On failure the written file is removed.
    #[tracing::instrument(
        skip(self, file),
        target = TRACING_TARGET_READER,
        fields(filename = %file.original_filename, size = file.size())
    )]
    pub async fn upload(&self, client_id: &str, file: UploadedFile) -> Result<ReaderFileInfo> {
        let filename = storage::sanitize_filename(&file.original_filename)?;
        let dir = self.inner.storage.reader_dir(client_id);
        let (filename, path) = storage::unique_path(&dir, &filename).await?;
        storage::write_file(&path, &file.data).await?;

        let draft = ReaderFileDraft {
            filename,
            mime_type: file.mime_type.clone(),
            size: i64::try_from(file.size()).unwrap_or(i64::MAX),
            path: path.display().to_string(),
            client_id: client_id.to_owned(),
        };
        match self.inner.store.create_reader_file(draft).await {
            Ok(record) => {
                tracing::info!(
                    target: TRACING_TARGET_READER,
                    client_id,
                    filename = %record.filename,
                    "Reader file uploaded"
                );
                Ok(ReaderFileInfo::from(&record))
            }
            Err(error) => {
                storage::remove_file_quietly(&path).await;
                Err(error)
            }
        }
    }

    /// Lists the client's files, newest first.
    pub async fn list(&self, client_id: &str) -> Result<Vec<ReaderFileInfo>> {
        let files = self.inner.store.reader_files(client_id).await?;
        Ok(files.iter().map(ReaderFileInfo::from).collect())
    }

    /// Returns the raw bytes of a file.
    pub async fn read(&self, filename: &str, client_id: &str) -> Result<Vec<u8>> {
        let file = self.find(filename, client_id).await?;
        Ok(tokio::fs::read(&file.path).await?)
    }

    /// Deletes a file with its cached analyses.
    pub async fn delete(&self, filename: &str, client_id: &str) -> Result<()> {
        let file = self.find(filename, client_id).await?;
        storage::remove_file_quietly(Path::new(&file.path)).await;
        if !self.inner.store.delete_reader_file(filename, client_id).await? {
            return Err(Error::not_found("File not found"));
        }
        tracing::info!(target: TRACING_TARGET_READER, client_id, filename, "Reader file deleted");
        Ok(())
    }

    /// Streams the summary of a file.
    pub async fn stream_summary(
        &self,
        filename: &str,
        client_id: &str,
        model_id: Option<&str>,
    ) -> Result<EventStream> {
        self.stream(filename, client_id, ReaderAnalysis::Summary, model_id)
            .await
    }

    /// Streams the page-by-page deep reading of a file.
    pub async fn stream_deep_reading(
        &self,
        filename: &str,
        client_id: &str,
        model_id: Option<&str>,
    ) -> Result<EventStream> {
        self.stream(filename, client_id, ReaderAnalysis::DeepReading, model_id)
            .await
    }

    /// Streams the mind map of a file.
    pub async fn stream_mind_map(
        &self,
        filename: &str,
        client_id: &str,
        model_id: Option<&str>,
    ) -> Result<EventStream> {
        self.stream(filename, client_id, ReaderAnalysis::MindMap, model_id)
            .await
    }

    /// Streams one analysis of a file.
    ///
    /// The file and model are resolved before anything is streamed. A cached
    /// analysis is sent as one content frame; otherwise the generated tokens
    /// are forwarded and the full text is cached once the model finishes.
    #[tracing::instrument(skip(self), target = TRACING_TARGET_READER)]
    pub async fn stream(
        &self,
        filename: &str,
        client_id: &str,
        kind: ReaderAnalysis,
        model_id: Option<&str>,
    ) -> Result<EventStream> {
        let file = self.find(filename, client_id).await?;
        let model = self.inner.models.resolve_chat(model_id)?;

        let (sink, receiver, cancel) = event_channel();
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let filename = file.filename.clone();
            match run_analysis(&inner, &file, kind, model.as_ref(), &sink).await {
                Ok(()) => {}
                Err(Error::Cancelled) => {
                    tracing::info!(target: TRACING_TARGET_READER, %filename, ?kind, "Analysis cancelled");
                }
                Err(error) => {
                    tracing::error!(
                        target: TRACING_TARGET_READER,
                        %filename,
                        ?kind,
                        error = %error,
                        "Analysis failed"
                    );
                    let _ = sink.send(ChatEvent::Error(error.to_string())).await;
                }
            }
        });

        Ok(EventStream::new(receiver, cancel, task))
    }

    async fn find(&self, filename: &str, client_id: &str) -> Result<ReaderFileRecord> {
        self.inner
            .store
            .find_reader_file(filename, client_id)
            .await?
            .ok_or_else(|| Error::not_found("File not found"))
    }
}

impl std::fmt::Debug for ReaderService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderService")
            .field("storage", &self.inner.storage)
            .finish_non_exhaustive()
    }
}

async fn run_analysis(
    inner: &ReaderServiceInner,
    file: &ReaderFileRecord,
    kind: ReaderAnalysis,
    model: &dyn LanguageModel,
    sink: &EventSink,
) -> Result<()> {
    if let Some(cached) = file.analysis(kind) {
        tracing::debug!(target: TRACING_TARGET_READER, filename = %file.filename, ?kind, "Serving cached analysis");
        sink.send(ChatEvent::Content(cached.to_owned())).await?;
        return sink.send(ChatEvent::Done).await;
    }

    let documents = extract::load(Path::new(&file.path), &file.mime_type).await?;
    let mut output = String::new();
    match kind {
        ReaderAnalysis::Summary => {
            let text = join_pages(&documents);
            relay(model, prompt::summary(&text), sink, &mut output).await?;
        }
        ReaderAnalysis::DeepReading => {
            deep_reading(&documents, model, sink, &mut output).await?;
        }
        ReaderAnalysis::MindMap => {
            let text = join_pages(&documents);
            relay(model, prompt::mind_map(&text), sink, &mut output).await?;
        }
    }

    if !output.is_empty() {
        inner
            .store
            .save_reader_analysis(&file.filename, &file.client_id, kind, &output)
            .await?;
    }
    tracing::info!(
        target: TRACING_TARGET_READER,
        filename = %file.filename,
        ?kind,
        len = output.len(),
        "Analysis generated"
    );
    sink.send(ChatEvent::Done).await
}

fn join_pages(documents: &[Document]) -> String {
    documents
        .iter()
        .map(|document| document.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Analyses every page in order, separating them with a rule.
async fn deep_reading(
    documents: &[Document],
    model: &dyn LanguageModel,
    sink: &EventSink,
    output: &mut String,
) -> Result<()> {
    for (index, document) in documents.iter().enumerate() {
        let page = index + 1;
        tracing::debug!(target: TRACING_TARGET_READER, page, "Analysing page");

        if index > 0 {
            emit(prompt::PAGE_SEPARATOR.to_owned(), sink, output).await?;
        }
        emit(prompt::page_header(page), sink, output).await?;
        relay(model, prompt::deep_reading(page, &document.content), sink, output).await?;
    }
    Ok(())
}

async fn emit(text: String, sink: &EventSink, output: &mut String) -> Result<()> {
    output.push_str(&text);
    sink.send(ChatEvent::Content(text)).await
}

/// Streams one model answer to the sink, appending its content to `output`.
///
/// Reasoning tokens are forwarded but not kept.
async fn relay(
    model: &dyn LanguageModel,
    instructions: String,
    sink: &EventSink,
    output: &mut String,
) -> Result<()> {
    let cancel = sink.cancellation();
    let request = Prompt::new(vec![PromptMessage::user(instructions)]);

    let mut deltas = tokio::select! {
        biased;

        () = cancel.cancelled() => return Err(Error::Cancelled),
        deltas = model.stream(&request) => deltas?,
    };

    loop {
        let delta = tokio::select! {
            biased;

            () = cancel.cancelled() => return Err(Error::Cancelled),
            delta = deltas.next() => delta,
        };

        match delta {
            None => return Ok(()),
            Some(Err(error)) => return Err(error),
            Some(Ok(ModelDelta::Content(token))) => emit(token, sink, output).await?,
            Some(Ok(ModelDelta::Reasoning(token))) => {
                sink.send(ChatEvent::Reasoning(token)).await?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::provider::ModelDescriptor;
    use crate::testing::{InMemoryStore, ScriptedModel};

    const CLIENT: &str = "client";

    struct Fixture {
        _dir: TempDir,
        store: Arc<InMemoryStore>,
        model: Arc<ScriptedModel>,
        reader: ReaderService,
    }

    fn fixture(model: ScriptedModel) -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(InMemoryStore::new());
        let model = Arc::new(model);
        let models = ModelRegistry::new(
            vec![(
                ModelDescriptor::new("scripted", "Scripted", "scripted", "http://localhost"),
                model.clone() as Arc<dyn LanguageModel>,
            )],
            "scripted",
            "scripted",
        )
        .unwrap();
        let reader = ReaderService::new(
            Arc::new(models),
            store.clone(),
            StorageConfig::new(dir.path()),
        );

        Fixture {
            _dir: dir,
            store,
            model,
            reader,
        }
    }

    async fn upload(f: &Fixture, name: &str, text: &str) -> ReaderFileInfo {
        f.reader
            .upload(CLIENT, UploadedFile::new(name, "text/plain", text))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn files_are_scoped_to_their_client() {
        let f = fixture(ScriptedModel::from_tokens(&["x"]));
        let info = upload(&f, "paper.txt", "Attention is all you need.").await;
        assert_eq!(info.filename, "paper.txt");
        assert_eq!(info.kind, "txt");
        assert_eq!(info.size, 26);

        assert_eq!(f.reader.list(CLIENT).await.unwrap(), vec![info.clone()]);
        assert!(f.reader.list("other").await.unwrap().is_empty());
        assert_eq!(
            f.reader.read("paper.txt", CLIENT).await.unwrap(),
            b"Attention is all you need."
        );

        let error = f.reader.delete("paper.txt", "other").await.unwrap_err();
        assert!(error.is_not_found());
        assert!(f.reader.read("paper.txt", "other").await.unwrap_err().is_not_found());

        f.reader.delete("paper.txt", CLIENT).await.unwrap();
        assert!(f.reader.list(CLIENT).await.unwrap().is_empty());
        assert!(f.reader.delete("paper.txt", CLIENT).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn same_name_upload_gets_a_fresh_filename() {
        let f = fixture(ScriptedModel::from_tokens(&["x"]));
        let first = upload(&f, "paper.txt", "one").await;
        let second = upload(&f, "paper.txt", "two").await;
        assert_ne!(first.filename, second.filename);
        assert!(second.filename.starts_with("paper_"));
        assert_eq!(f.reader.list(CLIENT).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn summary_is_streamed_then_served_from_cache() {
        let f = fixture(ScriptedModel::from_tokens(&["The paper ", "introduces transformers."]));
        upload(&f, "paper.txt", "Attention is all you need.").await;

        let events: Vec<ChatEvent> = f
            .reader
            .stream_summary("paper.txt", CLIENT, None)
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(
            events,
            vec![
                ChatEvent::Content("The paper ".into()),
                ChatEvent::Content("introduces transformers.".into()),
                ChatEvent::Done,
            ]
        );
        let prompt = f.model.last_prompt().unwrap();
        assert!(prompt.messages[0].content.contains("Attention is all you need."));

        let record = f.store.find_reader_file("paper.txt", CLIENT).await.unwrap().unwrap();
        assert_eq!(record.summary.as_deref(), Some("The paper introduces transformers."));

        let events: Vec<ChatEvent> = f
            .reader
            .stream_summary("paper.txt", CLIENT, None)
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(
            events,
            vec![
                ChatEvent::Content("The paper introduces transformers.".into()),
                ChatEvent::Done,
            ]
        );
        assert_eq!(f.model.prompts().len(), 1);
    }

    #[tokio::test]
    async fn deep_reading_separates_pages() {
        let f = fixture(ScriptedModel::from_tokens(&["Analysis."]));
        let pages = vec![Document::new("Cover page"), Document::new("Body text")];
        let (sink, mut receiver, _cancel) = event_channel();

        let mut output = String::new();
        deep_reading(&pages, f.model.as_ref(), &sink, &mut output)
            .await
            .unwrap();

        assert_eq!(
            output,
            "\n## Page 1 analysis\n\nAnalysis.\n\n-------------------\n\n## Page 2 analysis\n\nAnalysis."
        );
        let prompts = f.model.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[0].messages[0].content.contains("page 1 of a document"));
        assert!(prompts[1].messages[0].content.contains("Body text"));

        drop(sink);
        let mut frames = Vec::new();
        while let Some(event) = receiver.recv().await {
            frames.push(event);
        }
        assert_eq!(frames.len(), 5);
        assert_eq!(frames[2], ChatEvent::Content(prompt::PAGE_SEPARATOR.into()));
    }

    #[tokio::test]
    async fn deep_reading_is_cached_per_kind() {
        let f = fixture(ScriptedModel::from_tokens(&["Close reading."]));
        upload(&f, "paper.txt", "Attention is all you need.").await;

        let events: Vec<ChatEvent> = f
            .reader
            .stream_deep_reading("paper.txt", CLIENT, None)
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(events.last(), Some(&ChatEvent::Done));

        let record = f.store.find_reader_file("paper.txt", CLIENT).await.unwrap().unwrap();
        assert_eq!(
            record.analysis(ReaderAnalysis::DeepReading),
            Some("\n## Page 1 analysis\n\nClose reading.")
        );
        assert!(record.analysis(ReaderAnalysis::Summary).is_none());
        assert!(record.analysis(ReaderAnalysis::MindMap).is_none());
    }

    #[tokio::test]
    async fn failed_mind_map_is_not_cached() {
        let model = ScriptedModel::from_tokens(&["# Transformers"]).failing_after_deltas("boom");
        let f = fixture(model);
        upload(&f, "paper.txt", "Attention is all you need.").await;

        let events: Vec<ChatEvent> = f
            .reader
            .stream_mind_map("paper.txt", CLIENT, None)
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(events[0], ChatEvent::Content("# Transformers".into()));
        assert!(matches!(events.last(), Some(ChatEvent::Error(_))));
        assert!(
            f.model.last_prompt().unwrap().messages[0]
                .content
                .contains("only markdown headings")
        );

        let record = f.store.find_reader_file("paper.txt", CLIENT).await.unwrap().unwrap();
        assert!(record.mind_map.is_none());
    }

    #[tokio::test]
    async fn unknown_file_or_model_fails_before_streaming() {
        let f = fixture(ScriptedModel::from_tokens(&["x"]));
        let error = f
            .reader
            .stream_summary("missing.txt", CLIENT, None)
            .await
            .unwrap_err();
        assert!(error.is_not_found());

        upload(&f, "paper.txt", "text").await;
        assert!(
            f.reader
                .stream_summary("paper.txt", CLIENT, Some("no-such-model"))
                .await
                .is_err()
        );
        assert!(f.model.prompts().is_empty());
    }
}
