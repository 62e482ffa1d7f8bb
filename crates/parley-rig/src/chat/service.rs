//! Chat service running retrieval-augmented streaming turns.

use std::sync::Arc;

use futures::StreamExt;
use uuid::Uuid;

use super::persist::{self, CompletedTurn};
use super::retrieval::ContextAggregator;
use super::stream::{self, EventSink};
use super::{ChatEvent, ChatRequest, ChatStream, dedupe_sources, history, prompt};
use crate::provider::{LanguageModel, ModelDelta, ModelRegistry, Prompt, PromptMessage};
use crate::rag::{KnowledgeBase, TempDocuments};
use crate::store::{ConversationStore, SessionRecord};
use crate::web::WebSearch;
use crate::{Error, RagConfig, Result, TRACING_TARGET_CHAT};

const PROMPT_WRITER_INSTRUCTIONS: &str = "You are an expert at writing prompts for AI \
assistants. Given a role name, write a concise and professional system prompt that clearly \
defines the assistant's role, area of expertise, behaviour guidelines and main \
responsibilities. Return only the prompt itself, without explanations or extra formatting.";

/// Inner state for [`ChatService`].
struct ChatServiceInner {
    models: Arc<ModelRegistry>,
    store: Arc<dyn ConversationStore>,
    temp: Arc<TempDocuments>,
    retrieval: ContextAggregator,
    history_pairs: usize,
}

/// Chat service for retrieval-augmented conversations.
///
/// This type is cheap to clone and can be shared across threads.
#[derive(Clone)]
pub struct ChatService {
    inner: Arc<ChatServiceInner>,
}

/// A turn ready to run.
struct Turn {
    session: SessionRecord,
    request: ChatRequest,
    model: Arc<dyn LanguageModel>,
}

impl ChatService {
    /// Creates a new chat service from its collaborators.
    pub fn new(
        models: Arc<ModelRegistry>,
        store: Arc<dyn ConversationStore>,
        temp: Arc<TempDocuments>,
        knowledge: Arc<KnowledgeBase>,
        web: Arc<dyn WebSearch>,
        config: &RagConfig,
    ) -> Self {
        let retrieval = ContextAggregator {
            temp: Arc::clone(&temp),
            knowledge,
            web,
            temp_search_results: config.temp_search_results,
            knowledge_search_results: config.knowledge_search_results,
        };

        Self {
            inner: Arc::new(ChatServiceInner {
                models,
                store,
                temp,
                retrieval,
                history_pairs: config.history_pairs,
            }),
        }
    }

    /// Starts a turn and returns its event stream.
    ///
    /// The message, model and session are validated before anything is
    /// streamed: an empty message, an unknown model identifier or a session not
    /// owned by the client fail here. A request without a session creates one.
    #[tracing::instrument(
        skip(self, request),
        target = TRACING_TARGET_CHAT,
        fields(client_id = %request.client_id, model_id = ?request.model_id)
    )]
    pub async fn chat(&self, request: ChatRequest) -> Result<ChatStream> {
        if request.message.trim().is_empty() {
            return Err(Error::invalid_input("Message is required"));
        }

        let model = self
            .inner
            .models
            .resolve_chat(request.model_id.as_deref())?;
        let session = self.resolve_session(&request).await?;
        let session_id = session.session_id.clone();

        tracing::info!(
            target: TRACING_TARGET_CHAT,
            session_id = %session_id,
            model = model.model_name(),
            web_search = request.retrieval.web_search,
            vector_search = request.retrieval.vector_search,
            temp_doc_search = request.retrieval.temp_doc_search,
            "Starting chat turn"
        );

        let (sink, receiver, cancel) = stream::channel();
        let inner = Arc::clone(&self.inner);
        let turn = Turn {
            session,
            request,
            model,
        };
        let task = tokio::spawn(async move {
            let session_id = turn.session.session_id.clone();
            match run_turn(&inner, turn, &sink).await {
                Ok(()) => {
                    tracing::info!(target: TRACING_TARGET_CHAT, session_id = %session_id, "Chat turn completed");
                }
                Err(Error::Cancelled) => {
                    tracing::info!(target: TRACING_TARGET_CHAT, session_id = %session_id, "Chat turn cancelled");
                }
                Err(error) => {
                    tracing::error!(
                        target: TRACING_TARGET_CHAT,
                        session_id = %session_id,
                        error = %error,
                        "Chat turn failed"
                    );
                    let _ = sink.send(ChatEvent::Error(error.to_string())).await;
                }
            }
        });

        Ok(ChatStream::new(session_id, receiver, cancel, task))
    }

    async fn resolve_session(&self, request: &ChatRequest) -> Result<SessionRecord> {
        let store = &self.inner.store;
        match &request.session_id {
            Some(session_id) => store
                .find_session(session_id, &request.client_id)
                .await?
                .ok_or_else(|| Error::not_found("Session not found")),
            None => {
                let session = store.create_session(&request.client_id, None, None).await?;
                tracing::info!(
                    target: TRACING_TARGET_CHAT,
                    session_id = %session.session_id,
                    "Created session for chat turn"
                );
                Ok(session)
            }
        }
    }

    /// Asks a model to write a system prompt for a role.
    ///
    /// Uses the default prompt model unless `model_id` is given.
    #[tracing::instrument(skip(self), target = TRACING_TARGET_CHAT)]
    pub async fn generate_system_prompt(
        &self,
        role_name: &str,
        model_id: Option<&str>,
    ) -> Result<String> {
        let role_name = role_name.trim();
        if role_name.is_empty() {
            return Err(Error::invalid_input("role name is required"));
        }

        let model = self.inner.models.resolve_prompt(model_id)?;
        let prompt = Prompt::new(vec![
            PromptMessage::system(PROMPT_WRITER_INSTRUCTIONS),
            PromptMessage::user(format!(
                "Please generate a system prompt for the role \"{role_name}\"."
            )),
        ]);

        let system_prompt = model.complete(&prompt).await?.trim().to_owned();
        tracing::info!(
            target: TRACING_TARGET_CHAT,
            prompt_len = system_prompt.len(),
            "System prompt generated"
        );
        Ok(system_prompt)
    }

    /// Deletes one message owned by the client.
    pub async fn delete_message(&self, message_id: Uuid, client_id: &str) -> Result<()> {
        if !self.inner.store.delete_message(message_id, client_id).await? {
            tracing::warn!(target: TRACING_TARGET_CHAT, %message_id, client_id, "Message not found");
            return Err(Error::not_found("Message not found"));
        }
        tracing::info!(target: TRACING_TARGET_CHAT, %message_id, client_id, "Message deleted");
        Ok(())
    }

    /// Returns the model registry.
    pub fn models(&self) -> &ModelRegistry {
        &self.inner.models
    }
}

/// Runs one turn: history, retrieval, streaming, sources, persistence, end marker.
async fn run_turn(inner: &ChatServiceInner, turn: Turn, sink: &EventSink) -> Result<()> {
    let Turn {
        session,
        request,
        model,
    } = turn;
    let session_id = session.session_id.as_str();
    let client_id = request.client_id.as_str();
    let cancel = sink.cancellation();

    let history = history::load(
        inner.store.as_ref(),
        session_id,
        client_id,
        inner.history_pairs,
    )
    .await?;

    let retrieved = inner
        .retrieval
        .aggregate(&request.message, session_id, client_id, request.retrieval, sink)
        .await?;

    let prompt = prompt::assemble(
        session.system_prompt(),
        &history,
        &retrieved.search_context,
        &request.message,
    );

    let mut deltas = tokio::select! {
        biased;

        () = cancel.cancelled() => return Err(Error::Cancelled),
        deltas = model.stream(&prompt) => deltas?,
    };

    let mut content = String::new();
    let mut reasoning = String::new();
    loop {
        let delta = tokio::select! {
            biased;

            () = cancel.cancelled() => return Err(Error::Cancelled),
            delta = deltas.next() => delta,
        };

        match delta {
            None => break,
            Some(Err(error)) => return Err(error),
            Some(Ok(ModelDelta::Content(token))) => {
                content.push_str(&token);
                sink.send(ChatEvent::Content(token)).await?;
            }
            Some(Ok(ModelDelta::Reasoning(token))) => {
                reasoning.push_str(&token);
                sink.send(ChatEvent::Reasoning(token)).await?;
            }
        }
    }

    let sources = dedupe_sources(retrieved.sources.clone());
    if !sources.is_empty() {
        sink.send(ChatEvent::sources(&sources)?).await?;
    }

    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    persist::persist_turn(
        inner.store.as_ref(),
        &inner.temp,
        CompletedTurn {
            session_id,
            client_id,
            message: &request.message,
            retrieved: &retrieved,
            used_temp_documents: request.retrieval.temp_doc_search,
            content,
            reasoning,
            sources: &sources,
        },
    )
    .await?;

    sink.send(ChatEvent::Done).await
}

impl std::fmt::Debug for ChatService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatService")
            .field("default_model", &self.inner.models.default_chat_id())
            .field("history_pairs", &self.inner.history_pairs)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use tempfile::TempDir;

    use super::*;
    use crate::provider::{ModelDescriptor, PromptRole};
    use crate::rag::{Document, KnowledgeBackend, UploadedFile};
    use crate::store::{MessageDraft, MessageRole};
    use crate::testing::{
        FailingWebSearch, FakeEmbedder, InMemoryStore, ScriptedModel, StaticWebSearch,
    };
    use crate::web::WebResult;
    use crate::{RigComponents, RigConfig, RigService, StorageConfig};

    const CLIENT: &str = "client";

    struct Fixture {
        _dir: TempDir,
        store: Arc<InMemoryStore>,
        embedder: Arc<FakeEmbedder>,
        model: Arc<ScriptedModel>,
        service: RigService,
    }

    fn fixture_with(model: ScriptedModel, web: Arc<dyn WebSearch>) -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(InMemoryStore::new());
        let embedder = Arc::new(FakeEmbedder::default());
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

        let mut config = RigConfig::new("test-key");
        config.storage = StorageConfig::new(dir.path());
        config.rag.chunk_size = 200;
        config.rag.chunk_overlap = 20;

        let service = RigService::from_components(
            RigComponents {
                models: Arc::new(models),
                embedder: embedder.clone(),
                web,
                store: store.clone(),
                knowledge: KnowledgeBackend::Local,
            },
            &config,
        )
        .unwrap();

        Fixture {
            _dir: dir,
            store,
            embedder,
            model,
            service,
        }
    }

    fn fixture(model: ScriptedModel) -> Fixture {
        fixture_with(model, Arc::new(StaticWebSearch::default()))
    }

    async fn run(f: &Fixture, request: ChatRequest) -> (String, Vec<ChatEvent>) {
        let stream = f.service.chat().chat(request).await.unwrap();
        let session_id = stream.session_id().to_owned();
        (session_id, stream.collect().await)
    }

    fn statuses(events: &[ChatEvent]) -> Vec<&str> {
        events
            .iter()
            .filter_map(|event| match event {
                ChatEvent::Status(status) => Some(status.as_str()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn web_search_turn_streams_and_persists() {
        let web = Arc::new(StaticWebSearch::new(vec![WebResult::new(
            "https://a.com",
            "Paris is the capital of France.",
        )]));
        let model = ScriptedModel::new(vec![
            ModelDelta::Reasoning("The user asks about France.".into()),
            ModelDelta::Content("\n\nParis".into()),
            ModelDelta::Content(" is the capital.".into()),
        ]);
        let f = fixture_with(model, web.clone());

        let request = ChatRequest::new(CLIENT, "What is the capital of France?").with_web_search(true);
        let (session_id, events) = run(&f, request).await;

        assert_eq!(
            events,
            vec![
                ChatEvent::status("Searching web resources..."),
                ChatEvent::status("Found 1 web resources"),
                ChatEvent::Reasoning("The user asks about France.".into()),
                ChatEvent::Content("\n\nParis".into()),
                ChatEvent::Content(" is the capital.".into()),
                ChatEvent::Sources(r#"[{"type":"web","url":"https://a.com"}]"#.into()),
                ChatEvent::Done,
            ]
        );
        assert_eq!(web.queries(), vec!["What is the capital of France?"]);

        let prompt = f.model.last_prompt().unwrap();
        assert!(prompt.messages[0].content.contains(
            "Web search results:\nSource: https://a.com\nContent: Paris is the capital of France.\n\n"
        ));

        let messages = f.store.session_messages(&session_id, CLIENT).await.unwrap();
        assert_eq!(messages.len(), 2);
        let (user, assistant) = (&messages[0], &messages[1]);
        assert_eq!(user.role, MessageRole::User);
        assert_eq!(user.content, "What is the capital of France?");
        assert!(user.search_context.is_none());
        assert_eq!(assistant.role, MessageRole::Assistant);
        assert_eq!(assistant.content, "Paris is the capital.");
        assert_eq!(assistant.reasoning.as_deref(), Some("The user asks about France."));
        assert_eq!(
            assistant.sources,
            Some(serde_json::json!([{"type": "web", "url": "https://a.com"}]))
        );
        assert!(user.created_at < assistant.created_at);
    }

    #[tokio::test]
    async fn short_temp_document_is_inlined_and_purged() {
        let f = fixture(ScriptedModel::from_tokens(&["$5M"]));
        let session = f.store.create_session(CLIENT, None, None).await.unwrap();
        let upload = f
            .service
            .temp_documents()
            .upload(
                &session.session_id,
                CLIENT,
                UploadedFile::new("revenue.txt", "text/plain", "Revenue was $5M in 2023."),
            )
            .await
            .unwrap();
        assert!(upload.is_short_document);

        let request = ChatRequest::new(CLIENT, "What was the revenue?")
            .with_session(&session.session_id)
            .with_temp_doc_search(true);
        let (_, events) = run(&f, request).await;

        assert_eq!(
            statuses(&events),
            vec![
                "Searching temporary documents...",
                "Found 1 short documents, using full content",
            ]
        );
        assert_eq!(events.last(), Some(&ChatEvent::Done));
        assert_eq!(f.embedder.calls(), 0);

        let prompt = f.model.last_prompt().unwrap();
        assert!(prompt.messages[0].content.contains(
            "Session temporary document content:\nSource: revenue.txt\nContent: Revenue was $5M in 2023."
        ));

        let messages = f.store.session_messages(&session.session_id, CLIENT).await.unwrap();
        let user = &messages[0];
        assert!(user.search_context.as_deref().unwrap().contains("Revenue was $5M in 2023."));
        assert_eq!(user.temp_files.as_ref().unwrap()[0]["filename"], "revenue.txt");

        assert!(!upload.path.exists());
        let rows = f.store.temp_file_rows(&session.session_id);
        assert_eq!(rows.len(), 1);
        assert!(rows[0].deleted_at.is_some());
    }

    #[tokio::test]
    async fn upload_during_turn_survives_cleanup() {
        let gate = Arc::new(tokio::sync::Notify::new());
        let model = ScriptedModel::from_tokens(&["Revenue", " was $5M."]).gated(gate.clone());
        let f = fixture(model);
        let session = f.store.create_session(CLIENT, None, None).await.unwrap();
        let temp = f.service.temp_documents();
        let a = temp
            .upload(
                &session.session_id,
                CLIENT,
                UploadedFile::new("a.txt", "text/plain", "Revenue was $5M."),
            )
            .await
            .unwrap();

        let request = ChatRequest::new(CLIENT, "What was the revenue?")
            .with_session(&session.session_id)
            .with_temp_doc_search(true);
        let mut stream = f.service.chat().chat(request).await.unwrap();
        while !matches!(stream.next().await.unwrap(), ChatEvent::Content(_)) {}

        let b = temp
            .upload(
                &session.session_id,
                CLIENT,
                UploadedFile::new("b.txt", "text/plain", "Costs were $2M."),
            )
            .await
            .unwrap();
        gate.notify_one();
        let rest: Vec<ChatEvent> = stream.collect().await;
        assert_eq!(rest.last(), Some(&ChatEvent::Done));

        let active = temp.active_files(&session.session_id, CLIENT).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].original_filename, "b.txt");
        assert!(b.path.exists());
        assert!(!a.path.exists());

        let messages = f.store.session_messages(&session.session_id, CLIENT).await.unwrap();
        assert_eq!(messages[0].temp_files.as_ref().unwrap()[0]["filename"], "a.txt");
    }

    #[tokio::test]
    async fn long_temp_document_is_searched() {
        let f = fixture(ScriptedModel::from_tokens(&["ok"]));
        let session = f.store.create_session(CLIENT, None, None).await.unwrap();
        let text = "Quarterly revenue grew in every region this year. ".repeat(1300);
        f.service
            .temp_documents()
            .upload(&session.session_id, CLIENT, UploadedFile::new("report.txt", "text/plain", text))
            .await
            .unwrap();

        let request = ChatRequest::new(CLIENT, "How did revenue develop?")
            .with_session(&session.session_id)
            .with_temp_doc_search(true);
        let (_, events) = run(&f, request).await;

        assert_eq!(statuses(&events)[1], "Found 5 temporary documents");
        assert_eq!(
            events[events.len() - 2],
            ChatEvent::Sources(r#"[{"type":"temp","url":"report.txt"}]"#.into())
        );
        assert!(
            f.model.last_prompt().unwrap().messages[0]
                .content
                .contains("Session temporary document search results:\n")
        );
    }

    #[tokio::test]
    async fn adapters_run_in_fixed_order_and_sources_are_deduplicated() {
        let web = Arc::new(StaticWebSearch::new(vec![
            WebResult::new("X", "first"),
            WebResult::new("X", "second"),
        ]));
        let f = fixture_with(ScriptedModel::from_tokens(&["answer"]), web);
        f.service
            .knowledge()
            .add_documents(CLIENT, vec![Document::new("alpha facts").with_metadata("filename", "Y")])
            .await
            .unwrap();

        let request = ChatRequest::new(CLIENT, "alpha")
            .with_temp_doc_search(true)
            .with_web_search(true)
            .with_vector_search(true);
        let (_, events) = run(&f, request).await;

        assert_eq!(
            statuses(&events),
            vec![
                "Searching temporary documents...",
                "No temporary documents found",
                "Searching web resources...",
                "Found 2 web resources",
                "Searching vector database...",
                "Found 1 documents in vector database",
            ]
        );
        assert_eq!(
            events[events.len() - 2],
            ChatEvent::Sources(
                r#"[{"type":"web","url":"X"},{"type":"vector","url":"Y"}]"#.into()
            )
        );
        assert_eq!(events.last(), Some(&ChatEvent::Done));

        let system = &f.model.last_prompt().unwrap().messages[0].content;
        assert!(system.contains("Local document search results:\nSource: Y\nContent: alpha facts"));
    }

    #[tokio::test]
    async fn failing_web_search_degrades_to_empty_context() {
        let f = fixture_with(
            ScriptedModel::from_tokens(&["fine"]),
            Arc::new(FailingWebSearch::new("exa unavailable")),
        );
        let request = ChatRequest::new(CLIENT, "hello").with_web_search(true);
        let (session_id, events) = run(&f, request).await;

        assert_eq!(
            events,
            vec![
                ChatEvent::status("Searching web resources..."),
                ChatEvent::status("Web search failed"),
                ChatEvent::Content("fine".into()),
                ChatEvent::Done,
            ]
        );
        let system = &f.model.last_prompt().unwrap().messages[0].content;
        assert!(system.contains(crate::chat::EMPTY_CONTEXT));
        assert_eq!(f.store.session_messages(&session_id, CLIENT).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn model_failure_ends_with_error_and_persists_nothing() {
        let model = ScriptedModel::from_tokens(&["partial"]).failing_after_deltas("connection reset");
        let f = fixture(model);
        let (session_id, events) = run(&f, ChatRequest::new(CLIENT, "hi")).await;

        assert_eq!(events[0], ChatEvent::Content("partial".into()));
        let last = events.last().unwrap();
        assert!(matches!(last, ChatEvent::Error(message) if message.contains("connection reset")));
        assert!(!events.contains(&ChatEvent::Done));
        assert!(f.store.session_messages(&session_id, CLIENT).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancelled_turn_persists_nothing() {
        let f = fixture(ScriptedModel::from_tokens(&["Hel"]).hanging());
        let mut stream = f.service.chat().chat(ChatRequest::new(CLIENT, "hi")).await.unwrap();
        let session_id = stream.session_id().to_owned();

        assert_eq!(stream.next().await, Some(ChatEvent::Content("Hel".into())));
        stream.cancel();
        assert_eq!(stream.next().await, None);
        stream.drain().await;

        assert!(f.store.session_messages(&session_id, CLIENT).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn history_is_bounded_and_ordered() {
        let f = fixture(ScriptedModel::from_tokens(&["ok"]));
        let session = f.store.create_session(CLIENT, None, Some("Be terse.".into())).await.unwrap();
        for i in 0..22 {
            for (role, content) in [(MessageRole::User, format!("q{i}")), (MessageRole::Assistant, format!("a{i}"))] {
                let draft = MessageDraft::new(&session.session_id, CLIENT, role, content);
                f.store.append_message(draft).await.unwrap();
            }
        }

        let request = ChatRequest::new(CLIENT, "next").with_session(&session.session_id);
        let (_, events) = run(&f, request).await;
        assert_eq!(events.last(), Some(&ChatEvent::Done));

        let prompt = f.model.last_prompt().unwrap();
        assert_eq!(prompt.messages.len(), 1 + 20 * 2 + 1);
        assert!(prompt.messages[0].content.starts_with("Be terse.\n\n"));
        assert_eq!(prompt.messages[1].content, "q2");
        assert_eq!(prompt.messages[40].content, "a21");
        assert_eq!(prompt.messages[41].role, PromptRole::User);
        assert_eq!(prompt.messages[41].content, "next");
    }

    #[tokio::test]
    async fn requests_are_validated_before_streaming() {
        let f = fixture(ScriptedModel::from_tokens(&["x"]));

        let error = f
            .service
            .chat()
            .chat(ChatRequest::new(CLIENT, "hi").with_model("missing"))
            .await
            .unwrap_err();
        assert!(error.is_fatal_config());
        assert!(f.store.list_sessions(CLIENT).await.unwrap().is_empty());

        let error = f
            .service
            .chat()
            .chat(ChatRequest::new(CLIENT, "hi").with_session("unknown"))
            .await
            .unwrap_err();
        assert_eq!(error.to_string(), "Session not found");

        let error = f.service.chat().chat(ChatRequest::new(CLIENT, "  ")).await.unwrap_err();
        assert!(matches!(error, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn turn_without_session_creates_one() {
        let f = fixture(ScriptedModel::from_tokens(&["x"]));
        let (session_id, _) = run(&f, ChatRequest::new(CLIENT, "hi")).await;
        assert!(f.store.find_session(&session_id, CLIENT).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn system_prompt_generation() {
        let f = fixture(ScriptedModel::new(Vec::new()).with_completion("  You are a patient tutor.\n"));
        let prompt = f
            .service
            .chat()
            .generate_system_prompt("Math tutor", None)
            .await
            .unwrap();
        assert_eq!(prompt, "You are a patient tutor.");
        assert_eq!(
            f.model.last_prompt().unwrap().input(),
            Some("Please generate a system prompt for the role \"Math tutor\".")
        );

        let error = f.service.chat().generate_system_prompt(" ", None).await.unwrap_err();
        assert!(matches!(error, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn persisted_turn_touches_the_session() {
        let f = fixture(ScriptedModel::from_tokens(&["x"]));
        let (session_id, _) = run(&f, ChatRequest::new(CLIENT, "hi")).await;

        let session = f.store.find_session(&session_id, CLIENT).await.unwrap().unwrap();
        let messages = f.store.session_messages(&session_id, CLIENT).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert!(session.updated_at > session.created_at);
        assert_eq!(session.updated_at, messages[1].created_at);
    }

    #[tokio::test]
    async fn delete_message_reports_missing() {
        let f = fixture(ScriptedModel::from_tokens(&["x"]));
        let (session_id, _) = run(&f, ChatRequest::new(CLIENT, "hi")).await;
        let messages = f.store.session_messages(&session_id, CLIENT).await.unwrap();

        f.service.chat().delete_message(messages[0].id, CLIENT).await.unwrap();
        let error = f
            .service
            .chat()
            .delete_message(messages[0].id, CLIENT)
            .await
            .unwrap_err();
        assert_eq!(error.to_string(), "Message not found");
    }

    #[tokio::test]
    async fn delete_message_is_scoped_to_its_client() {
        let f = fixture(ScriptedModel::from_tokens(&["x"]));
        let (session_id, _) = run(&f, ChatRequest::new(CLIENT, "hi")).await;
        let messages = f.store.session_messages(&session_id, CLIENT).await.unwrap();

        let error = f
            .service
            .chat()
            .delete_message(messages[0].id, "intruder")
            .await
            .unwrap_err();
        assert!(matches!(error, Error::NotFound(_)));
        assert_eq!(
            f.store.session_messages(&session_id, CLIENT).await.unwrap().len(),
            messages.len()
        );
    }
}
