//! The `chat` command.

use std::io::{self, Write};

use anyhow::Context;
use clap::Args;
use futures::{Stream, StreamExt};
use parley_rig::RigService;
use parley_rig::chat::{ChatEvent, ChatRequest};
use tokio::signal::ctrl_c;
use tokio_util::sync::CancellationToken;

use crate::TRACING_TARGET_COMMAND;

/// Arguments of the `chat` command.
#[derive(Debug, Clone, Args)]
pub struct ChatArgs {
    /// Session to continue; a new one is created when omitted
    #[arg(long)]
    pub session: Option<String>,

    /// Model identifier (see `parley models`)
    #[arg(long)]
    pub model: Option<String>,

    /// Search the web
    #[arg(long)]
    pub web_search: bool,

    /// Search the client's knowledge base
    #[arg(long)]
    pub vector_search: bool,

    /// Search the session's temporary document
    #[arg(long)]
    pub temp_doc_search: bool,

    /// The user message
    pub message: String,
}

impl ChatArgs {
    fn into_request(self, client_id: &str) -> ChatRequest {
        let mut request = ChatRequest::new(client_id, self.message)
            .with_web_search(self.web_search)
            .with_vector_search(self.vector_search)
            .with_temp_doc_search(self.temp_doc_search);
        request.session_id = self.session;
        request.model_id = self.model;
        request
    }
}

/// Runs one turn, writing every event as an SSE frame.
///
/// Ctrl+C cancels the turn. A turn that ends with an error frame fails the
/// command after the frame was written.
pub async fn run(rig: &RigService, client_id: &str, args: ChatArgs) -> anyhow::Result<()> {
    let mut stream = rig.chat().chat(args.into_request(client_id)).await?;
    let cancel = stream.cancellation_token();
    tracing::info!(
        target: TRACING_TARGET_COMMAND,
        session_id = %stream.session_id(),
        "Chat turn started"
    );

    let failure = print_events(&mut stream, &cancel).await?;
    stream.drain().await;
    match failure {
        Some(message) => anyhow::bail!("chat turn failed: {message}"),
        None => Ok(()),
    }
}

/// Writes events as SSE frames until the stream ends or Ctrl+C cancels it.
///
/// Returns the message of an error frame, if one was written.
pub(super) async fn print_events<S>(
    stream: &mut S,
    cancel: &CancellationToken,
) -> anyhow::Result<Option<String>>
where
    S: Stream<Item = ChatEvent> + Unpin,
{
    let mut stdout = io::stdout();
    let mut failure = None;
    loop {
        let event = tokio::select! {
            event = stream.next() => event,
            result = ctrl_c() => {
                result.context("failed to listen for Ctrl+C")?;
                tracing::warn!(target: TRACING_TARGET_COMMAND, "Interrupted, cancelling stream");
                cancel.cancel();
                None
            }
        };
        let Some(event) = event else { break };

        stdout
            .write_all(event.to_sse_frame().as_bytes())
            .and_then(|()| stdout.flush())
            .context("failed to write event")?;
        if let ChatEvent::Error(message) = event {
            failure = Some(message);
        }
    }
    Ok(failure)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_map_onto_request() {
        let args = ChatArgs {
            session: Some("s1".into()),
            model: None,
            web_search: true,
            vector_search: false,
            temp_doc_search: true,
            message: "hi".into(),
        };

        let request = args.into_request("acme");
        assert_eq!(request.client_id, "acme");
        assert_eq!(request.session_id.as_deref(), Some("s1"));
        assert!(request.model_id.is_none());
        assert!(request.retrieval.web_search);
        assert!(!request.retrieval.vector_search);
        assert!(request.retrieval.temp_doc_search);
    }
}
