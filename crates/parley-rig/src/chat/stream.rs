//! Push channel between a running turn and its caller.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};

use super::ChatEvent;
use crate::{Error, Result, TRACING_TARGET_CHAT};

/// Frames buffered between the turn task and the caller.
const EVENT_BUFFER_SIZE: usize = 64;

/// Sending half used by the turn task.
#[derive(Debug, Clone)]
pub(crate) struct EventSink {
    sender: mpsc::Sender<ChatEvent>,
    cancel: CancellationToken,
}

impl EventSink {
    /// Forwards an event.
    ///
    /// Fails with [`Error::Cancelled`] once the turn was cancelled or the
    /// caller dropped its stream.
    pub async fn send(&self, event: ChatEvent) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        tokio::select! {
            biased;

            () = self.cancel.cancelled() => Err(Error::Cancelled),
            result = self.sender.send(event) => result.map_err(|_| {
                self.cancel.cancel();
                Error::Cancelled
            }),
        }
    }

    /// Returns the turn's cancellation token.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// Creates the channel of one turn.
pub(crate) fn channel() -> (EventSink, mpsc::Receiver<ChatEvent>, CancellationToken) {
    let (sender, receiver) = mpsc::channel(EVENT_BUFFER_SIZE);
    let cancel = CancellationToken::new();
    let sink = EventSink {
        sender,
        cancel: cancel.clone(),
    };
    (sink, receiver, cancel)
}

/// Ordered events pushed by a background task.
///
/// Dropping the stream cancels the task.
pub struct EventStream {
    events: ReceiverStream<ChatEvent>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    _guard: DropGuard,
}

impl EventStream {
    pub(crate) fn new(
        receiver: mpsc::Receiver<ChatEvent>,
        cancel: CancellationToken,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            events: ReceiverStream::new(receiver),
            _guard: cancel.clone().drop_guard(),
            cancel,
            task: Some(task),
        }
    }

    /// Returns a token that cancels the task when triggered.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancels the task. No further events are delivered.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Discards the remaining events and waits for the task to finish.
    pub async fn drain(mut self) {
        while self.events.next().await.is_some() {}
        if let Some(task) = self.task.take()
            && let Err(error) = task.await
        {
            tracing::error!(target: TRACING_TARGET_CHAT, error = %error, "Event task failed");
        }
    }
}

impl Stream for EventStream {
    type Item = ChatEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.cancel.is_cancelled() {
            return Poll::Ready(None);
        }
        self.events.poll_next_unpin(cx)
    }
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Ordered events of one chat turn.
///
/// Dropping the stream cancels the turn; a cancelled turn persists nothing.
pub struct ChatStream {
    session_id: String,
    events: EventStream,
}

impl ChatStream {
    pub(crate) fn new(
        session_id: String,
        receiver: mpsc::Receiver<ChatEvent>,
        cancel: CancellationToken,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            session_id,
            events: EventStream::new(receiver, cancel, task),
        }
    }

    /// Returns the session the turn belongs to, which may have been created for it.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Returns a token that cancels the turn when triggered.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.events.cancellation_token()
    }

    /// Cancels the turn. No further events are delivered.
    pub fn cancel(&self) {
        self.events.cancel();
    }

    /// Discards the remaining events and waits for the turn task to finish.
    pub async fn drain(self) {
        self.events.drain().await;
    }
}

impl Stream for ChatStream {
    type Item = ChatEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_next_unpin(cx)
    }
}

impl std::fmt::Debug for ChatStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatStream")
            .field("session_id", &self.session_id)
            .field("events", &self.events)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dropped_receiver_cancels_sink() {
        let (sink, receiver, cancel) = channel();
        drop(receiver);
        assert!(matches!(
            sink.send(ChatEvent::status("x")).await,
            Err(Error::Cancelled)
        ));
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn dropping_stream_cancels_turn() {
        let (sink, receiver, cancel) = channel();
        let task = tokio::spawn(async {});
        let stream = ChatStream::new("s".into(), receiver, cancel, task);
        drop(stream);
        assert!(sink.cancellation().is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_stream_yields_nothing() {
        let (sink, receiver, cancel) = channel();
        let task = tokio::spawn(async {});
        let mut stream = ChatStream::new("s".into(), receiver, cancel, task);

        sink.send(ChatEvent::status("queued")).await.unwrap();
        stream.cancel();
        assert!(stream.next().await.is_none());
    }
}
