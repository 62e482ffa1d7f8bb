//! Streaming retrieval-augmented chat.
//!
//! This module provides:
//! - [`ChatService`] - Main entry point: runs turns, generates system prompts
//! - [`ChatStream`] - Ordered events of one turn, cancelled on drop
//! - [`EventStream`] - The same push channel for other streamed generations
//! - [`ChatEvent`] - Push channel frames (`status`, `content`, `reasoning`, `sources`, `error`, `[DONE]`)
//! - [`Source`] - Citations gathered by retrieval
//!
//! A turn loads the session history, runs the selected retrieval adapters,
//! streams the model answer, emits the deduplicated citations, persists the
//! user and assistant messages and finally sends the end marker.

mod event;
mod history;
mod persist;
mod prompt;
mod request;
mod retrieval;
mod service;
mod source;
mod stream;

pub use self::event::{ChatEvent, DONE_SENTINEL};
pub use self::history::{HistoryTurn, reconstruct as reconstruct_history};
pub use self::prompt::{DEFAULT_SYSTEM_PROMPT, EMPTY_CONTEXT, assemble as assemble_prompt};
pub use self::request::ChatRequest;
pub use self::retrieval::{RetrievalFlags, RetrievedContext};
pub use self::service::ChatService;
pub use self::source::{Source, SourceKind, dedupe_sources};
pub(crate) use self::stream::{EventSink, channel as event_channel};
pub use self::stream::{ChatStream, EventStream};
