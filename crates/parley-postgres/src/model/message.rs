//! Chat message model.
//!
//! Messages are written once and never updated; they may only be deleted.

use diesel::prelude::*;
use jiff_diesel::Timestamp;
use uuid::Uuid;

use crate::schema::messages;
use crate::types::MessageRole;

/// A persisted user or assistant turn.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable)]
#[diesel(table_name = messages)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Message {
    /// Primary key (UUID v7, time ordered).
    pub id: Uuid,
    /// Owning session token.
    pub session_id: String,
    /// Owning client identifier.
    pub client_id: String,
    /// Author of the message.
    pub role: MessageRole,
    /// Message text.
    pub content: String,
    /// Reasoning trace (assistant only).
    pub reasoning: Option<String>,
    /// Retrieval context used to produce the turn (user only).
    pub search_context: Option<String>,
    /// Serialized citation list (assistant only).
    pub sources: Option<serde_json::Value>,
    /// Serialized snapshot of temporary files referenced by the turn.
    pub temp_files: Option<serde_json::Value>,
    /// Timestamp when the message was created.
    pub created_at: Timestamp,
}

/// Data for inserting a message.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = messages)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewMessage {
    /// Primary key, generated by the caller so inserts are time ordered.
    pub id: Uuid,
    /// Owning session token.
    pub session_id: String,
    /// Owning client identifier.
    pub client_id: String,
    /// Author of the message.
    pub role: MessageRole,
    /// Message text.
    pub content: String,
    /// Reasoning trace.
    pub reasoning: Option<String>,
    /// Retrieval context.
    pub search_context: Option<String>,
    /// Serialized citation list.
    pub sources: Option<serde_json::Value>,
    /// Serialized temporary file snapshot.
    pub temp_files: Option<serde_json::Value>,
}
