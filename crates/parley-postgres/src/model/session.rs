//! Chat session model.

use diesel::prelude::*;
use jiff_diesel::Timestamp;
use uuid::Uuid;

use crate::schema::sessions;

/// A conversation owned by a client.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable)]
#[diesel(table_name = sessions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Session {
    /// Primary key.
    pub id: Uuid,
    /// Opaque public session token.
    pub session_id: String,
    /// Owning client identifier.
    pub client_id: String,
    /// Optional assistant role name.
    pub role_name: Option<String>,
    /// Optional system prompt overriding the default one.
    pub system_prompt: Option<String>,
    /// Timestamp when the session was created.
    pub created_at: Timestamp,
    /// Timestamp when the session was last updated.
    pub updated_at: Timestamp,
}

impl Session {
    /// Returns the system prompt override, if one is set and non-blank.
    #[inline]
    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt
            .as_deref()
            .filter(|prompt| !prompt.trim().is_empty())
    }
}

/// Data for creating a new session.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = sessions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewSession {
    /// Opaque public session token.
    pub session_id: String,
    /// Owning client identifier.
    pub client_id: String,
    /// Optional assistant role name.
    pub role_name: Option<String>,
    /// Optional system prompt.
    pub system_prompt: Option<String>,
}

/// Changes applicable to an existing session.
///
/// Only the role name and the system prompt may change.
#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = sessions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UpdateSession {
    /// New role name (`Some(None)` clears it).
    pub role_name: Option<Option<String>>,
    /// New system prompt (`Some(None)` clears it).
    pub system_prompt: Option<Option<String>>,
    /// Update timestamp.
    pub updated_at: Option<Timestamp>,
}

impl UpdateSession {
    /// Returns whether the changeset modifies any user-visible field.
    pub fn is_empty(&self) -> bool {
        self.role_name.is_none() && self.system_prompt.is_none()
    }
}

/// A session together with summary information about its messages.
#[derive(Debug, Clone)]
pub struct SessionOverview {
    /// The session row.
    pub session: Session,
    /// Content of the oldest message, if any.
    pub first_message: Option<String>,
    /// Content of the newest message, if any.
    pub last_message: Option<String>,
    /// Number of messages in the session.
    pub message_count: i64,
}
