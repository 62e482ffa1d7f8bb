//! Session temporary file model.

use diesel::prelude::*;
use jiff_diesel::Timestamp;
use uuid::Uuid;

use crate::schema::session_temp_files;

/// An uploaded document attached to a session for one chat turn.
///
/// Rows are soft-deleted through `deleted_at`; at most one row per session has
/// `deleted_at IS NULL`.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable)]
#[diesel(table_name = session_temp_files)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct SessionTempFile {
    pub id: Uuid,
    pub filename: String,
    pub original_filename: String,
    pub mime_type: String,
    pub size: i64,
    pub path: String,
    pub session_id: String,
    pub client_id: String,
    pub is_short_document: bool,
    pub full_content: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub deleted_at: Option<Timestamp>,
}

impl SessionTempFile {
    /// Returns whether the file has not been soft-deleted.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }
}

/// Data for inserting a temporary file record.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = session_temp_files)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewSessionTempFile {
    pub filename: String,
    pub original_filename: String,
    pub mime_type: String,
    pub size: i64,
    pub path: String,
    pub session_id: String,
    pub client_id: String,
    pub is_short_document: bool,
    pub full_content: Option<String>,
}
