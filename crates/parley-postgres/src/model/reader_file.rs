//! Reader file model.

use diesel::prelude::*;
use jiff_diesel::Timestamp;
use uuid::Uuid;

use crate::schema::reader_files;

/// A document uploaded for reading, with its cached analyses.
///
/// Rows are soft-deleted through `deleted_at`. The filename is unique among a
/// client's active rows.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable)]
#[diesel(table_name = reader_files)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ReaderFile {
    pub id: Uuid,
    /// Stored filename.
    pub filename: String,
    pub mime_type: String,
    pub size: i64,
    pub path: String,
    pub client_id: String,
    pub summary: Option<String>,
    pub deep_reading: Option<String>,
    pub mind_map: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub deleted_at: Option<Timestamp>,
}

/// Data for inserting a reader file record.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = reader_files)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewReaderFile {
    pub filename: String,
    pub mime_type: String,
    pub size: i64,
    pub path: String,
    pub client_id: String,
}
