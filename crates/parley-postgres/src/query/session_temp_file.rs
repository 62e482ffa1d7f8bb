//! Session temporary file repository.

use std::future::Future;

use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use uuid::Uuid;

use crate::model::{NewSessionTempFile, SessionTempFile};
use crate::{PgConnection, PgError, PgResult, schema};

/// Repository for session temporary file records.
pub trait SessionTempFileRepository {
    /// Records an uploaded temporary file.
    fn create_session_temp_file(
        &mut self,
        new_file: NewSessionTempFile,
    ) -> impl Future<Output = PgResult<SessionTempFile>> + Send;

    /// Lists the non-deleted temporary files of a session, newest first.
    fn list_active_session_temp_files(
        &mut self,
        session_id: &str,
        client_id: &str,
    ) -> impl Future<Output = PgResult<Vec<SessionTempFile>>> + Send;

    /// Soft-deletes every active temporary file of a session.
    ///
    /// Returns the number of rows marked as deleted.
    fn soft_delete_session_temp_files(
        &mut self,
        session_id: &str,
        client_id: &str,
    ) -> impl Future<Output = PgResult<usize>> + Send;

    /// Soft-deletes the given active temporary files of a session.
    ///
    /// Returns the number of rows marked as deleted.
    fn soft_delete_session_temp_files_by_ids(
        &mut self,
        session_id: &str,
        client_id: &str,
        file_ids: &[Uuid],
    ) -> impl Future<Output = PgResult<usize>> + Send;
}

impl SessionTempFileRepository for PgConnection {
    async fn create_session_temp_file(
        &mut self,
        new_file: NewSessionTempFile,
    ) -> PgResult<SessionTempFile> {
        use schema::session_temp_files;

        diesel::insert_into(session_temp_files::table)
            .values(&new_file)
            .returning(SessionTempFile::as_returning())
            .get_result(self)
            .await
            .map_err(PgError::from)
    }

    async fn list_active_session_temp_files(
        &mut self,
        session_id: &str,
        client_id: &str,
    ) -> PgResult<Vec<SessionTempFile>> {
        use schema::session_temp_files::{self, dsl};

        session_temp_files::table
            .filter(dsl::session_id.eq(session_id))
            .filter(dsl::client_id.eq(client_id))
            .filter(dsl::deleted_at.is_null())
            .order(dsl::created_at.desc())
            .select(SessionTempFile::as_select())
            .load(self)
            .await
            .map_err(PgError::from)
    }

    async fn soft_delete_session_temp_files(
        &mut self,
        session_id: &str,
        client_id: &str,
    ) -> PgResult<usize> {
        use diesel::dsl::now;
        use schema::session_temp_files::{self, dsl};

        diesel::update(
            session_temp_files::table
                .filter(dsl::session_id.eq(session_id))
                .filter(dsl::client_id.eq(client_id))
                .filter(dsl::deleted_at.is_null()),
        )
        .set((dsl::deleted_at.eq(now), dsl::updated_at.eq(now)))
        .execute(self)
        .await
        .map_err(PgError::from)
    }

    async fn soft_delete_session_temp_files_by_ids(
        &mut self,
        session_id: &str,
        client_id: &str,
        file_ids: &[Uuid],
    ) -> PgResult<usize> {
        use diesel::dsl::now;
        use schema::session_temp_files::{self, dsl};

        if file_ids.is_empty() {
            return Ok(0);
        }

        diesel::update(
            session_temp_files::table
                .filter(dsl::session_id.eq(session_id))
                .filter(dsl::client_id.eq(client_id))
                .filter(dsl::id.eq_any(file_ids))
                .filter(dsl::deleted_at.is_null()),
        )
        .set((dsl::deleted_at.eq(now), dsl::updated_at.eq(now)))
        .execute(self)
        .await
        .map_err(PgError::from)
    }
}
