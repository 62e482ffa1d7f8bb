//! Reader file repository.

use std::future::Future;

use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::model::{NewReaderFile, ReaderFile};
use crate::{PgConnection, PgError, PgResult, schema};

/// Cached analysis column of a reader file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderAnalysisColumn {
    Summary,
    DeepReading,
    MindMap,
}

/// Repository for reader file records.
pub trait ReaderFileRepository {
    /// Records an uploaded reader file.
    fn create_reader_file(
        &mut self,
        new_file: NewReaderFile,
    ) -> impl Future<Output = PgResult<ReaderFile>> + Send;

    /// Lists a client's active reader files, newest first.
    fn list_reader_files(
        &mut self,
        client_id: &str,
    ) -> impl Future<Output = PgResult<Vec<ReaderFile>>> + Send;

    /// Finds an active reader file by its stored filename.
    fn find_reader_file(
        &mut self,
        filename: &str,
        client_id: &str,
    ) -> impl Future<Output = PgResult<Option<ReaderFile>>> + Send;

    /// Soft-deletes a reader file. Returns whether an active row matched.
    fn soft_delete_reader_file(
        &mut self,
        filename: &str,
        client_id: &str,
    ) -> impl Future<Output = PgResult<bool>> + Send;

    /// Stores one generated analysis. Returns whether an active row matched.
    fn save_reader_analysis(
        &mut self,
        filename: &str,
        client_id: &str,
        column: ReaderAnalysisColumn,
        content: &str,
    ) -> impl Future<Output = PgResult<bool>> + Send;
}

impl ReaderFileRepository for PgConnection {
    async fn create_reader_file(&mut self, new_file: NewReaderFile) -> PgResult<ReaderFile> {
        use schema::reader_files;

        diesel::insert_into(reader_files::table)
            .values(&new_file)
            .returning(ReaderFile::as_returning())
            .get_result(self)
            .await
            .map_err(PgError::from)
    }

    async fn list_reader_files(&mut self, client_id: &str) -> PgResult<Vec<ReaderFile>> {
        use schema::reader_files::{self, dsl};

        reader_files::table
            .filter(dsl::client_id.eq(client_id))
            .filter(dsl::deleted_at.is_null())
            .order(dsl::created_at.desc())
            .select(ReaderFile::as_select())
            .load(self)
            .await
            .map_err(PgError::from)
    }

    async fn find_reader_file(
        &mut self,
        filename: &str,
        client_id: &str,
    ) -> PgResult<Option<ReaderFile>> {
        use schema::reader_files::{self, dsl};

        reader_files::table
            .filter(dsl::filename.eq(filename))
            .filter(dsl::client_id.eq(client_id))
            .filter(dsl::deleted_at.is_null())
            .select(ReaderFile::as_select())
            .first(self)
            .await
            .optional()
            .map_err(PgError::from)
    }

    async fn soft_delete_reader_file(&mut self, filename: &str, client_id: &str) -> PgResult<bool> {
        use diesel::dsl::now;
        use schema::reader_files::{self, dsl};

        let updated = diesel::update(
            reader_files::table
                .filter(dsl::filename.eq(filename))
                .filter(dsl::client_id.eq(client_id))
                .filter(dsl::deleted_at.is_null()),
        )
        .set((dsl::deleted_at.eq(now), dsl::updated_at.eq(now)))
        .execute(self)
        .await
        .map_err(PgError::from)?;

        Ok(updated > 0)
    }

    async fn save_reader_analysis(
        &mut self,
        filename: &str,
        client_id: &str,
        column: ReaderAnalysisColumn,
        content: &str,
    ) -> PgResult<bool> {
        use diesel::dsl::now;
        use schema::reader_files::{self, dsl};

        let target = reader_files::table
            .filter(dsl::filename.eq(filename))
            .filter(dsl::client_id.eq(client_id))
            .filter(dsl::deleted_at.is_null());

        let updated = match column {
            ReaderAnalysisColumn::Summary => {
                diesel::update(target)
                    .set((dsl::summary.eq(content), dsl::updated_at.eq(now)))
                    .execute(self)
                    .await
            }
            ReaderAnalysisColumn::DeepReading => {
                diesel::update(target)
                    .set((dsl::deep_reading.eq(content), dsl::updated_at.eq(now)))
                    .execute(self)
                    .await
            }
            ReaderAnalysisColumn::MindMap => {
                diesel::update(target)
                    .set((dsl::mind_map.eq(content), dsl::updated_at.eq(now)))
                    .execute(self)
                    .await
            }
        }
        .map_err(PgError::from)?;

        Ok(updated > 0)
    }
}
