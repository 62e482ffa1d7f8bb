//! Knowledge-base chunk repository with pgvector similarity search.

use std::future::Future;

use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use pgvector::Vector;
use uuid::Uuid;

use crate::model::{KnowledgeChunk, NewKnowledgeChunk, ScoredKnowledgeChunk};
use crate::{PgConnection, PgError, PgResult, schema};

/// Repository for a client's knowledge-base chunks.
pub trait KnowledgeChunkRepository {
    /// Inserts a batch of chunks.
    fn create_knowledge_chunks(
        &mut self,
        new_chunks: Vec<NewKnowledgeChunk>,
    ) -> impl Future<Output = PgResult<Vec<KnowledgeChunk>>> + Send;

    /// Returns the `limit` chunks closest to the query embedding by cosine distance.
    ///
    /// When `filenames` is given, only chunks of those stored files are searched.
    fn search_knowledge_chunks(
        &mut self,
        client_id: &str,
        query_embedding: Vector,
        filenames: Option<&[String]>,
        limit: i64,
    ) -> impl Future<Output = PgResult<Vec<ScoredKnowledgeChunk>>> + Send;

    /// Counts the chunks of a client.
    fn count_client_knowledge_chunks(
        &mut self,
        client_id: &str,
    ) -> impl Future<Output = PgResult<i64>> + Send;

    /// Deletes every chunk of a client.
    fn delete_client_knowledge_chunks(
        &mut self,
        client_id: &str,
    ) -> impl Future<Output = PgResult<usize>> + Send;

    /// Deletes the given chunks of a client.
    fn delete_knowledge_chunks_by_ids(
        &mut self,
        client_id: &str,
        chunk_ids: &[Uuid],
    ) -> impl Future<Output = PgResult<usize>> + Send;

    /// Deletes every chunk originating from a stored file.
    fn delete_knowledge_chunks_by_filename(
        &mut self,
        client_id: &str,
        filename: &str,
    ) -> impl Future<Output = PgResult<usize>> + Send;
}

impl KnowledgeChunkRepository for PgConnection {
    async fn create_knowledge_chunks(
        &mut self,
        new_chunks: Vec<NewKnowledgeChunk>,
    ) -> PgResult<Vec<KnowledgeChunk>> {
        use schema::knowledge_chunks;

        if new_chunks.is_empty() {
            return Ok(vec![]);
        }

        diesel::insert_into(knowledge_chunks::table)
            .values(&new_chunks)
            .returning(KnowledgeChunk::as_returning())
            .get_results(self)
            .await
            .map_err(PgError::from)
    }

    async fn search_knowledge_chunks(
        &mut self,
        client_id: &str,
        query_embedding: Vector,
        filenames: Option<&[String]>,
        limit: i64,
    ) -> PgResult<Vec<ScoredKnowledgeChunk>> {
        use pgvector::VectorExpressionMethods;
        use schema::knowledge_chunks::{self, dsl};

        let mut query = knowledge_chunks::table
            .filter(dsl::client_id.eq(client_id))
            .into_boxed();
        if let Some(filenames) = filenames {
            query = query.filter(dsl::filename.eq_any(filenames));
        }

        let chunks: Vec<(KnowledgeChunk, f64)> = query
            .order(dsl::embedding.cosine_distance(&query_embedding))
            .limit(limit)
            .select((
                KnowledgeChunk::as_select(),
                (1.0.into_sql::<diesel::sql_types::Double>()
                    - dsl::embedding.cosine_distance(&query_embedding)),
            ))
            .load(self)
            .await
            .map_err(PgError::from)?;

        Ok(chunks
            .into_iter()
            .map(|(chunk, score)| ScoredKnowledgeChunk { chunk, score })
            .collect())
    }

    async fn count_client_knowledge_chunks(&mut self, client_id: &str) -> PgResult<i64> {
        use schema::knowledge_chunks::{self, dsl};

        knowledge_chunks::table
            .filter(dsl::client_id.eq(client_id))
            .count()
            .get_result(self)
            .await
            .map_err(PgError::from)
    }

    async fn delete_client_knowledge_chunks(&mut self, client_id: &str) -> PgResult<usize> {
        use schema::knowledge_chunks::{self, dsl};

        diesel::delete(knowledge_chunks::table.filter(dsl::client_id.eq(client_id)))
            .execute(self)
            .await
            .map_err(PgError::from)
    }

    async fn delete_knowledge_chunks_by_ids(
        &mut self,
        client_id: &str,
        chunk_ids: &[Uuid],
    ) -> PgResult<usize> {
        use schema::knowledge_chunks::{self, dsl};

        if chunk_ids.is_empty() {
            return Ok(0);
        }

        diesel::delete(
            knowledge_chunks::table
                .filter(dsl::client_id.eq(client_id))
                .filter(dsl::id.eq_any(chunk_ids)),
        )
        .execute(self)
        .await
        .map_err(PgError::from)
    }

    async fn delete_knowledge_chunks_by_filename(
        &mut self,
        client_id: &str,
        filename: &str,
    ) -> PgResult<usize> {
        use schema::knowledge_chunks::{self, dsl};

        diesel::delete(
            knowledge_chunks::table
                .filter(dsl::client_id.eq(client_id))
                .filter(dsl::filename.eq(filename)),
        )
        .execute(self)
        .await
        .map_err(PgError::from)
    }
}
