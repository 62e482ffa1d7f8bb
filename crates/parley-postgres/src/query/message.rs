//! Message repository for the conversation log.

use std::future::Future;

use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use uuid::Uuid;

use super::SessionRepository;
use crate::model::{Message, NewMessage};
use crate::types::{OffsetPage, OffsetPagination};
use crate::{PgConnection, PgError, PgResult, schema};

/// Repository for message database operations.
pub trait MessageRepository {
    /// Appends a message to a session.
    fn create_message(
        &mut self,
        new_message: NewMessage,
    ) -> impl Future<Output = PgResult<Message>> + Send;

    /// Appends a message and bumps the session's `updated_at` in one transaction.
    fn append_session_message(
        &mut self,
        new_message: NewMessage,
    ) -> impl Future<Output = PgResult<Message>> + Send;

    /// Lists every message of a session in ascending creation order.
    fn list_session_messages(
        &mut self,
        session_id: &str,
        client_id: &str,
    ) -> impl Future<Output = PgResult<Vec<Message>>> + Send;

    /// Returns the `limit` most recent messages of a session in ascending
    /// creation order.
    fn list_recent_session_messages(
        &mut self,
        session_id: &str,
        client_id: &str,
        limit: i64,
    ) -> impl Future<Output = PgResult<Vec<Message>>> + Send;

    /// Returns one page of a session's messages.
    ///
    /// The first page holds the most recent messages; items within a page are
    /// in ascending creation order.
    fn page_session_messages(
        &mut self,
        session_id: &str,
        client_id: &str,
        pagination: OffsetPagination,
    ) -> impl Future<Output = PgResult<OffsetPage<Message>>> + Send;

    /// Deletes one message owned by the client. Returns whether a row was removed.
    fn delete_message(
        &mut self,
        message_id: Uuid,
        client_id: &str,
    ) -> impl Future<Output = PgResult<bool>> + Send;
}

impl MessageRepository for PgConnection {
    async fn create_message(&mut self, new_message: NewMessage) -> PgResult<Message> {
        use schema::messages;

        diesel::insert_into(messages::table)
            .values(&new_message)
            .returning(Message::as_returning())
            .get_result(self)
            .await
            .map_err(PgError::from)
    }

    async fn append_session_message(&mut self, new_message: NewMessage) -> PgResult<Message> {
        self.transaction(|conn| {
            async move {
                let message = conn.create_message(new_message).await?;
                conn.touch_session(&message.session_id, &message.client_id)
                    .await?;
                Ok::<_, PgError>(message)
            }
            .scope_boxed()
        })
        .await
    }

    async fn list_session_messages(
        &mut self,
        session_id: &str,
        client_id: &str,
    ) -> PgResult<Vec<Message>> {
        use schema::messages::{self, dsl};

        messages::table
            .filter(dsl::session_id.eq(session_id))
            .filter(dsl::client_id.eq(client_id))
            .order((dsl::created_at.asc(), dsl::id.asc()))
            .select(Message::as_select())
            .load(self)
            .await
            .map_err(PgError::from)
    }

    async fn list_recent_session_messages(
        &mut self,
        session_id: &str,
        client_id: &str,
        limit: i64,
    ) -> PgResult<Vec<Message>> {
        use schema::messages::{self, dsl};

        let mut items: Vec<Message> = messages::table
            .filter(dsl::session_id.eq(session_id))
            .filter(dsl::client_id.eq(client_id))
            .order((dsl::created_at.desc(), dsl::id.desc()))
            .limit(limit)
            .select(Message::as_select())
            .load(self)
            .await
            .map_err(PgError::from)?;

        items.reverse();
        Ok(items)
    }

    async fn page_session_messages(
        &mut self,
        session_id: &str,
        client_id: &str,
        pagination: OffsetPagination,
    ) -> PgResult<OffsetPage<Message>> {
        use schema::messages::{self, dsl};

        let total: i64 = messages::table
            .filter(dsl::session_id.eq(session_id))
            .filter(dsl::client_id.eq(client_id))
            .count()
            .get_result(self)
            .await
            .map_err(PgError::from)?;

        let mut items: Vec<Message> = messages::table
            .filter(dsl::session_id.eq(session_id))
            .filter(dsl::client_id.eq(client_id))
            .order((dsl::created_at.desc(), dsl::id.desc()))
            .limit(pagination.limit)
            .offset(pagination.offset)
            .select(Message::as_select())
            .load(self)
            .await
            .map_err(PgError::from)?;

        items.reverse();
        Ok(OffsetPage::new(items, total))
    }

    async fn delete_message(&mut self, message_id: Uuid, client_id: &str) -> PgResult<bool> {
        use schema::messages::{self, dsl};

        let affected = diesel::delete(
            messages::table
                .filter(dsl::id.eq(message_id))
                .filter(dsl::client_id.eq(client_id)),
        )
        .execute(self)
        .await
        .map_err(PgError::from)?;

        Ok(affected > 0)
    }
}
