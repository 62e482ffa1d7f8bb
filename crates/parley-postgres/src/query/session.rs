//! Session repository for managing conversations.

use std::collections::HashMap;
use std::future::Future;

use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use jiff::Timestamp;

use crate::model::{NewSession, Session, SessionOverview, UpdateSession};
use crate::{PgConnection, PgError, PgResult, TRACING_TARGET_QUERY, schema};

/// Repository for session database operations.
///
/// Sessions are always addressed by their public token together with the
/// owning client, so one client can never read another client's session.
pub trait SessionRepository {
    /// Creates a new session.
    fn create_session(
        &mut self,
        new_session: NewSession,
    ) -> impl Future<Output = PgResult<Session>> + Send;

    /// Finds a session by its public token and owning client.
    fn find_session(
        &mut self,
        session_id: &str,
        client_id: &str,
    ) -> impl Future<Output = PgResult<Option<Session>>> + Send;

    /// Lists a client's sessions, most recently updated first, with message summaries.
    fn list_session_overviews(
        &mut self,
        client_id: &str,
    ) -> impl Future<Output = PgResult<Vec<SessionOverview>>> + Send;

    /// Applies the changeset and bumps `updated_at`.
    ///
    /// Returns `None` when the session does not exist.
    fn update_session(
        &mut self,
        session_id: &str,
        client_id: &str,
        updates: UpdateSession,
    ) -> impl Future<Output = PgResult<Option<Session>>> + Send;

    /// Bumps `updated_at` of a session.
    fn touch_session(
        &mut self,
        session_id: &str,
        client_id: &str,
    ) -> impl Future<Output = PgResult<()>> + Send;

    /// Deletes a session and its messages, soft-deleting its temporary files.
    ///
    /// Runs in a single transaction. Returns whether a session row was removed.
    fn delete_session_cascade(
        &mut self,
        session_id: &str,
        client_id: &str,
    ) -> impl Future<Output = PgResult<bool>> + Send;
}

impl SessionRepository for PgConnection {
    async fn create_session(&mut self, new_session: NewSession) -> PgResult<Session> {
        use schema::sessions;

        let session = diesel::insert_into(sessions::table)
            .values(&new_session)
            .returning(Session::as_returning())
            .get_result(self)
            .await
            .map_err(PgError::from)?;

        tracing::debug!(
            target: TRACING_TARGET_QUERY,
            session_id = %session.session_id,
            client_id = %session.client_id,
            "Session created"
        );

        Ok(session)
    }

    async fn find_session(
        &mut self,
        session_id: &str,
        client_id: &str,
    ) -> PgResult<Option<Session>> {
        use schema::sessions::{self, dsl};

        sessions::table
            .filter(dsl::session_id.eq(session_id))
            .filter(dsl::client_id.eq(client_id))
            .select(Session::as_select())
            .first(self)
            .await
            .optional()
            .map_err(PgError::from)
    }

    async fn list_session_overviews(&mut self, client_id: &str) -> PgResult<Vec<SessionOverview>> {
        use schema::messages;
        use schema::sessions::{self, dsl};

        let sessions: Vec<Session> = sessions::table
            .filter(dsl::client_id.eq(client_id))
            .order(dsl::updated_at.desc())
            .select(Session::as_select())
            .load(self)
            .await
            .map_err(PgError::from)?;

        if sessions.is_empty() {
            return Ok(Vec::new());
        }

        let session_ids: Vec<&str> = sessions.iter().map(|s| s.session_id.as_str()).collect();
        let rows: Vec<(String, String)> = messages::table
            .filter(messages::client_id.eq(client_id))
            .filter(messages::session_id.eq_any(session_ids))
            .order(messages::created_at.asc())
            .select((messages::session_id, messages::content))
            .load(self)
            .await
            .map_err(PgError::from)?;

        let mut summaries: HashMap<String, (String, String, i64)> = HashMap::new();
        for (session_id, content) in rows {
            summaries
                .entry(session_id)
                .and_modify(|(_, last, count)| {
                    last.clone_from(&content);
                    *count += 1;
                })
                .or_insert_with(|| (content.clone(), content, 1));
        }

        Ok(sessions
            .into_iter()
            .map(|session| match summaries.remove(&session.session_id) {
                Some((first, last, count)) => SessionOverview {
                    session,
                    first_message: Some(first),
                    last_message: Some(last),
                    message_count: count,
                },
                None => SessionOverview {
                    session,
                    first_message: None,
                    last_message: None,
                    message_count: 0,
                },
            })
            .collect())
    }

    async fn update_session(
        &mut self,
        session_id: &str,
        client_id: &str,
        mut updates: UpdateSession,
    ) -> PgResult<Option<Session>> {
        use schema::sessions::{self, dsl};

        updates.updated_at = Some(jiff_diesel::Timestamp::from(Timestamp::now()));

        diesel::update(
            sessions::table
                .filter(dsl::session_id.eq(session_id))
                .filter(dsl::client_id.eq(client_id)),
        )
        .set(&updates)
        .returning(Session::as_returning())
        .get_result(self)
        .await
        .optional()
        .map_err(PgError::from)
    }

    async fn touch_session(&mut self, session_id: &str, client_id: &str) -> PgResult<()> {
        use diesel::dsl::now;
        use schema::sessions::{self, dsl};

        diesel::update(
            sessions::table
                .filter(dsl::session_id.eq(session_id))
                .filter(dsl::client_id.eq(client_id)),
        )
        .set(dsl::updated_at.eq(now))
        .execute(self)
        .await
        .map_err(PgError::from)?;

        Ok(())
    }

    async fn delete_session_cascade(&mut self, session_id: &str, client_id: &str) -> PgResult<bool> {
        use diesel::dsl::now;
        use schema::{messages, session_temp_files, sessions};

        let session_id = session_id.to_owned();
        let client_id = client_id.to_owned();

        self.transaction(|conn| {
            async move {
                let removed_messages = diesel::delete(
                    messages::table
                        .filter(messages::session_id.eq(&session_id))
                        .filter(messages::client_id.eq(&client_id)),
                )
                .execute(conn)
                .await?;

                let removed_files = diesel::update(
                    session_temp_files::table
                        .filter(session_temp_files::session_id.eq(&session_id))
                        .filter(session_temp_files::client_id.eq(&client_id))
                        .filter(session_temp_files::deleted_at.is_null()),
                )
                .set(session_temp_files::deleted_at.eq(now))
                .execute(conn)
                .await?;

                let removed_sessions = diesel::delete(
                    sessions::table
                        .filter(sessions::session_id.eq(&session_id))
                        .filter(sessions::client_id.eq(&client_id)),
                )
                .execute(conn)
                .await?;

                tracing::debug!(
                    target: TRACING_TARGET_QUERY,
                    session_id = %session_id,
                    removed_messages,
                    removed_files,
                    "Session deleted"
                );

                Ok::<_, PgError>(removed_sessions > 0)
            }
            .scope_boxed()
        })
        .await
    }
}
