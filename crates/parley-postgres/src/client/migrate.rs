//! Embedded schema migrations.
//!
//! Migrations under `./migrations` are compiled into the binary and applied
//! through a pooled connection wrapped for diesel's synchronous
//! [`MigrationHarness`], on a blocking thread.

use std::time::{Duration, Instant};

use diesel::migration::Migration;
use diesel_async::async_connection_wrapper::AsyncConnectionWrapper;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use tokio::task::spawn_blocking;

use super::{PgClient, PooledConnection};
use crate::{PgError, PgResult, TRACING_TARGET_MIGRATION};

/// Embeds all migrations into the final binary.
pub(crate) const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations");

type HarnessConnection = AsyncConnectionWrapper<PooledConnection>;

/// Applied and pending migration versions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationStatus {
    /// Applied versions in chronological order.
    pub applied: Vec<String>,
    /// Versions not yet applied.
    pub pending: Vec<String>,
}

impl MigrationStatus {
    /// Returns true if all migrations have been applied.
    #[inline]
    pub fn is_up_to_date(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Outcome of [`PgClient::run_pending_migrations`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationResult {
    /// Versions applied by this run.
    pub applied: Vec<String>,
    pub duration: Duration,
}

impl PgClient {
    /// Applies every pending migration. Safe to call repeatedly.
    #[tracing::instrument(skip(self), target = TRACING_TARGET_MIGRATION)]
    pub async fn run_pending_migrations(&self) -> PgResult<MigrationResult> {
        tracing::info!(target: TRACING_TARGET_MIGRATION, "Starting database migration process");
        let started = Instant::now();

        let conn = self.pooled_connection().await?;
        let applied = with_harness(conn, |harness| {
            let versions = harness.run_pending_migrations(MIGRATIONS)?;
            Ok(versions.iter().map(ToString::to_string).collect::<Vec<_>>())
        })
        .await
        .inspect_err(|error| {
            tracing::error!(
                target: TRACING_TARGET_MIGRATION,
                error = %error,
                "Database migration process failed"
            );
        })?;

        let duration = started.elapsed();
        tracing::info!(
            target: TRACING_TARGET_MIGRATION,
            duration = ?duration,
            migrations_count = applied.len(),
            "Database migration process completed"
        );
        Ok(MigrationResult { applied, duration })
    }

    /// Returns which embedded migrations are applied and which are pending.
    #[tracing::instrument(skip(self), target = TRACING_TARGET_MIGRATION)]
    pub async fn migration_status(&self) -> PgResult<MigrationStatus> {
        let conn = self.pooled_connection().await?;
        let status = with_harness(conn, |harness| {
            let applied = harness
                .applied_migrations()?
                .iter()
                .map(ToString::to_string)
                .collect();
            let pending = harness
                .pending_migrations(MIGRATIONS)?
                .iter()
                .map(|migration| migration.name().version().to_string())
                .collect();
            Ok(MigrationStatus { applied, pending })
        })
        .await?;

        tracing::debug!(
            target: TRACING_TARGET_MIGRATION,
            applied = status.applied.len(),
            pending = status.pending.len(),
            "Migration status retrieved"
        );
        Ok(status)
    }
}

/// Runs `f` against a synchronous wrapper of `conn` on the blocking pool.
async fn with_harness<T, F>(conn: PooledConnection, f: F) -> PgResult<T>
where
    F: FnOnce(&mut HarnessConnection) -> diesel::migration::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let mut harness: HarnessConnection = conn.into();
    spawn_blocking(move || f(&mut harness))
        .await
        .map_err(|error| PgError::Migration(error.into()))?
        .map_err(PgError::Migration)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_without_pending_is_up_to_date() {
        let status = MigrationStatus {
            applied: vec!["20250601000000".into()],
            pending: Vec::new(),
        };
        assert!(status.is_up_to_date());
        assert!(!MigrationStatus {
            pending: vec!["20250601000000".into()],
            ..MigrationStatus::default()
        }
        .is_up_to_date());
    }
}
