//! The `migrate` command.

use parley_postgres::PgClient;
use serde_json::json;

use super::print_json;
use crate::TRACING_TARGET_COMMAND;

/// Applies pending migrations, or only reports them with `status_only`.
pub async fn run(db: &PgClient, status_only: bool) -> anyhow::Result<()> {
    if status_only {
        let status = db.migration_status().await?;
        return print_json(&json!({
            "applied": status.applied,
            "pending": status.pending,
            "upToDate": status.is_up_to_date(),
        }));
    }

    let result = db.run_pending_migrations().await?;
    if result.applied.is_empty() {
        tracing::info!(target: TRACING_TARGET_COMMAND, "Database schema is up to date");
    }
    print_json(&json!({
        "applied": result.applied,
        "durationMs": result.duration.as_millis(),
    }))
}
