//! PostgreSQL client with connection pooling.
//!
//! Wraps a `deadpool` pool of `diesel-async` connections behind a cheaply
//! clonable [`PgClient`]. Repository traits from [`crate::query`] are
//! implemented for [`PgConnection`](crate::PgConnection) and reachable through
//! the [`PgConn`] guard returned by [`PgClient::get_connection`].

mod custom_hooks;
mod migrate;
mod pg_client;
mod pg_config;

use deadpool::managed::{Object, Pool};
use diesel_async::AsyncPgConnection;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
pub use migrate::{MigrationResult, MigrationStatus};
pub use pg_client::{PgClient, PgConn, PgPoolStatus};
pub use pg_config::PgConfig;

/// Type alias for the connection pool used throughout the application.
pub type ConnectionPool = Pool<AsyncDieselConnectionManager<AsyncPgConnection>>;

/// Type alias for a connection object from the pool.
pub type PooledConnection = Object<AsyncDieselConnectionManager<AsyncPgConnection>>;
