//! Connection pool lifecycle and embedded migrations.

use anyhow::{Context, Result};
use diesel::{Connection, pg::PgConnection};
use diesel_async::{
    AsyncPgConnection,
    pooled_connection::{AsyncDieselConnectionManager, bb8},
};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness};
use secrecy::ExposeSecret;

use crate::config::DatabaseConfig;

pub type DbPool = bb8::Pool<AsyncPgConnection>;

/// Builds the pool and checks out one connection so a bad URL fails at startup.
pub async fn connect(config: &DatabaseConfig) -> Result<DbPool> {
    let manager =
        AsyncDieselConnectionManager::<AsyncPgConnection>::new(config.url.expose_secret());
    let pool = bb8::Pool::builder()
        .max_size(config.max_connections)
        .build(manager)
        .await
        .context("Failed to build the DB connection pool")?;

    drop(
        pool.get()
            .await
            .context("Failed to obtain a DB connection pool")?,
    );

    Ok(pool)
}

/// Builds a pool without opening any connection.
pub fn connect_lazy(config: &DatabaseConfig) -> DbPool {
    let manager =
        AsyncDieselConnectionManager::<AsyncPgConnection>::new(config.url.expose_secret());
    bb8::Pool::builder()
        .max_size(config.max_connections)
        .build_unchecked(manager)
}

/// Releases every idle connection. Called once the server has stopped accepting requests.
pub fn close(pool: DbPool) {
    let state = pool.state();
    tracing::info!(
        "Closing DB pool ({} connections, {} idle)",
        state.connections,
        state.idle_connections
    );
    drop(pool);
}

/// Runs pending migrations on a blocking thread with a synchronous connection.
pub async fn run_migrations_blocking(
    migrations: EmbeddedMigrations,
    database_url: &str,
) -> Result<usize> {
    let database_url = database_url.to_string();
    tokio::task::spawn_blocking(move || {
        let mut conn = PgConnection::establish(&database_url)
            .context("Failed to connect for migrations")?;
        let applied = conn
            .run_pending_migrations(migrations)
            .map_err(|e| anyhow::anyhow!("Failed to run migrations: {e}"))?;
        Ok(applied.len())
    })
    .await
    .context("Migration task panicked")?
}
