use anyhow::Result;
use consignment_backend::{
    SERVICE_NAME, app, app_error, app_state::AppState, bootstrap, config, db,
};
use diesel_migrations::{EmbeddedMigrations, embed_migrations};
use secrecy::ExposeSecret;

/// Migrations embedded into the binary which helps with streamlining image building process
const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[tokio::main]
async fn main() -> Result<()> {
    bootstrap::init_env();
    bootstrap::init_tracing();

    let config = config::load()?;
    tracing::info!("Starting {} ({:?})", SERVICE_NAME, config.environment);
    app_error::expose_error_details(config.environment.exposes_error_details());

    tracing::info!("Running migrations...");
    let migrations_count =
        db::run_migrations_blocking(MIGRATIONS, config.database.url.expose_secret()).await?;
    tracing::info!("Run {} new migrations successfully", migrations_count);

    tracing::info!("Bootstrapping...");
    let pool = db::connect(&config.database).await?;
    let addr = config.server.addr();
    let state = AppState::new(&config, pool.clone());

    let served = bootstrap::serve(SERVICE_NAME, app(state), addr).await;

    db::close(pool);
    served
}
