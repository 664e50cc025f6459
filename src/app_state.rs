use std::sync::Arc;

use crate::{auth::JwtKeys, config::AppConfig, db::DbPool, uploads::PhotoStore};

/// Shared handles injected into every handler. Cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub db_pool: DbPool,
    pub jwt: Arc<JwtKeys>,
    pub photos: PhotoStore,
}

impl AppState {
    pub fn new(config: &AppConfig, db_pool: DbPool) -> Self {
        Self {
            db_pool,
            jwt: Arc::new(JwtKeys::new(&config.auth)),
            photos: PhotoStore::new(config.uploads.dir.clone()),
        }
    }
}
