pub mod app_error;
pub mod app_state;
pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod db;
pub mod extract;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod schema;
pub mod services;
pub mod swagger;
pub mod uploads;

use axum::Router;
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::app_state::AppState;

pub const SERVICE_NAME: &str = "Consignment API";

/// The complete HTTP application: API routes, health, uploaded photos and Swagger UI.
pub fn app(state: AppState) -> Router {
    let routes = routes::api_routes(&state).merge(routes::health::routes_with_openapi());
    let (router, openapi) = routes.split_for_parts();
    let openapi = swagger::finalize(openapi, SERVICE_NAME);

    router
        .nest_service(uploads::PUBLIC_PREFIX, ServeDir::new(state.photos.dir()))
        .merge(swagger::create_swagger_ui(openapi))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
