pub mod carts;
pub mod health;
pub mod orders;
pub mod payments;
pub mod products;
pub mod users;

use utoipa_axum::router::OpenApiRouter;

use crate::app_state::AppState;

/// Every resource router, mounted under `/api`.
pub fn api_routes(state: &AppState) -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/api",
        users::routes_with_openapi(state.clone())
            .merge(products::routes_with_openapi(state.clone()))
            .merge(carts::routes_with_openapi(state.clone()))
            .merge(orders::routes_with_openapi(state.clone()))
            .merge(payments::routes_with_openapi(state.clone())),
    )
}
