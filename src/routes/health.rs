use axum::response::IntoResponse;
use serde::Serialize;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{app_error::StdResponse, app_state::AppState};

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().routes(utoipa_axum::routes!(health))
}

#[derive(Serialize, ToSchema)]
pub struct HealthRes {
    pub status: String,
}

/// Liveness probe. Does not touch the database.
#[utoipa::path(
    get,
    path = "/health",
    tags = ["Health"],
    responses(
        (status = 200, description = "Service is up", body = StdResponse<HealthRes, String>)
    )
)]
async fn health() -> impl IntoResponse {
    StdResponse::ok(
        HealthRes {
            status: "ok".to_string(),
        },
        "Service is healthy",
    )
}
