use anyhow::Context;
use axum::{
    Extension,
    extract::State,
    response::IntoResponse,
};
use serde::Deserialize;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    app_error::{AppError, StdResponse},
    app_state::AppState,
    extract::ApiJson,
    middleware::{CurrentUser, require_auth},
    models::{PaymentMethod, ProductEntity},
    services::{
        payments::{self, CustomerPayment, PaymentReceipt},
        reports::{self, MonthRevenue},
    },
};

pub fn routes_with_openapi(state: AppState) -> OpenApiRouter<AppState> {
    utoipa_axum::router::OpenApiRouter::new().nest(
        "/payments",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(create_payment))
            .routes(utoipa_axum::routes!(get_payments_by_customer))
            .routes(utoipa_axum::routes!(get_payments_by_seller))
            .routes(utoipa_axum::routes!(get_payments_by_month))
            .route_layer(axum::middleware::from_fn_with_state(state, require_auth)),
    )
}

#[derive(Deserialize, ToSchema)]
pub struct CreatePaymentReq {
    pub order_id: Option<i32>,
    #[schema(example = "card")]
    pub payment_method: Option<String>,
}

/// Pay for an order. The order becomes paid and its products sold, or nothing changes.
#[utoipa::path(
    post,
    path = "/createPayment",
    tags = ["Payments"],
    security(("bearerAuth" = [])),
    request_body = CreatePaymentReq,
    responses(
        (status = 201, description = "Payment created", body = StdResponse<PaymentReceipt, String>),
        (status = 400, description = "Missing fields or unknown payment method"),
        (status = 404, description = "Order not found"),
        (status = 409, description = "Order already paid or a product already sold")
    )
)]
async fn create_payment(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    ApiJson(body): ApiJson<CreatePaymentReq>,
) -> Result<impl IntoResponse, AppError> {
    let (Some(order_id), Some(method)) = (body.order_id, body.payment_method) else {
        return Err(AppError::BadRequest("Missing fields".into()));
    };
    let method: PaymentMethod = method.parse().map_err(AppError::BadRequest)?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let receipt = payments::create_payment(conn, user.id, order_id, method).await?;

    Ok(StdResponse::created(receipt, "Payment created successfully"))
}

/// The caller's payments with their orders and purchased products.
#[utoipa::path(
    get,
    path = "/getPaymentsByCustomerId",
    tags = ["Payments"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Payments fetched", body = StdResponse<Vec<CustomerPayment>, String>)
    )
)]
async fn get_payments_by_customer(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let payments = payments::list_customer_payments(conn, user.id).await?;

    Ok(StdResponse::ok(payments, "Payments fetched successfully"))
}

/// Every product the caller has listed.
#[utoipa::path(
    get,
    path = "/getPaymentsBySellerId",
    tags = ["Payments"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Seller products fetched", body = StdResponse<Vec<ProductEntity>, String>)
    )
)]
async fn get_payments_by_seller(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let products = payments::list_seller_products(conn, user.id).await?;

    Ok(StdResponse::ok(products, "Payments fetched successfully"))
}

/// The caller's listing value per calendar month.
#[utoipa::path(
    get,
    path = "/getPaymentsByMonth",
    tags = ["Payments"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Monthly totals", body = StdResponse<Vec<MonthRevenue>, String>)
    )
)]
async fn get_payments_by_month(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let report = reports::revenue_by_month(conn, user.id).await?;

    Ok(StdResponse::ok(report, "Payments fetched successfully"))
}
