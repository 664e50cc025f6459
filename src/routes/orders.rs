use anyhow::Context;
use axum::{
    Extension,
    extract::{Path, State},
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
    models::{OrderEntity, UpdateOrderStatusEntity},
    services::{
        orders::{self, LineItem, OrderSummary, OrderWithItems, ShippingAddress},
        users,
    },
};

pub fn routes_with_openapi(state: AppState) -> OpenApiRouter<AppState> {
    utoipa_axum::router::OpenApiRouter::new().nest(
        "/orders",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(create_order))
            .routes(utoipa_axum::routes!(get_orders))
            .routes(utoipa_axum::routes!(get_order))
            .routes(utoipa_axum::routes!(update_status))
            .route_layer(axum::middleware::from_fn_with_state(state, require_auth)),
    )
}

#[derive(Deserialize, ToSchema)]
pub struct CreateOrderReq {
    pub country: Option<String>,
    pub city: Option<String>,
    pub street: Option<String>,
    pub house_number: Option<String>,
    pub apartment_number: Option<String>,
    pub floor: Option<String>,
    pub postal_code: Option<String>,
    pub phone: Option<String>,
    pub items: Option<Vec<LineItem>>,
}

impl CreateOrderReq {
    /// Splits the body into an address and its lines. Every address field is required.
    fn into_parts(self) -> Result<(ShippingAddress, Vec<LineItem>), AppError> {
        fn present(value: Option<String>) -> Option<String> {
            value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
        }

        let address = (|| {
            Some(ShippingAddress {
                country: present(self.country)?,
                city: present(self.city)?,
                street: present(self.street)?,
                house_number: present(self.house_number)?,
                apartment_number: present(self.apartment_number)?,
                floor: present(self.floor)?,
                postal_code: present(self.postal_code)?,
                phone: present(self.phone)?,
            })
        })();

        match (address, self.items) {
            (Some(address), Some(items)) if !items.is_empty() => Ok((address, items)),
            _ => Err(AppError::BadRequest("Missing fields or items".into())),
        }
    }
}

/// Place an order priced at the products' current prices.
#[utoipa::path(
    post,
    path = "/createOrder",
    tags = ["Orders"],
    security(("bearerAuth" = [])),
    request_body = CreateOrderReq,
    responses(
        (status = 201, description = "Order placed", body = StdResponse<OrderWithItems, String>),
        (status = 400, description = "Missing address fields or items"),
        (status = 404, description = "A referenced product does not exist"),
        (status = 409, description = "A referenced product is no longer for sale")
    )
)]
async fn create_order(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    ApiJson(body): ApiJson<CreateOrderReq>,
) -> Result<impl IntoResponse, AppError> {
    let (address, items) = body.into_parts()?;
    orders::validate_lines(&items)?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let placed = orders::create_order(conn, user.id, address, items).await?;

    Ok(StdResponse::created(placed, "Order placed successfully"))
}

/// Fetch all orders of the caller, newest first.
#[utoipa::path(
    get,
    path = "/getOrders",
    tags = ["Orders"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "List my orders", body = StdResponse<Vec<OrderSummary>, String>)
    )
)]
async fn get_orders(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let orders = orders::list_orders(conn, user.id).await?;

    Ok(StdResponse::ok(orders, "Orders fetched successfully"))
}

/// Fetch a specific order with its items.
#[utoipa::path(
    get,
    path = "/getOrder/{order_id}",
    tags = ["Orders"],
    security(("bearerAuth" = [])),
    params(
        ("order_id" = i32, Path, description = "Order ID to fetch")
    ),
    responses(
        (status = 200, description = "Order fetched", body = StdResponse<OrderWithItems, String>),
        (status = 404, description = "Order not found")
    )
)]
async fn get_order(
    Path(order_id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let caller = users::caller(conn, user.id).await?;
    let order = orders::get_order(conn, order_id, caller).await?;

    Ok(StdResponse::ok(order, "Order fetched successfully"))
}

#[utoipa::path(
    put,
    path = "/updateStatus/{order_id}",
    tags = ["Orders"],
    security(("bearerAuth" = [])),
    params(
        ("order_id" = i32, Path, description = "Order ID to update")
    ),
    request_body = UpdateOrderStatusEntity,
    responses(
        (status = 200, description = "Order status updated", body = StdResponse<OrderEntity, String>),
        (status = 404, description = "Order not found")
    )
)]
async fn update_status(
    Path(order_id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    ApiJson(body): ApiJson<UpdateOrderStatusEntity>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let caller = users::caller(conn, user.id).await?;
    let order = orders::update_status(conn, order_id, caller, body).await?;

    Ok(StdResponse::ok(order, "Order status updated"))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn body(value: serde_json::Value) -> CreateOrderReq {
        serde_json::from_value(value).unwrap()
    }

    fn full_address() -> serde_json::Value {
        json!({
            "country": "RO",
            "city": "Cluj",
            "street": "Memorandumului",
            "house_number": "28",
            "apartment_number": "4",
            "floor": "2",
            "postal_code": "400114",
            "phone": "0712345678",
        })
    }

    #[test]
    fn complete_body_splits_into_address_and_lines() {
        let mut value = full_address();
        value["items"] = json!([{ "product_id": 7, "quantity": 2 }]);

        let (address, items) = body(value).into_parts().unwrap();
        assert_eq!(address.city, "Cluj");
        assert_eq!(
            items,
            vec![LineItem {
                product_id: 7,
                quantity: 2
            }]
        );
    }

    #[test]
    fn blank_address_field_is_rejected() {
        let mut value = full_address();
        value["floor"] = json!("  ");
        value["items"] = json!([{ "product_id": 7, "quantity": 1 }]);

        assert!(matches!(
            body(value).into_parts(),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn empty_or_missing_items_are_rejected() {
        let mut value = full_address();
        value["items"] = json!([]);
        assert!(body(value).into_parts().is_err());

        assert!(body(full_address()).into_parts().is_err());
    }
}
