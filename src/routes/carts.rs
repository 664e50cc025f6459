use anyhow::Context;
use axum::{
    Extension,
    extract::{Path, State},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    app_error::{AppError, StdResponse},
    app_state::AppState,
    extract::ApiJson,
    middleware::{CurrentUser, require_auth},
    models::CartEntity,
    services::{
        carts::{self, AddedToCart, CartWithItems},
        users,
    },
};

pub fn routes_with_openapi(state: AppState) -> OpenApiRouter<AppState> {
    utoipa_axum::router::OpenApiRouter::new().nest(
        "/carts",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_cart_items))
            .routes(utoipa_axum::routes!(create_cart))
            .routes(utoipa_axum::routes!(add_cart_product))
            .routes(utoipa_axum::routes!(remove_cart_product))
            .routes(utoipa_axum::routes!(update_cart_product))
            .routes(utoipa_axum::routes!(get_cart_id))
            .routes(utoipa_axum::routes!(remove_all_cart_products))
            .route_layer(axum::middleware::from_fn_with_state(state, require_auth)),
    )
}

#[derive(Serialize, ToSchema)]
pub struct CartLineRes {
    pub cart_id: i32,
    pub product_id: i32,
}

/// Fetch one of the caller's carts with its lines.
#[utoipa::path(
    get,
    path = "/getCartItems/{cart_id}",
    tags = ["Carts"],
    security(("bearerAuth" = [])),
    params(
        ("cart_id" = i32, Path, description = "Cart ID to fetch")
    ),
    responses(
        (status = 200, description = "Cart fetched", body = StdResponse<CartWithItems, String>),
        (status = 404, description = "Cart not found")
    )
)]
async fn get_cart_items(
    Path(cart_id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let cart = carts::get_cart(conn, user.id, cart_id).await?;

    Ok(StdResponse::ok(cart, "Cart fetched successfully"))
}

/// Return the caller's cart, creating it if they have none yet.
#[utoipa::path(
    post,
    path = "/createCart",
    tags = ["Carts"],
    security(("bearerAuth" = [])),
    responses(
        (status = 201, description = "Cart created", body = StdResponse<CartEntity, String>),
        (status = 200, description = "Existing cart returned", body = StdResponse<CartEntity, String>)
    )
)]
async fn create_cart(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let (cart, created) = carts::get_or_create(conn, user.id).await?;

    Ok(if created {
        StdResponse::created(cart, "Cart created successfully")
    } else {
        StdResponse::ok(cart, "Cart already exists")
    })
}

#[derive(Deserialize, ToSchema)]
pub struct AddCartProductReq {
    pub product_id: Option<i32>,
    /// Defaults to 1.
    pub quantity: Option<i32>,
}

/// Add a product to a cart. Adding it again changes nothing.
#[utoipa::path(
    post,
    path = "/addCartProduct/{cart_id}",
    tags = ["Carts"],
    security(("bearerAuth" = [])),
    params(
        ("cart_id" = i32, Path, description = "Cart to add to; an unknown id falls back to the caller's cart")
    ),
    request_body = AddCartProductReq,
    responses(
        (status = 200, description = "Product added to cart", body = StdResponse<AddedToCart, String>),
        (status = 404, description = "Product not found")
    )
)]
async fn add_cart_product(
    Path(cart_id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    ApiJson(body): ApiJson<AddCartProductReq>,
) -> Result<impl IntoResponse, AppError> {
    let Some(product_id) = body.product_id else {
        return Err(AppError::BadRequest("Missing fields".into()));
    };

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let added = carts::add_product(
        conn,
        user.id,
        cart_id,
        product_id,
        body.quantity.unwrap_or(1),
    )
    .await?;

    let message = if added.added {
        "Product added to cart"
    } else {
        "Product already in cart"
    };

    Ok(StdResponse::ok(added, message))
}

#[utoipa::path(
    delete,
    path = "/removeCartProduct/{cart_id}/{product_id}",
    tags = ["Carts"],
    security(("bearerAuth" = [])),
    params(
        ("cart_id" = i32, Path, description = "Cart ID"),
        ("product_id" = i32, Path, description = "Product to remove")
    ),
    responses(
        (status = 200, description = "Product removed from cart", body = StdResponse<CartLineRes, String>),
        (status = 404, description = "Cart not found")
    )
)]
async fn remove_cart_product(
    Path((cart_id, product_id)): Path<(i32, i32)>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    carts::remove_product(conn, user.id, cart_id, product_id).await?;

    Ok(StdResponse::ok(
        CartLineRes {
            cart_id,
            product_id,
        },
        "Product removed from cart",
    ))
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateCartProductReq {
    pub quantity: Option<i32>,
}

#[utoipa::path(
    put,
    path = "/updateCartProduct/{cart_id}/{product_id}",
    tags = ["Carts"],
    security(("bearerAuth" = [])),
    params(
        ("cart_id" = i32, Path, description = "Cart ID"),
        ("product_id" = i32, Path, description = "Product whose quantity changes")
    ),
    request_body = UpdateCartProductReq,
    responses(
        (status = 200, description = "Cart item quantity updated", body = StdResponse<CartLineRes, String>),
        (status = 404, description = "Cart or line not found")
    )
)]
async fn update_cart_product(
    Path((cart_id, product_id)): Path<(i32, i32)>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    ApiJson(body): ApiJson<UpdateCartProductReq>,
) -> Result<impl IntoResponse, AppError> {
    let Some(quantity) = body.quantity else {
        return Err(AppError::BadRequest("Missing fields".into()));
    };

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    carts::update_quantity(conn, user.id, cart_id, product_id, quantity).await?;

    Ok(StdResponse::ok(
        CartLineRes {
            cart_id,
            product_id,
        },
        "Cart item quantity updated",
    ))
}

#[derive(Serialize, ToSchema)]
pub struct CartIdRes {
    pub cart_id: i32,
}

/// Look up a user's cart id. Only for the user themselves or an admin.
#[utoipa::path(
    get,
    path = "/getCartId/{user_id}",
    tags = ["Carts"],
    security(("bearerAuth" = [])),
    params(
        ("user_id" = i32, Path, description = "Cart owner")
    ),
    responses(
        (status = 200, description = "Cart ID fetched", body = StdResponse<CartIdRes, String>),
        (status = 403, description = "Another user's cart"),
        (status = 404, description = "Cart not found")
    )
)]
async fn get_cart_id(
    Path(user_id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    if !users::caller(conn, user.id).await?.can_access(user_id) {
        return Err(AppError::ForbiddenResource(
            "Cannot read another user's cart".into(),
        ));
    }

    let cart = carts::find_for_user(conn, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Cart not found".into()))?;

    Ok(StdResponse::ok(
        CartIdRes { cart_id: cart.id },
        "Cart ID fetched successfully",
    ))
}

#[derive(Serialize, ToSchema)]
pub struct ClearedCartRes {
    pub cart_id: i32,
    pub removed: usize,
}

#[utoipa::path(
    delete,
    path = "/removeAllCartProducts/{cart_id}",
    tags = ["Carts"],
    security(("bearerAuth" = [])),
    params(
        ("cart_id" = i32, Path, description = "Cart to empty")
    ),
    responses(
        (status = 200, description = "All products removed from cart", body = StdResponse<ClearedCartRes, String>),
        (status = 404, description = "Cart not found")
    )
)]
async fn remove_all_cart_products(
    Path(cart_id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let removed = carts::clear(conn, user.id, cart_id).await?;

    Ok(StdResponse::ok(
        ClearedCartRes { cart_id, removed },
        "All products removed from cart",
    ))
}
