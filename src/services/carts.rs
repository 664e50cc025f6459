//! Shopping carts. Prices are never copied here; they are read when an order is placed.

use anyhow::Context;
use chrono::{DateTime, Utc};
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper};
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;
use utoipa::ToSchema;

use crate::{
    app_error::AppError,
    models::{CartEntity, CreateCartEntity, CreateCartItemEntity},
    schema::{cart_items, products, shopping_carts},
};

/// A cart line joined to the product it points at.
#[derive(Serialize, Debug, Clone, ToSchema)]
pub struct CartLine {
    pub product_id: i32,
    pub quantity: i32,
    pub name: String,
    pub photo: Option<String>,
    pub description: Option<String>,
    #[schema(value_type = String, example = "120.00")]
    pub current_price: Decimal,
    pub status: String,
    pub end_date: DateTime<Utc>,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct CartWithItems {
    #[serde(flatten)]
    pub cart: CartEntity,
    pub items: Vec<CartLine>,
}

/// Result of an add: which cart was used and whether a line was inserted.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, ToSchema)]
pub struct AddedToCart {
    pub cart_id: i32,
    pub added: bool,
}

async fn find_owned(
    conn: &mut AsyncPgConnection,
    owner_id: i32,
    cart_id: i32,
) -> Result<Option<CartEntity>, AppError> {
    let cart = shopping_carts::table
        .filter(shopping_carts::id.eq(cart_id))
        .filter(shopping_carts::user_id.eq(owner_id))
        .select(CartEntity::as_select())
        .first(conn)
        .await
        .optional()
        .context("Failed to get cart")?;

    Ok(cart)
}

async fn require_owned(
    conn: &mut AsyncPgConnection,
    owner_id: i32,
    cart_id: i32,
) -> Result<CartEntity, AppError> {
    find_owned(conn, owner_id, cart_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Cart not found".into()))
}

/// The owner's oldest cart, if any.
pub async fn find_for_user(
    conn: &mut AsyncPgConnection,
    owner_id: i32,
) -> Result<Option<CartEntity>, AppError> {
    let cart = shopping_carts::table
        .filter(shopping_carts::user_id.eq(owner_id))
        .order_by(shopping_carts::id.asc())
        .select(CartEntity::as_select())
        .first(conn)
        .await
        .optional()
        .context("Failed to get cart")?;

    Ok(cart)
}

/// Returns the owner's cart, creating it on first use. The flag is true when it was created.
pub async fn get_or_create(
    conn: &mut AsyncPgConnection,
    owner_id: i32,
) -> Result<(CartEntity, bool), AppError> {
    if let Some(cart) = find_for_user(conn, owner_id).await? {
        return Ok((cart, false));
    }

    let cart = diesel::insert_into(shopping_carts::table)
        .values(CreateCartEntity { user_id: owner_id })
        .returning(CartEntity::as_returning())
        .get_result(conn)
        .await
        .context("Failed to create cart")?;

    info!("Cart #{} created for user #{}", cart.id, owner_id);

    Ok((cart, true))
}

pub async fn get_cart(
    conn: &mut AsyncPgConnection,
    owner_id: i32,
    cart_id: i32,
) -> Result<CartWithItems, AppError> {
    let cart = require_owned(conn, owner_id, cart_id).await?;

    #[allow(clippy::type_complexity)]
    let rows: Vec<(
        i32,
        i32,
        String,
        Option<String>,
        Option<String>,
        Decimal,
        String,
        DateTime<Utc>,
    )> = cart_items::table
        .inner_join(products::table)
        .filter(cart_items::cart_id.eq(cart.id))
        .order_by(cart_items::created_at.asc())
        .select((
            cart_items::product_id,
            cart_items::quantity,
            products::name,
            products::photo,
            products::description,
            products::current_price,
            products::status,
            products::end_date,
        ))
        .load(conn)
        .await
        .context("Failed to get cart items")?;

    let items = rows
        .into_iter()
        .map(
            |(product_id, quantity, name, photo, description, current_price, status, end_date)| {
                CartLine {
                    product_id,
                    quantity,
                    name,
                    photo,
                    description,
                    current_price,
                    status,
                    end_date,
                }
            },
        )
        .collect();

    Ok(CartWithItems { cart, items })
}

/// Adds a product to a cart. Adding a product already present leaves its quantity alone.
///
/// A cart id the caller does not own falls back to the caller's own cart, created if needed.
pub async fn add_product(
    conn: &mut AsyncPgConnection,
    owner_id: i32,
    cart_id: i32,
    product_id: i32,
    quantity: i32,
) -> Result<AddedToCart, AppError> {
    if quantity <= 0 {
        return Err(AppError::BadRequest("Quantity must be positive".into()));
    }

    conn.transaction(move |conn| {
        Box::pin(async move {
            let product: Option<i32> = products::table
                .find(product_id)
                .select(products::id)
                .first(conn)
                .await
                .optional()
                .context("Failed to get product")?;
            if product.is_none() {
                return Err(AppError::NotFound(format!(
                    "Product with id {product_id} not found"
                )));
            }

            let cart = match find_owned(conn, owner_id, cart_id).await? {
                Some(cart) => cart,
                None => get_or_create(conn, owner_id).await?.0,
            };

            let inserted = diesel::insert_into(cart_items::table)
                .values(CreateCartItemEntity {
                    cart_id: cart.id,
                    product_id,
                    quantity,
                })
                .on_conflict((cart_items::cart_id, cart_items::product_id))
                .do_nothing()
                .execute(conn)
                .await
                .context("Failed to add product to cart")?;

            Ok::<_, AppError>(AddedToCart {
                cart_id: cart.id,
                added: inserted == 1,
            })
        })
    })
    .await
}

pub async fn remove_product(
    conn: &mut AsyncPgConnection,
    owner_id: i32,
    cart_id: i32,
    product_id: i32,
) -> Result<(), AppError> {
    let cart = require_owned(conn, owner_id, cart_id).await?;

    diesel::delete(
        cart_items::table
            .filter(cart_items::cart_id.eq(cart.id))
            .filter(cart_items::product_id.eq(product_id)),
    )
    .execute(conn)
    .await
    .context("Failed to remove product from cart")?;

    Ok(())
}

pub async fn update_quantity(
    conn: &mut AsyncPgConnection,
    owner_id: i32,
    cart_id: i32,
    product_id: i32,
    quantity: i32,
) -> Result<(), AppError> {
    if quantity <= 0 {
        return Err(AppError::BadRequest("Quantity must be positive".into()));
    }

    let cart = require_owned(conn, owner_id, cart_id).await?;

    let updated = diesel::update(
        cart_items::table
            .filter(cart_items::cart_id.eq(cart.id))
            .filter(cart_items::product_id.eq(product_id)),
    )
    .set((
        cart_items::quantity.eq(quantity),
        cart_items::updated_at.eq(diesel::dsl::now),
    ))
    .execute(conn)
    .await
    .context("Failed to update cart item")?;

    if updated == 0 {
        return Err(AppError::NotFound("Product is not in the cart".into()));
    }

    Ok(())
}

/// Empties the cart. The cart itself stays so its id remains valid.
pub async fn clear(
    conn: &mut AsyncPgConnection,
    owner_id: i32,
    cart_id: i32,
) -> Result<usize, AppError> {
    let cart = require_owned(conn, owner_id, cart_id).await?;

    let removed = diesel::delete(cart_items::table.filter(cart_items::cart_id.eq(cart.id)))
        .execute(conn)
        .await
        .context("Failed to clear cart")?;

    Ok(removed)
}
