//! Product listings, their offer window, and the views buyers and sellers see.

use std::collections::HashMap;

use anyhow::Context;
use chrono::{DateTime, Utc};
use diesel::{
    BoolExpressionMethods, ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper,
    pg::Pg,
};
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::{
    app_error::AppError,
    models::{CreateProductEntity, ProductEntity, ProductListing, ProductStatus, UpdateProductEntity},
    schema::{order_items, products, users},
    services::check_amount,
};

/// The filtered listings exposed over the catalog. Each one is a predicate set over `products`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductView {
    /// Everything still for sale.
    All,
    /// One seller's products still for sale.
    BySeller(i32),
    /// The seller's products that closed and were paid for.
    Sold { seller_id: i32 },
    /// Closed windows still active where the caller holds the last offer.
    Offers { holder_id: i32 },
    /// The seller's closed windows that never turned into a sale.
    FinishedOffers { seller_id: i32 },
    /// What the caller has bought.
    Purchased { buyer_id: i32 },
}

pub fn view_query(view: ProductView, now: DateTime<Utc>) -> products::BoxedQuery<'static, Pg> {
    let query = products::table.order_by(products::id.asc()).into_boxed();
    let window_closed = products::end_date.lt(now).and(products::start_date.lt(now));

    match view {
        ProductView::All => query.filter(products::status.eq(ProductStatus::Active.as_str())),
        ProductView::BySeller(seller_id) => query
            .filter(products::user_id.eq(seller_id))
            .filter(products::status.eq(ProductStatus::Active.as_str())),
        ProductView::Sold { seller_id } => query
            .filter(products::user_id.eq(seller_id))
            .filter(window_closed)
            .filter(products::status.eq(ProductStatus::Paid.as_str())),
        ProductView::Offers { holder_id } => query
            .filter(products::current_user_id.eq(holder_id))
            .filter(window_closed)
            .filter(products::status.eq(ProductStatus::Active.as_str())),
        ProductView::FinishedOffers { seller_id } => query
            .filter(products::user_id.eq(seller_id))
            .filter(window_closed)
            .filter(products::status.ne(ProductStatus::Paid.as_str())),
        ProductView::Purchased { buyer_id } => query
            .filter(products::current_user_id.eq(buyer_id))
            .filter(products::status.eq(ProductStatus::Paid.as_str())),
    }
}

/// Loads a view and attaches the name of each product's current holder.
pub async fn list(
    conn: &mut AsyncPgConnection,
    view: ProductView,
) -> Result<Vec<ProductListing>, AppError> {
    let products: Vec<ProductEntity> = view_query(view, Utc::now())
        .load(conn)
        .await
        .context("Failed to list products")?;

    let mut holder_ids: Vec<i32> = products
        .iter()
        .filter_map(|product| product.current_user_id)
        .collect();
    holder_ids.sort_unstable();
    holder_ids.dedup();

    let names: HashMap<i32, String> = if holder_ids.is_empty() {
        HashMap::new()
    } else {
        users::table
            .filter(users::id.eq_any(&holder_ids))
            .select((users::id, users::name))
            .load::<(i32, String)>(conn)
            .await
            .context("Failed to get product holders")?
            .into_iter()
            .collect()
    };

    Ok(products
        .into_iter()
        .map(|product| ProductListing {
            current_user_name: product
                .current_user_id
                .and_then(|id| names.get(&id).cloned()),
            product,
        })
        .collect())
}

pub async fn get_product(
    conn: &mut AsyncPgConnection,
    product_id: i32,
) -> Result<ProductEntity, AppError> {
    products::table
        .find(product_id)
        .select(ProductEntity::as_select())
        .first(conn)
        .await
        .optional()
        .context("Failed to get product")?
        .ok_or_else(|| AppError::NotFound("Product not found".into()))
}

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub initial_price: Decimal,
    pub description: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub photo: String,
}

fn check_listing(
    name: &str,
    initial_price: Decimal,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
) -> Result<(), AppError> {
    if name.trim().is_empty() {
        return Err(AppError::BadRequest("Name is required".into()));
    }
    if initial_price <= Decimal::ZERO {
        return Err(AppError::BadRequest("Initial price must be positive".into()));
    }
    check_amount("initial_price", initial_price)?;
    if start_date >= end_date {
        return Err(AppError::BadRequest(
            "start_date must be before end_date".into(),
        ));
    }
    Ok(())
}

pub async fn create_product(
    conn: &mut AsyncPgConnection,
    seller_id: i32,
    new: NewProduct,
) -> Result<ProductEntity, AppError> {
    check_listing(&new.name, new.initial_price, new.start_date, new.end_date)?;

    let product = diesel::insert_into(products::table)
        .values(CreateProductEntity {
            name: new.name,
            photo: Some(new.photo),
            initial_price: new.initial_price,
            current_price: new.initial_price,
            description: new.description,
            user_id: seller_id,
            status: ProductStatus::Active.as_str().to_string(),
            start_date: new.start_date,
            end_date: new.end_date,
        })
        .returning(ProductEntity::as_returning())
        .get_result(conn)
        .await
        .context("Failed to create product")?;

    info!("Product #{} listed by user #{}", product.id, seller_id);

    Ok(product)
}

#[derive(Debug, Clone, Default)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub initial_price: Option<Decimal>,
    pub description: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub photo: Option<String>,
}

/// Builds the changeset for a patch. A raised floor drags the current price up with it.
fn merge_patch(current: &ProductEntity, patch: ProductPatch) -> Result<UpdateProductEntity, AppError> {
    let name = patch.name.clone().unwrap_or_else(|| current.name.clone());
    let initial_price = patch.initial_price.unwrap_or(current.initial_price);
    let start_date = patch.start_date.unwrap_or(current.start_date);
    let end_date = patch.end_date.unwrap_or(current.end_date);
    check_listing(&name, initial_price, start_date, end_date)?;

    Ok(UpdateProductEntity {
        name: patch.name,
        photo: patch.photo,
        initial_price: patch.initial_price,
        current_price: (initial_price > current.current_price).then_some(initial_price),
        description: patch.description,
        start_date: patch.start_date,
        end_date: patch.end_date,
    })
}

/// Updates a seller's own product. Returns the updated row and the photo it replaced, if any.
pub async fn update_product(
    conn: &mut AsyncPgConnection,
    seller_id: i32,
    product_id: i32,
    patch: ProductPatch,
) -> Result<(ProductEntity, Option<String>), AppError> {
    conn.transaction(move |conn| {
        Box::pin(async move {
            let current: ProductEntity = products::table
                .filter(products::id.eq(product_id))
                .filter(products::user_id.eq(seller_id))
                .select(ProductEntity::as_select())
                .for_update()
                .first(conn)
                .await
                .optional()
                .context("Failed to get product")?
                .ok_or_else(|| AppError::NotFound("Product not found".into()))?;

            let replaced_photo = patch.photo.as_ref().and(current.photo.clone());
            let changes = merge_patch(&current, patch)?;

            let updated = diesel::update(products::table.find(product_id))
                .set((&changes, products::updated_at.eq(diesel::dsl::now)))
                .returning(ProductEntity::as_returning())
                .get_result(conn)
                .await
                .context("Failed to update product")?;

            Ok::<_, AppError>((updated, replaced_photo))
        })
    })
    .await
}

/// Rejects an offer the product cannot accept right now.
pub fn check_offer(
    product: &ProductEntity,
    bidder_id: i32,
    new_price: Decimal,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    if product.status != ProductStatus::Active.as_str() {
        return Err(AppError::BadRequest("Product is not for sale".into()));
    }
    if now < product.start_date || now > product.end_date {
        return Err(AppError::BadRequest("Offer window is closed".into()));
    }
    if product.user_id == bidder_id {
        return Err(AppError::BadRequest(
            "Sellers cannot bid on their own products".into(),
        ));
    }
    check_amount("new_price", new_price)?;
    if new_price <= product.current_price {
        return Err(AppError::BadRequest(format!(
            "New price must exceed the current price of {}",
            product.current_price
        )));
    }
    Ok(())
}

/// Raises the price and makes the bidder the current holder.
///
/// The write only lands while the product is active and still priced below the offer,
/// so a concurrent higher offer or a sale turns this one into a conflict.
pub async fn increase_price(
    conn: &mut AsyncPgConnection,
    bidder_id: i32,
    product_id: i32,
    new_price: Decimal,
) -> Result<ProductEntity, AppError> {
    let product = get_product(conn, product_id).await?;
    check_offer(&product, bidder_id, new_price, Utc::now())?;

    apply_offer(conn, bidder_id, product_id, new_price).await
}

/// Writes an already validated offer. Lands only while the product is active and priced below it.
pub async fn apply_offer(
    conn: &mut AsyncPgConnection,
    bidder_id: i32,
    product_id: i32,
    new_price: Decimal,
) -> Result<ProductEntity, AppError> {
    let updated: Option<ProductEntity> = diesel::update(
        products::table
            .filter(products::id.eq(product_id))
            .filter(products::status.eq(ProductStatus::Active.as_str()))
            .filter(products::current_price.lt(new_price)),
    )
    .set((
        products::current_price.eq(new_price),
        products::current_user_id.eq(bidder_id),
        products::updated_at.eq(diesel::dsl::now),
    ))
    .returning(ProductEntity::as_returning())
    .get_result(conn)
    .await
    .optional()
    .context("Failed to update product price")?;

    match updated {
        Some(product) => {
            info!(
                "User #{} raised product #{} to {}",
                bidder_id, product.id, product.current_price
            );
            Ok(product)
        }
        None => {
            warn!(
                "Offer of {} on product #{} by user #{} lost the race",
                new_price, product_id, bidder_id
            );
            Err(AppError::Conflict(
                "Product price changed or product is no longer for sale".into(),
            ))
        }
    }
}

/// Deletes a seller's own product unless an order already references it.
pub async fn delete_product(
    conn: &mut AsyncPgConnection,
    seller_id: i32,
    product_id: i32,
) -> Result<ProductEntity, AppError> {
    conn.transaction(move |conn| {
        Box::pin(async move {
            let owned: Option<i32> = products::table
                .filter(products::id.eq(product_id))
                .filter(products::user_id.eq(seller_id))
                .select(products::id)
                .for_update()
                .first(conn)
                .await
                .optional()
                .context("Failed to get product")?;

            if owned.is_none() {
                return Err(AppError::NotFound("Product not found".into()));
            }

            let ordered: i64 = order_items::table
                .filter(order_items::product_id.eq(product_id))
                .count()
                .get_result(conn)
                .await
                .context("Failed to check product orders")?;

            if ordered > 0 {
                return Err(AppError::Conflict(
                    "Product is part of an order and cannot be deleted".into(),
                ));
            }

            let deleted = diesel::delete(products::table.find(product_id))
                .returning(ProductEntity::as_returning())
                .get_result(conn)
                .await
                .context("Failed to delete product")?;

            info!("Product #{} deleted by user #{}", product_id, seller_id);

            Ok::<ProductEntity, AppError>(deleted)
        })
    })
    .await
}
