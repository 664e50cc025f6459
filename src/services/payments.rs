//! Checkout: recording a payment settles the order and sells every product on it.

use std::collections::HashMap;

use anyhow::Context;
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper};
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    app_error::AppError,
    models::{
        CreatePaymentEntity, OrderEntity, PaymentEntity, PaymentMethod, PaymentStatus,
        ProductEntity, ProductStatus,
    },
    schema::{order_items, orders, payments, products},
    services::orders::{OrderLineView, load_lines},
};

#[derive(Serialize, Debug, ToSchema)]
pub struct PaymentReceipt {
    pub id: Uuid,
    pub order_id: i32,
    pub payment_method: PaymentMethod,
    pub sold_product_ids: Vec<i32>,
}

/// Records a completed payment and applies its effects in one transaction.
///
/// The order flips `is_paid` only from `false`, and each product flips to `paid`
/// only from `active`. If either guard finds a row already moved on, nothing is kept.
pub async fn create_payment(
    conn: &mut AsyncPgConnection,
    buyer_id: i32,
    order_id: i32,
    method: PaymentMethod,
) -> Result<PaymentReceipt, AppError> {
    let receipt = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let order: Option<OrderEntity> = orders::table
                    .filter(orders::id.eq(order_id))
                    .filter(orders::user_id.eq(buyer_id))
                    .select(OrderEntity::as_select())
                    .for_update()
                    .first(conn)
                    .await
                    .optional()
                    .context("Failed to get order")?;

                let Some(order) = order else {
                    return Err(AppError::NotFound("Order not found".into()));
                };
                if order.is_paid {
                    return Err(AppError::Conflict(format!(
                        "Order #{} is already paid",
                        order.id
                    )));
                }

                let payment: PaymentEntity = diesel::insert_into(payments::table)
                    .values(CreatePaymentEntity {
                        order_id: order.id,
                        payment_method: method.as_str().to_string(),
                        status: PaymentStatus::Completed.as_str().to_string(),
                    })
                    .returning(PaymentEntity::as_returning())
                    .get_result(conn)
                    .await
                    .context("Failed to create payment")?;

                let flipped = diesel::update(
                    orders::table
                        .filter(orders::id.eq(order.id))
                        .filter(orders::is_paid.eq(false)),
                )
                .set((orders::is_paid.eq(true), orders::updated_at.eq(diesel::dsl::now)))
                .execute(conn)
                .await
                .context("Failed to mark order as paid")?;

                if flipped != 1 {
                    return Err(AppError::Conflict(format!(
                        "Order #{} is already paid",
                        order.id
                    )));
                }

                let mut ordered_ids: Vec<i32> = order_items::table
                    .filter(order_items::order_id.eq(order.id))
                    .select(order_items::product_id)
                    .distinct()
                    .load(conn)
                    .await
                    .context("Failed to get order items")?;
                ordered_ids.sort_unstable();

                let mut sold_ids: Vec<i32> = diesel::update(
                    products::table
                        .filter(products::id.eq_any(&ordered_ids))
                        .filter(products::status.eq(ProductStatus::Active.as_str())),
                )
                .set((
                    products::status.eq(ProductStatus::Paid.as_str()),
                    products::current_user_id.eq(buyer_id),
                    products::updated_at.eq(diesel::dsl::now),
                ))
                .returning(products::id)
                .get_results(conn)
                .await
                .context("Failed to mark products as paid")?;
                sold_ids.sort_unstable();

                if sold_ids != ordered_ids {
                    let unavailable: Vec<String> = ordered_ids
                        .iter()
                        .filter(|id| sold_ids.binary_search(id).is_err())
                        .map(ToString::to_string)
                        .collect();
                    warn!(
                        "Payment for order #{} rejected, products no longer for sale: {}",
                        order.id,
                        unavailable.join(", ")
                    );
                    return Err(AppError::Conflict(format!(
                        "Products no longer available: {}",
                        unavailable.join(", ")
                    )));
                }

                Ok::<PaymentReceipt, AppError>(PaymentReceipt {
                    id: payment.id,
                    order_id: order.id,
                    payment_method: method,
                    sold_product_ids: sold_ids,
                })
            })
        })
        .await?;

    info!(
        "Payment {} recorded for order #{} ({} products sold)",
        receipt.id,
        receipt.order_id,
        receipt.sold_product_ids.len()
    );

    Ok(receipt)
}

#[derive(Serialize, Debug, Clone, ToSchema)]
pub struct PaidOrderSummary {
    pub id: i32,
    #[schema(value_type = String, example = "200.00")]
    pub total: Decimal,
    pub is_paid: bool,
    pub is_delivered: bool,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct CustomerPayment {
    pub payment: PaymentEntity,
    pub order: PaidOrderSummary,
    pub products: Vec<OrderLineView>,
}

/// The buyer's payments, each with its order and the products the buyer now holds.
pub async fn list_customer_payments(
    conn: &mut AsyncPgConnection,
    buyer_id: i32,
) -> Result<Vec<CustomerPayment>, AppError> {
    let rows: Vec<(PaymentEntity, (i32, Decimal, bool, bool))> = payments::table
        .inner_join(orders::table)
        .filter(orders::user_id.eq(buyer_id))
        .order_by(payments::created_at.desc())
        .select((
            PaymentEntity::as_select(),
            (
                orders::id,
                orders::total,
                orders::is_paid,
                orders::is_delivered,
            ),
        ))
        .load(conn)
        .await
        .context("Failed to get payments")?;

    let order_ids: Vec<i32> = rows.iter().map(|(payment, _)| payment.order_id).collect();
    let group: HashMap<i32, Vec<OrderLineView>> =
        load_lines(conn, &order_ids, Some(buyer_id)).await?;

    Ok(rows
        .into_iter()
        .map(|(payment, (id, total, is_paid, is_delivered))| CustomerPayment {
            products: group.get(&payment.order_id).cloned().unwrap_or_default(),
            order: PaidOrderSummary {
                id,
                total,
                is_paid,
                is_delivered,
            },
            payment,
        })
        .collect())
}

/// Every product the seller has listed, whatever its sale state.
pub async fn list_seller_products(
    conn: &mut AsyncPgConnection,
    seller_id: i32,
) -> Result<Vec<ProductEntity>, AppError> {
    let products = products::table
        .filter(products::user_id.eq(seller_id))
        .order_by(products::created_at.desc())
        .select(ProductEntity::as_select())
        .get_results(conn)
        .await
        .context("Failed to get seller products")?;

    Ok(products)
}
