//! Order placement: turns requested line items into a priced order whose item
//! prices are frozen at creation time.

use std::collections::{BTreeSet, HashMap};

use anyhow::Context;
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper};
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use crate::{
    app_error::AppError,
    models::{
        CreateOrderEntity, CreateOrderItemEntity, OrderEntity, OrderItemEntity, ProductStatus,
        UpdateOrderStatusEntity,
    },
    schema::{order_items, orders, products},
    services::{Caller, MAX_AMOUNT, check_amount},
};

#[derive(Debug, Clone)]
pub struct ShippingAddress {
    pub country: String,
    pub city: String,
    pub street: String,
    pub house_number: String,
    pub apartment_number: String,
    pub floor: String,
    pub postal_code: String,
    pub phone: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
pub struct LineItem {
    pub product_id: i32,
    pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedLine {
    pub product_id: i32,
    pub quantity: i32,
    pub price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedOrder {
    pub lines: Vec<PricedLine>,
    pub total: Decimal,
}

/// Rejects an empty order and non-positive quantities before anything is read.
pub fn validate_lines(lines: &[LineItem]) -> Result<(), AppError> {
    if lines.is_empty() {
        return Err(AppError::BadRequest("Missing fields or items".into()));
    }
    if let Some(line) = lines.iter().find(|line| line.quantity <= 0) {
        return Err(AppError::BadRequest(format!(
            "Quantity for product {} must be positive",
            line.product_id
        )));
    }
    Ok(())
}

/// Prices every line at the resolved current price. The first unknown product fails the whole order,
/// and so does a total the order row cannot store.
pub fn price_lines(
    lines: &[LineItem],
    prices: &HashMap<i32, Decimal>,
) -> Result<PricedOrder, AppError> {
    let mut total = Decimal::ZERO;
    let mut priced = Vec::with_capacity(lines.len());

    for line in lines {
        let price = *prices.get(&line.product_id).ok_or_else(|| {
            AppError::NotFound(format!("Product with id {} not found", line.product_id))
        })?;
        total = Decimal::from(line.quantity)
            .checked_mul(price)
            .and_then(|subtotal| total.checked_add(subtotal))
            .ok_or_else(|| AppError::BadRequest(format!("total cannot exceed {MAX_AMOUNT}")))?;
        priced.push(PricedLine {
            product_id: line.product_id,
            quantity: line.quantity,
            price,
        });
    }

    check_amount("total", total)?;

    Ok(PricedOrder {
        lines: priced,
        total,
    })
}

#[derive(Serialize, Debug, ToSchema)]
pub struct OrderWithItems {
    pub order: OrderEntity,
    pub items: Vec<OrderItemEntity>,
}

/// Places an order atomically: either the order and all of its items exist, or nothing does.
pub async fn create_order(
    conn: &mut AsyncPgConnection,
    buyer_id: i32,
    address: ShippingAddress,
    lines: Vec<LineItem>,
) -> Result<OrderWithItems, AppError> {
    validate_lines(&lines)?;

    let created = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let product_ids: Vec<i32> = lines
                    .iter()
                    .map(|line| line.product_id)
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect();

                // Row locks keep a concurrent re-price from slipping between read and snapshot.
                let found: Vec<(i32, Decimal, String)> = products::table
                    .filter(products::id.eq_any(&product_ids))
                    .select((products::id, products::current_price, products::status))
                    .for_share()
                    .load(conn)
                    .await
                    .context("Failed to get product prices")?;

                let prices: HashMap<i32, Decimal> = found
                    .iter()
                    .map(|(id, price, _)| (*id, *price))
                    .collect();
                let priced = price_lines(&lines, &prices)?;

                if let Some((id, _, _)) = found
                    .iter()
                    .find(|(_, _, status)| status != ProductStatus::Active.as_str())
                {
                    return Err(AppError::Conflict(format!(
                        "Product with id {id} is no longer available"
                    )));
                }

                let order: OrderEntity = diesel::insert_into(orders::table)
                    .values(CreateOrderEntity {
                        user_id: buyer_id,
                        country: address.country,
                        city: address.city,
                        street: address.street,
                        house_number: address.house_number,
                        apartment_number: address.apartment_number,
                        floor: address.floor,
                        postal_code: address.postal_code,
                        phone: address.phone,
                        total: priced.total,
                        is_paid: false,
                        is_delivered: false,
                    })
                    .returning(OrderEntity::as_returning())
                    .get_result(conn)
                    .await
                    .context("Failed to create order")?;

                let new_items: Vec<CreateOrderItemEntity> = priced
                    .lines
                    .into_iter()
                    .map(|line| CreateOrderItemEntity {
                        order_id: order.id,
                        product_id: line.product_id,
                        quantity: line.quantity,
                        price: line.price,
                    })
                    .collect();

                let items: Vec<OrderItemEntity> = diesel::insert_into(order_items::table)
                    .values(&new_items)
                    .returning(OrderItemEntity::as_returning())
                    .get_results(conn)
                    .await
                    .context("Failed to create order items")?;

                Ok::<OrderWithItems, AppError>(OrderWithItems { order, items })
            })
        })
        .await?;

    info!(
        "Order #{} placed by user #{} for {}",
        created.order.id, buyer_id, created.order.total
    );

    Ok(created)
}

/// A product line of an order, with the price captured when the order was placed.
#[derive(Serialize, Debug, Clone, ToSchema)]
pub struct OrderLineView {
    pub product_id: i32,
    pub name: String,
    pub photo: Option<String>,
    pub description: Option<String>,
    pub quantity: i32,
    #[schema(value_type = String, example = "100.00")]
    pub price: Decimal,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct OrderSummary {
    pub order: OrderEntity,
    pub products: Vec<OrderLineView>,
}

/// Loads the product lines of many orders in one query, grouped by order id.
pub async fn load_lines(
    conn: &mut AsyncPgConnection,
    order_ids: &[i32],
    holder_id: Option<i32>,
) -> Result<HashMap<i32, Vec<OrderLineView>>, AppError> {
    let mut query = order_items::table
        .inner_join(products::table)
        .filter(order_items::order_id.eq_any(order_ids))
        .select((
            order_items::order_id,
            products::id,
            products::name,
            products::photo,
            products::description,
            order_items::quantity,
            order_items::price,
        ))
        .order_by(order_items::id.asc())
        .into_boxed();

    if let Some(holder_id) = holder_id {
        query = query.filter(products::current_user_id.eq(holder_id));
    }

    #[allow(clippy::type_complexity)]
    let rows: Vec<(i32, i32, String, Option<String>, Option<String>, i32, Decimal)> = query
        .load(conn)
        .await
        .context("Failed to get order items")?;

    let mut group: HashMap<i32, Vec<OrderLineView>> = HashMap::new();
    for (order_id, product_id, name, photo, description, quantity, price) in rows {
        group.entry(order_id).or_default().push(OrderLineView {
            product_id,
            name,
            photo,
            description,
            quantity,
            price,
        });
    }

    Ok(group)
}

/// Every order placed by the buyer, newest first, with its product lines.
pub async fn list_orders(
    conn: &mut AsyncPgConnection,
    buyer_id: i32,
) -> Result<Vec<OrderSummary>, AppError> {
    let orders: Vec<OrderEntity> = orders::table
        .filter(orders::user_id.eq(buyer_id))
        .order_by(orders::created_at.desc())
        .select(OrderEntity::as_select())
        .get_results(conn)
        .await
        .context("Failed to get orders")?;

    let order_ids: Vec<i32> = orders.iter().map(|order| order.id).collect();
    let mut group = load_lines(conn, &order_ids, None).await?;

    Ok(orders
        .into_iter()
        .map(|order| OrderSummary {
            products: group.remove(&order.id).unwrap_or_default(),
            order,
        })
        .collect())
}

async fn find_accessible(
    conn: &mut AsyncPgConnection,
    order_id: i32,
    caller: Caller,
) -> Result<OrderEntity, AppError> {
    let order: Option<OrderEntity> = orders::table
        .find(order_id)
        .select(OrderEntity::as_select())
        .first(conn)
        .await
        .optional()
        .context("Failed to get order")?;

    // Someone else's order is reported as absent.
    order
        .filter(|order| caller.can_access(order.user_id))
        .ok_or_else(|| AppError::NotFound("Order not found".into()))
}

pub async fn get_order(
    conn: &mut AsyncPgConnection,
    order_id: i32,
    caller: Caller,
) -> Result<OrderWithItems, AppError> {
    let order = find_accessible(conn, order_id, caller).await?;

    let items: Vec<OrderItemEntity> = order_items::table
        .filter(order_items::order_id.eq(order.id))
        .order_by(order_items::id.asc())
        .select(OrderItemEntity::as_select())
        .get_results(conn)
        .await
        .context("Failed to get order items")?;

    Ok(OrderWithItems { order, items })
}

pub async fn update_status(
    conn: &mut AsyncPgConnection,
    order_id: i32,
    caller: Caller,
    patch: UpdateOrderStatusEntity,
) -> Result<OrderEntity, AppError> {
    if patch.is_paid.is_none() && patch.is_delivered.is_none() {
        return Err(AppError::BadRequest(
            "Provide is_paid and/or is_delivered".into(),
        ));
    }

    find_accessible(conn, order_id, caller).await?;

    let order = diesel::update(orders::table.find(order_id))
        .set((&patch, orders::updated_at.eq(diesel::dsl::now)))
        .returning(OrderEntity::as_returning())
        .get_result(conn)
        .await
        .context("Failed to update order status")?;

    info!(
        "Order #{} status updated (paid: {}, delivered: {})",
        order.id, order.is_paid, order.is_delivered
    );

    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prices(pairs: &[(i32, i64)]) -> HashMap<i32, Decimal> {
        pairs
            .iter()
            .map(|(id, cents)| (*id, Decimal::new(*cents, 2)))
            .collect()
    }

    fn line(product_id: i32, quantity: i32) -> LineItem {
        LineItem {
            product_id,
            quantity,
        }
    }

    #[test]
    fn total_is_sum_of_price_times_quantity() {
        let priced = price_lines(
            &[line(1, 2), line(2, 3)],
            &prices(&[(1, 10_000), (2, 1_999)]),
        )
        .unwrap();

        // 2 x 100.00 + 3 x 19.99
        assert_eq!(priced.total, Decimal::new(25_997, 2));
        assert_eq!(priced.total.to_string(), "259.97");
        assert_eq!(priced.lines[1].price, Decimal::new(1_999, 2));
    }

    #[test]
    fn fixed_point_sums_do_not_drift() {
        let lines: Vec<LineItem> = (1..=10).map(|id| line(id, 1)).collect();
        let table: Vec<(i32, i64)> = (1..=10).map(|id| (id, 10)).collect();

        // Ten lines of 0.10 is exactly 1.00, unlike binary floating point.
        let priced = price_lines(&lines, &prices(&table)).unwrap();
        assert_eq!(priced.total, Decimal::ONE);
    }

    #[test]
    fn repeated_product_lines_are_priced_independently() {
        let priced = price_lines(&[line(5, 1), line(5, 2)], &prices(&[(5, 250)])).unwrap();
        assert_eq!(priced.lines.len(), 2);
        assert_eq!(priced.total, Decimal::new(750, 2));
    }

    #[test]
    fn unknown_product_names_the_offending_id() {
        let err = price_lines(&[line(1, 1), line(99, 1)], &prices(&[(1, 100)])).unwrap_err();
        assert!(matches!(err, AppError::NotFound(msg) if msg == "Product with id 99 not found"));
    }

    #[test]
    fn totals_beyond_the_money_column_are_a_bad_request() {
        let err = price_lines(&[line(1, 1_000_000)], &prices(&[(1, 10_000)])).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(msg) if msg.starts_with("total")));

        let at_limit = price_lines(&[line(1, 1)], &HashMap::from([(1, MAX_AMOUNT)])).unwrap();
        assert_eq!(at_limit.total, MAX_AMOUNT);
    }

    #[test]
    fn empty_orders_and_non_positive_quantities_are_rejected() {
        assert!(matches!(
            validate_lines(&[]),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            validate_lines(&[line(1, 0)]),
            Err(AppError::BadRequest(_))
        ));
        assert!(validate_lines(&[line(1, 1)]).is_ok());
    }
}
