use std::collections::BTreeMap;

use anyhow::Context;
use chrono::{DateTime, Datelike, Utc};
use diesel::{ExpressionMethods, QueryDsl};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;

use crate::{app_error::AppError, schema::products};

pub const MONTH_NAMES: [&str; 12] = [
    "Ian", "Feb", "Mar", "Apr", "Mai", "Iun", "Iul", "Aug", "Sep", "Oct", "Noi", "Dec",
];

#[derive(Serialize, Debug, Clone, PartialEq, Eq, ToSchema)]
pub struct MonthRevenue {
    /// Calendar month, 1 = January
    pub month: u32,
    #[schema(value_type = String, example = "320.00")]
    pub total: Decimal,
    pub month_name: String,
}

/// Sums prices per calendar month of `created_at`, in month order.
pub fn aggregate_by_month(rows: &[(DateTime<Utc>, Decimal)]) -> Vec<MonthRevenue> {
    let mut totals: BTreeMap<u32, Decimal> = BTreeMap::new();
    for (created_at, price) in rows {
        *totals.entry(created_at.month()).or_default() += *price;
    }

    totals
        .into_iter()
        .map(|(month, total)| MonthRevenue {
            month,
            total,
            month_name: MONTH_NAMES[(month - 1) as usize].to_string(),
        })
        .collect()
}

pub async fn revenue_by_month(
    conn: &mut AsyncPgConnection,
    seller_id: i32,
) -> Result<Vec<MonthRevenue>, AppError> {
    let rows: Vec<(DateTime<Utc>, Decimal)> = products::table
        .filter(products::user_id.eq(seller_id))
        .select((products::created_at, products::current_price))
        .load(conn)
        .await
        .context("Failed to get seller revenue")?;

    Ok(aggregate_by_month(&rows))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap()
    }

    #[test]
    fn months_are_summed_and_sorted_chronologically() {
        let rows = vec![
            (at(2025, 11, 3), Decimal::new(5_000, 2)),
            (at(2025, 2, 14), Decimal::new(10_000, 2)),
            (at(2025, 11, 20), Decimal::new(2_550, 2)),
        ];

        let report = aggregate_by_month(&rows);

        assert_eq!(
            report,
            vec![
                MonthRevenue {
                    month: 2,
                    total: Decimal::new(10_000, 2),
                    month_name: "Feb".into(),
                },
                MonthRevenue {
                    month: 11,
                    total: Decimal::new(7_550, 2),
                    month_name: "Noi".into(),
                },
            ]
        );
    }

    #[test]
    fn same_month_of_different_years_is_merged() {
        let rows = vec![
            (at(2024, 5, 1), Decimal::ONE),
            (at(2025, 5, 1), Decimal::ONE),
        ];
        let report = aggregate_by_month(&rows);
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].month_name, "Mai");
        assert_eq!(report[0].total, Decimal::TWO);
    }

    #[test]
    fn no_products_means_empty_report() {
        assert!(aggregate_by_month(&[]).is_empty());
    }
}
