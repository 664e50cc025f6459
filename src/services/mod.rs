//! Database-backed workflows. Every function takes a connection so callers decide
//! whether it runs on a pooled connection or inside an enclosing transaction.

use rust_decimal::Decimal;

use crate::app_error::AppError;

pub mod carts;
pub mod orders;
pub mod payments;
pub mod products;
pub mod reports;
pub mod users;

/// Largest amount a `NUMERIC(10,2)` money column can hold.
/// 99_999_999.99, i.e. mantissa 9_999_999_999 (= 2 * 2^32 + 0x540B_E3FF) at scale 2.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(0x540B_E3FF, 2, 0, false, 2);

/// Rejects amounts the money columns would round or refuse.
pub fn check_amount(field: &str, amount: Decimal) -> Result<(), AppError> {
    if amount.normalize().scale() > 2 {
        return Err(AppError::BadRequest(format!(
            "{field} has at most two decimals"
        )));
    }
    if amount > MAX_AMOUNT {
        return Err(AppError::BadRequest(format!(
            "{field} cannot exceed {MAX_AMOUNT}"
        )));
    }
    Ok(())
}

/// The authenticated caller plus whether they may cross ownership boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub id: i32,
    pub is_admin: bool,
}

impl Caller {
    pub const fn can_access(self, owner_id: i32) -> bool {
        self.is_admin || self.id == owner_id
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{Caller, MAX_AMOUNT, check_amount};
    use crate::app_error::AppError;

    #[test]
    fn owners_and_admins_can_access() {
        let buyer = Caller {
            id: 3,
            is_admin: false,
        };
        let admin = Caller {
            id: 9,
            is_admin: true,
        };
        assert!(buyer.can_access(3));
        assert!(!buyer.can_access(4));
        assert!(admin.can_access(4));
    }

    #[test]
    fn amounts_must_fit_the_money_columns() {
        assert!(check_amount("price", Decimal::new(12_000, 2)).is_ok());
        assert!(check_amount("price", Decimal::new(1_200_000, 4)).is_ok());
        assert!(check_amount("price", MAX_AMOUNT).is_ok());

        assert!(matches!(
            check_amount("new_price", Decimal::new(120_001, 3)),
            Err(AppError::BadRequest(msg)) if msg == "new_price has at most two decimals"
        ));
        assert!(matches!(
            check_amount("total", MAX_AMOUNT + Decimal::new(1, 2)),
            Err(AppError::BadRequest(msg)) if msg == "total cannot exceed 99999999.99"
        ));
    }
}
