use std::str::FromStr;

use chrono::{DateTime, Utc};
use diesel::{
    Selectable,
    prelude::{AsChangeset, Identifiable, Insertable, Queryable},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

// Users

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = crate::schema::users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UserEntity {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub phone: String,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The user as shown to clients. Never carries the password hash.
#[derive(Serialize, Debug, Clone, ToSchema)]
pub struct PublicUser {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<UserEntity> for PublicUser {
    fn from(user: UserEntity) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            phone: user.phone,
            last_login: user.last_login,
            created_at: user.created_at,
        }
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::users)]
pub struct CreateUserEntity {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub phone: String,
}

/// Authorization tags assigned at registration, keyed by `rights.right_code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Right {
    Customer,
    Seller,
    Admin,
}

impl Right {
    pub const fn code(self) -> i32 {
        match self {
            Self::Customer => 1,
            Self::Seller => 2,
            Self::Admin => 3,
        }
    }

    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::Customer),
            2 => Some(Self::Seller),
            3 => Some(Self::Admin),
            _ => None,
        }
    }
}

// Products

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    Active,
    Inactive,
    Paid,
}

impl ProductStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Paid => "paid",
        }
    }
}

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::products)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ProductEntity {
    pub id: i32,
    pub name: String,
    pub photo: Option<String>,
    #[schema(value_type = String, example = "100.00")]
    pub initial_price: Decimal,
    #[schema(value_type = String, example = "120.00")]
    pub current_price: Decimal,
    pub description: Option<String>,
    pub user_id: i32,
    pub status: String,
    pub current_user_id: Option<i32>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A product listing together with the name of whoever holds the current offer.
#[derive(Serialize, Debug, ToSchema)]
pub struct ProductListing {
    #[serde(flatten)]
    pub product: ProductEntity,
    pub current_user_name: Option<String>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::products)]
pub struct CreateProductEntity {
    pub name: String,
    pub photo: Option<String>,
    pub initial_price: Decimal,
    pub current_price: Decimal,
    pub description: Option<String>,
    pub user_id: i32,
    pub status: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

#[derive(AsChangeset, Debug, Default)]
#[diesel(table_name = crate::schema::products)]
pub struct UpdateProductEntity {
    pub name: Option<String>,
    pub photo: Option<String>,
    pub initial_price: Option<Decimal>,
    pub current_price: Option<Decimal>,
    pub description: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

// Carts

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::shopping_carts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CartEntity {
    pub id: i32,
    pub user_id: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Deserialize, Debug)]
#[diesel(table_name = crate::schema::shopping_carts)]
pub struct CreateCartEntity {
    pub user_id: i32,
}

#[derive(Insertable, Deserialize, Debug)]
#[diesel(table_name = crate::schema::cart_items)]
pub struct CreateCartItemEntity {
    pub cart_id: i32,
    pub product_id: i32,
    pub quantity: i32,
}

// Orders

#[derive(Queryable, Serialize, Selectable, Identifiable, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::orders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderEntity {
    pub id: i32,
    pub user_id: i32,
    pub country: String,
    pub city: String,
    pub street: String,
    pub house_number: String,
    pub apartment_number: String,
    pub floor: String,
    pub postal_code: String,
    pub phone: String,
    #[schema(value_type = String, example = "200.00")]
    pub total: Decimal,
    pub is_paid: bool,
    pub is_delivered: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::orders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CreateOrderEntity {
    pub user_id: i32,
    pub country: String,
    pub city: String,
    pub street: String,
    pub house_number: String,
    pub apartment_number: String,
    pub floor: String,
    pub postal_code: String,
    pub phone: String,
    pub total: Decimal,
    pub is_paid: bool,
    pub is_delivered: bool,
}

#[derive(AsChangeset, Deserialize, Debug, Default, ToSchema)]
#[diesel(table_name = crate::schema::orders)]
pub struct UpdateOrderStatusEntity {
    pub is_paid: Option<bool>,
    pub is_delivered: Option<bool>,
}

#[derive(Queryable, Serialize, Selectable, Identifiable, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::order_items)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderItemEntity {
    pub id: i32,
    pub order_id: i32,
    pub product_id: i32,
    pub quantity: i32,
    #[schema(value_type = String, example = "100.00")]
    pub price: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::order_items)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CreateOrderItemEntity {
    pub order_id: i32,
    pub product_id: i32,
    pub quantity: i32,
    pub price: Decimal,
}

// Payments

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Card,
}

impl PaymentMethod {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::Card => "card",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cash" => Ok(Self::Cash),
            "card" => Ok(Self::Card),
            other => Err(format!("{other} is not a valid payment method")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

impl PaymentStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

#[derive(Queryable, Serialize, Selectable, Identifiable, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::payments)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PaymentEntity {
    pub id: Uuid,
    pub order_id: i32,
    pub payment_method: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Serialize, Deserialize, Debug)]
#[diesel(table_name = crate::schema::payments)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CreatePaymentEntity {
    pub order_id: i32,
    pub payment_method: String,
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_method_rejects_unknown_values() {
        assert_eq!("card".parse::<PaymentMethod>(), Ok(PaymentMethod::Card));
        assert_eq!("cash".parse::<PaymentMethod>(), Ok(PaymentMethod::Cash));
        assert!("crypto".parse::<PaymentMethod>().is_err());
    }

    #[test]
    fn right_codes_match_the_seeded_rights_table() {
        assert_eq!(Right::Customer.code(), 1);
        assert_eq!(Right::Seller.code(), 2);
        assert_eq!(Right::Admin.code(), 3);
        assert_eq!(Right::from_code(2), Some(Right::Seller));
        assert_eq!(Right::from_code(9), None);
    }

    #[test]
    fn public_user_drops_the_password_hash() {
        let now = Utc::now();
        let user = UserEntity {
            id: 7,
            name: "Ana".into(),
            email: "ana@example.com".into(),
            password_hash: "$argon2id$secret".into(),
            phone: "0712345678".into(),
            last_login: None,
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_value(PublicUser::from(user)).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["email"], "ana@example.com");
    }
}
