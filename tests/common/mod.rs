//! Shared fixtures for the integration tests.
//!
//! Database tests need a disposable `PostgreSQL` database:
//! `TEST_DATABASE_URL=postgres://... cargo test`. Without it they are skipped.

#![allow(dead_code)]

use std::sync::Once;

use chrono::{Duration, Utc};
use consignment_backend::{
    app_state::AppState,
    config,
    db,
    models::{CreateProductEntity, CreateUserEntity, ProductEntity, ProductStatus, Right},
    schema::{products, rights, user_rights, users},
};
use diesel::{Connection, ExpressionMethods, PgConnection, QueryDsl, SelectableHelper};
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use rust_decimal::Decimal;
use uuid::Uuid;

pub const JWT_SECRET: &str = "test-secret-0123456789abcdef0123456789";

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");
static MIGRATED: Once = Once::new();

/// App state over a pool that never connects. Enough for routes that fail before the database.
pub fn offline_state() -> AppState {
    let config = config::from_lookup(|key| match key {
        "DATABASE_URL" => Some("postgres://nobody@127.0.0.1:1/none".to_string()),
        "JWT_SECRET" => Some(JWT_SECRET.to_string()),
        "UPLOAD_DIR" => Some(
            std::env::temp_dir()
                .join("consignment-test-uploads")
                .display()
                .to_string(),
        ),
        _ => None,
    })
    .expect("test config is valid");
    let pool = db::connect_lazy(&config.database);
    AppState::new(&config, pool)
}

/// A connection inside a transaction that is never committed, or `None` when no database is configured.
pub async fn test_conn() -> Option<AsyncPgConnection> {
    let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
        eprintln!("TEST_DATABASE_URL not set, skipping database test");
        return None;
    };

    MIGRATED.call_once(|| {
        let mut conn = PgConnection::establish(&url).expect("connect for migrations");
        conn.run_pending_migrations(MIGRATIONS)
            .expect("migrations apply");
    });

    let mut conn = AsyncPgConnection::establish(&url)
        .await
        .expect("connect to test database");
    conn.begin_test_transaction()
        .await
        .expect("begin test transaction");
    Some(conn)
}

/// A valid `07xxxxxxxx` phone number unlikely to collide with other tests.
pub fn unique_phone() -> String {
    format!("07{:08}", Uuid::new_v4().as_u128() % 100_000_000)
}

pub fn unique_email(prefix: &str) -> String {
    format!("{prefix}-{}@example.com", Uuid::new_v4().simple())
}

/// Inserts a user directly, bypassing password hashing.
pub async fn insert_user(conn: &mut AsyncPgConnection, name: &str) -> i32 {
    diesel::insert_into(users::table)
        .values(CreateUserEntity {
            name: name.to_string(),
            email: unique_email(name),
            password_hash: "not-a-real-hash".to_string(),
            phone: unique_phone(),
        })
        .returning(users::id)
        .get_result(conn)
        .await
        .expect("insert user")
}

/// An active product whose offer window is open right now.
pub async fn insert_product(conn: &mut AsyncPgConnection, seller_id: i32, cents: i64) -> ProductEntity {
    let now = Utc::now();
    let price = Decimal::new(cents, 2);
    diesel::insert_into(products::table)
        .values(CreateProductEntity {
            name: format!("Item {cents}"),
            photo: None,
            initial_price: price,
            current_price: price,
            description: Some("Test listing".to_string()),
            user_id: seller_id,
            status: ProductStatus::Active.as_str().to_string(),
            start_date: now - Duration::hours(1),
            end_date: now + Duration::days(1),
        })
        .returning(ProductEntity::as_returning())
        .get_result(conn)
        .await
        .expect("insert product")
}

/// Attaches one of the seeded rights to a user.
pub async fn grant_right(conn: &mut AsyncPgConnection, user_id: i32, right: Right) {
    let right_id: i32 = rights::table
        .filter(rights::right_code.eq(right.code()))
        .select(rights::id)
        .first(conn)
        .await
        .expect("seeded right");
    diesel::insert_into(user_rights::table)
        .values((
            user_rights::user_id.eq(user_id),
            user_rights::right_id.eq(right_id),
        ))
        .execute(conn)
        .await
        .expect("grant right");
}
