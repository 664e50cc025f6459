use anyhow::Context;
use axum::{
    Extension,
    extract::{DefaultBodyLimit, Multipart, Path, State, multipart::MultipartError},
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    app_error::{AppError, StdResponse},
    app_state::AppState,
    extract::ApiJson,
    middleware::{CurrentUser, require_auth},
    models::{ProductEntity, ProductListing},
    services::products::{self, NewProduct, ProductPatch, ProductView},
};

const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

pub fn routes_with_openapi(state: AppState) -> OpenApiRouter<AppState> {
    utoipa_axum::router::OpenApiRouter::new().nest(
        "/products",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_all_products))
            .routes(utoipa_axum::routes!(get_products_by_seller))
            .routes(utoipa_axum::routes!(get_products_sold))
            .routes(utoipa_axum::routes!(get_offers))
            .routes(utoipa_axum::routes!(get_finished_offers))
            .routes(utoipa_axum::routes!(get_purchased_products))
            .routes(utoipa_axum::routes!(get_product))
            .routes(utoipa_axum::routes!(create_product))
            .routes(utoipa_axum::routes!(update_product))
            .routes(utoipa_axum::routes!(increase_product_price))
            .routes(utoipa_axum::routes!(delete_product))
            .route_layer(axum::middleware::from_fn_with_state(state, require_auth))
            .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
    )
}

async fn list_view(state: AppState, view: ProductView) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let products = products::list(conn, view).await?;

    Ok(StdResponse::ok(products, "Products fetched successfully"))
}

/// Every product currently for sale.
#[utoipa::path(
    get,
    path = "/getAllProducts",
    tags = ["Products"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Products for sale", body = StdResponse<Vec<ProductListing>, String>)
    )
)]
async fn get_all_products(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    list_view(state, ProductView::All).await
}

/// A seller's products currently for sale.
#[utoipa::path(
    get,
    path = "/getProducts/{user_id}",
    tags = ["Products"],
    security(("bearerAuth" = [])),
    params(
        ("user_id" = i32, Path, description = "Seller ID")
    ),
    responses(
        (status = 200, description = "Seller products", body = StdResponse<Vec<ProductListing>, String>)
    )
)]
async fn get_products_by_seller(
    Path(user_id): Path<i32>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    list_view(state, ProductView::BySeller(user_id)).await
}

/// The caller's products that closed and were paid for.
#[utoipa::path(
    get,
    path = "/getProductsSold",
    tags = ["Products"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Sold products", body = StdResponse<Vec<ProductListing>, String>)
    )
)]
async fn get_products_sold(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    list_view(state, ProductView::Sold { seller_id: user.id }).await
}

/// Closed listings where the caller holds the winning offer.
#[utoipa::path(
    get,
    path = "/getOffers",
    tags = ["Products"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Won offers", body = StdResponse<Vec<ProductListing>, String>)
    )
)]
async fn get_offers(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    list_view(state, ProductView::Offers { holder_id: user.id }).await
}

/// The caller's closed listings that have not been paid for.
#[utoipa::path(
    get,
    path = "/getFinishedOffers",
    tags = ["Products"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Finished offers", body = StdResponse<Vec<ProductListing>, String>)
    )
)]
async fn get_finished_offers(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    list_view(state, ProductView::FinishedOffers { seller_id: user.id }).await
}

#[utoipa::path(
    get,
    path = "/getPurchasedProducts",
    tags = ["Products"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Purchased products", body = StdResponse<Vec<ProductListing>, String>)
    )
)]
async fn get_purchased_products(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    list_view(state, ProductView::Purchased { buyer_id: user.id }).await
}

#[utoipa::path(
    get,
    path = "/getProduct/{product_id}",
    tags = ["Products"],
    security(("bearerAuth" = [])),
    params(
        ("product_id" = i32, Path, description = "Product ID to fetch")
    ),
    responses(
        (status = 200, description = "Product fetched", body = StdResponse<ProductEntity, String>),
        (status = 404, description = "Product not found")
    )
)]
async fn get_product(
    Path(product_id): Path<i32>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let product = products::get_product(conn, product_id).await?;

    Ok(StdResponse::ok(product, "Product fetched successfully"))
}

/// Multipart body shared by create and update.
#[allow(dead_code)]
#[derive(ToSchema)]
pub struct ProductUpload {
    name: Option<String>,
    #[schema(example = "100.00")]
    initial_price: Option<String>,
    description: Option<String>,
    #[schema(example = "2025-06-01T10:00:00Z")]
    start_date: Option<String>,
    #[schema(example = "2025-06-08T10:00:00Z")]
    end_date: Option<String>,
    #[schema(value_type = String, format = Binary)]
    photo: Option<Vec<u8>>,
}

struct UploadedPhoto {
    content_type: Option<String>,
    bytes: Vec<u8>,
}

#[derive(Default)]
struct ProductForm {
    name: Option<String>,
    initial_price: Option<String>,
    description: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
    photo: Option<UploadedPhoto>,
}

fn bad_multipart(err: MultipartError) -> AppError {
    AppError::BadRequest(err.body_text())
}

impl ProductForm {
    async fn read(mut multipart: Multipart) -> Result<Self, AppError> {
        let mut form = Self::default();

        while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            if name == "photo" {
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(bad_multipart)?;
                if !bytes.is_empty() {
                    form.photo = Some(UploadedPhoto {
                        content_type,
                        bytes: bytes.to_vec(),
                    });
                }
                continue;
            }

            let value = field.text().await.map_err(bad_multipart)?;
            let value = Some(value.trim().to_string()).filter(|v| !v.is_empty());
            match name.as_str() {
                "name" => form.name = value,
                "initial_price" => form.initial_price = value,
                "description" => form.description = value,
                "start_date" => form.start_date = value,
                "end_date" => form.end_date = value,
                _ => {}
            }
        }

        Ok(form)
    }
}

fn parse_price(raw: Option<String>) -> Result<Option<Decimal>, AppError> {
    raw.map(|raw| {
        raw.parse::<Decimal>()
            .map_err(|_| AppError::BadRequest(format!("{raw} is not a valid price")))
    })
    .transpose()
}

fn parse_date(field: &str, raw: Option<String>) -> Result<Option<DateTime<Utc>>, AppError> {
    raw.map(|raw| {
        DateTime::parse_from_rfc3339(&raw)
            .map(|date| date.with_timezone(&Utc))
            .map_err(|_| AppError::BadRequest(format!("{field} must be an RFC 3339 timestamp")))
    })
    .transpose()
}

/// List a new product. The photo is required.
#[utoipa::path(
    post,
    path = "/createProduct",
    tags = ["Products"],
    security(("bearerAuth" = [])),
    request_body(content = ProductUpload, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Product created", body = StdResponse<ProductEntity, String>),
        (status = 400, description = "Missing or invalid fields")
    )
)]
async fn create_product(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let form = ProductForm::read(multipart).await?;

    let (Some(name), Some(initial_price), Some(start_date), Some(end_date)) = (
        form.name,
        parse_price(form.initial_price)?,
        parse_date("start_date", form.start_date)?,
        parse_date("end_date", form.end_date)?,
    ) else {
        return Err(AppError::BadRequest("Missing required fields".into()));
    };
    let Some(photo) = form.photo else {
        return Err(AppError::BadRequest("Image is required".into()));
    };

    let photo_path = state
        .photos
        .save(photo.content_type.as_deref(), &photo.bytes)
        .await?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let created = products::create_product(
        conn,
        user.id,
        NewProduct {
            name,
            initial_price,
            description: form.description,
            start_date,
            end_date,
            photo: photo_path.clone(),
        },
    )
    .await;

    match created {
        Ok(product) => Ok(StdResponse::created(product, "Product created successfully")),
        Err(err) => {
            state.photos.remove(&photo_path).await;
            Err(err)
        }
    }
}

/// Update the caller's own product. Omitted fields keep their value.
#[utoipa::path(
    put,
    path = "/updateProduct/{product_id}",
    tags = ["Products"],
    security(("bearerAuth" = [])),
    params(
        ("product_id" = i32, Path, description = "Product ID to update")
    ),
    request_body(content = ProductUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Product updated", body = StdResponse<ProductEntity, String>),
        (status = 404, description = "Product not found")
    )
)]
async fn update_product(
    Path(product_id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let form = ProductForm::read(multipart).await?;

    let mut patch = ProductPatch {
        name: form.name,
        initial_price: parse_price(form.initial_price)?,
        description: form.description,
        start_date: parse_date("start_date", form.start_date)?,
        end_date: parse_date("end_date", form.end_date)?,
        photo: None,
    };

    if let Some(photo) = form.photo {
        patch.photo = Some(
            state
                .photos
                .save(photo.content_type.as_deref(), &photo.bytes)
                .await?,
        );
    }
    let new_photo = patch.photo.clone();

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    match products::update_product(conn, user.id, product_id, patch).await {
        Ok((product, replaced)) => {
            if let Some(old) = replaced {
                state.photos.remove(&old).await;
            }
            Ok(StdResponse::ok(product, "Product updated"))
        }
        Err(err) => {
            if let Some(path) = new_photo {
                state.photos.remove(&path).await;
            }
            Err(err)
        }
    }
}

#[derive(Deserialize, Serialize, ToSchema)]
pub struct IncreasePriceReq {
    #[schema(value_type = String, example = "150.00")]
    pub new_price: Option<Decimal>,
}

/// Place a higher offer. The caller becomes the product's current holder.
#[utoipa::path(
    put,
    path = "/increaseProductPrice/{product_id}",
    tags = ["Products"],
    security(("bearerAuth" = [])),
    params(
        ("product_id" = i32, Path, description = "Product ID to bid on")
    ),
    request_body = IncreasePriceReq,
    responses(
        (status = 200, description = "Offer accepted", body = StdResponse<ProductEntity, String>),
        (status = 400, description = "Offer not acceptable"),
        (status = 409, description = "A concurrent offer or sale won")
    )
)]
async fn increase_product_price(
    Path(product_id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    ApiJson(body): ApiJson<IncreasePriceReq>,
) -> Result<impl IntoResponse, AppError> {
    let Some(new_price) = body.new_price else {
        return Err(AppError::BadRequest("Missing new_price".into()));
    };

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let product = products::increase_price(conn, user.id, product_id, new_price).await?;

    Ok(StdResponse::ok(product, "Product updated"))
}

#[utoipa::path(
    delete,
    path = "/deleteProduct/{product_id}",
    tags = ["Products"],
    security(("bearerAuth" = [])),
    params(
        ("product_id" = i32, Path, description = "Product ID to delete")
    ),
    responses(
        (status = 200, description = "Product deleted", body = StdResponse<ProductEntity, String>),
        (status = 404, description = "Product not found"),
        (status = 409, description = "Product is part of an order")
    )
)]
async fn delete_product(
    Path(product_id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let deleted = products::delete_product(conn, user.id, product_id).await?;
    if let Some(photo) = &deleted.photo {
        state.photos.remove(photo).await;
    }

    Ok(StdResponse::ok(deleted, "Product deleted"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prices_parse_as_fixed_point() {
        assert_eq!(
            parse_price(Some("100.50".into())).unwrap(),
            Some(Decimal::new(10_050, 2))
        );
        assert_eq!(parse_price(None).unwrap(), None);
        assert!(matches!(
            parse_price(Some("ten".into())),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn dates_must_be_rfc3339() {
        let parsed = parse_date("start_date", Some("2025-06-01T12:00:00+03:00".into()))
            .unwrap()
            .unwrap();
        assert_eq!(parsed.to_rfc3339(), "2025-06-01T09:00:00+00:00");

        let err = parse_date("end_date", Some("01/06/2025".into())).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(msg) if msg.starts_with("end_date")));
    }
}
