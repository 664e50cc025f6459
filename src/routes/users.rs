use anyhow::Context;
use axum::{
    Extension,
    extract::{Path, State},
    http::{HeaderName, HeaderValue},
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
    models::PublicUser,
    services::users::{
        self, LoggedIn, Profile, Registration, UserWithRight, validate_registration,
    },
};

static AUTH_TOKEN_HEADER: HeaderName = HeaderName::from_static("x-auth-token");

/// Register and login stay public; every other user route needs a bearer token.
pub fn routes_with_openapi(state: AppState) -> OpenApiRouter<AppState> {
    utoipa_axum::router::OpenApiRouter::new().nest(
        "/users",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(check_login))
            .routes(utoipa_axum::routes!(get_profile))
            .routes(utoipa_axum::routes!(update_password))
            .routes(utoipa_axum::routes!(get_users))
            .routes(utoipa_axum::routes!(delete_user))
            .route_layer(axum::middleware::from_fn_with_state(state, require_auth))
            .routes(utoipa_axum::routes!(register))
            .routes(utoipa_axum::routes!(login)),
    )
}

#[derive(Serialize, ToSchema)]
pub struct RegisterRes {
    pub id: i32,
}

/// Create an account with the requested right.
#[utoipa::path(
    post,
    path = "/register",
    tags = ["Users"],
    request_body = Registration,
    responses(
        (status = 201, description = "User created", body = StdResponse<RegisterRes, String>),
        (status = 400, description = "Validation failed"),
        (status = 409, description = "Email or phone already registered")
    )
)]
async fn register(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<Registration>,
) -> Result<impl IntoResponse, AppError> {
    let input = validate_registration(body)?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let id = users::register(conn, input).await?;

    Ok(StdResponse::created(
        RegisterRes { id },
        "User created successfully",
    ))
}

#[derive(Deserialize, ToSchema)]
pub struct LoginReq {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Exchange credentials for a bearer token. The token is also sent in `X-Auth-Token`.
#[utoipa::path(
    post,
    path = "/login",
    tags = ["Users"],
    request_body = LoginReq,
    responses(
        (status = 200, description = "Logged in", body = StdResponse<LoggedIn, String>),
        (status = 401, description = "Invalid credentials")
    )
)]
async fn login(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<LoginReq>,
) -> Result<impl IntoResponse, AppError> {
    let (Some(email), Some(password)) = (
        body.email.filter(|e| !e.trim().is_empty()),
        body.password.filter(|p| !p.is_empty()),
    ) else {
        return Err(AppError::BadRequest(
            "Email and password are required".into(),
        ));
    };

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let logged_in = users::login(conn, &state.jwt, email.trim(), &password).await?;
    let header =
        HeaderValue::from_str(&logged_in.token).context("Token is not a valid header value")?;

    Ok((
        [(AUTH_TOKEN_HEADER.clone(), header)],
        StdResponse::ok(logged_in, "Successfully logged in!"),
    ))
}

/// Echo the authenticated user.
#[utoipa::path(
    get,
    path = "/checkLogin",
    tags = ["Users"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "User is logged in", body = StdResponse<PublicUser, String>)
    )
)]
async fn check_login(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let user = users::get_user(conn, user.id).await?;

    Ok(StdResponse::ok(user, "User is logged in"))
}

#[utoipa::path(
    get,
    path = "/profile/{user_id}",
    tags = ["Users"],
    security(("bearerAuth" = [])),
    params(
        ("user_id" = i32, Path, description = "User ID to fetch")
    ),
    responses(
        (status = 200, description = "User fetched", body = StdResponse<Profile, String>),
        (status = 404, description = "User not found")
    )
)]
async fn get_profile(
    Path(user_id): Path<i32>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let profile = users::profile(conn, user_id).await?;

    Ok(StdResponse::ok(profile, "User fetched successfully"))
}

#[derive(Deserialize, ToSchema)]
pub struct UpdatePasswordReq {
    pub password: Option<String>,
}

/// Change a password. Only the user themselves or an admin may do this.
#[utoipa::path(
    put,
    path = "/updatePassword/{user_id}",
    tags = ["Users"],
    security(("bearerAuth" = [])),
    params(
        ("user_id" = i32, Path, description = "User whose password changes")
    ),
    request_body = UpdatePasswordReq,
    responses(
        (status = 200, description = "Password updated", body = StdResponse<RegisterRes, String>),
        (status = 403, description = "Not the same user")
    )
)]
async fn update_password(
    Path(user_id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    ApiJson(body): ApiJson<UpdatePasswordReq>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    users::update_password(conn, user.id, user_id, body.password).await?;

    Ok(StdResponse::ok(
        RegisterRes { id: user_id },
        "Password updated",
    ))
}

/// List every other user. Admin only.
#[utoipa::path(
    get,
    path = "/getUsers",
    tags = ["Users"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Users found", body = StdResponse<Vec<UserWithRight>, String>),
        (status = 403, description = "Caller is not an admin")
    )
)]
async fn get_users(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let users = users::list_users(conn, user.id).await?;

    Ok(StdResponse::ok(users, "Users found"))
}

#[utoipa::path(
    delete,
    path = "/deleteUser/{user_id}",
    tags = ["Users"],
    security(("bearerAuth" = [])),
    params(
        ("user_id" = i32, Path, description = "User to delete")
    ),
    responses(
        (status = 200, description = "User deleted", body = StdResponse<RegisterRes, String>),
        (status = 403, description = "Caller is not an admin"),
        (status = 404, description = "User not found")
    )
)]
async fn delete_user(
    Path(user_id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    users::delete_user(conn, user.id, user_id).await?;

    Ok(StdResponse::ok(
        RegisterRes { id: user_id },
        "User deleted successfully",
    ))
}
