use anyhow::Context;
use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use diesel::{OptionalExtension, QueryDsl};
use diesel_async::RunQueryDsl;

use crate::{app_error::AppError, app_state::AppState, schema::users};

/// Identity of the caller, inserted as a request extension once the token checks out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: i32,
    pub email: String,
}

/// Verifies the bearer token and makes `Extension<CurrentUser>` available to handlers.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(&req)?;
    let claims = state.jwt.verify(token)?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let user_id: Option<i32> = users::table
        .find(claims.sub)
        .select(users::id)
        .first(conn)
        .await
        .optional()
        .context("Failed to look up token owner")?;

    let Some(id) = user_id else {
        return Err(AppError::Unauthorized("User no longer exists".into()));
    };

    req.extensions_mut().insert(CurrentUser {
        id,
        email: claims.email,
    });

    Ok(next.run(req).await)
}

fn bearer_token(req: &Request) -> Result<&str, AppError> {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .ok_or_else(|| AppError::InvalidToken("Missing Auth Token".into()))?;

    header
        .to_str()
        .ok()
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::InvalidToken("Invalid token format".into()))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;

    use super::*;

    fn request_with(header: Option<&str>) -> Request {
        let mut builder = Request::builder().uri("/");
        if let Some(value) = header {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn bearer_token_is_extracted() {
        let req = request_with(Some("Bearer abc.def.ghi"));
        assert_eq!(bearer_token(&req).unwrap(), "abc.def.ghi");
    }

    #[test]
    fn missing_header_is_reported_as_missing() {
        let err = bearer_token(&request_with(None)).unwrap_err();
        assert!(matches!(err, AppError::InvalidToken(reason) if reason == "Missing Auth Token"));
    }

    #[test]
    fn non_bearer_scheme_is_invalid() {
        let err = bearer_token(&request_with(Some("Basic dXNlcjpwYXNz"))).unwrap_err();
        assert!(matches!(err, AppError::InvalidToken(reason) if reason == "Invalid token format"));

        let err = bearer_token(&request_with(Some("Bearer   "))).unwrap_err();
        assert!(matches!(err, AppError::InvalidToken(_)));
    }
}
