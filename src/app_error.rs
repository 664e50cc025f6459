//! Error taxonomy and the uniform `{ success, message, data }` response envelope.

use std::sync::atomic::{AtomicBool, Ordering};

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use diesel::result::DatabaseErrorKind;
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

pub type DieselError = diesel::result::Error;

static EXPOSE_DETAILS: AtomicBool = AtomicBool::new(false);

/// Whether 500 responses carry the error chain in `data.details`. Set once at startup.
pub fn expose_error_details(enabled: bool) {
    EXPOSE_DETAILS.store(enabled, Ordering::Relaxed);
}

/// Envelope wrapped around every response body.
#[derive(Debug, Serialize, ToSchema)]
pub struct StdResponse<T, M> {
    pub success: bool,
    pub message: Option<M>,
    pub data: Option<T>,
    #[serde(skip)]
    pub status: StatusCode,
}

impl<T, M> StdResponse<T, M> {
    pub fn ok(data: T, message: M) -> Self {
        Self {
            success: true,
            message: Some(message),
            data: Some(data),
            status: StatusCode::OK,
        }
    }

    pub fn created(data: T, message: M) -> Self {
        Self {
            status: StatusCode::CREATED,
            ..Self::ok(data, message)
        }
    }
}

impl<T: Serialize, M: Serialize> IntoResponse for StdResponse<T, M> {
    fn into_response(self) -> Response {
        let status = self.status;
        (status, Json(self)).into_response()
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorDetails {
    pub details: String,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    ForbiddenResource(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    /// Missing, malformed or expired bearer credential.
    #[error("{0}")]
    InvalidToken(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::ForbiddenResource(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::InvalidToken(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DieselError> for AppError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::NotFound => Self::NotFound("Resource not found".into()),
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                tracing::warn!("Unique violation: {}", info.message());
                Self::Conflict("Resource already exists".into())
            }
            DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, info) => {
                tracing::warn!("Foreign key violation: {}", info.message());
                Self::Conflict("Resource is referenced by other records".into())
            }
            other => Self::Other(other.into()),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        let (message, data) = match &self {
            Self::Other(err) => {
                tracing::error!(error = ?err, "Request failed with a dependency error");
                let data = EXPOSE_DETAILS.load(Ordering::Relaxed).then(|| ErrorDetails {
                    details: format!("{err:#}"),
                });
                ("Internal server error".to_string(), data)
            }
            other => (other.to_string(), None),
        };

        StdResponse::<ErrorDetails, String> {
            success: false,
            message: Some(message),
            data,
            status,
        }
        .into_response()
    }
}
