use axum::extract::FromRequest;

use crate::app_error::AppError;

/// `Json` whose rejections are reported through the response envelope as 400s.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);
