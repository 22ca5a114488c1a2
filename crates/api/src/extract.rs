//! Request extractors that reject through [`AppError`].

use axum::extract::rejection::JsonRejection;
use axum::extract::FromRequest;

use crate::error::AppError;

/// `axum::Json` whose rejections (malformed JSON, missing or mistyped
/// fields, wrong content type) surface as 400 `BAD_REQUEST` in the
/// standard error envelope.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}
