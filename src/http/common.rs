//! Shared HTTP plumbing: error translation and middleware stacking,
//! mirroring the teacher's `api::routes` composition style but without
//! the auth/rate-limit layers this system does not need.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::error::{AppError, DatabaseError};

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Database(DatabaseError::NotFound(_)) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) | AppError::Database(DatabaseError::EmptyUpdate) => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(json!({ "detail": self.to_string() }));
        (status, body).into_response()
    }
}
