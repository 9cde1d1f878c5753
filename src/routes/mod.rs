//! API route handlers
//!
//! - `books`: the book collection (list, get, insert, delete, aggregate)
//! - `health`: liveness and readiness checks

pub mod books;
pub mod health;

use crate::error::ServerError;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

/// Greeting served at `GET /`.
pub async fn api_info() -> impl IntoResponse {
    Json(json!({ "message": "Hello, World!" }))
}

/// 404 Not Found handler
///
/// Returns a standardized error response for undefined routes.
pub async fn not_found() -> ServerError {
    ServerError::NotFound("route not found".to_string())
}
