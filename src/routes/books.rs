//! Book collection endpoints.
//!
//! Each handler turns one HTTP request into exactly one store call. Input is
//! checked only as far as the store needs: identifiers must parse and bodies
//! must be JSON. Malformed input is rejected before the store is touched.
//!
//! `POST /books/aggregate` forwards the client's pipeline without inspecting
//! its stages. There is no stage allowlist or cost bound, so callers get the
//! full power of the store's aggregation language and whatever the store's own
//! permissions allow.

use crate::error::{ServerError, ServerResult};
use crate::state::ServerState;
use axum::body::Bytes;
use axum::extract::rejection::{BytesRejection, PathRejection};
use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use store::{bson_to_json, document_from_json, document_to_json, documents_to_json, BookId};

/// Confirmation returned by delete.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Confirmation returned by insert, carrying the store-assigned id.
#[derive(Debug, Serialize, Deserialize)]
pub struct InsertResponse {
    pub message: String,
    #[serde(rename = "insertedID")]
    pub inserted_id: Value,
}

/// Decode a request body as JSON.
///
/// The body is read as raw bytes so a missing or unusual `Content-Type` is
/// not an error; only the payload itself has to parse.
fn parse_body(body: &Bytes) -> ServerResult<Value> {
    Ok(serde_json::from_slice(body)?)
}

/// `GET /books`
pub async fn list_books(State(state): State<Arc<ServerState>>) -> ServerResult<Json<Value>> {
    let books = state.store.find_all().await?;
    tracing::debug!(count = books.len(), "listed books");
    Ok(Json(documents_to_json(books)))
}

/// `GET /books/{id}`
pub async fn get_book(
    State(state): State<Arc<ServerState>>,
    path: Result<Path<String>, PathRejection>,
) -> ServerResult<Json<Value>> {
    let Path(id) = path?;
    let id = BookId::parse(&id)?;
    match state.store.find_by_id(id).await? {
        Some(book) => Ok(Json(document_to_json(book))),
        None => Err(ServerError::book_not_found()),
    }
}

/// `POST /books/aggregate`
pub async fn aggregate_books(
    State(state): State<Arc<ServerState>>,
    body: Result<Bytes, BytesRejection>,
) -> ServerResult<Json<Value>> {
    let pipeline = parse_body(&body?)?;
    let results = state.store.aggregate(pipeline).await?;
    tracing::debug!(count = results.len(), "aggregation finished");
    Ok(Json(documents_to_json(results)))
}

/// `DELETE /books/{id}`
pub async fn delete_book(
    State(state): State<Arc<ServerState>>,
    path: Result<Path<String>, PathRejection>,
) -> ServerResult<Json<MessageResponse>> {
    let Path(id) = path?;
    let id = BookId::parse(&id)?;
    let deleted = state.store.delete_by_id(id).await?;
    if deleted == 0 {
        return Err(ServerError::book_not_found());
    }

    tracing::info!(%id, "book deleted");
    Ok(Json(MessageResponse {
        message: "Book deleted successfully".to_string(),
    }))
}

/// `POST /books`
pub async fn add_book(
    State(state): State<Arc<ServerState>>,
    body: Result<Bytes, BytesRejection>,
) -> ServerResult<Json<InsertResponse>> {
    let Value::Object(fields) = parse_body(&body?)? else {
        return Err(ServerError::BadRequest(
            "a book must be a JSON object".to_string(),
        ));
    };
    let book =
        document_from_json(fields).map_err(|err| ServerError::BadRequest(err.to_string()))?;

    let inserted_id = bson_to_json(state.store.insert_one(book).await?);
    tracing::info!(id = %inserted_id, "book inserted");
    Ok(Json(InsertResponse {
        message: "Book added successfully".to_string(),
        inserted_id,
    }))
}
