//! Shared helpers for the HTTP integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header::CONTENT_TYPE, Method, Request, StatusCode};
use axum::Router;
use bookshop::{build_router, ServerConfig, ServerState, StoreBackend};
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use store::bson::{Bson, Document};
use store::{BookId, DocumentStore, DynStore, InMemoryStore, StoreError, StoreResult};
use tower::ServiceExt;

pub fn test_config() -> ServerConfig {
    ServerConfig {
        backend: StoreBackend::Memory,
        ..Default::default()
    }
}

pub fn app_with(store: DynStore) -> Router {
    app_with_config(test_config(), store)
}

pub fn app_with_config(config: ServerConfig, store: DynStore) -> Router {
    build_router(Arc::new(ServerState::with_store(config, store)))
}

pub fn memory_app() -> Router {
    app_with(Arc::new(InMemoryStore::new()))
}

/// Response pieces the tests look at.
pub struct TestResponse {
    pub status: StatusCode,
    pub request_id: Option<String>,
    pub body: Value,
}

pub async fn send(app: &Router, method: Method, uri: &str, body: Option<&str>) -> TestResponse {
    let mut request = Request::builder().method(method).uri(uri);
    if body.is_some() {
        request = request.header(CONTENT_TYPE, "application/json");
    }
    let request = request
        .body(Body::from(body.unwrap_or_default().to_string()))
        .unwrap();
    send_request(app, request).await
}

pub async fn send_request(app: &Router, request: Request<Body>) -> TestResponse {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let request_id = response
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    TestResponse {
        status,
        request_id,
        body,
    }
}

/// Insert a book over HTTP and return its id.
pub async fn insert(app: &Router, book: &str) -> String {
    let response = send(app, Method::POST, "/books", Some(book)).await;
    assert_eq!(response.status, StatusCode::OK, "{:?}", response.body);
    response.body["insertedID"]
        .as_str()
        .expect("inserted id should be a string")
        .to_string()
}

/// In-memory store that counts every call reaching it.
#[derive(Default)]
pub struct CountingStore {
    pub inner: InMemoryStore,
    calls: AtomicUsize,
}

impl CountingStore {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DocumentStore for CountingStore {
    fn name(&self) -> &'static str {
        "counting"
    }

    async fn ping(&self) -> StoreResult<()> {
        self.hit();
        self.inner.ping().await
    }

    async fn find_all(&self) -> StoreResult<Vec<Document>> {
        self.hit();
        self.inner.find_all().await
    }

    async fn find_by_id(&self, id: BookId) -> StoreResult<Option<Document>> {
        self.hit();
        self.inner.find_by_id(id).await
    }

    async fn insert_one(&self, doc: Document) -> StoreResult<Bson> {
        self.hit();
        self.inner.insert_one(doc).await
    }

    async fn delete_by_id(&self, id: BookId) -> StoreResult<u64> {
        self.hit();
        self.inner.delete_by_id(id).await
    }

    async fn aggregate(&self, pipeline: Value) -> StoreResult<Vec<Document>> {
        self.hit();
        self.inner.aggregate(pipeline).await
    }
}

/// Store whose every call fails, standing in for a lost connection.
pub struct FailingStore;

fn down() -> StoreError {
    StoreError::backend("connection refused")
}

#[async_trait]
impl DocumentStore for FailingStore {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn ping(&self) -> StoreResult<()> {
        Err(down())
    }

    async fn find_all(&self) -> StoreResult<Vec<Document>> {
        Err(down())
    }

    async fn find_by_id(&self, _id: BookId) -> StoreResult<Option<Document>> {
        Err(down())
    }

    async fn insert_one(&self, _doc: Document) -> StoreResult<Bson> {
        Err(down())
    }

    async fn delete_by_id(&self, _id: BookId) -> StoreResult<u64> {
        Err(down())
    }

    async fn aggregate(&self, _pipeline: Value) -> StoreResult<Vec<Document>> {
        Err(down())
    }
}

/// In-memory store whose `find_all` stalls, for exercising request deadlines.
pub struct SlowStore {
    pub inner: InMemoryStore,
    pub delay: Duration,
}

impl SlowStore {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: InMemoryStore::new(),
            delay,
        }
    }
}

#[async_trait]
impl DocumentStore for SlowStore {
    fn name(&self) -> &'static str {
        "slow"
    }

    async fn ping(&self) -> StoreResult<()> {
        self.inner.ping().await
    }

    async fn find_all(&self) -> StoreResult<Vec<Document>> {
        tokio::time::sleep(self.delay).await;
        self.inner.find_all().await
    }

    async fn find_by_id(&self, id: BookId) -> StoreResult<Option<Document>> {
        self.inner.find_by_id(id).await
    }

    async fn insert_one(&self, doc: Document) -> StoreResult<Bson> {
        self.inner.insert_one(doc).await
    }

    async fn delete_by_id(&self, id: BookId) -> StoreResult<u64> {
        self.inner.delete_by_id(id).await
    }

    async fn aggregate(&self, pipeline: Value) -> StoreResult<Vec<Document>> {
        self.inner.aggregate(pipeline).await
    }
}
