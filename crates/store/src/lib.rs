//! # Book Store
//!
//! The document-store side of the bookshop gateway: a single collection of
//! schema-less book documents behind the [`DocumentStore`] trait.
//!
//! ## Core Features
//!
//! - **Pluggable Backends**: [`MongoStore`] talks to a MongoDB deployment
//!   through the official driver (feature `backend-mongo`, on by default);
//!   [`InMemoryStore`] keeps documents in process and evaluates a useful
//!   subset of aggregation stages, which is what the test suites run against.
//! - **Identifier Codec**: [`BookId`] parses the 24-character hex identifiers
//!   seen at the HTTP boundary into native `ObjectId`s.
//! - **Rendering**: [`document_to_json`] and friends turn BSON into the JSON
//!   the gateway returns, flattening object ids to hex strings.
//! - **Pipeline Passthrough**: aggregation pipelines arrive as raw JSON and
//!   are only shape-checked ([`stages_from_json`]) before being handed to the
//!   backend.
//!
//! ## Example Usage
//!
//! ```
//! use store::{BackendConfig, BookId, document_to_json};
//! use bson::{doc, Bson};
//!
//! # tokio_test();
//! # fn tokio_test() {
//! # let rt = tokio::runtime::Runtime::new().unwrap();
//! # rt.block_on(async {
//! let store = BackendConfig::in_memory().connect().await.unwrap();
//!
//! let Bson::ObjectId(oid) = store.insert_one(doc! { "title": "Dune" }).await.unwrap() else {
//!     unreachable!()
//! };
//! let id = BookId::parse(&oid.to_hex()).unwrap();
//! let book = store.find_by_id(id).await.unwrap().unwrap();
//! assert_eq!(document_to_json(book)["title"], "Dune");
//! # });
//! # }
//! ```

mod backend;
mod document;
mod error;
mod id;
pub mod pipeline;

#[cfg(feature = "backend-mongo")]
pub use backend::MongoStore;
pub use backend::{BackendConfig, DocumentStore, DynStore, InMemoryStore};
pub use document::{
    bson_from_json, bson_to_json, document_from_json, document_to_json, documents_to_json,
    ID_FIELD,
};
pub use error::{IdError, StoreError, StoreResult};
pub use id::{BookId, ID_HEX_LEN};
pub use pipeline::stages_from_json;

pub use bson;
