//! Bookshop - HTTP gateway for a MongoDB book collection
//!
//! This crate exposes a single collection of schema-less book documents over
//! a small JSON API. Handlers validate only what the store needs (well-formed
//! identifiers and JSON bodies) and translate each request into one
//! [`store::DocumentStore`] call.
//!
//! # API Endpoints
//!
//! - `GET /` - Greeting
//! - `GET /health` - Liveness check
//! - `GET /ready` - Readiness check (pings the store)
//! - `GET /books` - List every book
//! - `GET /books/{id}` - Get one book by its 24-character hex id
//! - `POST /books` - Insert a book, returning the assigned id
//! - `DELETE /books/{id}` - Delete one book
//! - `POST /books/aggregate` - Run a client-supplied aggregation pipeline
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use bookshop::ServerConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::load()?;
//!     bookshop::start_server(config).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

pub use config::{ServerConfig, StoreBackend};
pub use error::{ServerError, ServerResult};
pub use server::{build_router, start_server};
pub use state::ServerState;
