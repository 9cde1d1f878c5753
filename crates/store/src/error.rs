//! Error types produced by the store crate.
//!
//! Two error surfaces exist:
//!
//! | Type | Raised by | Meaning |
//! |------|-----------|---------|
//! | [`IdError`] | [`BookId::parse`](crate::BookId::parse) | External identifier is not a 24-digit hex string |
//! | [`StoreError`] | every [`DocumentStore`](crate::DocumentStore) call | The store could not carry out the operation |
//!
//! Callers at an HTTP boundary map `IdError` to a client error and every
//! `StoreError` to a server error. "No document matched" is never an error: it
//! surfaces as `Ok(None)` from `find_by_id` and `Ok(0)` from `delete_by_id`.

use thiserror::Error;

/// Identifier parsing failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("identifier must be {expected} hex characters, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("identifier contains non-hex character {found:?} at position {position}")]
    InvalidCharacter { found: char, position: usize },
}

/// Failure of a document store operation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Transport or execution failure reported by the MongoDB driver.
    #[cfg(feature = "backend-mongo")]
    #[error("mongodb error: {0}")]
    Driver(#[from] mongodb::error::Error),

    /// The aggregation pipeline does not have the shape of a stage list.
    #[error("invalid pipeline: {0}")]
    InvalidPipeline(String),

    /// The backend cannot evaluate this aggregation stage.
    #[error("unsupported pipeline stage `{0}`")]
    UnsupportedStage(String),

    /// A document with the same `_id` already exists.
    #[error("duplicate key: a document with _id {0} already exists")]
    DuplicateKey(String),

    /// A value could not be converted between JSON and BSON.
    #[error("conversion error: {0}")]
    Conversion(String),

    /// Generic backend failure (poisoned lock, misconfiguration, ...).
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn backend<S: Into<String>>(msg: S) -> Self {
        StoreError::Backend(msg.into())
    }

    pub fn invalid_pipeline<S: Into<String>>(msg: S) -> Self {
        StoreError::InvalidPipeline(msg.into())
    }
}

impl From<bson::extjson::de::Error> for StoreError {
    fn from(err: bson::extjson::de::Error) -> Self {
        StoreError::Conversion(err.to_string())
    }
}

/// Convenience alias used by every backend.
pub type StoreResult<T> = Result<T, StoreError>;
