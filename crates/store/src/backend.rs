use crate::error::{StoreError, StoreResult};
use crate::id::BookId;
use crate::document::ID_FIELD;
use crate::pipeline;
use async_trait::async_trait;
use bson::oid::ObjectId;
use bson::{Bson, Document};
use serde_json::Value;
use std::sync::{Arc, RwLock};

/// Contract the gateway needs from a single document collection.
///
/// Implementations must be safe to share across concurrent requests; any
/// pooling happens inside the implementation. "Nothing matched" is reported
/// through the return value, never as an error.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Round-trip to the store to prove it is reachable.
    async fn ping(&self) -> StoreResult<()>;

    /// Every document in the collection, in store order.
    async fn find_all(&self) -> StoreResult<Vec<Document>>;

    /// The document whose `_id` equals `id`, if any.
    async fn find_by_id(&self, id: BookId) -> StoreResult<Option<Document>>;

    /// Persist `doc` and return the `_id` the store assigned (or kept).
    async fn insert_one(&self, doc: Document) -> StoreResult<Bson>;

    /// Remove the document with this `_id`, returning how many were deleted.
    async fn delete_by_id(&self, id: BookId) -> StoreResult<u64>;

    /// Run a client-supplied pipeline and materialize every result.
    ///
    /// The pipeline is passed through as received. Only its outer shape is
    /// checked here; stage semantics are the store's business.
    async fn aggregate(&self, pipeline: Value) -> StoreResult<Vec<Document>>;
}

/// Shared handle injected into request handlers.
pub type DynStore = Arc<dyn DocumentStore>;

/// Configuration for selecting and building a backend.
///
/// # Example
/// ```
/// use store::BackendConfig;
///
/// let config = BackendConfig::in_memory();
/// let config = BackendConfig::mongo("mongodb://localhost:27017", "bookshop", "books");
/// ```
#[derive(Clone, Debug, Default)]
pub enum BackendConfig {
    /// A MongoDB collection reached through the official driver.
    ///
    /// Requires the `backend-mongo` feature (enabled by default).
    Mongo {
        uri: String,
        database: String,
        collection: String,
    },
    /// A process-local collection, lost on exit. Useful for tests.
    #[default]
    InMemory,
}

impl BackendConfig {
    pub fn in_memory() -> Self {
        BackendConfig::InMemory
    }

    pub fn mongo<U, D, C>(uri: U, database: D, collection: C) -> Self
    where
        U: Into<String>,
        D: Into<String>,
        C: Into<String>,
    {
        BackendConfig::Mongo {
            uri: uri.into(),
            database: database.into(),
            collection: collection.into(),
        }
    }

    /// Build the backend and check connectivity once.
    ///
    /// A failed ping is returned as an error so the caller can refuse to
    /// start serving.
    pub async fn connect(&self) -> StoreResult<DynStore> {
        let store: DynStore = match self {
            BackendConfig::InMemory => Arc::new(InMemoryStore::new()),
            BackendConfig::Mongo {
                uri,
                database,
                collection,
            } => {
                #[cfg(feature = "backend-mongo")]
                {
                    Arc::new(MongoStore::connect(uri, database, collection).await?)
                }
                #[cfg(not(feature = "backend-mongo"))]
                {
                    let _ = (uri, database, collection);
                    return Err(StoreError::backend(
                        "mongo backend disabled at compile time",
                    ));
                }
            }
        };

        store.ping().await?;
        tracing::info!(backend = store.name(), "document store reachable");
        Ok(store)
    }
}

/// An in-memory collection guarded by a `RwLock`.
///
/// Documents keep insertion order, which stands in for MongoDB's natural
/// order.
pub struct InMemoryStore {
    docs: RwLock<Vec<Document>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(Vec::new()),
        }
    }

    /// Seed the collection, assigning `_id`s where missing.
    pub fn with_documents(docs: impl IntoIterator<Item = Document>) -> StoreResult<Self> {
        let store = Self::new();
        for doc in docs {
            store.insert(doc)?;
        }
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.docs.read().map(|docs| docs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> StoreResult<Vec<Document>> {
        let guard = self
            .docs
            .read()
            .map_err(|_| StoreError::backend("poisoned lock"))?;
        Ok(guard.clone())
    }

    fn insert(&self, doc: Document) -> StoreResult<Bson> {
        // `_id` always leads, as the server stores it
        let id = doc
            .get(ID_FIELD)
            .cloned()
            .unwrap_or_else(|| Bson::ObjectId(ObjectId::new()));
        let mut stored = Document::new();
        stored.insert(ID_FIELD, id.clone());
        for (key, value) in doc {
            if key != ID_FIELD {
                stored.insert(key, value);
            }
        }

        let mut guard = self
            .docs
            .write()
            .map_err(|_| StoreError::backend("poisoned lock"))?;
        if guard.iter().any(|d| d.get(ID_FIELD) == Some(&id)) {
            return Err(StoreError::DuplicateKey(format!("{id}")));
        }
        guard.push(stored);
        Ok(id)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> StoreResult<()> {
        self.docs
            .read()
            .map(|_| ())
            .map_err(|_| StoreError::backend("poisoned lock"))
    }

    async fn find_all(&self) -> StoreResult<Vec<Document>> {
        self.snapshot()
    }

    async fn find_by_id(&self, id: BookId) -> StoreResult<Option<Document>> {
        let wanted = Bson::ObjectId(id.into());
        let guard = self
            .docs
            .read()
            .map_err(|_| StoreError::backend("poisoned lock"))?;
        Ok(guard
            .iter()
            .find(|d| d.get(ID_FIELD) == Some(&wanted))
            .cloned())
    }

    async fn insert_one(&self, doc: Document) -> StoreResult<Bson> {
        self.insert(doc)
    }

    async fn delete_by_id(&self, id: BookId) -> StoreResult<u64> {
        let wanted = Bson::ObjectId(id.into());
        let mut guard = self
            .docs
            .write()
            .map_err(|_| StoreError::backend("poisoned lock"))?;
        match guard.iter().position(|d| d.get(ID_FIELD) == Some(&wanted)) {
            Some(index) => {
                guard.remove(index);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn aggregate(&self, pipeline: Value) -> StoreResult<Vec<Document>> {
        let stages = pipeline::stages_from_json(pipeline)?;
        pipeline::evaluate(self.snapshot()?, &stages)
    }
}

#[cfg(feature = "backend-mongo")]
pub mod mongo;

#[cfg(feature = "backend-mongo")]
pub use mongo::MongoStore;
