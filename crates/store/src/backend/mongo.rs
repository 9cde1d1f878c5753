use crate::backend::DocumentStore;
use crate::error::StoreResult;
use crate::id::BookId;
use crate::pipeline;
use async_trait::async_trait;
use bson::oid::ObjectId;
use bson::{doc, Bson, Document};
use futures::TryStreamExt;
use mongodb::options::{ClientOptions, ServerApi, ServerApiVersion};
use mongodb::{Client, Collection, Database};
use serde_json::Value;

/// A single MongoDB collection.
///
/// The driver's `Client` owns a connection pool and is cheap to share, so one
/// `MongoStore` serves every request.
pub struct MongoStore {
    database: Database,
    collection: Collection<Document>,
}

impl MongoStore {
    /// Build a client for `uri` pinned to stable API version 1.
    ///
    /// The driver connects lazily; call [`DocumentStore::ping`] to verify
    /// the deployment is reachable.
    pub async fn connect(uri: &str, database: &str, collection: &str) -> StoreResult<Self> {
        let mut options = ClientOptions::parse(uri).await?;
        options.server_api = Some(ServerApi::builder().version(ServerApiVersion::V1).build());
        if options.app_name.is_none() {
            options.app_name = Some(env!("CARGO_PKG_NAME").to_string());
        }

        let client = Client::with_options(options)?;
        let database = client.database(database);
        let collection = database.collection::<Document>(collection);

        tracing::debug!(
            database = %database.name(),
            collection = %collection.name(),
            "mongo client created"
        );
        Ok(Self {
            database,
            collection,
        })
    }

    fn by_id(id: BookId) -> Document {
        doc! { "_id": ObjectId::from(id) }
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    fn name(&self) -> &'static str {
        "mongo"
    }

    async fn ping(&self) -> StoreResult<()> {
        self.database.run_command(doc! { "ping": 1 }, None).await?;
        Ok(())
    }

    async fn find_all(&self) -> StoreResult<Vec<Document>> {
        let cursor = self.collection.find(None, None).await?;
        let docs: Vec<Document> = cursor.try_collect().await?;
        tracing::debug!(count = docs.len(), "find_all");
        Ok(docs)
    }

    async fn find_by_id(&self, id: BookId) -> StoreResult<Option<Document>> {
        Ok(self.collection.find_one(Self::by_id(id), None).await?)
    }

    async fn insert_one(&self, doc: Document) -> StoreResult<Bson> {
        let result = self.collection.insert_one(doc, None).await?;
        Ok(result.inserted_id)
    }

    async fn delete_by_id(&self, id: BookId) -> StoreResult<u64> {
        let result = self.collection.delete_one(Self::by_id(id), None).await?;
        Ok(result.deleted_count)
    }

    async fn aggregate(&self, pipeline: Value) -> StoreResult<Vec<Document>> {
        let stages = pipeline::stages_from_json(pipeline)?;
        tracing::debug!(stages = stages.len(), "aggregate");
        let cursor = self.collection.aggregate(stages, None).await?;
        Ok(cursor.try_collect().await?)
    }
}
