use crate::config::ServerConfig;
use crate::error::ServerResult;
use std::sync::Arc;
use store::DynStore;

/// Shared application state
///
/// Built once at startup and handed to every handler through axum's `State`
/// extractor; there is no global store handle.
#[derive(Clone)]
pub struct ServerState {
    /// Server configuration
    pub config: Arc<ServerConfig>,

    /// The books collection (shared across requests)
    pub store: DynStore,
}

impl ServerState {
    /// Connect to the configured store and verify it answers a ping.
    pub async fn connect(config: ServerConfig) -> ServerResult<Self> {
        let store = config.store_config().connect().await?;
        Ok(Self::with_store(config, store))
    }

    /// Wrap an already-built store.
    pub fn with_store(config: ServerConfig, store: DynStore) -> Self {
        Self {
            config: Arc::new(config),
            store,
        }
    }
}
