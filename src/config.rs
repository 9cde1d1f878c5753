use crate::error::{ServerError, ServerResult};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;
use store::BackendConfig;

/// Which [`store::DocumentStore`] implementation to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Mongo,
    Memory,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Server bind address
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Document store backend
    #[serde(default)]
    pub backend: StoreBackend,

    /// MongoDB connection string, required for the mongo backend
    #[serde(default)]
    pub mongo_uri: Option<String>,

    /// Database holding the books collection
    #[serde(default = "default_database")]
    pub database: String,

    /// Collection holding every book document
    #[serde(default = "default_collection")]
    pub collection: String,

    /// Maximum request body size in MB
    #[serde(default = "default_max_body_size_mb")]
    pub max_body_size_mb: usize,

    /// Optional per-request deadline; unset means requests wait on the store
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub enable_cors: bool,

    /// Log level (an `EnvFilter` directive)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[serde(default = "default_true")]
    pub log_json: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_port(),
            backend: StoreBackend::default(),
            mongo_uri: None,
            database: default_database(),
            collection: default_collection(),
            max_body_size_mb: default_max_body_size_mb(),
            request_timeout_secs: None,
            enable_cors: default_true(),
            log_level: default_log_level(),
            log_json: default_true(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from `.env`, an optional `bookshop.*` file and
    /// `BOOKSHOP_*` environment variables, in increasing precedence.
    ///
    /// The bare `MONGO_URI` and `PORT` variables are honoured as defaults so
    /// existing deployments keep working.
    pub fn load() -> anyhow::Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env");
        }

        let mut builder = config::Config::builder();
        if let Ok(uri) = std::env::var("MONGO_URI") {
            builder = builder.set_default("mongo_uri", uri)?;
        }
        if let Ok(port) = std::env::var("PORT") {
            builder = builder.set_default("port", port)?;
        }

        let builder = builder
            // Load from file if exists
            .add_source(config::File::with_name("bookshop").required(false))
            // Override with environment variables
            .add_source(
                config::Environment::with_prefix("BOOKSHOP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        let config: ServerConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the server cannot start with.
    pub fn validate(&self) -> ServerResult<()> {
        if self.backend == StoreBackend::Mongo
            && self.mongo_uri.as_deref().map_or(true, |uri| uri.trim().is_empty())
        {
            return Err(ServerError::Config(
                "MONGO_URI not found: set MONGO_URI or BOOKSHOP_MONGO_URI".to_string(),
            ));
        }
        if self.max_body_size_mb == 0 {
            return Err(ServerError::Config(
                "max_body_size_mb must be greater than zero".to_string(),
            ));
        }
        if self.request_timeout_secs == Some(0) {
            return Err(ServerError::Config(
                "request_timeout_secs must be greater than zero when set".to_string(),
            ));
        }
        Ok(())
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        let addr_str = format!("{}:{}", self.bind_addr, self.port);
        Ok(addr_str.parse()?)
    }

    /// Get request timeout as Duration, if one is configured
    pub fn timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    /// Get max body size in bytes
    pub fn max_body_size(&self) -> usize {
        self.max_body_size_mb * 1024 * 1024
    }

    /// Backend selection for [`BackendConfig::connect`].
    pub fn store_config(&self) -> BackendConfig {
        match self.backend {
            StoreBackend::Memory => BackendConfig::in_memory(),
            StoreBackend::Mongo => BackendConfig::mongo(
                self.mongo_uri.clone().unwrap_or_default(),
                self.database.clone(),
                self.collection.clone(),
            ),
        }
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_database() -> String {
    "bookshop".to_string()
}

fn default_collection() -> String {
    "books".to_string()
}

fn default_max_body_size_mb() -> usize {
    10
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}
