//! Bookshop server binary.
//!
//! Exits with an error before binding if configuration is incomplete or the
//! document store does not answer.

use bookshop::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::load()?;
    bookshop::start_server(config).await
}
