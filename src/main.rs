//! Medical assistant chat server.
//!
//! Entry point: loads configuration, installs tracing and serves the API.

use std::sync::Arc;

use anyhow::Context;
use mimalloc::MiMalloc;
use tracing::info;

use medchat::config::AppConfig;
use medchat::{server, telemetry};

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env (if present)
    let _ = dotenvy::dotenv();

    let config = AppConfig::load().context("failed to load configuration")?;
    telemetry::init(config.logging.format);

    info!(
        name: "config.loaded",
        port = config.server.port,
        jwt_required = config.security.jwt_required,
        rate_limit_enabled = config.resilience.rate_limit_enabled,
        storage = ?config.storage.backend,
        "Configuration loaded"
    );

    let provider = server::provider_from_env();
    server::start_server(Arc::new(config), provider).await
}
