//! Demo server: loads overrides from `SCHEMA_API_CONFIG` (JSON file) and `SCHEMA_API_*` env vars, reads
//! schemas from `SCHEMA_DIR`, registers the plugin and serves the generated API.

use schema_api::{init_tracing, Config, ConfigOverride, DirSchemaBuilder, Host, Plugin, PluginOptions, Runtime};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::default();
    if let Ok(path) = std::env::var("SCHEMA_API_CONFIG") {
        config.merge(&ConfigOverride::from_json_file(path).await?);
    }
    config.merge(&ConfigOverride::from_env()?);
    init_tracing(&config);

    let schema_dir = std::env::var("SCHEMA_DIR").unwrap_or_else(|_| "schemas".into());
    let bind = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    let plugin = Plugin::new(Runtime::new(config));
    let mut host = Host::new();
    let registration = plugin
        .register(&mut host, PluginOptions::new(Arc::new(DirSchemaBuilder::new(&schema_dir))))
        .await?;
    if registration.degraded {
        tracing::warn!("started without generated routes; check the policy directory");
    }

    let listener = TcpListener::bind(&bind).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, host.into_router()).await?;
    Ok(())
}
