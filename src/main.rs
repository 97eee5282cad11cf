//! WrldBldr Vault - storage bootstrap
//!
//! Loads configuration and the entity catalog, builds the configured storage
//! backend (provisioning and verifying the SQLite schema when selected), then
//! reports readiness. Any startup failure exits non-zero.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wrldbldr_vault::application::ports::outbound::StorageBackendPort;
use wrldbldr_vault::domain::catalog::Catalog;
use wrldbldr_vault::infrastructure::clock::SystemClock;
use wrldbldr_vault::infrastructure::config::AppConfig;
use wrldbldr_vault::infrastructure::persistence::StorageFactory;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wrldbldr_vault=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting WrldBldr Vault");

    // Load configuration
    let config = AppConfig::load()?;
    tracing::info!("Configuration loaded");
    tracing::info!("  Backend: {}", config.storage.backend);

    let catalog = match &config.catalog_path {
        Some(path) => Catalog::from_path(path)
            .with_context(|| format!("Failed to load catalog from {}", path.display()))?,
        None => Catalog::embedded().context("Embedded catalog is invalid")?,
    };
    let catalog = Arc::new(catalog);
    tracing::info!("  Entity types: {}", catalog.len());

    let backend = StorageFactory::new(config.storage.clone())
        .build(catalog, Arc::new(SystemClock::new()))
        .await?;

    tracing::info!(
        backend = %backend.kind(),
        entity_types = backend.catalog().len(),
        "Storage ready"
    );

    Ok(())
}
