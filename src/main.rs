use std::sync::Arc;

use mongodb::Client;
use tokio_util::sync::CancellationToken;

use pricewatch::config::{self, StoreBackend};
use pricewatch::services::catalog_feed::HttpCatalog;
use pricewatch::services::line::LineClient;
use pricewatch::store::{MemoryStore, MongoStore};
use pricewatch::{scheduler, AppState, EngineResult};

#[tokio::main]
async fn main() -> EngineResult<()> {
    tracing_subscriber::fmt::init();

    let settings = config::load();

    let catalog = Arc::new(HttpCatalog::new(settings.catalog_url.clone()));
    let transport = Arc::new(LineClient::new(
        settings.line_api_base.clone(),
        settings.line_channel_token.clone(),
    ));

    let state = match settings.store_backend {
        StoreBackend::Mongo => {
            let client = Client::with_uri_str(&settings.mongodb_uri).await?;
            let store = MongoStore::new(client.database(&settings.mongodb_db));
            store.ensure_indexes().await?;
            tracing::info!(db = %settings.mongodb_db, "connected to MongoDB");
            AppState::with_mongo(settings.clone(), store, catalog, transport)
        }
        StoreBackend::Memory => {
            tracing::warn!("using in-memory store; nothing survives a restart");
            AppState::with_memory(settings.clone(), Arc::new(MemoryStore::new()), catalog, transport)
        }
    };

    let cancel = CancellationToken::new();
    let handles = scheduler::spawn_all(&state, &cancel);
    tracing::info!(
        tracking_secs = settings.tracking_interval.as_secs(),
        sweep_secs = settings.sweep_interval.as_secs(),
        "scheduler started"
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "could not listen for shutdown signal");
    }

    tracing::info!("shutting down");
    cancel.cancel();
    for h in handles {
        if let Err(e) = h.await {
            tracing::error!(error = %e, "scheduler task ended abnormally");
        }
    }

    Ok(())
}
