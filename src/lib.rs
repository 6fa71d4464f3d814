//! Library entrypoint for pricewatch.
//!
//! The binary only wires real collaborators into `AppState`; integration tests
//! under `tests/` build the same state over the in-memory store.

use std::sync::Arc;

pub mod config;
pub mod error;
pub mod models;
pub mod scheduler;
pub mod services;
pub mod store;

pub use error::{EngineError, EngineResult};

use services::catalog_feed::CatalogSource;
use services::line::Transport;
use store::{MemoryStore, MongoStore, NotificationLog, RunLog, SnapshotStore, SubscriptionRegistry, VolatilityLog};

#[derive(Clone)]
pub struct AppState {
    pub settings: config::Settings,

    pub catalog: Arc<dyn CatalogSource>,
    pub transport: Arc<dyn Transport>,

    pub snapshots: Arc<dyn SnapshotStore>,
    pub subscriptions: Arc<dyn SubscriptionRegistry>,
    pub volatility: Arc<dyn VolatilityLog>,
    pub notifications: Arc<dyn NotificationLog>,
    pub runs: Arc<dyn RunLog>,
}

impl AppState {
    pub fn with_mongo(
        settings: config::Settings,
        store: MongoStore,
        catalog: Arc<dyn CatalogSource>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let store = Arc::new(store);
        Self {
            settings,
            catalog,
            transport,
            snapshots: store.clone(),
            subscriptions: store.clone(),
            volatility: store.clone(),
            notifications: store.clone(),
            runs: store,
        }
    }

    pub fn with_memory(
        settings: config::Settings,
        store: Arc<MemoryStore>,
        catalog: Arc<dyn CatalogSource>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            settings,
            catalog,
            transport,
            snapshots: store.clone(),
            subscriptions: store.clone(),
            volatility: store.clone(),
            notifications: store.clone(),
            runs: store,
        }
    }
}
