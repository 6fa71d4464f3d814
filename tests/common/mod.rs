#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use pricewatch::config::Settings;
use pricewatch::models::{Category, Item, NotificationIntent, NotificationType, Snapshot};
use pricewatch::services::catalog_feed::CatalogSource;
use pricewatch::services::line::Transport;
use pricewatch::store::MemoryStore;
use pricewatch::{AppState, EngineError, EngineResult};

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn item(category: Category, title: &str, price: i64) -> Item {
    Item::new(category, title, Some(price), None)
}

pub fn snapshot(date: NaiveDate, taken_at: i64, items: Vec<Item>) -> Snapshot {
    let (s, rejected) = Snapshot::from_items(date, taken_at, items);
    assert!(rejected.is_empty());
    s
}

/// Serves whatever items were last set, with a strictly increasing `taken_at`.
#[derive(Default)]
pub struct FixedCatalog {
    items: Mutex<Vec<Item>>,
    clock: AtomicI64,
}

impl FixedCatalog {
    pub fn set(&self, items: Vec<Item>) {
        *self.items.lock().unwrap() = items;
    }
}

#[async_trait]
impl CatalogSource for FixedCatalog {
    async fn fetch_snapshot(&self, date: NaiveDate) -> EngineResult<(Snapshot, Vec<EngineError>)> {
        let taken_at = 1_000 + self.clock.fetch_add(1, Ordering::SeqCst);
        let items = self.items.lock().unwrap().clone();
        Ok(Snapshot::from_items(date, taken_at, items))
    }
}

/// Records every intent. Fails every send while `failing` is set, and any
/// send matching the configured type or user.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<NotificationIntent>>,
    failing: AtomicBool,
    failing_kind: Mutex<Option<NotificationType>>,
    failing_user: Mutex<Option<String>>,
}

impl RecordingTransport {
    pub fn fail(&self, on: bool) {
        self.failing.store(on, Ordering::SeqCst);
    }

    pub fn fail_kind(&self, kind: Option<NotificationType>) {
        *self.failing_kind.lock().unwrap() = kind;
    }

    pub fn fail_user(&self, user: Option<&str>) {
        *self.failing_user.lock().unwrap() = user.map(str::to_string);
    }

    pub fn sent(&self) -> Vec<NotificationIntent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_of(&self, kind: NotificationType) -> Vec<NotificationIntent> {
        self.sent().into_iter().filter(|i| i.kind == kind).collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, user_id: &str, intent: &NotificationIntent) -> EngineResult<()> {
        let kind_down = *self.failing_kind.lock().unwrap() == Some(intent.kind);
        let user_down = self.failing_user.lock().unwrap().as_deref() == Some(user_id);
        if self.failing.load(Ordering::SeqCst) || kind_down || user_down {
            return Err(EngineError::TransportFailure("push rejected".to_string()));
        }
        self.sent.lock().unwrap().push(intent.clone());
        Ok(())
    }
}

pub struct Harness {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub catalog: Arc<FixedCatalog>,
    pub transport: Arc<RecordingTransport>,
}

pub fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let catalog = Arc::new(FixedCatalog::default());
    let transport = Arc::new(RecordingTransport::default());

    let state = AppState::with_memory(
        Settings::default(),
        store.clone(),
        catalog.clone(),
        transport.clone(),
    );

    Harness {
        state,
        store,
        catalog,
        transport,
    }
}
