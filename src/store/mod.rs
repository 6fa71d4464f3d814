//! Persistence seams used by the engine.
//!
//! Every query the matcher and dispatcher need is a method here, so the engine
//! never builds store-specific filters itself. `mongo` backs production,
//! `memory` backs tests and `STORE_BACKEND=memory`.

use async_trait::async_trait;
use chrono::NaiveDate;
use mongodb::bson::oid::ObjectId;

use crate::error::EngineResult;
use crate::models::{
    Category, DispatchLogEntry, NotificationRecord, NotificationType, Snapshot, Subscription,
    TrackingRecord, VolatilityEvent,
};

pub mod memory;
pub mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

/// Append-only history of catalog snapshots.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn get_latest(&self) -> EngineResult<Option<Snapshot>>;

    /// Most recent snapshot dated strictly before `before`.
    async fn get_previous(&self, before: NaiveDate) -> EngineResult<Option<Snapshot>>;

    async fn append(&self, snapshot: &Snapshot) -> EngineResult<()>;

    /// Snapshots dated on or after `since`, oldest first.
    async fn list_since(&self, since: NaiveDate) -> EngineResult<Vec<Snapshot>>;
}

#[async_trait]
pub trait SubscriptionRegistry: Send + Sync {
    /// Creates a subscription, or collapses into the active one for the same
    /// (user, category): refreshes the ceiling and query date and clears `notice`.
    async fn upsert(
        &self,
        user_id: &str,
        category: Category,
        max_price: i64,
        today: NaiveDate,
        now: i64,
    ) -> EngineResult<Subscription>;

    async fn get(&self, id: ObjectId) -> EngineResult<Option<Subscription>>;

    async fn find_by_user(&self, user_id: &str, category: Category) -> EngineResult<Option<Subscription>>;

    /// All active subscriptions in the category regardless of `notice`.
    async fn find_active(&self, category: Category) -> EngineResult<Vec<Subscription>>;

    /// Active and not yet notified, optionally narrowed to one category.
    async fn find_unnotified(&self, category: Option<Category>) -> EngineResult<Vec<Subscription>>;

    /// Active with `last_query_date >= since`.
    async fn find_recent_by_category(
        &self,
        category: Category,
        since: NaiveDate,
    ) -> EngineResult<Vec<Subscription>>;

    /// Active with `last_query_date < before`.
    async fn find_stale(&self, before: NaiveDate) -> EngineResult<Vec<Subscription>>;

    /// Refreshes `last_query_date`. Returns false when there is no active subscription.
    async fn touch(&self, user_id: &str, category: Category, today: NaiveDate, now: i64) -> EngineResult<bool>;

    /// Records delivery of one listing type and bumps the counter. `notice`
    /// flips to true once `kind` and every type in `matched` are delivered.
    /// Returns false when `kind` was already delivered, `notice` is already
    /// set, or the subscription is gone, i.e. nothing changed.
    async fn mark_notified(
        &self,
        id: ObjectId,
        kind: NotificationType,
        matched: &[NotificationType],
        notified_items: i64,
        now: i64,
    ) -> EngineResult<bool>;

    /// Volatility path: bumps the counter and last notification time, leaves
    /// `notice` alone. Returns false when the subscription does not exist.
    async fn increment_interest_count(&self, id: ObjectId, now: i64) -> EngineResult<bool>;

    async fn deactivate(&self, id: ObjectId, now: i64) -> EngineResult<()>;
}

#[async_trait]
pub trait VolatilityLog: Send + Sync {
    async fn record(&self, event: &VolatilityEvent) -> EngineResult<()>;

    /// Events whose fan-out has not completed yet, oldest first.
    async fn pending(&self) -> EngineResult<Vec<VolatilityEvent>>;

    /// Adds a subscription to the event's reached set.
    async fn mark_reached(&self, id: ObjectId, subscription_id: ObjectId) -> EngineResult<()>;

    /// Closes a pending event. Closed events never come back from `pending`.
    async fn set_notified_count(&self, id: ObjectId, count: i64, now: i64) -> EngineResult<()>;
}

#[async_trait]
pub trait NotificationLog: Send + Sync {
    async fn append(&self, record: &NotificationRecord) -> EngineResult<()>;

    async fn history(&self, user_id: &str, since: i64) -> EngineResult<Vec<NotificationRecord>>;
}

/// Dispatch attempts plus one record per tracking cycle; read by reporting.
#[async_trait]
pub trait RunLog: Send + Sync {
    async fn append_dispatch(&self, entry: &DispatchLogEntry) -> EngineResult<()>;

    async fn dispatches_since(&self, since: i64) -> EngineResult<Vec<DispatchLogEntry>>;

    async fn append_tracking(&self, record: &TrackingRecord) -> EngineResult<()>;

    async fn latest_tracking(&self) -> EngineResult<Option<TrackingRecord>>;

    /// Tracking records dated on or after `since`, oldest first.
    async fn tracking_since(&self, since: NaiveDate) -> EngineResult<Vec<TrackingRecord>>;
}
