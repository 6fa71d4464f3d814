use async_trait::async_trait;
use chrono::NaiveDate;
use mongodb::bson::oid::ObjectId;
use tokio::sync::RwLock;

use crate::error::EngineResult;
use crate::models::{
    Category, DispatchLogEntry, NotificationRecord, NotificationType, Snapshot, Subscription,
    TrackingRecord, VolatilityEvent,
};

use super::{NotificationLog, RunLog, SnapshotStore, SubscriptionRegistry, VolatilityLog};

#[derive(Default)]
struct Inner {
    snapshots: Vec<Snapshot>,
    subscriptions: Vec<Subscription>,
    volatility: Vec<VolatilityEvent>,
    notifications: Vec<NotificationRecord>,
    dispatches: Vec<DispatchLogEntry>,
    tracking: Vec<TrackingRecord>,
}

/// Process-local store. Same semantics as the Mongo collections, nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a subscription as-is (fixtures, imports).
    pub async fn insert_subscription(&self, sub: Subscription) {
        self.inner.write().await.subscriptions.push(sub);
    }

    pub async fn subscriptions(&self) -> Vec<Subscription> {
        self.inner.read().await.subscriptions.clone()
    }

    pub async fn volatility_events(&self) -> Vec<VolatilityEvent> {
        self.inner.read().await.volatility.clone()
    }

    pub async fn notification_records(&self) -> Vec<NotificationRecord> {
        self.inner.read().await.notifications.clone()
    }

    pub async fn snapshot_count(&self) -> usize {
        self.inner.read().await.snapshots.len()
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn get_latest(&self) -> EngineResult<Option<Snapshot>> {
        let inner = self.inner.read().await;
        Ok(inner.snapshots.iter().max_by_key(|s| s.taken_at).cloned())
    }

    async fn get_previous(&self, before: NaiveDate) -> EngineResult<Option<Snapshot>> {
        let inner = self.inner.read().await;
        Ok(inner
            .snapshots
            .iter()
            .filter(|s| s.date < before)
            .max_by_key(|s| s.taken_at)
            .cloned())
    }

    async fn append(&self, snapshot: &Snapshot) -> EngineResult<()> {
        self.inner.write().await.snapshots.push(snapshot.clone());
        Ok(())
    }

    async fn list_since(&self, since: NaiveDate) -> EngineResult<Vec<Snapshot>> {
        let inner = self.inner.read().await;
        let mut out: Vec<Snapshot> = inner
            .snapshots
            .iter()
            .filter(|s| s.date >= since)
            .cloned()
            .collect();
        out.sort_by_key(|s| s.taken_at);
        Ok(out)
    }
}

#[async_trait]
impl SubscriptionRegistry for MemoryStore {
    async fn upsert(
        &self,
        user_id: &str,
        category: Category,
        max_price: i64,
        today: NaiveDate,
        now: i64,
    ) -> EngineResult<Subscription> {
        let mut inner = self.inner.write().await;

        if let Some(existing) = inner
            .subscriptions
            .iter_mut()
            .find(|s| s.active && s.user_id == user_id && s.category == category)
        {
            existing.max_price = max_price;
            existing.last_query_date = today;
            existing.updated_at = now;
            existing.notice = false;
            existing.notified_types.clear();
            return Ok(existing.clone());
        }

        let sub = Subscription::new(user_id, category, max_price, today, now);
        inner.subscriptions.push(sub.clone());
        Ok(sub)
    }

    async fn get(&self, id: ObjectId) -> EngineResult<Option<Subscription>> {
        let inner = self.inner.read().await;
        Ok(inner.subscriptions.iter().find(|s| s.id == id).cloned())
    }

    async fn find_by_user(&self, user_id: &str, category: Category) -> EngineResult<Option<Subscription>> {
        let inner = self.inner.read().await;
        Ok(inner
            .subscriptions
            .iter()
            .find(|s| s.active && s.user_id == user_id && s.category == category)
            .cloned())
    }

    async fn find_active(&self, category: Category) -> EngineResult<Vec<Subscription>> {
        let inner = self.inner.read().await;
        Ok(inner
            .subscriptions
            .iter()
            .filter(|s| s.active && s.category == category)
            .cloned()
            .collect())
    }

    async fn find_unnotified(&self, category: Option<Category>) -> EngineResult<Vec<Subscription>> {
        let inner = self.inner.read().await;
        Ok(inner
            .subscriptions
            .iter()
            .filter(|s| s.is_unnotified())
            .filter(|s| category.is_none_or(|c| s.category == c))
            .cloned()
            .collect())
    }

    async fn find_recent_by_category(
        &self,
        category: Category,
        since: NaiveDate,
    ) -> EngineResult<Vec<Subscription>> {
        let inner = self.inner.read().await;
        Ok(inner
            .subscriptions
            .iter()
            .filter(|s| s.category == category && s.is_recent(since))
            .cloned()
            .collect())
    }

    async fn find_stale(&self, before: NaiveDate) -> EngineResult<Vec<Subscription>> {
        let inner = self.inner.read().await;
        Ok(inner
            .subscriptions
            .iter()
            .filter(|s| s.active && s.last_query_date < before)
            .cloned()
            .collect())
    }

    async fn touch(&self, user_id: &str, category: Category, today: NaiveDate, now: i64) -> EngineResult<bool> {
        let mut inner = self.inner.write().await;
        match inner
            .subscriptions
            .iter_mut()
            .find(|s| s.active && s.user_id == user_id && s.category == category)
        {
            Some(s) => {
                s.last_query_date = today;
                s.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_notified(
        &self,
        id: ObjectId,
        kind: NotificationType,
        matched: &[NotificationType],
        notified_items: i64,
        now: i64,
    ) -> EngineResult<bool> {
        let mut inner = self.inner.write().await;
        let Some(s) = inner
            .subscriptions
            .iter_mut()
            .find(|s| s.id == id && !s.notice && !s.has_received(kind))
        else {
            return Ok(false);
        };

        s.notified_types.push(kind);
        s.notice = matched.iter().all(|k| s.notified_types.contains(k));
        s.notification_count += 1;
        s.notification_type = Some(kind);
        s.notified_items = Some(notified_items);
        s.last_notification_at = Some(now);
        s.updated_at = now;
        Ok(true)
    }

    async fn increment_interest_count(&self, id: ObjectId, now: i64) -> EngineResult<bool> {
        let mut inner = self.inner.write().await;
        let Some(s) = inner.subscriptions.iter_mut().find(|s| s.id == id) else {
            return Ok(false);
        };
        s.notification_count += 1;
        s.last_notification_at = Some(now);
        Ok(true)
    }

    async fn deactivate(&self, id: ObjectId, now: i64) -> EngineResult<()> {
        let mut inner = self.inner.write().await;
        if let Some(s) = inner.subscriptions.iter_mut().find(|s| s.id == id) {
            s.active = false;
            s.deactivated_at = Some(now);
            s.updated_at = now;
        }
        Ok(())
    }
}

#[async_trait]
impl VolatilityLog for MemoryStore {
    async fn record(&self, event: &VolatilityEvent) -> EngineResult<()> {
        self.inner.write().await.volatility.push(event.clone());
        Ok(())
    }

    async fn pending(&self) -> EngineResult<Vec<VolatilityEvent>> {
        let inner = self.inner.read().await;
        let mut out: Vec<VolatilityEvent> =
            inner.volatility.iter().filter(|e| e.is_pending()).cloned().collect();
        out.sort_by_key(|e| e.detected_at);
        Ok(out)
    }

    async fn mark_reached(&self, id: ObjectId, subscription_id: ObjectId) -> EngineResult<()> {
        let mut inner = self.inner.write().await;
        if let Some(e) = inner.volatility.iter_mut().find(|e| e.id == id) {
            if !e.has_reached(subscription_id) {
                e.reached.push(subscription_id);
            }
        }
        Ok(())
    }

    async fn set_notified_count(&self, id: ObjectId, count: i64, now: i64) -> EngineResult<()> {
        let mut inner = self.inner.write().await;
        if let Some(e) = inner.volatility.iter_mut().find(|e| e.id == id && e.is_pending()) {
            e.notified_user_count = Some(count);
            e.notified_at = Some(now);
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationLog for MemoryStore {
    async fn append(&self, record: &NotificationRecord) -> EngineResult<()> {
        self.inner.write().await.notifications.push(record.clone());
        Ok(())
    }

    async fn history(&self, user_id: &str, since: i64) -> EngineResult<Vec<NotificationRecord>> {
        let inner = self.inner.read().await;
        let mut out: Vec<NotificationRecord> = inner
            .notifications
            .iter()
            .filter(|r| r.user_id == user_id && r.sent_at >= since)
            .cloned()
            .collect();
        out.sort_by_key(|r| std::cmp::Reverse(r.sent_at));
        Ok(out)
    }
}

#[async_trait]
impl RunLog for MemoryStore {
    async fn append_dispatch(&self, entry: &DispatchLogEntry) -> EngineResult<()> {
        self.inner.write().await.dispatches.push(entry.clone());
        Ok(())
    }

    async fn dispatches_since(&self, since: i64) -> EngineResult<Vec<DispatchLogEntry>> {
        let inner = self.inner.read().await;
        Ok(inner.dispatches.iter().filter(|d| d.at >= since).cloned().collect())
    }

    async fn append_tracking(&self, record: &TrackingRecord) -> EngineResult<()> {
        self.inner.write().await.tracking.push(record.clone());
        Ok(())
    }

    async fn latest_tracking(&self) -> EngineResult<Option<TrackingRecord>> {
        let inner = self.inner.read().await;
        Ok(inner.tracking.iter().max_by_key(|t| t.taken_at).cloned())
    }

    async fn tracking_since(&self, since: NaiveDate) -> EngineResult<Vec<TrackingRecord>> {
        let inner = self.inner.read().await;
        let mut out: Vec<TrackingRecord> =
            inner.tracking.iter().filter(|t| t.date >= since).cloned().collect();
        out.sort_by_key(|t| t.taken_at);
        Ok(out)
    }
}
