mod common;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use mongodb::bson::oid::ObjectId;
use tokio_util::sync::CancellationToken;

use common::{day, harness, item};
use pricewatch::models::{Category, NotificationType, Subscription};
use pricewatch::services::{subscription_service, tracker};
use pricewatch::store::{MemoryStore, SubscriptionRegistry};
use pricewatch::{EngineError, EngineResult};

/// Delegates to the memory store, except that subscriber lookups for one
/// category fail as if the database went away.
struct BrokenCategory {
    inner: Arc<MemoryStore>,
    broken: Category,
}

impl BrokenCategory {
    fn check(&self, category: Category) -> EngineResult<()> {
        if category == self.broken {
            return Err(EngineError::StoreUnavailable(format!("{category} shard offline")));
        }
        Ok(())
    }
}

#[async_trait]
impl SubscriptionRegistry for BrokenCategory {
    async fn upsert(
        &self,
        user_id: &str,
        category: Category,
        max_price: i64,
        today: NaiveDate,
        now: i64,
    ) -> EngineResult<Subscription> {
        self.inner.upsert(user_id, category, max_price, today, now).await
    }

    async fn get(&self, id: ObjectId) -> EngineResult<Option<Subscription>> {
        self.inner.get(id).await
    }

    async fn find_by_user(&self, user_id: &str, category: Category) -> EngineResult<Option<Subscription>> {
        self.inner.find_by_user(user_id, category).await
    }

    async fn find_active(&self, category: Category) -> EngineResult<Vec<Subscription>> {
        self.inner.find_active(category).await
    }

    async fn find_unnotified(&self, category: Option<Category>) -> EngineResult<Vec<Subscription>> {
        if let Some(c) = category {
            self.check(c)?;
        }
        self.inner.find_unnotified(category).await
    }

    async fn find_recent_by_category(
        &self,
        category: Category,
        since: NaiveDate,
    ) -> EngineResult<Vec<Subscription>> {
        self.check(category)?;
        self.inner.find_recent_by_category(category, since).await
    }

    async fn find_stale(&self, before: NaiveDate) -> EngineResult<Vec<Subscription>> {
        self.inner.find_stale(before).await
    }

    async fn touch(&self, user_id: &str, category: Category, today: NaiveDate, now: i64) -> EngineResult<bool> {
        self.inner.touch(user_id, category, today, now).await
    }

    async fn mark_notified(
        &self,
        id: ObjectId,
        kind: NotificationType,
        matched: &[NotificationType],
        notified_items: i64,
        now: i64,
    ) -> EngineResult<bool> {
        self.inner.mark_notified(id, kind, matched, notified_items, now).await
    }

    async fn increment_interest_count(&self, id: ObjectId, now: i64) -> EngineResult<bool> {
        self.inner.increment_interest_count(id, now).await
    }

    async fn deactivate(&self, id: ObjectId, now: i64) -> EngineResult<()> {
        self.inner.deactivate(id, now).await
    }
}

#[tokio::test]
async fn registry_failure_in_one_category_leaves_others_delivering() {
    let mut h = harness();
    let cancel = CancellationToken::new();

    h.catalog.set(vec![
        item(Category::Mac, "MacBook Air", 35_000),
        item(Category::Ipad, "iPad mini", 15_000),
    ]);
    tracker::run_tracking_cycle(&h.state, day(2024, 5, 1), &cancel).await.unwrap();

    let mac_sub = subscription_service::subscribe(&h.state, "U1", Category::Mac, 30_000, day(2024, 5, 2))
        .await
        .unwrap();
    let ipad_sub = subscription_service::subscribe(&h.state, "U2", Category::Ipad, 14_000, day(2024, 5, 2))
        .await
        .unwrap();

    h.state.subscriptions = Arc::new(BrokenCategory {
        inner: h.store.clone(),
        broken: Category::Mac,
    });

    h.catalog.set(vec![
        item(Category::Mac, "MacBook Air", 28_000),
        item(Category::Ipad, "iPad mini", 13_000),
    ]);
    let summary = tracker::run_tracking_cycle(&h.state, day(2024, 5, 2), &cancel).await.unwrap();

    assert_eq!(summary.listings.failed_categories, vec![Category::Mac]);
    assert_eq!(summary.volatility.failed_categories, vec![Category::Mac]);
    assert_eq!(summary.listings.delivered, 1);
    assert_eq!(summary.volatility.delivered, 1);

    let sent = h.transport.sent();
    assert!(sent.iter().all(|i| i.user_id == "U2"));
    assert_eq!(h.transport.sent_of(NotificationType::PriceDrop).len(), 1);
    assert_eq!(h.transport.sent_of(NotificationType::PriceVolatility).len(), 1);

    let subs = h.store.subscriptions().await;
    let mac = subs.iter().find(|s| s.id == mac_sub.id).unwrap();
    let ipad = subs.iter().find(|s| s.id == ipad_sub.id).unwrap();
    assert!(!mac.notice);
    assert_eq!(mac.notification_count, 0);
    assert!(ipad.notice);

    let events = h.store.volatility_events().await;
    let mac_event = events.iter().find(|e| e.category == Category::Mac).unwrap();
    let ipad_event = events.iter().find(|e| e.category == Category::Ipad).unwrap();
    assert!(mac_event.is_pending());
    assert_eq!(ipad_event.notified_user_count, Some(1));
}
