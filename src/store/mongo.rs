use async_trait::async_trait;
use chrono::NaiveDate;
use futures_util::StreamExt;
use mongodb::bson::{doc, oid::ObjectId, Document};
use mongodb::options::{FindOneOptions, FindOptions, IndexOptions};
use mongodb::{Cursor, Database, IndexModel};
use serde::de::DeserializeOwned;

use crate::error::EngineResult;
use crate::models::{
    Category, DispatchLogEntry, NotificationRecord, NotificationType, Snapshot, Subscription,
    TrackingRecord, VolatilityEvent,
};

use super::{NotificationLog, RunLog, SnapshotStore, SubscriptionRegistry, VolatilityLog};

const SNAPSHOTS: &str = "snapshots";
const SUBSCRIPTIONS: &str = "subscriptions";
const VOLATILITY: &str = "price_volatility_events";
const NOTIFICATIONS: &str = "notification_history";
const DISPATCHES: &str = "dispatch_log";
const TRACKING: &str = "price_tracking";

#[derive(Clone)]
pub struct MongoStore {
    db: Database,
}

impl MongoStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Indexes backing the registry's query shapes. Safe to run on every start.
    pub async fn ensure_indexes(&self) -> EngineResult<()> {
        // subscriptions: unnotified scan per category
        {
            let col = self.db.collection::<Document>(SUBSCRIPTIONS);
            let model = IndexModel::builder()
                .keys(doc! { "active": 1, "notice": 1, "category": 1 })
                .build();
            col.create_index(model, None).await?;
        }

        // subscriptions: recency window and retention sweep
        {
            let col = self.db.collection::<Document>(SUBSCRIPTIONS);
            let model = IndexModel::builder()
                .keys(doc! { "category": 1, "active": 1, "last_query_date": -1 })
                .build();
            col.create_index(model, None).await?;
        }

        // subscriptions: collapse lookup per (user, category)
        {
            let col = self.db.collection::<Document>(SUBSCRIPTIONS);
            let model = IndexModel::builder()
                .keys(doc! { "user_id": 1, "category": 1, "active": 1 })
                .build();
            col.create_index(model, None).await?;
        }

        // snapshots: latest / previous-before lookups
        {
            let col = self.db.collection::<Document>(SNAPSHOTS);
            let model = IndexModel::builder()
                .keys(doc! { "date": -1, "taken_at": -1 })
                .build();
            col.create_index(model, None).await?;
        }

        // notification history: per user, newest first
        {
            let col = self.db.collection::<Document>(NOTIFICATIONS);
            let model = IndexModel::builder()
                .keys(doc! { "user_id": 1, "sent_at": -1 })
                .build();
            col.create_index(model, None).await?;
        }

        // tracking records: one per snapshot
        {
            let col = self.db.collection::<Document>(TRACKING);
            let model = IndexModel::builder()
                .keys(doc! { "snapshot_id": 1 })
                .options(IndexOptions::builder().unique(true).build())
                .build();
            col.create_index(model, None).await?;
        }

        Ok(())
    }
}

async fn collect<T>(mut cursor: Cursor<T>) -> EngineResult<Vec<T>>
where
    T: DeserializeOwned + Unpin + Send + Sync,
{
    let mut items = Vec::new();
    while let Some(res) = cursor.next().await {
        items.push(res?);
    }
    Ok(items)
}

fn newest_first(field: &str) -> FindOneOptions {
    let mut sort = Document::new();
    sort.insert(field, -1);
    FindOneOptions::builder().sort(sort).build()
}

fn oldest_first(field: &str) -> FindOptions {
    let mut sort = Document::new();
    sort.insert(field, 1);
    FindOptions::builder().sort(sort).build()
}

#[async_trait]
impl SnapshotStore for MongoStore {
    async fn get_latest(&self) -> EngineResult<Option<Snapshot>> {
        let col = self.db.collection::<Snapshot>(SNAPSHOTS);
        Ok(col.find_one(doc! {}, newest_first("taken_at")).await?)
    }

    async fn get_previous(&self, before: NaiveDate) -> EngineResult<Option<Snapshot>> {
        let col = self.db.collection::<Snapshot>(SNAPSHOTS);
        Ok(col
            .find_one(doc! { "date": { "$lt": before.to_string() } }, newest_first("taken_at"))
            .await?)
    }

    async fn append(&self, snapshot: &Snapshot) -> EngineResult<()> {
        let col = self.db.collection::<Snapshot>(SNAPSHOTS);
        col.insert_one(snapshot, None).await?;
        Ok(())
    }

    async fn list_since(&self, since: NaiveDate) -> EngineResult<Vec<Snapshot>> {
        let col = self.db.collection::<Snapshot>(SNAPSHOTS);
        let cursor = col
            .find(doc! { "date": { "$gte": since.to_string() } }, oldest_first("taken_at"))
            .await?;
        collect(cursor).await
    }
}

#[async_trait]
impl SubscriptionRegistry for MongoStore {
    async fn upsert(
        &self,
        user_id: &str,
        category: Category,
        max_price: i64,
        today: NaiveDate,
        now: i64,
    ) -> EngineResult<Subscription> {
        let col = self.db.collection::<Subscription>(SUBSCRIPTIONS);

        let existing = col
            .find_one(
                doc! { "user_id": user_id, "category": category.as_ref(), "active": true },
                None,
            )
            .await?;

        if let Some(mut sub) = existing {
            col.update_one(
                doc! { "_id": sub.id },
                doc! { "$set": {
                    "max_price": max_price,
                    "last_query_date": today.to_string(),
                    "updated_at": now,
                    "notice": false,
                    "notified_types": [],
                } },
                None,
            )
            .await?;

            sub.max_price = max_price;
            sub.last_query_date = today;
            sub.updated_at = now;
            sub.notice = false;
            sub.notified_types.clear();
            return Ok(sub);
        }

        let sub = Subscription::new(user_id, category, max_price, today, now);
        col.insert_one(&sub, None).await?;
        Ok(sub)
    }

    async fn get(&self, id: ObjectId) -> EngineResult<Option<Subscription>> {
        let col = self.db.collection::<Subscription>(SUBSCRIPTIONS);
        Ok(col.find_one(doc! { "_id": id }, None).await?)
    }

    async fn find_by_user(&self, user_id: &str, category: Category) -> EngineResult<Option<Subscription>> {
        let col = self.db.collection::<Subscription>(SUBSCRIPTIONS);
        Ok(col
            .find_one(
                doc! { "user_id": user_id, "category": category.as_ref(), "active": true },
                None,
            )
            .await?)
    }

    async fn find_active(&self, category: Category) -> EngineResult<Vec<Subscription>> {
        let col = self.db.collection::<Subscription>(SUBSCRIPTIONS);
        let cursor = col
            .find(doc! { "category": category.as_ref(), "active": true }, None)
            .await?;
        collect(cursor).await
    }

    async fn find_unnotified(&self, category: Option<Category>) -> EngineResult<Vec<Subscription>> {
        let col = self.db.collection::<Subscription>(SUBSCRIPTIONS);
        let mut filter = doc! { "active": true, "notice": false };
        if let Some(c) = category {
            filter.insert("category", c.as_ref());
        }
        let cursor = col.find(filter, None).await?;
        collect(cursor).await
    }

    async fn find_recent_by_category(
        &self,
        category: Category,
        since: NaiveDate,
    ) -> EngineResult<Vec<Subscription>> {
        let col = self.db.collection::<Subscription>(SUBSCRIPTIONS);
        // ISO dates compare correctly as strings
        let cursor = col
            .find(
                doc! {
                    "category": category.as_ref(),
                    "active": true,
                    "last_query_date": { "$gte": since.to_string() },
                },
                None,
            )
            .await?;
        collect(cursor).await
    }

    async fn find_stale(&self, before: NaiveDate) -> EngineResult<Vec<Subscription>> {
        let col = self.db.collection::<Subscription>(SUBSCRIPTIONS);
        let cursor = col
            .find(
                doc! { "active": true, "last_query_date": { "$lt": before.to_string() } },
                None,
            )
            .await?;
        collect(cursor).await
    }

    async fn touch(&self, user_id: &str, category: Category, today: NaiveDate, now: i64) -> EngineResult<bool> {
        let col = self.db.collection::<Subscription>(SUBSCRIPTIONS);
        let res = col
            .update_one(
                doc! { "user_id": user_id, "category": category.as_ref(), "active": true },
                doc! { "$set": { "last_query_date": today.to_string(), "updated_at": now } },
                None,
            )
            .await?;
        Ok(res.matched_count > 0)
    }

    async fn mark_notified(
        &self,
        id: ObjectId,
        kind: NotificationType,
        matched: &[NotificationType],
        notified_items: i64,
        now: i64,
    ) -> EngineResult<bool> {
        let col = self.db.collection::<Subscription>(SUBSCRIPTIONS);

        // the per-type guard makes each delivery count at most once
        let res = col
            .update_one(
                doc! { "_id": id, "notice": false, "notified_types": { "$ne": kind.as_ref() } },
                doc! {
                    "$addToSet": { "notified_types": kind.as_ref() },
                    "$set": {
                        "notification_type": kind.as_ref(),
                        "notified_items": notified_items,
                        "last_notification_at": now,
                        "updated_at": now,
                    },
                    "$inc": { "notification_count": 1 },
                },
                None,
            )
            .await?;

        if res.matched_count == 0 {
            return Ok(false);
        }

        let mut all: Vec<&str> = matched.iter().map(|k| k.as_ref()).collect();
        all.push(kind.as_ref());
        col.update_one(
            doc! { "_id": id, "notified_types": { "$all": all } },
            doc! { "$set": { "notice": true } },
            None,
        )
        .await?;

        Ok(true)
    }

    async fn increment_interest_count(&self, id: ObjectId, now: i64) -> EngineResult<bool> {
        let col = self.db.collection::<Subscription>(SUBSCRIPTIONS);
        let res = col
            .update_one(
                doc! { "_id": id },
                doc! {
                    "$set": { "last_notification_at": now },
                    "$inc": { "notification_count": 1 },
                },
                None,
            )
            .await?;
        Ok(res.matched_count > 0)
    }

    async fn deactivate(&self, id: ObjectId, now: i64) -> EngineResult<()> {
        let col = self.db.collection::<Subscription>(SUBSCRIPTIONS);
        col.update_one(
            doc! { "_id": id },
            doc! { "$set": { "active": false, "deactivated_at": now, "updated_at": now } },
            None,
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl VolatilityLog for MongoStore {
    async fn record(&self, event: &VolatilityEvent) -> EngineResult<()> {
        let col = self.db.collection::<VolatilityEvent>(VOLATILITY);
        col.insert_one(event, None).await?;
        Ok(())
    }

    async fn pending(&self) -> EngineResult<Vec<VolatilityEvent>> {
        let col = self.db.collection::<VolatilityEvent>(VOLATILITY);
        let cursor = col
            .find(
                doc! { "severity": "high", "notified_user_count": null },
                oldest_first("detected_at"),
            )
            .await?;
        collect(cursor).await
    }

    async fn mark_reached(&self, id: ObjectId, subscription_id: ObjectId) -> EngineResult<()> {
        let col = self.db.collection::<VolatilityEvent>(VOLATILITY);
        col.update_one(
            doc! { "_id": id },
            doc! { "$addToSet": { "reached": subscription_id } },
            None,
        )
        .await?;
        Ok(())
    }

    async fn set_notified_count(&self, id: ObjectId, count: i64, now: i64) -> EngineResult<()> {
        let col = self.db.collection::<VolatilityEvent>(VOLATILITY);
        col.update_one(
            doc! { "_id": id, "notified_user_count": null },
            doc! { "$set": { "notified_user_count": count, "notified_at": now } },
            None,
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl NotificationLog for MongoStore {
    async fn append(&self, record: &NotificationRecord) -> EngineResult<()> {
        let col = self.db.collection::<NotificationRecord>(NOTIFICATIONS);
        col.insert_one(record, None).await?;
        Ok(())
    }

    async fn history(&self, user_id: &str, since: i64) -> EngineResult<Vec<NotificationRecord>> {
        let col = self.db.collection::<NotificationRecord>(NOTIFICATIONS);
        let opts = FindOptions::builder().sort(doc! { "sent_at": -1 }).build();
        let cursor = col
            .find(doc! { "user_id": user_id, "sent_at": { "$gte": since } }, opts)
            .await?;
        collect(cursor).await
    }
}

#[async_trait]
impl RunLog for MongoStore {
    async fn append_dispatch(&self, entry: &DispatchLogEntry) -> EngineResult<()> {
        let col = self.db.collection::<DispatchLogEntry>(DISPATCHES);
        col.insert_one(entry, None).await?;
        Ok(())
    }

    async fn dispatches_since(&self, since: i64) -> EngineResult<Vec<DispatchLogEntry>> {
        let col = self.db.collection::<DispatchLogEntry>(DISPATCHES);
        let cursor = col
            .find(doc! { "at": { "$gte": since } }, oldest_first("at"))
            .await?;
        collect(cursor).await
    }

    async fn append_tracking(&self, record: &TrackingRecord) -> EngineResult<()> {
        let col = self.db.collection::<TrackingRecord>(TRACKING);
        col.insert_one(record, None).await?;
        Ok(())
    }

    async fn latest_tracking(&self) -> EngineResult<Option<TrackingRecord>> {
        let col = self.db.collection::<TrackingRecord>(TRACKING);
        Ok(col.find_one(doc! {}, newest_first("taken_at")).await?)
    }

    async fn tracking_since(&self, since: NaiveDate) -> EngineResult<Vec<TrackingRecord>> {
        let col = self.db.collection::<TrackingRecord>(TRACKING);
        let cursor = col
            .find(doc! { "date": { "$gte": since.to_string() } }, oldest_first("taken_at"))
            .await?;
        collect(cursor).await
    }
}
