use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

use super::diff::DiffEntry;
use super::item::Category;
use super::volatility::VolatilityEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotificationType {
    PriceDrop,
    NewProduct,
    PriceVolatility,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "entries", rename_all = "snake_case")]
pub enum IntentItems {
    Listings(Vec<DiffEntry>),
    Volatility(Vec<VolatilityEvent>),
}

impl IntentItems {
    pub fn len(&self) -> usize {
        match self {
            IntentItems::Listings(v) => v.len(),
            IntentItems::Volatility(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// "Notify this user about these items, for this reason", before delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationIntent {
    pub user_id: String,
    pub subscription_id: ObjectId,
    pub kind: NotificationType,
    pub category: Category,

    // the subscription's ceiling at match time; volatility intents ignore it
    pub max_price: Option<i64>,

    // listing types matched for this subscription in the same pass; `notice`
    // flips once all of them are delivered. Empty for volatility intents.
    #[serde(default)]
    pub matched_kinds: Vec<NotificationType>,

    pub items: IntentItems,
}

impl NotificationIntent {
    /// One-line summary stored with the NotificationRecord.
    pub fn summary(&self) -> String {
        let n = self.items.len();
        match self.kind {
            NotificationType::PriceDrop => format!("{n} {} item(s) dropped in price", self.category),
            NotificationType::NewProduct => format!("{n} new {} item(s) within budget", self.category),
            NotificationType::PriceVolatility => {
                format!("{n} {} item(s) moved sharply in price", self.category)
            }
        }
    }
}

/// Append-only audit of delivered notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub category: Category,
    pub content: String,
    pub sent_at: i64,
}

impl NotificationRecord {
    pub fn for_intent(intent: &NotificationIntent, sent_at: i64) -> Self {
        Self {
            id: ObjectId::new(),
            user_id: intent.user_id.clone(),
            kind: intent.kind,
            category: intent.category,
            content: intent.summary(),
            sent_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    Delivered,
    // send succeeded but the subscription was already marked by an earlier dispatch
    AlreadyApplied,
    TransportFailed,
    ReconciliationFailed,
}

/// One line of the dispatcher's run log; the daily report reads these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchLogEntry {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    pub at: i64,
    pub user_id: String,
    pub subscription_id: ObjectId,
    pub kind: NotificationType,
    pub category: Category,
    pub item_count: i64,
    pub status: DispatchStatus,

    #[serde(default)]
    pub error: Option<String>,
}
