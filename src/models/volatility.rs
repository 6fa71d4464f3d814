use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use super::item::Category;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Normal,
    // label only; never persisted or fanned out
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Drop,
    Rise,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolatilityEvent {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    pub item_id: String,
    pub category: Category,
    pub title: String,
    pub url: Option<String>,

    pub old_price: i64,
    pub new_price: i64,
    pub change_pct: f64,

    pub severity: Severity,
    pub direction: Direction,

    pub detected_at: i64,

    // subscriptions that already received this event; a retried sweep skips them
    #[serde(default)]
    pub reached: Vec<ObjectId>,

    // set once, when the fan-out for this event completes
    pub notified_user_count: Option<i64>,
    pub notified_at: Option<i64>,
}

impl VolatilityEvent {
    pub fn is_pending(&self) -> bool {
        self.notified_user_count.is_none()
    }

    pub fn has_reached(&self, subscription_id: ObjectId) -> bool {
        self.reached.contains(&subscription_id)
    }

    pub fn change_amount(&self) -> i64 {
        self.new_price - self.old_price
    }
}
