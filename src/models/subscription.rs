use chrono::NaiveDate;
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use super::item::Category;
use super::notification::NotificationType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    pub user_id: String,
    pub category: Category,
    pub max_price: i64,

    pub created_at: i64,
    pub updated_at: i64,

    // last day the user asked about this category; drives volatility fan-out and retention
    pub last_query_date: NaiveDate,

    // true once every price_drop / new_product intent of a match went out
    pub notice: bool,
    // listing types already delivered since the last (re)subscribe
    #[serde(default)]
    pub notified_types: Vec<NotificationType>,
    pub notification_count: i64,

    pub active: bool,

    #[serde(default)]
    pub last_notification_at: Option<i64>,
    #[serde(default)]
    pub notification_type: Option<NotificationType>,
    #[serde(default)]
    pub notified_items: Option<i64>,
    #[serde(default)]
    pub deactivated_at: Option<i64>,
}

impl Subscription {
    pub fn new(user_id: &str, category: Category, max_price: i64, today: NaiveDate, now: i64) -> Self {
        Self {
            id: ObjectId::new(),
            user_id: user_id.to_string(),
            category,
            max_price,
            created_at: now,
            updated_at: now,
            last_query_date: today,
            notice: false,
            notified_types: Vec::new(),
            notification_count: 0,
            active: true,
            last_notification_at: None,
            notification_type: None,
            notified_items: None,
            deactivated_at: None,
        }
    }

    pub fn is_unnotified(&self) -> bool {
        self.active && !self.notice
    }

    pub fn has_received(&self, kind: NotificationType) -> bool {
        self.notified_types.contains(&kind)
    }

    pub fn is_recent(&self, since: NaiveDate) -> bool {
        self.active && self.last_query_date >= since
    }
}
