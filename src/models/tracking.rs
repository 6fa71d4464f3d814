use std::collections::BTreeMap;

use chrono::NaiveDate;
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use super::diff::DiffResult;

/// Audit document written once per tracking cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingRecord {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    pub date: NaiveDate,
    pub taken_at: i64,
    pub snapshot_id: ObjectId,

    pub total_items: i64,
    // category name -> listing count
    pub categories: BTreeMap<String, i64>,

    pub skipped_items: i64,
    pub diff: DiffResult,
}
