use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::NaiveDate;
use mongodb::bson::oid::ObjectId;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::error::EngineError;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
    Display, EnumString, EnumIter, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Category {
    Mac,
    Ipad,
    Iphone,
    Airpods,
    Homepod,
    Appletv,
    Accessories,
}

static REFURB_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\((整修品|Refurbished)\)").expect("valid regex"));
static PRICE_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"NT\$\s?[\d,]+").expect("valid regex"));
static PRICE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"NT\$?\s?([\d,]+)").expect("valid regex"));

/// Derives the stable identity of a listing: category plus a short hash of the
/// title with the refurbished marker and any inline price text removed.
pub fn derive_item_id(category: Category, title: &str) -> String {
    let clean = REFURB_MARKER.replace_all(title, "");
    let clean = PRICE_TEXT.replace_all(&clean, "");
    let clean = clean.trim();

    let digest = Sha256::digest(clean.as_bytes());
    let short = &hex::encode(digest)[..12];
    format!("{}_{}", category, short)
}

/// "NT$35,900" -> 35900. Anything without a recognizable amount is unknown.
pub fn parse_price(text: &str) -> Option<i64> {
    let caps = PRICE_NUMBER.captures(text)?;
    caps.get(1)?.as_str().replace(',', "").parse::<i64>().ok()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub item_id: String,
    pub category: Category,
    pub title: String,

    // smallest currency unit; None = price unknown
    pub price: Option<i64>,

    #[serde(default)]
    pub url: Option<String>,
}

impl Item {
    pub fn new(category: Category, title: &str, price: Option<i64>, url: Option<String>) -> Self {
        Self {
            item_id: derive_item_id(category, title),
            category,
            title: title.to_string(),
            price,
            url,
        }
    }

    /// Price usable for comparisons. Zero or negative amounts are treated as unknown.
    pub fn known_price(&self) -> Option<i64> {
        self.price.filter(|p| *p > 0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    pub date: NaiveDate,
    pub taken_at: i64,

    pub items: BTreeMap<String, Item>,
}

impl Snapshot {
    /// Builds a snapshot from normalized listings. Items without an id and
    /// repeated ids are dropped; each drop is returned so the caller can log it.
    pub fn from_items(
        date: NaiveDate,
        taken_at: i64,
        items: Vec<Item>,
    ) -> (Self, Vec<EngineError>) {
        let mut map: BTreeMap<String, Item> = BTreeMap::new();
        let mut rejected = Vec::new();

        for item in items {
            if item.item_id.trim().is_empty() {
                rejected.push(EngineError::InconsistentSnapshot {
                    title: item.title,
                    reason: "missing item_id".to_string(),
                });
                continue;
            }
            if map.contains_key(&item.item_id) {
                rejected.push(EngineError::InconsistentSnapshot {
                    title: item.title,
                    reason: format!("duplicate item_id {}", item.item_id),
                });
                continue;
            }
            map.insert(item.item_id.clone(), item);
        }

        let snapshot = Self {
            id: ObjectId::new(),
            date,
            taken_at,
            items: map,
        };
        (snapshot, rejected)
    }

    pub fn get(&self, item_id: &str) -> Option<&Item> {
        self.items.get(item_id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn count_by_category(&self) -> BTreeMap<Category, usize> {
        let mut counts = BTreeMap::new();
        for item in self.items.values() {
            *counts.entry(item.category).or_insert(0) += 1;
        }
        counts
    }
}
