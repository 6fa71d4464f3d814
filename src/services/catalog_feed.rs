use std::str::FromStr;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::models::item::parse_price;
use crate::models::{Category, Item, Snapshot};

/// Supplies the normalized catalog for one tracking cycle.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Returns the snapshot plus the listings that had to be skipped.
    async fn fetch_snapshot(&self, date: NaiveDate) -> EngineResult<(Snapshot, Vec<EngineError>)>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeedPrice {
    Amount(i64),
    Text(String),
}

/// One listing as published by the extraction side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedItem {
    pub category: String,
    pub title: String,

    #[serde(default)]
    pub price: Option<FeedPrice>,

    #[serde(default)]
    pub url: Option<String>,
}

impl FeedItem {
    pub fn normalize(self) -> Result<Item, EngineError> {
        let category = Category::from_str(self.category.trim()).map_err(|_| {
            EngineError::InconsistentSnapshot {
                title: self.title.clone(),
                reason: format!("unknown category {:?}", self.category),
            }
        })?;

        let title = self.title.trim();
        if title.is_empty() {
            return Err(EngineError::InconsistentSnapshot {
                title: String::new(),
                reason: "missing title, no item_id can be derived".to_string(),
            });
        }

        let price = match self.price {
            Some(FeedPrice::Amount(p)) => Some(p),
            Some(FeedPrice::Text(s)) => parse_price(&s),
            None => None,
        };

        let url = self.url.filter(|u| !u.trim().is_empty());
        Ok(Item::new(category, title, price, url))
    }
}

/// Normalizes a feed into a snapshot, collecting every rejected listing.
pub fn build_snapshot(date: NaiveDate, taken_at: i64, feed: Vec<FeedItem>) -> (Snapshot, Vec<EngineError>) {
    let mut rejected = Vec::new();
    let mut items = Vec::with_capacity(feed.len());

    for raw in feed {
        match raw.normalize() {
            Ok(item) => items.push(item),
            Err(e) => rejected.push(e),
        }
    }

    let (snapshot, mut dropped) = Snapshot::from_items(date, taken_at, items);
    rejected.append(&mut dropped);
    (snapshot, rejected)
}

/// Pulls the catalog as a JSON array of `FeedItem` from an HTTP endpoint.
#[derive(Clone)]
pub struct HttpCatalog {
    http: Client,
    url: String,
}

impl HttpCatalog {
    pub fn new(url: String) -> Self {
        Self {
            http: Client::new(),
            url,
        }
    }
}

#[async_trait]
impl CatalogSource for HttpCatalog {
    async fn fetch_snapshot(&self, date: NaiveDate) -> EngineResult<(Snapshot, Vec<EngineError>)> {
        if self.url.trim().is_empty() {
            return Err(EngineError::Config("CATALOG_URL is missing in .env".to_string()));
        }

        let res = self
            .http
            .get(&self.url)
            .query(&[("date", date.to_string())])
            .send()
            .await
            .map_err(|e| EngineError::StoreUnavailable(format!("catalog fetch: {e}")))?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(EngineError::StoreUnavailable(format!(
                "catalog fetch failed: {status} {body}"
            )));
        }

        let feed = res
            .json::<Vec<FeedItem>>()
            .await
            .map_err(|e| EngineError::StoreUnavailable(format!("catalog decode: {e}")))?;

        Ok(build_snapshot(date, Utc::now().timestamp(), feed))
    }
}
