use serde::{Deserialize, Serialize};

use super::item::Category;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffKind {
    Changed,
    New,
    Discontinued,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffEntry {
    pub item_id: String,
    pub kind: DiffKind,

    pub previous_price: Option<i64>,
    pub current_price: Option<i64>,

    // only set for Changed; percent rounded to 2 decimals
    pub change_pct: Option<f64>,

    pub category: Category,
    pub title: String,
    pub url: Option<String>,
}

impl DiffEntry {
    pub fn is_drop(&self) -> bool {
        self.kind == DiffKind::Changed && self.change_amount().is_some_and(|d| d < 0)
    }

    pub fn change_amount(&self) -> Option<i64> {
        Some(self.current_price? - self.previous_price?)
    }

    /// Change expressed in hundredths of a percent (-20.00% -> -2000).
    pub fn change_bps(&self) -> Option<i64> {
        self.change_pct.map(|p| (p * 100.0).round() as i64)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiffResult {
    pub changed: Vec<DiffEntry>,
    pub new: Vec<DiffEntry>,
    pub discontinued: Vec<DiffEntry>,

    // ids present on both sides with no price change (or an unknown price)
    #[serde(default)]
    pub unchanged: Vec<String>,
}

impl DiffResult {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.new.is_empty() && self.discontinued.is_empty()
    }

    pub fn drops(&self) -> impl Iterator<Item = &DiffEntry> {
        self.changed.iter().filter(|e| e.is_drop())
    }

    /// Categories that have at least one drop or new listing.
    pub fn match_categories(&self) -> Vec<Category> {
        let mut cats: Vec<Category> = self
            .drops()
            .chain(self.new.iter())
            .map(|e| e.category)
            .collect();
        cats.sort();
        cats.dedup();
        cats
    }
}
