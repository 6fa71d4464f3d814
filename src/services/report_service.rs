//! Read-only summaries over stored snapshots, tracking records and the run log.

use std::collections::{BTreeMap, HashMap};

use chrono::{NaiveDate, Utc};
use serde::Serialize;

use crate::error::{bounded, EngineResult};
use crate::models::{
    Category, DiffEntry, DispatchStatus, Item, NotificationRecord, NotificationType, Snapshot,
};
use crate::services::diff_engine::change_pct;
use crate::services::tracker::days_before;
use crate::AppState;

const TOP_VOLATILE: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub price: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolatileItem {
    pub item_id: String,
    pub title: String,
    pub category: Category,
    pub change_count: usize,
    pub total_change: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ChangeSummary {
    pub period_days: i64,
    pub total_changes: usize,
    pub drops: usize,
    pub rises: usize,
    pub avg_drop_amount: f64,
    pub avg_rise_amount: f64,
    pub biggest_drop: Option<DiffEntry>,
    pub biggest_rise: Option<DiffEntry>,
    pub most_volatile: Vec<VolatileItem>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DailyReport {
    pub date: Option<NaiveDate>,
    pub cycles: usize,
    pub items_tracked: i64,
    pub changed: usize,
    pub new: usize,
    pub discontinued: usize,
    pub delivered: usize,
    pub transport_failures: usize,
    pub reconciliation_errors: usize,
    pub delivered_by_type: BTreeMap<String, usize>,
}

/// Dated prices of one item over the last `days` days, oldest first.
pub async fn price_history(
    state: &AppState,
    item_id: &str,
    days: i64,
    today: NaiveDate,
) -> EngineResult<Vec<PricePoint>> {
    let since = days_before(today, days);
    let snapshots = bounded(
        state.settings.store_timeout,
        "list snapshots",
        state.snapshots.list_since(since),
    )
    .await?;

    Ok(snapshots
        .iter()
        .filter_map(|s| {
            s.get(item_id).map(|item| PricePoint {
                date: s.date,
                price: item.price,
            })
        })
        .collect())
}

/// Aggregates every price change recorded in the last `days` days.
pub fn summarize_changes(changes: &[DiffEntry], period_days: i64) -> ChangeSummary {
    let mut summary = ChangeSummary {
        period_days,
        total_changes: changes.len(),
        ..Default::default()
    };

    let amounts: Vec<(i64, &DiffEntry)> = changes
        .iter()
        .filter_map(|e| e.change_amount().map(|a| (a, e)))
        .collect();

    let drops: Vec<i64> = amounts.iter().map(|(a, _)| *a).filter(|a| *a < 0).collect();
    let rises: Vec<i64> = amounts.iter().map(|(a, _)| *a).filter(|a| *a > 0).collect();
    summary.drops = drops.len();
    summary.rises = rises.len();
    if !drops.is_empty() {
        summary.avg_drop_amount = drops.iter().sum::<i64>() as f64 / drops.len() as f64;
    }
    if !rises.is_empty() {
        summary.avg_rise_amount = rises.iter().sum::<i64>() as f64 / rises.len() as f64;
    }

    summary.biggest_drop = amounts
        .iter()
        .filter(|(a, _)| *a < 0)
        .min_by_key(|(a, _)| *a)
        .map(|(_, e)| (*e).clone());
    summary.biggest_rise = amounts
        .iter()
        .filter(|(a, _)| *a > 0)
        .max_by_key(|(a, _)| *a)
        .map(|(_, e)| (*e).clone());

    let mut per_item: HashMap<&str, VolatileItem> = HashMap::new();
    for (amount, e) in &amounts {
        let v = per_item.entry(e.item_id.as_str()).or_insert_with(|| VolatileItem {
            item_id: e.item_id.clone(),
            title: e.title.clone(),
            category: e.category,
            change_count: 0,
            total_change: 0,
        });
        v.change_count += 1;
        v.total_change += amount.abs();
    }

    let mut volatile: Vec<VolatileItem> = per_item.into_values().collect();
    volatile.sort_by(|a, b| {
        b.change_count
            .cmp(&a.change_count)
            .then_with(|| a.item_id.cmp(&b.item_id))
    });
    volatile.truncate(TOP_VOLATILE);
    summary.most_volatile = volatile;

    summary
}

pub async fn price_change_summary(state: &AppState, days: i64, today: NaiveDate) -> EngineResult<ChangeSummary> {
    let since = days_before(today, days);
    let records = bounded(
        state.settings.store_timeout,
        "tracking_since",
        state.runs.tracking_since(since),
    )
    .await?;

    let changes: Vec<DiffEntry> = records
        .into_iter()
        .flat_map(|r| r.diff.changed)
        .collect();

    Ok(summarize_changes(&changes, days))
}

// percent; moves within ±5% over the window count as stable
const TREND_BAND_PCT: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Rising,
    Falling,
    Stable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceTrend {
    pub item_id: String,
    pub title: String,
    pub category: Category,
    pub first_price: i64,
    pub last_price: i64,
    pub min_price: i64,
    pub max_price: i64,
    pub avg_price: f64,
    pub total_change: i64,
    pub total_change_pct: f64,
    pub trend: Trend,
    pub data_points: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryStats {
    pub category: Category,
    pub item_count: usize,
    pub priced_count: usize,
    pub min_price: i64,
    pub max_price: i64,
    pub avg_price: f64,
    pub median_price: f64,
    pub price_range: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Deal {
    pub item_id: String,
    pub title: String,
    pub category: Category,
    pub original_price: i64,
    pub current_price: i64,
    pub price_drop: i64,
    pub price_drop_pct: f64,
}

/// Per-item trend across snapshots, oldest first. Items with fewer than two
/// known prices are left out.
pub fn trends_from(snapshots: &[Snapshot]) -> Vec<PriceTrend> {
    let mut series: BTreeMap<&str, (&Item, Vec<i64>)> = BTreeMap::new();
    for snap in snapshots {
        for item in snap.items.values() {
            let Some(price) = item.known_price() else {
                continue;
            };
            series
                .entry(item.item_id.as_str())
                .or_insert_with(|| (item, Vec::new()))
                .1
                .push(price);
        }
    }

    series
        .into_iter()
        .filter(|(_, (_, prices))| prices.len() >= 2)
        .filter_map(|(id, (item, prices))| {
            let first = *prices.first()?;
            let last = *prices.last()?;
            let pct = change_pct(first, last);
            let trend = if pct > TREND_BAND_PCT {
                Trend::Rising
            } else if pct < -TREND_BAND_PCT {
                Trend::Falling
            } else {
                Trend::Stable
            };

            Some(PriceTrend {
                item_id: id.to_string(),
                title: item.title.clone(),
                category: item.category,
                first_price: first,
                last_price: last,
                min_price: *prices.iter().min()?,
                max_price: *prices.iter().max()?,
                avg_price: prices.iter().sum::<i64>() as f64 / prices.len() as f64,
                total_change: last - first,
                total_change_pct: pct,
                trend,
                data_points: prices.len(),
            })
        })
        .collect()
}

/// Price spread per category in one snapshot. Categories without any known
/// price are skipped.
pub fn category_stats_from(snapshot: &Snapshot) -> Vec<CategoryStats> {
    let mut by_cat: BTreeMap<Category, (usize, Vec<i64>)> = BTreeMap::new();
    for item in snapshot.items.values() {
        let entry = by_cat.entry(item.category).or_default();
        entry.0 += 1;
        if let Some(p) = item.known_price() {
            entry.1.push(p);
        }
    }

    by_cat
        .into_iter()
        .filter_map(|(category, (item_count, mut prices))| {
            prices.sort_unstable();
            let min = *prices.first()?;
            let max = *prices.last()?;
            let n = prices.len();
            let median = if n % 2 == 1 {
                prices[n / 2] as f64
            } else {
                (prices[n / 2 - 1] + prices[n / 2]) as f64 / 2.0
            };

            Some(CategoryStats {
                category,
                item_count,
                priced_count: n,
                min_price: min,
                max_price: max,
                avg_price: prices.iter().sum::<i64>() as f64 / n as f64,
                median_price: median,
                price_range: max - min,
            })
        })
        .collect()
}

/// Items that got cheaper over the window, biggest drop in amount first.
pub fn deals_from(trends: &[PriceTrend], top_n: usize) -> Vec<Deal> {
    let mut deals: Vec<Deal> = trends
        .iter()
        .filter(|t| t.total_change < 0)
        .map(|t| Deal {
            item_id: t.item_id.clone(),
            title: t.title.clone(),
            category: t.category,
            original_price: t.first_price,
            current_price: t.last_price,
            price_drop: -t.total_change,
            price_drop_pct: -t.total_change_pct,
        })
        .collect();

    deals.sort_by(|a, b| {
        b.price_drop
            .cmp(&a.price_drop)
            .then_with(|| a.item_id.cmp(&b.item_id))
    });
    deals.truncate(top_n);
    deals
}

async fn snapshots_since(state: &AppState, days: i64, today: NaiveDate) -> EngineResult<Vec<Snapshot>> {
    bounded(
        state.settings.store_timeout,
        "list snapshots",
        state.snapshots.list_since(days_before(today, days)),
    )
    .await
}

pub async fn price_trends(state: &AppState, days: i64, today: NaiveDate) -> EngineResult<Vec<PriceTrend>> {
    Ok(trends_from(&snapshots_since(state, days, today).await?))
}

/// Category spread in the most recent snapshot of the window.
pub async fn category_statistics(
    state: &AppState,
    days: i64,
    today: NaiveDate,
) -> EngineResult<Vec<CategoryStats>> {
    let snapshots = snapshots_since(state, days, today).await?;
    Ok(snapshots.last().map(category_stats_from).unwrap_or_default())
}

pub async fn best_deals(
    state: &AppState,
    days: i64,
    top_n: usize,
    today: NaiveDate,
) -> EngineResult<Vec<Deal>> {
    let trends = trends_from(&snapshots_since(state, days, today).await?);
    Ok(deals_from(&trends, top_n))
}

/// Tracking and dispatch totals for one calendar day (UTC).
pub async fn daily_report(state: &AppState, date: NaiveDate) -> EngineResult<DailyReport> {
    let limit = state.settings.store_timeout;

    let start = date.and_hms_opt(0, 0, 0).map(|t| t.and_utc().timestamp()).unwrap_or(0);
    let end = start + 24 * 60 * 60;

    let mut report = DailyReport {
        date: Some(date),
        ..Default::default()
    };

    let records = bounded(limit, "tracking_since", state.runs.tracking_since(date)).await?;
    for r in records.iter().filter(|r| r.date == date) {
        report.cycles += 1;
        report.items_tracked = report.items_tracked.max(r.total_items);
        report.changed += r.diff.changed.len();
        report.new += r.diff.new.len();
        report.discontinued += r.diff.discontinued.len();
    }

    let dispatches = bounded(limit, "dispatches_since", state.runs.dispatches_since(start)).await?;
    for d in dispatches.iter().filter(|d| d.at < end) {
        match d.status {
            DispatchStatus::Delivered | DispatchStatus::AlreadyApplied => {
                report.delivered += 1;
                *report.delivered_by_type.entry(d.kind.to_string()).or_insert(0) += 1;
            }
            DispatchStatus::TransportFailed => report.transport_failures += 1,
            DispatchStatus::ReconciliationFailed => report.reconciliation_errors += 1,
        }
    }

    Ok(report)
}

pub fn render_report(report: &DailyReport, changes: &ChangeSummary) -> String {
    let mut out = String::new();
    let date = report.date.map(|d| d.to_string()).unwrap_or_default();

    out.push_str(&format!("Price tracking report {date}\n"));
    out.push_str(&format!(
        "cycles: {}, items: {}, changed: {}, new: {}, discontinued: {}\n",
        report.cycles, report.items_tracked, report.changed, report.new, report.discontinued
    ));
    out.push_str(&format!(
        "notifications delivered: {}, failed: {}, needs reconciliation: {}\n",
        report.delivered, report.transport_failures, report.reconciliation_errors
    ));
    for (kind, n) in &report.delivered_by_type {
        out.push_str(&format!("  {kind}: {n}\n"));
    }

    out.push_str(&format!(
        "last {} day(s): {} changes ({} drops, {} rises)\n",
        changes.period_days, changes.total_changes, changes.drops, changes.rises
    ));
    if let Some(d) = &changes.biggest_drop {
        out.push_str(&format!(
            "biggest drop: {} {:.1}%\n",
            d.title,
            d.change_pct.unwrap_or_default()
        ));
    }
    if let Some(r) = &changes.biggest_rise {
        out.push_str(&format!(
            "biggest rise: {} {:+.1}%\n",
            r.title,
            r.change_pct.unwrap_or_default()
        ));
    }
    for (i, v) in changes.most_volatile.iter().enumerate() {
        out.push_str(&format!(
            "{}. {} ({} changes, NT${} total)\n",
            i + 1,
            v.title,
            v.change_count,
            v.total_change
        ));
    }

    out
}

pub async fn notification_history(
    state: &AppState,
    user_id: &str,
    days: i64,
) -> EngineResult<Vec<NotificationRecord>> {
    let since = Utc::now().timestamp().saturating_sub(days.saturating_mul(24 * 60 * 60));
    bounded(
        state.settings.store_timeout,
        "notification history",
        state.notifications.history(user_id, since),
    )
    .await
}

pub fn count_by_type(records: &[NotificationRecord]) -> BTreeMap<NotificationType, usize> {
    let mut counts = BTreeMap::new();
    for r in records {
        *counts.entry(r.kind).or_insert(0) += 1;
    }
    counts
}
