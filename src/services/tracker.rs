//! Trigger entry points: tracking cycle, notification sweeps, retention cleanup.
//!
//! These run one at a time under the scheduler's guard. Work is split into
//! per-category units; a failure or a cancellation only affects the units that
//! have not completed yet.

use std::collections::HashMap;

use chrono::{Days, NaiveDate, Utc};
use mongodb::bson::oid::ObjectId;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::{bounded, EngineResult};
use crate::models::{Category, DiffResult, IntentItems, TrackingRecord};
use crate::services::{diff_engine, dispatcher, matcher, volatility};
use crate::AppState;

/// `today` minus `days`, saturating at the earliest representable date.
pub fn days_before(today: NaiveDate, days: i64) -> NaiveDate {
    today
        .checked_sub_days(Days::new(days.max(0) as u64))
        .unwrap_or(NaiveDate::MIN)
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepSummary {
    pub intents: usize,
    pub delivered: usize,
    pub already_applied: usize,
    pub transport_failures: usize,
    pub reconciliation_errors: usize,
    pub failed_categories: Vec<Category>,
    pub cancelled: bool,
}

impl SweepSummary {
    fn tally(&mut self, res: &EngineResult<bool>) {
        self.intents += 1;
        match res {
            Ok(true) => self.delivered += 1,
            Ok(false) => self.already_applied += 1,
            Err(e) if e.was_delivered() => self.reconciliation_errors += 1,
            Err(_) => self.transport_failures += 1,
        }
    }

    fn merge(&mut self, other: SweepSummary) {
        self.intents += other.intents;
        self.delivered += other.delivered;
        self.already_applied += other.already_applied;
        self.transport_failures += other.transport_failures;
        self.reconciliation_errors += other.reconciliation_errors;
        self.failed_categories.extend(other.failed_categories);
        self.cancelled |= other.cancelled;
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleSummary {
    pub total_items: usize,
    pub skipped_items: usize,
    pub changed: usize,
    pub new: usize,
    pub discontinued: usize,
    pub volatility_events: usize,
    pub listings: SweepSummary,
    pub volatility: SweepSummary,
}

/// Fetches today's catalog, diffs it against the latest stored snapshot,
/// persists both, then notifies.
///
/// Fails as a whole only when the catalog cannot be fetched or the new
/// snapshot cannot be stored; both happen before anyone is contacted.
pub async fn run_tracking_cycle(
    state: &AppState,
    today: NaiveDate,
    cancel: &CancellationToken,
) -> EngineResult<CycleSummary> {
    let limit = state.settings.store_timeout;

    let (current, rejected) = bounded(
        state.settings.transport_timeout,
        "catalog fetch",
        state.catalog.fetch_snapshot(today),
    )
    .await?;

    for e in &rejected {
        warn!(error = %e, "skipping listing");
    }

    let previous = bounded(limit, "get_latest", state.snapshots.get_latest()).await?;
    let diff = diff_engine::diff(previous.as_ref(), &current);

    bounded(limit, "append snapshot", state.snapshots.append(&current)).await?;

    let record = TrackingRecord {
        id: ObjectId::new(),
        date: today,
        taken_at: current.taken_at,
        snapshot_id: current.id,
        total_items: current.len() as i64,
        categories: current
            .count_by_category()
            .into_iter()
            .map(|(c, n)| (c.to_string(), n as i64))
            .collect(),
        skipped_items: rejected.len() as i64,
        diff: diff.clone(),
    };
    if let Err(e) = bounded(limit, "append_tracking", state.runs.append_tracking(&record)).await {
        warn!(error = %e, "tracking record not stored; retry sweeps will miss this diff");
    }

    let detected_at = Utc::now().timestamp();
    let events = volatility::classify_all(
        &diff.changed,
        state.settings.volatility_threshold_bps,
        detected_at,
    );
    let mut recorded = 0;
    for ev in &events {
        match bounded(limit, "record volatility", state.volatility.record(ev)).await {
            Ok(()) => recorded += 1,
            Err(e) => error!(item_id = %ev.item_id, error = %e, "volatility event not recorded"),
        }
    }

    info!(
        date = %today,
        items = current.len(),
        changed = diff.changed.len(),
        new = diff.new.len(),
        discontinued = diff.discontinued.len(),
        volatility_events = recorded,
        "tracking cycle diffed"
    );

    let mut summary = CycleSummary {
        total_items: current.len(),
        skipped_items: rejected.len(),
        changed: diff.changed.len(),
        new: diff.new.len(),
        discontinued: diff.discontinued.len(),
        volatility_events: recorded,
        ..Default::default()
    };

    summary.listings = sweep_listings(state, &diff, cancel).await;
    summary.volatility = match run_volatility_sweep(state, today, cancel).await {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "volatility sweep skipped; pending events stay queued");
            SweepSummary::default()
        }
    };

    Ok(summary)
}

/// Price-drop / new-product matching and dispatch for one diff, category by category.
pub async fn sweep_listings(state: &AppState, diff: &DiffResult, cancel: &CancellationToken) -> SweepSummary {
    let mut summary = SweepSummary::default();

    for category in diff.match_categories() {
        if cancel.is_cancelled() {
            summary.cancelled = true;
            break;
        }

        let intents = match matcher::listing_intents_for(state, category, diff).await {
            Ok(v) => v,
            Err(e) => {
                error!(%category, error = %e, retryable = e.is_retryable(), "listing match aborted for category");
                summary.failed_categories.push(category);
                continue;
            }
        };

        for intent in &intents {
            let res = dispatcher::dispatch(state, intent).await;
            summary.tally(&res);
        }
    }

    summary
}

/// Re-runs listing matching against the most recent cycle's diff. Subscriptions
/// already notified are excluded by the registry, so only failed sends and new
/// subscribers are picked up.
pub async fn run_price_sweep(state: &AppState, cancel: &CancellationToken) -> EngineResult<SweepSummary> {
    let latest = bounded(
        state.settings.store_timeout,
        "latest_tracking",
        state.runs.latest_tracking(),
    )
    .await?;

    match latest {
        Some(record) => Ok(sweep_listings(state, &record.diff, cancel).await),
        None => Ok(SweepSummary::default()),
    }
}

/// Fans pending high-severity events out to users who queried the category
/// within the configured window, then closes the events.
///
/// A category whose subscriber lookup fails, or where any send failed, keeps
/// its events pending for the next sweep. Subscriptions an event already
/// reached are not contacted again.
pub async fn run_volatility_sweep(
    state: &AppState,
    today: NaiveDate,
    cancel: &CancellationToken,
) -> EngineResult<SweepSummary> {
    let pending = bounded(
        state.settings.store_timeout,
        "pending volatility",
        state.volatility.pending(),
    )
    .await?;

    let since = days_before(today, state.settings.volatility_window_days);
    let mut summary = SweepSummary::default();

    for (category, events) in matcher::group_by_category(&pending) {
        if cancel.is_cancelled() {
            summary.cancelled = true;
            break;
        }

        let intents = match matcher::volatility_intents_for(state, category, &events, since).await {
            Ok(v) => v,
            Err(e) => {
                error!(%category, error = %e, retryable = e.is_retryable(), "volatility match aborted for category");
                summary.failed_categories.push(category);
                continue;
            }
        };

        let mut reached: HashMap<ObjectId, i64> =
            events.iter().map(|ev| (ev.id, ev.reached.len() as i64)).collect();
        let mut retry = false;

        for intent in &intents {
            let res = dispatcher::dispatch(state, intent).await;
            if res.is_ok() || res.as_ref().is_err_and(|e| e.was_delivered()) {
                if let IntentItems::Volatility(sent) = &intent.items {
                    for ev in sent {
                        *reached.entry(ev.id).or_insert(0) += 1;
                    }
                }
            } else if res.as_ref().is_err_and(|e| e.is_retryable()) {
                retry = true;
            }
            summary.tally(&res);
        }

        if retry {
            warn!(%category, events = events.len(), "volatility sends failed, events stay pending");
            continue;
        }

        dispatcher::close_volatility_events(state, &events, &reached).await;
        info!(%category, events = events.len(), intents = intents.len(), "volatility fan-out done");
    }

    Ok(summary)
}

/// The short-interval sweep: retries the listing path, then fans out volatility.
pub async fn run_notification_sweep(
    state: &AppState,
    today: NaiveDate,
    cancel: &CancellationToken,
) -> EngineResult<SweepSummary> {
    let mut summary = run_price_sweep(state, cancel).await?;
    summary.merge(run_volatility_sweep(state, today, cancel).await?);
    Ok(summary)
}

/// Deactivates subscriptions nobody has touched within the retention window.
/// Returns how many were deactivated; individual failures are logged and skipped.
pub async fn run_cleanup(state: &AppState, today: NaiveDate) -> EngineResult<usize> {
    let limit = state.settings.store_timeout;
    let cutoff = days_before(today, state.settings.retention_days);

    let stale = bounded(limit, "find_stale", state.subscriptions.find_stale(cutoff)).await?;
    let now = Utc::now().timestamp();

    let mut deactivated = 0;
    for sub in stale {
        match bounded(limit, "deactivate", state.subscriptions.deactivate(sub.id, now)).await {
            Ok(()) => deactivated += 1,
            Err(e) => warn!(subscription_id = %sub.id, error = %e, "deactivate failed"),
        }
    }

    info!(%cutoff, deactivated, "retention cleanup done");
    Ok(deactivated)
}
