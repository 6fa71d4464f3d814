//! Periodic triggers. Every loop shares one guard so tracking, sweeps and
//! cleanup never overlap; a tick that finds the guard held is skipped.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::services::{report_service, tracker};
use crate::AppState;

const REPORT_WINDOW_DAYS: i64 = 7;

pub type RunGuard = Arc<Mutex<()>>;

pub fn run_guard() -> RunGuard {
    Arc::new(Mutex::new(()))
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn spawn_loop<F, Fut>(
    name: &'static str,
    every: Duration,
    guard: RunGuard,
    cancel: CancellationToken,
    mut tick: F,
) -> JoinHandle<()>
where
    F: FnMut(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = time::interval(every.max(Duration::from_secs(1)));
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            let Ok(_held) = guard.try_lock() else {
                warn!(task = name, "previous run still in progress, skipping tick");
                continue;
            };

            tick(cancel.clone()).await;
        }

        info!(task = name, "stopped");
    })
}

pub fn spawn_tracking_loop(state: AppState, guard: RunGuard, cancel: CancellationToken) -> JoinHandle<()> {
    let every = state.settings.tracking_interval;
    spawn_loop("tracking", every, guard, cancel, move |cancel| {
        let state = state.clone();
        async move {
            match tracker::run_tracking_cycle(&state, today(), &cancel).await {
                Ok(s) => info!(
                    items = s.total_items,
                    changed = s.changed,
                    new = s.new,
                    discontinued = s.discontinued,
                    delivered = s.listings.delivered + s.volatility.delivered,
                    "tracking cycle done"
                ),
                Err(e) => error!(error = %e, retryable = e.is_retryable(), "tracking cycle failed"),
            }
        }
    })
}

pub fn spawn_sweep_loop(state: AppState, guard: RunGuard, cancel: CancellationToken) -> JoinHandle<()> {
    let every = state.settings.sweep_interval;
    spawn_loop("sweep", every, guard, cancel, move |cancel| {
        let state = state.clone();
        async move {
            match tracker::run_notification_sweep(&state, today(), &cancel).await {
                Ok(s) if s.intents > 0 => info!(
                    intents = s.intents,
                    delivered = s.delivered,
                    failed = s.transport_failures,
                    "notification sweep done"
                ),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "notification sweep failed"),
            }
        }
    })
}

pub fn spawn_cleanup_loop(state: AppState, guard: RunGuard, cancel: CancellationToken) -> JoinHandle<()> {
    let every = state.settings.cleanup_interval;
    spawn_loop("cleanup", every, guard, cancel, move |_| {
        let state = state.clone();
        async move {
            if let Err(e) = tracker::run_cleanup(&state, today()).await {
                warn!(error = %e, "retention cleanup failed");
            }
        }
    })
}

pub fn spawn_report_loop(state: AppState, guard: RunGuard, cancel: CancellationToken) -> JoinHandle<()> {
    let every = state.settings.report_interval;
    spawn_loop("report", every, guard, cancel, move |_| {
        let state = state.clone();
        async move {
            let date = today();
            let report = report_service::daily_report(&state, date).await;
            let changes = report_service::price_change_summary(&state, REPORT_WINDOW_DAYS, date).await;
            match (report, changes) {
                (Ok(r), Ok(c)) => info!("{}", report_service::render_report(&r, &c)),
                (Err(e), _) | (_, Err(e)) => warn!(error = %e, "daily report failed"),
            }
        }
    })
}

/// Starts every loop over one shared guard.
pub fn spawn_all(state: &AppState, cancel: &CancellationToken) -> Vec<JoinHandle<()>> {
    let guard = run_guard();
    vec![
        spawn_tracking_loop(state.clone(), guard.clone(), cancel.clone()),
        spawn_sweep_loop(state.clone(), guard.clone(), cancel.clone()),
        spawn_cleanup_loop(state.clone(), guard.clone(), cancel.clone()),
        spawn_report_loop(state.clone(), guard, cancel.clone()),
    ]
}
