//! Delivers intents and applies their bookkeeping: send first, then record.
//!
//! A failed send mutates nothing, so the intent comes back on the next sweep.
//! A failed write after a successful send is reported as a reconciliation
//! error and never retried here, since retrying would send a second message.

use std::collections::HashMap;

use chrono::Utc;
use mongodb::bson::oid::ObjectId;
use tracing::{error, info, warn};

use crate::error::{bounded, EngineError, EngineResult};
use crate::models::{
    DispatchLogEntry, DispatchStatus, IntentItems, NotificationIntent, NotificationRecord,
    NotificationType, VolatilityEvent,
};
use crate::AppState;

async fn log_attempt(state: &AppState, intent: &NotificationIntent, status: DispatchStatus, err: Option<&EngineError>) {
    let entry = DispatchLogEntry {
        id: ObjectId::new(),
        at: Utc::now().timestamp(),
        user_id: intent.user_id.clone(),
        subscription_id: intent.subscription_id,
        kind: intent.kind,
        category: intent.category,
        item_count: intent.items.len() as i64,
        status,
        error: err.map(|e| e.to_string()),
    };

    let res = bounded(
        state.settings.store_timeout,
        "append_dispatch",
        state.runs.append_dispatch(&entry),
    )
    .await;

    if let Err(e) = res {
        warn!(user_id = %intent.user_id, error = %e, "run log append failed");
    }
}

async fn apply(state: &AppState, intent: &NotificationIntent, now: i64) -> EngineResult<bool> {
    let limit = state.settings.store_timeout;

    let applied = match (&intent.items, intent.kind) {
        (IntentItems::Volatility(events), _) => {
            let found = bounded(
                limit,
                "increment_interest_count",
                state
                    .subscriptions
                    .increment_interest_count(intent.subscription_id, now),
            )
            .await?;

            for ev in events {
                bounded(
                    limit,
                    "mark_reached",
                    state.volatility.mark_reached(ev.id, intent.subscription_id),
                )
                .await?;
            }
            found
        }
        (IntentItems::Listings(_), kind) => {
            bounded(
                limit,
                "mark_notified",
                state.subscriptions.mark_notified(
                    intent.subscription_id,
                    kind,
                    &intent.matched_kinds,
                    intent.items.len() as i64,
                    now,
                ),
            )
            .await?
        }
    };

    let record = NotificationRecord::for_intent(intent, now);
    bounded(limit, "append_notification", state.notifications.append(&record)).await?;

    Ok(applied)
}

/// Sends one intent and records it.
///
/// `Ok(true)`: delivered and recorded. `Ok(false)`: delivered, but the
/// subscription had already been marked by an earlier dispatch. `Err` with a
/// retryable error: nothing was sent or changed. `Err(Reconciliation)`: the
/// message went out and the store does not know it.
pub async fn dispatch(state: &AppState, intent: &NotificationIntent) -> EngineResult<bool> {
    let sent = bounded(
        state.settings.transport_timeout,
        "transport send",
        state.transport.send(&intent.user_id, intent),
    )
    .await;

    if let Err(e) = sent {
        let e = match e {
            EngineError::Timeout { .. } | EngineError::TransportFailure(_) => e,
            other => EngineError::TransportFailure(other.to_string()),
        };
        warn!(
            user_id = %intent.user_id,
            kind = %intent.kind,
            category = %intent.category,
            error = %e,
            "send failed, will retry next sweep"
        );
        log_attempt(state, intent, DispatchStatus::TransportFailed, Some(&e)).await;
        return Err(e);
    }

    let now = Utc::now().timestamp();
    match apply(state, intent, now).await {
        Ok(applied) => {
            let status = if applied {
                DispatchStatus::Delivered
            } else {
                match intent.kind {
                    NotificationType::PriceVolatility => warn!(
                        subscription_id = %intent.subscription_id,
                        "volatility alert sent for a subscription that no longer exists"
                    ),
                    _ => warn!(
                        subscription_id = %intent.subscription_id,
                        kind = %intent.kind,
                        "subscription already had this type; message sent twice"
                    ),
                }
                DispatchStatus::AlreadyApplied
            };
            info!(
                user_id = %intent.user_id,
                kind = %intent.kind,
                category = %intent.category,
                items = intent.items.len(),
                "notification delivered"
            );
            log_attempt(state, intent, status, None).await;
            Ok(applied)
        }
        Err(e) => {
            let err = EngineError::Reconciliation {
                subscription_id: intent.subscription_id.to_hex(),
                user_id: intent.user_id.clone(),
                reason: e.to_string(),
            };
            error!(error = %err, kind = %intent.kind, "sent but not recorded, reconcile manually");
            log_attempt(state, intent, DispatchStatus::ReconciliationFailed, Some(&err)).await;
            Err(err)
        }
    }
}

/// Closes a category's volatility events, each with the number of
/// subscriptions it reached across all sweeps. Each event is written once. A
/// failed write leaves it pending; already reached subscriptions are skipped
/// on the next sweep.
pub async fn close_volatility_events(
    state: &AppState,
    events: &[VolatilityEvent],
    reached: &HashMap<ObjectId, i64>,
) {
    let now = Utc::now().timestamp();
    for ev in events {
        let count = reached.get(&ev.id).copied().unwrap_or(ev.reached.len() as i64);
        let res = bounded(
            state.settings.store_timeout,
            "set_notified_count",
            state.volatility.set_notified_count(ev.id, count, now),
        )
        .await;

        if let Err(e) = res {
            error!(item_id = %ev.item_id, error = %e, "could not close volatility event");
        }
    }
}
