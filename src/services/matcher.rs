//! Pairs diffs and volatility events with the subscriptions that should hear about them.
//!
//! The pure functions here take already-loaded subscriptions; the `*_for`
//! wrappers load them for one category under the store timeout. A failed load
//! surfaces as an error for that category only, before anything is marked.

use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;

use crate::error::{bounded, EngineResult};
use crate::models::{
    Category, DiffEntry, DiffResult, IntentItems, NotificationIntent, NotificationType, Severity,
    Subscription, VolatilityEvent,
};
use crate::AppState;

fn by_price_then_id(a: &DiffEntry, b: &DiffEntry) -> std::cmp::Ordering {
    a.current_price
        .cmp(&b.current_price)
        .then_with(|| a.item_id.cmp(&b.item_id))
}

fn within(entry: &DiffEntry, category: Category, max_price: i64) -> bool {
    entry.category == category && entry.current_price.is_some_and(|p| p > 0 && p <= max_price)
}

/// Price-drop and new-product intents for one category.
///
/// Each unnotified subscription gets at most one intent per type, bundling all
/// of its candidates ordered by ascending price then item_id. Types the
/// subscription already received are skipped, so a retry only resends what
/// failed.
pub fn listing_intents(
    category: Category,
    subs: &[Subscription],
    diff: &DiffResult,
) -> Vec<NotificationIntent> {
    let mut intents = Vec::new();
    let mut seen: HashSet<_> = HashSet::new();

    for sub in subs {
        if sub.category != category || !sub.is_unnotified() || !seen.insert(sub.id) {
            continue;
        }

        let mut drops: Vec<DiffEntry> = diff
            .drops()
            .filter(|e| within(e, category, sub.max_price))
            .cloned()
            .collect();
        drops.sort_by(by_price_then_id);

        let mut fresh: Vec<DiffEntry> = diff
            .new
            .iter()
            .filter(|e| within(e, category, sub.max_price))
            .cloned()
            .collect();
        fresh.sort_by(by_price_then_id);

        let candidates: Vec<(NotificationType, Vec<DiffEntry>)> = [
            (NotificationType::PriceDrop, drops),
            (NotificationType::NewProduct, fresh),
        ]
        .into_iter()
        .filter(|(_, items)| !items.is_empty())
        .collect();

        let matched_kinds: Vec<NotificationType> = candidates.iter().map(|(k, _)| *k).collect();

        for (kind, items) in candidates {
            if sub.has_received(kind) {
                continue;
            }
            intents.push(NotificationIntent {
                user_id: sub.user_id.clone(),
                subscription_id: sub.id,
                kind,
                category,
                max_price: Some(sub.max_price),
                matched_kinds: matched_kinds.clone(),
                items: IntentItems::Listings(items),
            });
        }
    }

    intents
}

/// High-severity events grouped per category, biggest drops first within a group.
pub fn group_by_category(events: &[VolatilityEvent]) -> BTreeMap<Category, Vec<VolatilityEvent>> {
    let mut groups: BTreeMap<Category, Vec<VolatilityEvent>> = BTreeMap::new();
    for ev in events.iter().filter(|e| e.severity == Severity::High) {
        groups.entry(ev.category).or_default().push(ev.clone());
    }
    for group in groups.values_mut() {
        group.sort_by(|a, b| {
            a.change_pct
                .total_cmp(&b.change_pct)
                .then_with(|| a.item_id.cmp(&b.item_id))
        });
    }
    groups
}

/// One volatility intent per recently interested subscription, bundling every
/// event of the category it has not received yet. The notice flag plays no
/// part here.
pub fn volatility_intents(
    category: Category,
    subs: &[Subscription],
    events: &[VolatilityEvent],
    since: NaiveDate,
) -> Vec<NotificationIntent> {
    let mut seen: HashSet<_> = HashSet::new();
    let mut intents = Vec::new();

    for s in subs {
        if s.category != category || !s.is_recent(since) || !seen.insert(s.id) {
            continue;
        }

        let unseen: Vec<VolatilityEvent> = events
            .iter()
            .filter(|ev| !ev.has_reached(s.id))
            .cloned()
            .collect();
        if unseen.is_empty() {
            continue;
        }

        intents.push(NotificationIntent {
            user_id: s.user_id.clone(),
            subscription_id: s.id,
            kind: NotificationType::PriceVolatility,
            category,
            max_price: None,
            matched_kinds: Vec::new(),
            items: IntentItems::Volatility(unseen),
        });
    }

    intents
}

pub async fn listing_intents_for(
    state: &AppState,
    category: Category,
    diff: &DiffResult,
) -> EngineResult<Vec<NotificationIntent>> {
    let subs = bounded(
        state.settings.store_timeout,
        "find_unnotified",
        state.subscriptions.find_unnotified(Some(category)),
    )
    .await?;

    Ok(listing_intents(category, &subs, diff))
}

pub async fn volatility_intents_for(
    state: &AppState,
    category: Category,
    events: &[VolatilityEvent],
    since: NaiveDate,
) -> EngineResult<Vec<NotificationIntent>> {
    let subs = bounded(
        state.settings.store_timeout,
        "find_recent_by_category",
        state.subscriptions.find_recent_by_category(category, since),
    )
    .await?;

    Ok(volatility_intents(category, &subs, events, since))
}
