//! Day-over-day comparison of two catalog snapshots.

use std::collections::BTreeSet;

use crate::models::{DiffEntry, DiffKind, DiffResult, Item, Snapshot};

/// Percent change rounded half away from zero to 2 decimals, in hundredths of
/// a percent. Integer arithmetic only, so the result is deterministic.
pub fn change_bps(previous: i64, current: i64) -> i64 {
    let num = (current - previous) as i128 * 10_000;
    let den = previous as i128;
    let q = if num >= 0 {
        (2 * num + den) / (2 * den)
    } else {
        -((2 * -num + den) / (2 * den))
    };
    q as i64
}

pub fn change_pct(previous: i64, current: i64) -> f64 {
    change_bps(previous, current) as f64 / 100.0
}

fn entry(kind: DiffKind, item: &Item, previous: Option<i64>, current: Option<i64>) -> DiffEntry {
    let change_pct = match (kind, previous, current) {
        (DiffKind::Changed, Some(p), Some(c)) => Some(change_pct(p, c)),
        _ => None,
    };

    DiffEntry {
        item_id: item.item_id.clone(),
        kind,
        previous_price: previous,
        current_price: current,
        change_pct,
        category: item.category,
        title: item.title.clone(),
        url: item.url.clone(),
    }
}

/// Classifies every item of both snapshots into exactly one of changed, new,
/// discontinued or unchanged. With no previous snapshot everything is new.
pub fn diff(previous: Option<&Snapshot>, current: &Snapshot) -> DiffResult {
    let mut result = DiffResult::default();

    let Some(previous) = previous else {
        result.new = current
            .items
            .values()
            .map(|item| entry(DiffKind::New, item, None, item.price))
            .collect();
        return result;
    };

    let ids: BTreeSet<&String> = previous.items.keys().chain(current.items.keys()).collect();

    for id in ids {
        match (previous.get(id), current.get(id)) {
            (Some(old), Some(new)) => match (old.known_price(), new.known_price()) {
                (Some(p), Some(c)) if p != c => {
                    result.changed.push(entry(DiffKind::Changed, new, Some(p), Some(c)));
                }
                _ => result.unchanged.push(id.clone()),
            },
            (None, Some(new)) => {
                result.new.push(entry(DiffKind::New, new, None, new.price));
            }
            (Some(old), None) => {
                result
                    .discontinued
                    .push(entry(DiffKind::Discontinued, old, old.price, None));
            }
            (None, None) => {}
        }
    }

    result
}
