use mongodb::bson::oid::ObjectId;

use crate::models::{DiffEntry, DiffKind, Direction, Severity, VolatilityEvent};

/// High-severity threshold in hundredths of a percent (10.00%).
pub const DEFAULT_THRESHOLD_BPS: i64 = 1_000;

pub fn direction_of(change_bps: i64) -> Direction {
    if change_bps < 0 {
        Direction::Drop
    } else {
        Direction::Rise
    }
}

/// `High` at or above the threshold, `Medium` at or above half of it.
pub fn severity_of(change_bps: i64, threshold_bps: i64) -> Severity {
    let magnitude = change_bps.abs();
    if magnitude >= threshold_bps {
        Severity::High
    } else if magnitude * 2 >= threshold_bps {
        Severity::Medium
    } else {
        Severity::Normal
    }
}

/// Turns a changed entry into a volatility event when the move reaches the
/// threshold. Anything else (new, discontinued, small moves) yields `None`.
pub fn classify(entry: &DiffEntry, threshold_bps: i64, detected_at: i64) -> Option<VolatilityEvent> {
    if entry.kind != DiffKind::Changed {
        return None;
    }

    let bps = entry.change_bps()?;
    if severity_of(bps, threshold_bps) != Severity::High {
        return None;
    }

    Some(VolatilityEvent {
        id: ObjectId::new(),
        item_id: entry.item_id.clone(),
        category: entry.category,
        title: entry.title.clone(),
        url: entry.url.clone(),
        old_price: entry.previous_price?,
        new_price: entry.current_price?,
        change_pct: entry.change_pct?,
        severity: Severity::High,
        direction: direction_of(bps),
        detected_at,
        reached: Vec::new(),
        notified_user_count: None,
        notified_at: None,
    })
}

pub fn classify_all(changed: &[DiffEntry], threshold_bps: i64, detected_at: i64) -> Vec<VolatilityEvent> {
    changed
        .iter()
        .filter_map(|e| classify(e, threshold_bps, detected_at))
        .collect()
}
