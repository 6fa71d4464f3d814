use chrono::{NaiveDate, Utc};
use tracing::info;

use crate::error::{bounded, EngineError, EngineResult};
use crate::models::{Category, Subscription};
use crate::AppState;

/// Registers interest in a category under a price ceiling. A second call for
/// the same user and category updates the existing subscription and makes it
/// eligible for a price / new-product notification again.
pub async fn subscribe(
    state: &AppState,
    user_id: &str,
    category: Category,
    max_price: i64,
    today: NaiveDate,
) -> EngineResult<Subscription> {
    let user_id = user_id.trim();
    if user_id.is_empty() {
        return Err(EngineError::Validation("missing user id".to_string()));
    }
    if max_price <= 0 {
        return Err(EngineError::Validation("max price must be positive".to_string()));
    }

    let now = Utc::now().timestamp();
    let sub = bounded(
        state.settings.store_timeout,
        "upsert subscription",
        state.subscriptions.upsert(user_id, category, max_price, today, now),
    )
    .await?;

    info!(user_id, %category, max_price, subscription_id = %sub.id, "subscription saved");
    Ok(sub)
}

/// Records that the user looked at a category today, keeping them inside the
/// volatility window and out of the retention sweep.
pub async fn touch_interest(
    state: &AppState,
    user_id: &str,
    category: Category,
    today: NaiveDate,
) -> EngineResult<bool> {
    let now = Utc::now().timestamp();
    bounded(
        state.settings.store_timeout,
        "touch subscription",
        state.subscriptions.touch(user_id, category, today, now),
    )
    .await
}

/// Returns true if there was an active subscription to deactivate.
pub async fn unsubscribe(state: &AppState, user_id: &str, category: Category) -> EngineResult<bool> {
    let limit = state.settings.store_timeout;

    let Some(sub) = bounded(
        limit,
        "find subscription",
        state.subscriptions.find_by_user(user_id, category),
    )
    .await?
    else {
        return Ok(false);
    };

    let now = Utc::now().timestamp();
    bounded(limit, "deactivate", state.subscriptions.deactivate(sub.id, now)).await?;
    info!(user_id, %category, "subscription deactivated");
    Ok(true)
}

pub async fn active_in_category(state: &AppState, category: Category) -> EngineResult<Vec<Subscription>> {
    bounded(
        state.settings.store_timeout,
        "find_active",
        state.subscriptions.find_active(category),
    )
    .await
}
