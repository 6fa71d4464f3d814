mod common;

use common::{day, harness, item};
use pricewatch::models::{Category, Direction, NotificationType, Severity};
use pricewatch::services::{subscription_service, tracker};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn mac_drop_within_ceiling_gets_price_drop_and_volatility() {
    let h = harness();
    let cancel = CancellationToken::new();

    h.catalog.set(vec![item(Category::Mac, "MacBook Air", 35_000)]);
    tracker::run_tracking_cycle(&h.state, day(2024, 5, 1), &cancel).await.unwrap();

    subscription_service::subscribe(&h.state, "U1", Category::Mac, 30_000, day(2024, 5, 2))
        .await
        .unwrap();

    h.catalog.set(vec![item(Category::Mac, "MacBook Air", 28_000)]);
    let summary = tracker::run_tracking_cycle(&h.state, day(2024, 5, 2), &cancel).await.unwrap();

    assert_eq!(summary.changed, 1);
    assert_eq!(summary.volatility_events, 1);
    assert_eq!(summary.listings.delivered, 1);
    assert_eq!(summary.volatility.delivered, 1);

    let drops = h.transport.sent_of(NotificationType::PriceDrop);
    assert_eq!(drops.len(), 1);
    assert_eq!(drops[0].user_id, "U1");
    assert_eq!(h.transport.sent_of(NotificationType::PriceVolatility).len(), 1);

    let subs = h.store.subscriptions().await;
    assert!(subs[0].notice);
    assert_eq!(subs[0].notification_count, 2);

    let events = h.store.volatility_events().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].severity, Severity::High);
    assert_eq!(events[0].direction, Direction::Drop);
    assert_eq!(events[0].notified_user_count, Some(1));
}

#[tokio::test]
async fn mac_drop_above_ceiling_still_gets_volatility() {
    let h = harness();
    let cancel = CancellationToken::new();

    h.catalog.set(vec![item(Category::Mac, "MacBook Air", 35_000)]);
    tracker::run_tracking_cycle(&h.state, day(2024, 5, 1), &cancel).await.unwrap();

    subscription_service::subscribe(&h.state, "U1", Category::Mac, 20_000, day(2024, 5, 2))
        .await
        .unwrap();

    h.catalog.set(vec![item(Category::Mac, "MacBook Air", 28_000)]);
    tracker::run_tracking_cycle(&h.state, day(2024, 5, 2), &cancel).await.unwrap();

    assert!(h.transport.sent_of(NotificationType::PriceDrop).is_empty());
    assert_eq!(h.transport.sent_of(NotificationType::PriceVolatility).len(), 1);

    let subs = h.store.subscriptions().await;
    assert!(!subs[0].notice);
    assert_eq!(subs[0].notification_count, 1);
}

#[tokio::test]
async fn rerun_on_same_catalog_sends_nothing_new() {
    let h = harness();
    let cancel = CancellationToken::new();

    h.catalog.set(vec![item(Category::Mac, "MacBook Air", 35_000)]);
    tracker::run_tracking_cycle(&h.state, day(2024, 5, 1), &cancel).await.unwrap();
    subscription_service::subscribe(&h.state, "U1", Category::Mac, 30_000, day(2024, 5, 2))
        .await
        .unwrap();
    h.catalog.set(vec![item(Category::Mac, "MacBook Air", 28_000)]);
    tracker::run_tracking_cycle(&h.state, day(2024, 5, 2), &cancel).await.unwrap();
    let sent = h.transport.sent().len();

    let again = tracker::run_tracking_cycle(&h.state, day(2024, 5, 2), &cancel).await.unwrap();

    assert_eq!(again.changed, 0);
    assert_eq!(again.new, 0);
    assert_eq!(again.listings.intents, 0);
    assert_eq!(h.transport.sent().len(), sent);
    assert_eq!(h.store.snapshot_count().await, 3);
}

#[tokio::test]
async fn failed_send_is_picked_up_by_the_next_sweep() {
    let h = harness();
    let cancel = CancellationToken::new();

    subscription_service::subscribe(&h.state, "U1", Category::Ipad, 15_000, day(2024, 5, 1))
        .await
        .unwrap();

    h.transport.fail(true);
    h.catalog.set(vec![item(Category::Ipad, "iPad mini", 14_500)]);
    let summary = tracker::run_tracking_cycle(&h.state, day(2024, 5, 1), &cancel).await.unwrap();
    assert_eq!(summary.listings.transport_failures, 1);
    assert!(!h.store.subscriptions().await[0].notice);

    h.transport.fail(false);
    let sweep = tracker::run_notification_sweep(&h.state, day(2024, 5, 1), &cancel).await.unwrap();
    assert_eq!(sweep.delivered, 1);
    assert_eq!(h.transport.sent_of(NotificationType::NewProduct).len(), 1);
    assert!(h.store.subscriptions().await[0].notice);

    let quiet = tracker::run_notification_sweep(&h.state, day(2024, 5, 1), &cancel).await.unwrap();
    assert_eq!(quiet.intents, 0);
}

#[tokio::test]
async fn cancelled_cycle_stores_snapshot_but_sends_nothing() {
    let h = harness();
    let cancel = CancellationToken::new();
    cancel.cancel();

    subscription_service::subscribe(&h.state, "U1", Category::Ipad, 15_000, day(2024, 5, 1))
        .await
        .unwrap();
    h.catalog.set(vec![item(Category::Ipad, "iPad mini", 14_500)]);

    let summary = tracker::run_tracking_cycle(&h.state, day(2024, 5, 1), &cancel).await.unwrap();

    assert!(summary.listings.cancelled);
    assert!(h.transport.sent().is_empty());
    assert_eq!(h.store.snapshot_count().await, 1);
}

#[tokio::test]
async fn cleanup_deactivates_only_stale_subscriptions() {
    let h = harness();

    subscription_service::subscribe(&h.state, "OLD", Category::Mac, 30_000, day(2024, 1, 1))
        .await
        .unwrap();
    subscription_service::subscribe(&h.state, "NEW", Category::Mac, 30_000, day(2024, 2, 25))
        .await
        .unwrap();

    let n = tracker::run_cleanup(&h.state, day(2024, 3, 1)).await.unwrap();
    assert_eq!(n, 1);

    let subs = h.store.subscriptions().await;
    let old = subs.iter().find(|s| s.user_id == "OLD").unwrap();
    let new = subs.iter().find(|s| s.user_id == "NEW").unwrap();
    assert!(!old.active);
    assert!(old.deactivated_at.is_some());
    assert!(new.active);
}

#[tokio::test]
async fn failed_new_product_is_retried_after_price_drop_went_out() {
    let h = harness();
    let cancel = CancellationToken::new();

    h.catalog.set(vec![item(Category::Ipad, "iPad Air", 19_000)]);
    tracker::run_tracking_cycle(&h.state, day(2024, 5, 1), &cancel).await.unwrap();
    subscription_service::subscribe(&h.state, "U1", Category::Ipad, 20_000, day(2024, 5, 2))
        .await
        .unwrap();

    h.transport.fail_kind(Some(NotificationType::NewProduct));
    h.catalog.set(vec![
        item(Category::Ipad, "iPad Air", 18_000),
        item(Category::Ipad, "iPad mini", 13_000),
    ]);
    let cycle = tracker::run_tracking_cycle(&h.state, day(2024, 5, 2), &cancel).await.unwrap();
    assert_eq!(cycle.listings.intents, 2);
    assert_eq!(cycle.listings.delivered, 1);
    assert_eq!(cycle.listings.transport_failures, 1);

    let sub = h.store.subscriptions().await.remove(0);
    assert!(!sub.notice);
    assert!(sub.has_received(NotificationType::PriceDrop));

    h.transport.fail_kind(None);
    let sweep = tracker::run_notification_sweep(&h.state, day(2024, 5, 2), &cancel).await.unwrap();
    assert_eq!(sweep.intents, 1);
    assert_eq!(sweep.delivered, 1);

    assert_eq!(h.transport.sent_of(NotificationType::PriceDrop).len(), 1);
    assert_eq!(h.transport.sent_of(NotificationType::NewProduct).len(), 1);
    assert!(h.store.subscriptions().await[0].notice);

    let quiet = tracker::run_notification_sweep(&h.state, day(2024, 5, 2), &cancel).await.unwrap();
    assert_eq!(quiet.intents, 0);
}

#[tokio::test]
async fn drop_and_new_in_one_cycle_are_both_plain_deliveries() {
    let h = harness();
    let cancel = CancellationToken::new();

    h.catalog.set(vec![item(Category::Ipad, "iPad Air", 19_000)]);
    tracker::run_tracking_cycle(&h.state, day(2024, 5, 1), &cancel).await.unwrap();
    subscription_service::subscribe(&h.state, "U1", Category::Ipad, 20_000, day(2024, 5, 2))
        .await
        .unwrap();

    h.catalog.set(vec![
        item(Category::Ipad, "iPad Air", 18_000),
        item(Category::Ipad, "iPad mini", 13_000),
    ]);
    let cycle = tracker::run_tracking_cycle(&h.state, day(2024, 5, 2), &cancel).await.unwrap();

    assert_eq!(cycle.listings.delivered, 2);
    assert_eq!(cycle.listings.already_applied, 0);
    let sub = h.store.subscriptions().await.remove(0);
    assert!(sub.notice);
    assert_eq!(sub.notification_count, 2);
}

#[tokio::test]
async fn failed_volatility_send_keeps_event_pending_until_delivered() {
    let h = harness();
    let cancel = CancellationToken::new();

    h.catalog.set(vec![item(Category::Mac, "MacBook Air", 35_000)]);
    tracker::run_tracking_cycle(&h.state, day(2024, 5, 1), &cancel).await.unwrap();
    subscription_service::subscribe(&h.state, "U1", Category::Mac, 30_000, day(2024, 5, 2))
        .await
        .unwrap();

    h.transport.fail(true);
    h.catalog.set(vec![item(Category::Mac, "MacBook Air", 28_000)]);
    let cycle = tracker::run_tracking_cycle(&h.state, day(2024, 5, 2), &cancel).await.unwrap();
    assert_eq!(cycle.volatility.transport_failures, 1);

    let events = h.store.volatility_events().await;
    assert!(events[0].is_pending());
    assert!(events[0].reached.is_empty());

    h.transport.fail(false);
    tracker::run_notification_sweep(&h.state, day(2024, 5, 2), &cancel).await.unwrap();
    assert_eq!(h.transport.sent_of(NotificationType::PriceVolatility).len(), 1);
    assert_eq!(h.store.volatility_events().await[0].notified_user_count, Some(1));

    tracker::run_notification_sweep(&h.state, day(2024, 5, 2), &cancel).await.unwrap();
    assert_eq!(h.transport.sent_of(NotificationType::PriceVolatility).len(), 1);
}

#[tokio::test]
async fn volatility_retry_skips_users_already_reached() {
    let h = harness();
    let cancel = CancellationToken::new();

    h.catalog.set(vec![item(Category::Mac, "MacBook Air", 35_000)]);
    tracker::run_tracking_cycle(&h.state, day(2024, 5, 1), &cancel).await.unwrap();
    for user in ["U1", "U2"] {
        subscription_service::subscribe(&h.state, user, Category::Mac, 10_000, day(2024, 5, 2))
            .await
            .unwrap();
    }

    h.transport.fail_user(Some("U2"));
    h.catalog.set(vec![item(Category::Mac, "MacBook Air", 28_000)]);
    tracker::run_tracking_cycle(&h.state, day(2024, 5, 2), &cancel).await.unwrap();

    let events = h.store.volatility_events().await;
    assert!(events[0].is_pending());
    assert_eq!(events[0].reached.len(), 1);

    h.transport.fail_user(None);
    tracker::run_notification_sweep(&h.state, day(2024, 5, 2), &cancel).await.unwrap();

    let users: Vec<String> = h
        .transport
        .sent_of(NotificationType::PriceVolatility)
        .into_iter()
        .map(|i| i.user_id)
        .collect();
    assert_eq!(users, vec!["U1", "U2"]);
    assert_eq!(h.store.volatility_events().await[0].notified_user_count, Some(2));
}

#[tokio::test]
async fn huge_windows_clamp_instead_of_panicking() {
    let today = day(2024, 5, 10);
    assert_eq!(tracker::days_before(today, 3), day(2024, 5, 7));
    assert_eq!(tracker::days_before(today, -5), today);
    assert_eq!(tracker::days_before(today, i64::MAX), chrono::NaiveDate::MIN);

    let mut h = harness();
    h.state.settings.retention_days = i64::MAX;
    h.state.settings.volatility_window_days = i64::MAX;
    subscription_service::subscribe(&h.state, "U1", Category::Mac, 30_000, today)
        .await
        .unwrap();

    assert_eq!(tracker::run_cleanup(&h.state, today).await.unwrap(), 0);
    let cancel = CancellationToken::new();
    tracker::run_notification_sweep(&h.state, today, &cancel).await.unwrap();
}
