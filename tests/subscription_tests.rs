mod common;

use common::{day, harness};
use pricewatch::models::{Category, NotificationType};
use pricewatch::services::subscription_service;
use pricewatch::EngineError;

#[tokio::test]
async fn resubscribing_collapses_and_resets_notice() {
    let h = harness();

    let first = subscription_service::subscribe(&h.state, "U1", Category::Mac, 30_000, day(2024, 5, 1))
        .await
        .unwrap();
    h.state
        .subscriptions
        .mark_notified(first.id, NotificationType::PriceDrop, &[NotificationType::PriceDrop], 1, 10)
        .await
        .unwrap();

    let second = subscription_service::subscribe(&h.state, "U1", Category::Mac, 25_000, day(2024, 5, 3))
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.max_price, 25_000);
    assert_eq!(second.last_query_date, day(2024, 5, 3));
    assert!(!second.notice);
    assert!(second.notified_types.is_empty());
    assert_eq!(h.store.subscriptions().await.len(), 1);
}

#[tokio::test]
async fn different_categories_are_separate_subscriptions() {
    let h = harness();
    subscription_service::subscribe(&h.state, "U1", Category::Mac, 30_000, day(2024, 5, 1))
        .await
        .unwrap();
    subscription_service::subscribe(&h.state, "U1", Category::Ipad, 15_000, day(2024, 5, 1))
        .await
        .unwrap();

    assert_eq!(h.store.subscriptions().await.len(), 2);
    let mac = subscription_service::active_in_category(&h.state, Category::Mac).await.unwrap();
    assert_eq!(mac.len(), 1);
}

#[tokio::test]
async fn invalid_input_is_rejected() {
    let h = harness();

    let err = subscription_service::subscribe(&h.state, "  ", Category::Mac, 30_000, day(2024, 5, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let err = subscription_service::subscribe(&h.state, "U1", Category::Mac, 0, day(2024, 5, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[tokio::test]
async fn touch_refreshes_query_date_only_for_active() {
    let h = harness();
    subscription_service::subscribe(&h.state, "U1", Category::Airpods, 8_000, day(2024, 5, 1))
        .await
        .unwrap();

    assert!(subscription_service::touch_interest(&h.state, "U1", Category::Airpods, day(2024, 5, 9)).await.unwrap());
    assert_eq!(h.store.subscriptions().await[0].last_query_date, day(2024, 5, 9));

    assert!(subscription_service::unsubscribe(&h.state, "U1", Category::Airpods).await.unwrap());
    assert!(!subscription_service::touch_interest(&h.state, "U1", Category::Airpods, day(2024, 5, 10)).await.unwrap());
    assert!(!subscription_service::unsubscribe(&h.state, "U1", Category::Airpods).await.unwrap());
}

#[tokio::test]
async fn notified_subscription_leaves_unnotified_set() {
    let h = harness();
    let sub = subscription_service::subscribe(&h.state, "U1", Category::Mac, 30_000, day(2024, 5, 1))
        .await
        .unwrap();

    assert!(h.state.subscriptions.mark_notified(sub.id, NotificationType::NewProduct, &[NotificationType::NewProduct], 2, 10).await.unwrap());
    assert!(!h.state.subscriptions.mark_notified(sub.id, NotificationType::NewProduct, &[NotificationType::NewProduct], 2, 11).await.unwrap());

    let unnotified = h.state.subscriptions.find_unnotified(Some(Category::Mac)).await.unwrap();
    assert!(unnotified.is_empty());
}

#[tokio::test]
async fn notice_waits_for_every_matched_type() {
    let h = harness();
    let sub = subscription_service::subscribe(&h.state, "U1", Category::Ipad, 20_000, day(2024, 5, 1))
        .await
        .unwrap();
    let both = [NotificationType::PriceDrop, NotificationType::NewProduct];
    let reg = &h.state.subscriptions;

    assert!(reg.mark_notified(sub.id, NotificationType::PriceDrop, &both, 1, 10).await.unwrap());
    let after_drop = reg.get(sub.id).await.unwrap().unwrap();
    assert!(!after_drop.notice);
    assert!(after_drop.has_received(NotificationType::PriceDrop));
    assert_eq!(reg.find_unnotified(Some(Category::Ipad)).await.unwrap().len(), 1);

    assert!(!reg.mark_notified(sub.id, NotificationType::PriceDrop, &both, 1, 11).await.unwrap());
    assert!(reg.mark_notified(sub.id, NotificationType::NewProduct, &both, 1, 12).await.unwrap());

    let done = reg.get(sub.id).await.unwrap().unwrap();
    assert!(done.notice);
    assert_eq!(done.notification_count, 2);
    assert!(reg.find_unnotified(Some(Category::Ipad)).await.unwrap().is_empty());
}

#[tokio::test]
async fn interest_count_on_missing_subscription_reports_nothing_changed() {
    let h = harness();
    let missing = mongodb::bson::oid::ObjectId::new();
    assert!(!h.state.subscriptions.increment_interest_count(missing, 10).await.unwrap());

    let sub = subscription_service::subscribe(&h.state, "U1", Category::Mac, 30_000, day(2024, 5, 1))
        .await
        .unwrap();
    assert!(h.state.subscriptions.increment_interest_count(sub.id, 11).await.unwrap());
    assert_eq!(h.store.subscriptions().await[0].notification_count, 1);
}
