use std::sync::Arc;
use std::time::Duration;

use reconcile_engine::MemoryCache;

use crate::common::test_config;
use crate::common::wait_until;
use crate::common::Event;
use crate::common::TestContext;
use crate::common::Widget;
use crate::common::WIDGET;

#[tokio::test]
async fn test_deletion_of_evicted_widget_should_deliver_last_known_state() {
    crate::enable_logger();
    let ctx = TestContext::start(test_config(), Arc::new(MemoryCache::new())).await;
    let key = ctx.cache.apply(WIDGET, Widget::new("ns1", "bar", "purple"));
    let reconciler = ctx.reconciler.clone();
    assert!(wait_until(Duration::from_secs(2), move || reconciler.events_for("ns1/bar").len() == 1).await);

    assert!(ctx.cache.evict(WIDGET, &key));
    assert!(ctx.cache.delete(WIDGET, &key));

    let reconciler = ctx.reconciler.clone();
    assert!(wait_until(Duration::from_secs(2), move || reconciler.events_for("ns1/bar").len() == 2).await);
    assert_eq!(
        ctx.reconciler.events_for("ns1/bar")[1],
        Event::Deleted(Widget::new("ns1", "bar", "purple"))
    );

    let controller = ctx.controller.clone();
    assert!(
        wait_until(Duration::from_secs(1), move || {
            !controller.key_status(WIDGET, &key).unwrap().deletion_pending
        })
        .await
    );

    ctx.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_failed_deletion_should_be_retried_with_the_same_state() {
    crate::enable_logger();
    let ctx = TestContext::start(test_config(), Arc::new(MemoryCache::new())).await;
    let key = ctx.cache.apply(WIDGET, Widget::new("ns1", "gone", "red"));
    let reconciler = ctx.reconciler.clone();
    assert!(wait_until(Duration::from_secs(2), move || reconciler.events_for("ns1/gone").len() == 1).await);
    ctx.reconciler.fail_times("ns1/gone", 2);

    assert!(ctx.cache.delete(WIDGET, &key));

    let reconciler = ctx.reconciler.clone();
    assert!(wait_until(Duration::from_secs(2), move || reconciler.events_for("ns1/gone").len() == 4).await);
    let deletions = ctx.reconciler.events_for("ns1/gone").split_off(1);
    assert!(deletions
        .iter()
        .all(|e| *e == Event::Deleted(Widget::new("ns1", "gone", "red"))));

    ctx.shutdown().await.unwrap();
}
