use std::sync::Arc;
use std::time::Duration;

use reconcile_engine::MemoryCache;
use reconcile_engine::ObjectKey;

use crate::common::test_config;
use crate::common::wait_until;
use crate::common::Event;
use crate::common::TestContext;
use crate::common::Widget;
use crate::common::WIDGET;

#[tokio::test]
async fn test_created_widget_should_be_reconciled_and_leave_no_queue_state() {
    crate::enable_logger();
    let ctx = TestContext::start(test_config(), Arc::new(MemoryCache::new())).await;

    let key = ctx.cache.apply(WIDGET, Widget::new("ns1", "foo", "blue"));

    let reconciler = ctx.reconciler.clone();
    assert!(wait_until(Duration::from_secs(2), move || !reconciler.events_for("ns1/foo").is_empty()).await);
    let controller = ctx.controller.clone();
    let settled_key = key.clone();
    assert!(
        wait_until(Duration::from_secs(2), move || {
            let status = controller.key_status(WIDGET, &settled_key).unwrap();
            !status.pending && !status.in_flight
        })
        .await
    );

    assert_eq!(
        ctx.reconciler.events_for("ns1/foo"),
        vec![Event::Reconciled(Widget::new("ns1", "foo", "blue"))]
    );
    let status = ctx.controller.key_status(WIDGET, &key).unwrap();
    assert_eq!(status.requeues, 0);
    assert!(!status.deletion_pending);

    ctx.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_objects_listed_before_start_should_be_reconciled_once_synced() {
    crate::enable_logger();
    let cache = Arc::new(MemoryCache::new());
    cache.apply(WIDGET, Widget::new("ns1", "a", "red"));
    cache.apply(WIDGET, Widget::new("ns2", "b", "green"));

    let ctx = TestContext::start(test_config(), cache).await;

    let reconciler = ctx.reconciler.clone();
    assert!(
        wait_until(Duration::from_secs(2), move || {
            reconciler.events_for("ns1/a").len() == 1 && reconciler.events_for("ns2/b").len() == 1
        })
        .await
    );
    let stats = ctx.controller.queue_stats(WIDGET).unwrap();
    assert_eq!(stats.pending, 0);
    assert!(ctx
        .controller
        .key_status(WIDGET, &ObjectKey::from("ns2/b"))
        .is_some());

    ctx.shutdown().await.unwrap();
}
