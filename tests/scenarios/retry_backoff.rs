use std::sync::Arc;
use std::time::Duration;

use reconcile_engine::MemoryCache;

use crate::common::test_config;
use crate::common::wait_until;
use crate::common::TestContext;
use crate::common::Widget;
use crate::common::WIDGET;

#[tokio::test(start_paused = true)]
async fn test_failing_handler_should_back_off_then_be_forgotten() {
    crate::enable_logger();
    let ctx = TestContext::start(test_config(), Arc::new(MemoryCache::new())).await;
    ctx.reconciler.fail_times("ns1/foo", 3);

    let key = ctx.cache.apply(WIDGET, Widget::new("ns1", "foo", "blue"));

    let reconciler = ctx.reconciler.clone();
    assert!(wait_until(Duration::from_secs(5), move || reconciler.call_times("ns1/foo").len() == 4).await);

    let times = ctx.reconciler.call_times("ns1/foo");
    let delays: Vec<Duration> = times.windows(2).map(|w| w[1] - w[0]).collect();
    assert_eq!(delays.len(), 3);
    assert!(delays.windows(2).all(|w| w[0] < w[1]), "{delays:?}");
    assert!(delays[0] >= Duration::from_millis(5), "{delays:?}");

    let controller = ctx.controller.clone();
    let forgotten_key = key.clone();
    assert!(
        wait_until(Duration::from_secs(1), move || {
            let status = controller.key_status(WIDGET, &forgotten_key).unwrap();
            status.requeues == 0 && !status.in_flight
        })
        .await
    );

    // No further redelivery once forgotten.
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(ctx.reconciler.call_times("ns1/foo").len(), 4);

    ctx.shutdown().await.unwrap();
}
