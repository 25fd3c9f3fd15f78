use std::sync::Arc;
use std::time::Duration;

use reconcile_engine::ControllerBuilder;
use reconcile_engine::ControllerState;
use reconcile_engine::Error;
use reconcile_engine::LifecycleError;
use reconcile_engine::MemoryCache;
use reconcile_engine::ResourceConfig;
use tokio::sync::watch;

use crate::common::test_config;
use crate::common::Widget;
use crate::common::WidgetReconciler;
use crate::common::WIDGET;

#[tokio::test(start_paused = true)]
async fn test_never_synced_cache_should_fail_startup_without_reconciling() {
    crate::enable_logger();
    let cache = Arc::new(MemoryCache::new());
    cache.apply(WIDGET, Widget::new("ns1", "foo", "blue"));
    cache.apply("gizmo", Widget::new("ns1", "g", "grey"));
    cache.block_sync(WIDGET);
    let reconciler = WidgetReconciler::new();

    let mut config = test_config();
    config.controller.cache_sync_timeout_ms = 300;
    let mut controller = ControllerBuilder::new(config, cache.clone())
        .register::<Widget, _>(ResourceConfig::namespaced(WIDGET), reconciler.clone())
        .register::<Widget, _>(ResourceConfig::namespaced("gizmo"), reconciler.clone())
        .build()
        .unwrap();
    controller.initialize().unwrap();
    let (_graceful_tx, graceful_rx) = watch::channel(());

    let err = controller.run(graceful_rx).await.unwrap_err();

    match err {
        Error::Lifecycle(LifecycleError::SyncTimeout { timeout, unsynced }) => {
            assert_eq!(timeout, Duration::from_millis(300));
            assert_eq!(unsynced, vec![WIDGET.to_string()]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(controller.state(), ControllerState::Stopped);
    assert!(reconciler.events_for("ns1/foo").is_empty());
    assert!(reconciler.events_for("ns1/g").is_empty());
}

#[tokio::test]
async fn test_dropping_the_signal_sender_before_sync_should_abort() {
    let cache = Arc::new(MemoryCache::new());
    cache.block_sync(WIDGET);
    let mut controller = ControllerBuilder::new(test_config(), cache)
        .register::<Widget, _>(ResourceConfig::namespaced(WIDGET), WidgetReconciler::new())
        .build()
        .unwrap();
    controller.initialize().unwrap();
    let (graceful_tx, graceful_rx) = watch::channel(());
    drop(graceful_tx);

    let err = controller.run(graceful_rx).await.unwrap_err();

    assert!(matches!(err, Error::Lifecycle(LifecycleError::SyncAborted)));
}
