use std::time::Duration;

use reconcile_engine::queue::default_controller_rate_limiter;
use reconcile_engine::queue::RateLimitingQueue;
use reconcile_engine::ObjectKey;
use reconcile_engine::RateLimitConfig;

#[tokio::test]
async fn test_shut_down_should_drain_pending_keys_then_signal() {
    let queue: RateLimitingQueue<ObjectKey> =
        RateLimitingQueue::new("widget", default_controller_rate_limiter(&RateLimitConfig::default()));
    for i in 0..5 {
        assert!(queue.add(ObjectKey::from(format!("ns1/w{i}"))));
    }

    queue.shut_down();
    assert!(!queue.add(ObjectKey::from("ns1/late")));
    queue.add_after(ObjectKey::from("ns1/delayed"), Duration::from_millis(1));

    let mut drained = Vec::new();
    while let Some(key) = queue.get().await {
        queue.done(&key);
        drained.push(key.to_string());
    }

    assert_eq!(drained, vec!["ns1/w0", "ns1/w1", "ns1/w2", "ns1/w3", "ns1/w4"]);
    assert!(queue.get().await.is_none());
    assert!(queue.is_empty());
    assert_eq!(queue.in_flight_len(), 0);
}
