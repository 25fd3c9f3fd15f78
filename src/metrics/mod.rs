//! Prometheus metrics for queues and reconciliation, served on `/metrics`.

use std::sync::Once;

use lazy_static::lazy_static;
use prometheus::core::Collector;
use prometheus::exponential_buckets;
use prometheus::Encoder;
use prometheus::HistogramOpts;
use prometheus::HistogramVec;
use prometheus::IntCounterVec;
use prometheus::IntGaugeVec;
use prometheus::Opts;
use prometheus::Registry;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use warp::Filter;
use warp::Rejection;
use warp::Reply;

lazy_static! {
    pub static ref QUEUE_DEPTH: IntGaugeVec = IntGaugeVec::new(
        Opts::new("reconcile_queue_depth", "Keys waiting to be handed to a worker"),
        &["kind"]
    )
    .expect("metric can not be created");

    pub static ref QUEUE_ADDS: IntCounterVec = IntCounterVec::new(
        Opts::new("reconcile_queue_adds_total", "Keys accepted by the work queue"),
        &["kind"]
    )
    .expect("metric can not be created");

    pub static ref QUEUE_RETRIES: IntCounterVec = IntCounterVec::new(
        Opts::new("reconcile_queue_retries_total", "Rate limited re-adds after a failure"),
        &["kind"]
    )
    .expect("metric can not be created");

    pub static ref RECONCILE_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new("reconcile_duration_seconds", "Time spent dispatching one key")
            .buckets(exponential_buckets(0.001, 2.0, 16).expect("valid buckets")),
        &["kind"]
    )
    .expect("metric can not be created");

    pub static ref RECONCILE_ERRORS: IntCounterVec = IntCounterVec::new(
        Opts::new("reconcile_errors_total", "Failed reconciliations by reason"),
        &["kind", "reason"]
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

static REGISTER_ONCE: Once = Once::new();

/// Registers every engine metric with `registry`.
pub fn register_custom_metrics(registry: &Registry) -> prometheus::Result<()> {
    let collectors: Vec<Box<dyn Collector>> = vec![
        Box::new(QUEUE_DEPTH.clone()),
        Box::new(QUEUE_ADDS.clone()),
        Box::new(QUEUE_RETRIES.clone()),
        Box::new(RECONCILE_DURATION.clone()),
        Box::new(RECONCILE_ERRORS.clone()),
    ];
    for collector in collectors {
        registry.register(collector)?;
    }
    Ok(())
}

/// Serves `/metrics` on `port` until `shutdown_signal` fires.
pub async fn start_server(
    port: u16,
    mut shutdown_signal: watch::Receiver<()>,
) {
    REGISTER_ONCE.call_once(|| {
        if let Err(e) = register_custom_metrics(&REGISTRY) {
            error!("could not register metrics: {:?}", e);
        }
    });

    let metrics_route = warp::path!("metrics").and_then(metrics_handler);

    info!(port, "metrics server listening");
    let (_, server) =
        warp::serve(metrics_route).bind_with_graceful_shutdown(([0, 0, 0, 0], port), async move {
            let _ = shutdown_signal.changed().await;
        });
    server.await;
}

async fn metrics_handler() -> Result<impl Reply, Rejection> {
    Ok(encode_metrics(&REGISTRY))
}

/// Renders `registry` in the Prometheus text format.
pub fn encode_metrics(registry: &Registry) -> String {
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        error!("could not encode metrics: {}", e);
        return String::default();
    }
    match String::from_utf8(buffer) {
        Ok(v) => v,
        Err(e) => {
            error!("metrics could not be from_utf8'd: {}", e);
            String::default()
        }
    }
}
