use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reconcile_engine::Controller;
use reconcile_engine::ControllerBuilder;
use reconcile_engine::EngineConfig;
use reconcile_engine::HandlerResult;
use reconcile_engine::MemoryCache;
use reconcile_engine::Reconciler;
use reconcile_engine::Resource;
use reconcile_engine::ResourceConfig;
use reconcile_engine::Result;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing_subscriber::EnvFilter;

pub const WIDGET: &str = "widget";

static LOGGER_INIT: once_cell::sync::Lazy<()> = once_cell::sync::Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
});

pub fn enable_logger() {
    *LOGGER_INIT;
    println!("setup logger for integration test.");
}

#[derive(Debug, Clone, PartialEq)]
pub struct Widget {
    pub namespace: String,
    pub name: String,
    pub color: String,
}

impl Widget {
    pub fn new(
        namespace: &str,
        name: &str,
        color: &str,
    ) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            color: color.to_string(),
        }
    }
}

impl Resource for Widget {
    fn namespace(&self) -> Option<&str> {
        Some(&self.namespace)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Reconciled(Widget),
    Deleted(Widget),
}

/// Records every handler call with its time; fails scripted keys.
#[derive(Default)]
pub struct WidgetReconciler {
    events: Mutex<Vec<(Instant, String, Event)>>,
    failures: Mutex<HashMap<String, u32>>,
}

impl WidgetReconciler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_times(
        &self,
        key: &str,
        times: u32,
    ) {
        self.failures.lock().insert(key.to_string(), times);
    }

    pub fn events_for(
        &self,
        key: &str,
    ) -> Vec<Event> {
        self.events
            .lock()
            .iter()
            .filter(|(_, k, _)| k == key)
            .map(|(_, _, e)| e.clone())
            .collect()
    }

    pub fn call_times(
        &self,
        key: &str,
    ) -> Vec<Instant> {
        self.events
            .lock()
            .iter()
            .filter(|(_, k, _)| k == key)
            .map(|(at, _, _)| *at)
            .collect()
    }

    fn record(
        &self,
        widget: &Widget,
        event: Event,
    ) -> HandlerResult {
        let key = widget.key().to_string();
        self.events.lock().push((Instant::now(), key.clone(), event));

        let mut failures = self.failures.lock();
        if let Some(remaining) = failures.get_mut(&key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(format!("{key} is not ready yet").into());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Reconciler<Widget> for WidgetReconciler {
    async fn created_or_updated(
        &self,
        object: Arc<Widget>,
    ) -> HandlerResult {
        self.record(&object, Event::Reconciled((*object).clone()))
    }

    async fn deleted(
        &self,
        object: Arc<Widget>,
    ) -> HandlerResult {
        self.record(&object, Event::Deleted((*object).clone()))
    }
}

pub fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.controller.cache_sync_timeout_ms = 1_000;
    config.controller.cache_sync_poll_interval_ms = 10;
    config.resources = vec![ResourceConfig::namespaced(WIDGET)];
    config
}

pub struct TestContext {
    pub cache: Arc<MemoryCache>,
    pub reconciler: Arc<WidgetReconciler>,
    pub controller: Arc<Controller>,
    graceful_tx: watch::Sender<()>,
    handle: JoinHandle<Result<()>>,
}

impl TestContext {
    /// Starts a controller watching widgets and waits until it is running.
    pub async fn start(
        config: EngineConfig,
        cache: Arc<MemoryCache>,
    ) -> Self {
        let reconciler = WidgetReconciler::new();
        let mut controller = ControllerBuilder::new(config, cache.clone())
            .register_configured::<Widget, _>(WIDGET, reconciler.clone())
            .build()
            .expect("build controller");
        controller.initialize().expect("initialize controller");
        let controller = Arc::new(controller);

        let (graceful_tx, graceful_rx) = watch::channel(());
        let handle = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.run(graceful_rx).await })
        };

        let mut states = controller.subscribe_state();
        states
            .wait_for(|s| *s == reconcile_engine::ControllerState::Running)
            .await
            .expect("controller running");

        Self {
            cache,
            reconciler,
            controller,
            graceful_tx,
            handle,
        }
    }

    pub async fn shutdown(self) -> Result<()> {
        self.graceful_tx.send(()).expect("controller listening");
        self.handle.await.expect("controller task")
    }
}

pub async fn wait_until<F>(
    timeout: Duration,
    mut condition: F,
) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    while !condition() {
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    true
}
