use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use async_trait::async_trait;
use reconcile_engine::metrics;
use reconcile_engine::utils::file_io::open_file_for_append;
use reconcile_engine::ControllerBuilder;
use reconcile_engine::EngineConfig;
use reconcile_engine::Error;
use reconcile_engine::HandlerResult;
use reconcile_engine::LifecycleError;
use reconcile_engine::MemoryCache;
use reconcile_engine::ObjectKey;
use reconcile_engine::Reconciler;
use reconcile_engine::Resource;
use reconcile_engine::Result;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

const LOG_FILE_NAME: &str = "reconcile.log";

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> ExitCode {
    let settings = match EngineConfig::new().and_then(EngineConfig::validate) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("invalid configuration: {e}");
            return ExitCode::from(1);
        }
    };

    // Initializing Logs
    let _guard = match init_observability(settings.controller.log_dir.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("failed to initialize logging: {e}");
            return ExitCode::from(1);
        }
    };

    match run(settings).await {
        Ok(()) => {
            info!("Exiting program.");
            ExitCode::SUCCESS
        }
        Err(e @ Error::Lifecycle(LifecycleError::SyncTimeout { .. })) => {
            error!("controller failed to start: {}", e);
            ExitCode::from(2)
        }
        Err(e) => {
            error!("controller stops: {}", e);
            ExitCode::from(1)
        }
    }
}

async fn run(settings: EngineConfig) -> Result<()> {
    // Initializing Shutdown Signal
    let (graceful_tx, graceful_rx) = watch::channel(());

    let cache = Arc::new(MemoryCache::new());
    seed_cache(&cache, &settings)?;
    if let Some(period) = settings.cache.resync_period() {
        cache.spawn_resync(period, graceful_rx.clone());
    }

    if settings.monitoring.prometheus_enabled {
        tokio::spawn(metrics::start_server(
            settings.monitoring.prometheus_port,
            graceful_rx.clone(),
        ));
    }

    let mut builder = ControllerBuilder::new(settings.clone(), cache.clone());
    for resource in &settings.resources {
        builder = builder.register::<DynamicObject, _>(resource.clone(), LoggingReconciler::new(&resource.name));
    }
    let mut controller = builder.build()?;
    controller.initialize()?;

    info!("Application started. Waiting for CTRL+C signal...");
    // Listen on Shutdown Signal
    tokio::spawn(async {
        if let Err(e) = graceful_shutdown(graceful_tx).await {
            error!("Failed to shutdown: {:?}", e);
        }
    });

    controller.run(graceful_rx).await
}

/// Loads `cache.seed` into the mirror; validation already matched every seed
/// to a declared resource.
fn seed_cache(
    cache: &MemoryCache,
    settings: &EngineConfig,
) -> Result<()> {
    for seed in &settings.cache.seed {
        let Some(resource) = settings.resource(&seed.kind) else {
            continue;
        };
        let key = ObjectKey::from(seed.key.as_str());
        let (namespace, name) = key.split(&resource.name, resource.scope)?;
        cache.apply(
            &seed.kind,
            DynamicObject {
                namespace: namespace.map(str::to_string),
                name: name.to_string(),
            },
        );
    }
    info!(objects = settings.cache.seed.len(), "cache seeded");
    Ok(())
}

async fn graceful_shutdown(graceful_tx: watch::Sender<()>) -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT detected.");
        },
        _ = sigterm.recv() => {
            info!("SIGTERM detected.");
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C detected.");
        },
    }

    graceful_tx.send(()).map_err(|e| {
        error!("Failed to send shutdown signal: {}", e);
        Error::SignalSenderClosed(format!("Failed to send shutdown signal: {}", e))
    })?;

    info!("Shutdown signal sent");
    Ok(())
}

/// Logs go to `<log_dir>/reconcile.log` when a directory is configured,
/// stdout otherwise. Filtered by `RUST_LOG`.
pub fn init_observability(log_dir: Option<&Path>) -> Result<WorkerGuard> {
    let (non_blocking, guard) = match log_dir {
        Some(dir) => tracing_appender::non_blocking(open_file_for_append(&dir.join(LOG_FILE_NAME))?),
        None => tracing_appender::non_blocking(std::io::stdout()),
    };

    let base_subscriber = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(base_subscriber).init();

    Ok(guard)
}

/// Schema-less object: the demo binary watches configured kinds without
/// knowing their payloads.
#[derive(Debug, Clone)]
struct DynamicObject {
    namespace: Option<String>,
    name: String,
}

impl Resource for DynamicObject {
    fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

struct LoggingReconciler {
    kind: String,
}

impl LoggingReconciler {
    fn new(kind: &str) -> Self {
        Self { kind: kind.to_string() }
    }
}

#[async_trait]
impl Reconciler<DynamicObject> for LoggingReconciler {
    async fn created_or_updated(
        &self,
        object: Arc<DynamicObject>,
    ) -> HandlerResult {
        info!(kind = %self.kind, key = %object.key(), "created or updated");
        Ok(())
    }

    async fn deleted(
        &self,
        object: Arc<DynamicObject>,
    ) -> HandlerResult {
        info!(kind = %self.kind, key = %object.key(), "deleted");
        Ok(())
    }
}
