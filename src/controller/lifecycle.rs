use std::fmt;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::builder::PendingWatch;
use super::KeyStatus;
use super::QueueStats;
use super::WatchedType;
use crate::CacheProvider;
use crate::EngineConfig;
use crate::LifecycleError;
use crate::ObjectKey;
use crate::Result;

/// Lifecycle of a [`Controller`].
///
/// `Created -> Initialized -> Syncing -> Running -> ShuttingDown -> Stopped`;
/// a failed startup jumps to `Stopped` from wherever it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Created,
    Initialized,
    Syncing,
    Running,
    ShuttingDown,
    Stopped,
}

impl ControllerState {
    pub fn can_transition_to(
        self,
        next: ControllerState,
    ) -> bool {
        use ControllerState::*;
        matches!(
            (self, next),
            (Created, Initialized)
                | (Initialized, Syncing)
                | (Syncing, Running)
                | (Running, ShuttingDown)
                | (ShuttingDown, Stopped)
                | (Created | Initialized | Syncing, Stopped)
        )
    }
}

impl fmt::Display for ControllerState {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Drives every registered object type from cache sync to shutdown.
pub struct Controller {
    pub(super) config: EngineConfig,
    pub(super) cache: Arc<dyn CacheProvider>,
    pub(super) pending: Vec<Box<dyn PendingWatch>>,
    pub(super) watched: Vec<Arc<dyn WatchedType>>,
    pub(super) state_tx: watch::Sender<ControllerState>,
}

impl fmt::Debug for Controller {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Controller")
            .field("kinds", &self.kinds())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Controller {
    pub fn state(&self) -> ControllerState {
        *self.state_tx.borrow()
    }

    /// Receiver following every state change
    pub fn subscribe_state(&self) -> watch::Receiver<ControllerState> {
        self.state_tx.subscribe()
    }

    /// Registered kinds, in registration order
    pub fn kinds(&self) -> Vec<String> {
        if self.watched.is_empty() {
            self.pending.iter().map(|p| p.kind().to_string()).collect()
        } else {
            self.watched.iter().map(|w| w.kind().to_string()).collect()
        }
    }

    pub fn queue_stats(
        &self,
        kind: &str,
    ) -> Option<QueueStats> {
        self.find(kind).map(|w| w.stats())
    }

    pub fn key_status(
        &self,
        kind: &str,
        key: &ObjectKey,
    ) -> Option<KeyStatus> {
        self.find(kind).map(|w| w.key_status(key))
    }

    fn find(
        &self,
        kind: &str,
    ) -> Option<&Arc<dyn WatchedType>> {
        self.watched.iter().find(|w| w.kind() == kind)
    }

    /// Builds every queue and subscribes it to the cache provider.
    ///
    /// Must be called from within a tokio runtime.
    pub fn initialize(&mut self) -> Result<()> {
        self.transition(ControllerState::Initialized)?;

        for pending in std::mem::take(&mut self.pending) {
            let watched = pending.into_watched(self.cache.clone(), &self.config);
            if let Err(e) = self
                .cache
                .subscribe(watched.kind(), watched.clone().notification_handler())
            {
                error!(kind = %watched.kind(), "subscribe failed: {:?}", e);
                self.watched.push(watched);
                self.abort_startup();
                return Err(e);
            }
            self.watched.push(watched);
        }
        info!(kinds = ?self.kinds(), "controller initialized");
        Ok(())
    }

    /// Starts the caches, waits for them to sync, runs the workers and
    /// returns after `shutdown` fires (or its sender is dropped) and every
    /// worker has drained its queue.
    ///
    /// Workers never start unless every type reported synced within
    /// `cache_sync_timeout_ms`; otherwise `SyncTimeout` is returned.
    pub async fn run(
        &self,
        mut shutdown: watch::Receiver<()>,
    ) -> Result<()> {
        self.transition(ControllerState::Syncing)?;

        info!("starting caches");
        for watched in &self.watched {
            if let Err(e) = self.cache.start_sync(watched.kind()) {
                error!(kind = %watched.kind(), "start sync failed: {:?}", e);
                self.abort_startup();
                return Err(e);
            }
        }

        if let Err(e) = self.wait_for_cache_sync(&mut shutdown).await {
            error!("{}", e);
            self.abort_startup();
            return Err(e);
        }

        self.transition(ControllerState::Running)?;
        let handles: Vec<JoinHandle<()>> = self
            .watched
            .iter()
            .flat_map(|w| w.clone().spawn_workers())
            .collect();
        info!(workers = handles.len(), "started workers");

        if shutdown.changed().await.is_err() {
            warn!("shutdown signal sender dropped, stopping");
        }

        self.transition(ControllerState::ShuttingDown)?;
        info!("shutting down workers");
        for watched in &self.watched {
            watched.shut_down();
        }
        self.join_workers(handles).await;

        self.transition(ControllerState::Stopped)?;
        info!("controller stopped");
        Ok(())
    }

    async fn wait_for_cache_sync(
        &self,
        shutdown: &mut watch::Receiver<()>,
    ) -> Result<()> {
        let timeout = self.config.controller.cache_sync_timeout();
        let deadline = Instant::now() + timeout;
        let mut ticker = tokio::time::interval(self.config.controller.cache_sync_poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("waiting for caches to sync");
        loop {
            let unsynced = self.unsynced_kinds();
            if unsynced.is_empty() {
                info!("caches synced");
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(LifecycleError::SyncTimeout { timeout, unsynced }.into());
            }
            debug!(?unsynced, "caches not synced yet");

            tokio::select! {
                _ = shutdown.changed() => {
                    return Err(LifecycleError::SyncAborted.into());
                }
                _ = ticker.tick() => {}
            }
        }
    }

    fn unsynced_kinds(&self) -> Vec<String> {
        self.watched
            .iter()
            .filter(|w| !self.cache.is_synced(w.kind()))
            .map(|w| w.kind().to_string())
            .collect()
    }

    async fn join_workers(
        &self,
        mut handles: Vec<JoinHandle<()>>,
    ) {
        let finished = match self.config.controller.shutdown_timeout() {
            Some(limit) => tokio::time::timeout(limit, join_all(handles.iter_mut()))
                .await
                .map(log_join_errors)
                .is_ok(),
            None => {
                log_join_errors(join_all(handles.iter_mut()).await);
                true
            }
        };

        if !finished {
            let remaining = handles.iter().filter(|h| !h.is_finished()).count();
            warn!(remaining, "workers did not drain before the shutdown timeout, aborting them");
            for handle in &handles {
                handle.abort();
            }
        }
    }

    /// Closes every queue built so far and marks the controller stopped.
    fn abort_startup(&self) {
        for watched in &self.watched {
            watched.shut_down();
        }
        self.state_tx.send_modify(|state| *state = ControllerState::Stopped);
    }

    fn transition(
        &self,
        next: ControllerState,
    ) -> Result<()> {
        let mut rejected = None;
        self.state_tx.send_if_modified(|state| {
            if state.can_transition_to(next) {
                debug!(from = %state, to = %next, "controller state");
                *state = next;
                true
            } else {
                rejected = Some(*state);
                false
            }
        });
        match rejected {
            Some(from) => Err(LifecycleError::InvalidTransition { from, to: next }.into()),
            None => Ok(()),
        }
    }
}

fn log_join_errors(results: Vec<std::result::Result<(), tokio::task::JoinError>>) {
    for result in results {
        if let Err(e) = result {
            error!("worker task failed: {:?}", e);
        }
    }
}
