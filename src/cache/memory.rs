use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::info;
use tracing::trace;

use super::CacheProvider;
use super::DeletedFinalState;
use super::DynObject;
use super::Notification;
use super::NotificationHandler;
use super::Tombstone;
use crate::CacheError;
use crate::ObjectKey;
use crate::Resource;
use crate::Result;

/// In-process cache provider.
///
/// Holds one mirror per object type and is driven by explicit calls
/// ([`MemoryCache::apply`], [`MemoryCache::delete`], ...). Used by the binary
/// as a stand-in for a real watch source, and by tests to script notification
/// sequences, including deletions of objects that were already evicted.
///
/// Notifications are only emitted for types whose sync has started, and always
/// after the internal lock is released.
pub struct MemoryCache {
    kinds: DashMap<String, KindStore>,
    list_latency: Duration,
}

#[derive(Default)]
struct KindStore {
    objects: HashMap<ObjectKey, DynObject>,
    /// Objects dropped from the mirror whose deletion has not been seen yet
    evicted: HashMap<ObjectKey, DynObject>,
    handlers: Vec<Arc<dyn NotificationHandler>>,
    started: bool,
    sync_blocked: bool,
    synced: Arc<AtomicBool>,
}

impl KindStore {
    fn take_handlers(&self) -> Vec<Arc<dyn NotificationHandler>> {
        if self.started {
            self.handlers.clone()
        } else {
            Vec::new()
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self {
            kinds: DashMap::new(),
            list_latency: Duration::ZERO,
        }
    }

    /// Delays the end of every initial listing by `latency`.
    pub fn with_list_latency(
        mut self,
        latency: Duration,
    ) -> Self {
        self.list_latency = latency;
        self
    }

    /// Inserts or replaces an object, notifying `Added` or `Updated`.
    pub fn apply<O>(
        &self,
        kind: &str,
        object: O,
    ) -> ObjectKey
    where
        O: Resource,
    {
        let key = object.key();
        let payload: DynObject = Arc::new(object);
        let (existed, handlers) = {
            let mut store = self.kinds.entry(kind.to_string()).or_default();
            store.evicted.remove(&key);
            let existed = store.objects.insert(key.clone(), payload).is_some();
            (existed, store.take_handlers())
        };

        let notification = if existed {
            Notification::Updated(key.clone())
        } else {
            Notification::Added(key.clone())
        };
        dispatch(&handlers, notification);
        key
    }

    /// Removes an object and notifies its deletion.
    ///
    /// An object previously [`evict`](Self::evict)ed is delivered as a
    /// [`Tombstone`]. Returns `false` when the key is unknown.
    pub fn delete(
        &self,
        kind: &str,
        key: &ObjectKey,
    ) -> bool {
        let (state, handlers) = {
            let Some(mut store) = self.kinds.get_mut(kind) else {
                return false;
            };
            let state = if let Some(obj) = store.objects.remove(key) {
                DeletedFinalState::Object(obj)
            } else if let Some(last_known) = store.evicted.remove(key) {
                DeletedFinalState::Tombstone(Tombstone {
                    key: key.clone(),
                    last_known,
                })
            } else {
                return false;
            };
            (state, store.take_handlers())
        };

        dispatch(&handlers, Notification::Deleted(key.clone(), state));
        true
    }

    /// Drops an object from the mirror without notifying anyone, as a watch
    /// source does when it loses track of an object before seeing its
    /// deletion.
    pub fn evict(
        &self,
        kind: &str,
        key: &ObjectKey,
    ) -> bool {
        let Some(mut store) = self.kinds.get_mut(kind) else {
            return false;
        };
        match store.objects.remove(key) {
            Some(obj) => {
                store.evicted.insert(key.clone(), obj);
                true
            }
            None => false,
        }
    }

    /// Delivers a raw notification to the subscribers of `kind`.
    pub fn emit(
        &self,
        kind: &str,
        notification: Notification,
    ) {
        let handlers = match self.kinds.get(kind) {
            Some(store) => store.take_handlers(),
            None => return,
        };
        dispatch(&handlers, notification);
    }

    /// Keeps `kind` from ever reporting synced.
    pub fn block_sync(
        &self,
        kind: &str,
    ) {
        self.kinds.entry(kind.to_string()).or_default().sync_blocked = true;
    }

    /// Re-notifies every cached object of `kind` as `Updated`.
    pub fn resync(
        &self,
        kind: &str,
    ) {
        let (keys, handlers) = {
            let Some(store) = self.kinds.get(kind) else {
                return;
            };
            (store.objects.keys().cloned().collect::<Vec<_>>(), store.take_handlers())
        };
        trace!(%kind, objects = keys.len(), "resync");
        for key in keys {
            dispatch(&handlers, Notification::Updated(key));
        }
    }

    /// Periodically resyncs every type until `shutdown` fires.
    pub fn spawn_resync(
        self: &Arc<Self>,
        period: Duration,
        mut shutdown: watch::Receiver<()>,
    ) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        debug!("resync loop stopped");
                        return;
                    }
                    _ = ticker.tick() => {
                        let kinds: Vec<String> = cache.kinds.iter().map(|e| e.key().clone()).collect();
                        for kind in kinds {
                            cache.resync(&kind);
                        }
                    }
                }
            }
        })
    }

    /// Number of objects currently mirrored for `kind`
    pub fn len(
        &self,
        kind: &str,
    ) -> usize {
        self.kinds.get(kind).map_or(0, |store| store.objects.len())
    }

    pub fn is_empty(
        &self,
        kind: &str,
    ) -> bool {
        self.len(kind) == 0
    }
}

impl CacheProvider for MemoryCache {
    fn subscribe(
        &self,
        kind: &str,
        handler: Arc<dyn NotificationHandler>,
    ) -> Result<()> {
        self.kinds.entry(kind.to_string()).or_default().handlers.push(handler);
        Ok(())
    }

    fn lookup(
        &self,
        kind: &str,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynObject>> {
        let store = self
            .kinds
            .get(kind)
            .ok_or_else(|| CacheError::UnknownKind(kind.to_string()))?;
        let key = ObjectKey::new(Some(namespace), name);
        Ok(store.objects.get(&key).cloned())
    }

    fn start_sync(
        &self,
        kind: &str,
    ) -> Result<()> {
        let (keys, handlers, synced, blocked) = {
            let mut store = self.kinds.entry(kind.to_string()).or_default();
            if store.started {
                return Ok(());
            }
            store.started = true;
            (
                store.objects.keys().cloned().collect::<Vec<_>>(),
                store.handlers.clone(),
                store.synced.clone(),
                store.sync_blocked,
            )
        };

        info!(%kind, objects = keys.len(), "initial listing");
        for key in keys {
            dispatch(&handlers, Notification::Added(key));
        }

        if blocked {
            debug!(%kind, "sync blocked");
        } else if self.list_latency.is_zero() {
            synced.store(true, Ordering::Release);
        } else {
            let latency = self.list_latency;
            tokio::spawn(async move {
                tokio::time::sleep(latency).await;
                synced.store(true, Ordering::Release);
            });
        }
        Ok(())
    }

    fn is_synced(
        &self,
        kind: &str,
    ) -> bool {
        self.kinds
            .get(kind)
            .is_some_and(|store| store.synced.load(Ordering::Acquire))
    }
}

fn dispatch(
    handlers: &[Arc<dyn NotificationHandler>],
    notification: Notification,
) {
    for handler in handlers {
        handler.on_notification(notification.clone());
    }
}
