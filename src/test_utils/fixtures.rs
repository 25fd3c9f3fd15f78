use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::HandlerResult;
use crate::Notification;
use crate::NotificationHandler;
use crate::ObjectKey;
use crate::Reconciler;
use crate::Resource;

#[derive(Debug, Clone, PartialEq)]
pub struct TestObject {
    pub namespace: Option<String>,
    pub name: String,
    pub generation: u64,
}

impl TestObject {
    pub fn namespaced(
        namespace: &str,
        name: &str,
    ) -> Self {
        Self {
            namespace: Some(namespace.to_string()),
            name: name.to_string(),
            generation: 1,
        }
    }

    pub fn cluster(name: &str) -> Self {
        Self {
            namespace: None,
            name: name.to_string(),
            generation: 1,
        }
    }

    pub fn with_generation(
        mut self,
        generation: u64,
    ) -> Self {
        self.generation = generation;
        self
    }
}

impl Resource for TestObject {
    fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// A second object type, used to feed a registration payloads it cannot downcast.
#[derive(Debug, Clone, PartialEq)]
pub struct OtherObject {
    pub name: String,
}

impl Resource for OtherObject {
    fn namespace(&self) -> Option<&str> {
        None
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Default)]
pub struct RecordingHandler {
    notifications: Mutex<Vec<Notification>>,
}

impl RecordingHandler {
    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().clone()
    }
}

impl NotificationHandler for RecordingHandler {
    fn on_notification(
        &self,
        notification: Notification,
    ) {
        self.notifications.lock().push(notification);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreatedOrUpdated(ObjectKey, u64),
    Deleted(ObjectKey, u64),
}

impl Call {
    pub fn key(&self) -> &ObjectKey {
        match self {
            Call::CreatedOrUpdated(key, _) | Call::Deleted(key, _) => key,
        }
    }
}

/// Reconciler recording every call, with scripted failures and panics.
#[derive(Default)]
pub struct RecordingReconciler {
    calls: Mutex<Vec<(Instant, Call)>>,
    failures: Mutex<HashMap<ObjectKey, u32>>,
    panics: Mutex<HashMap<ObjectKey, u32>>,
    delay: Mutex<Option<Duration>>,
    in_flight: Mutex<HashSet<ObjectKey>>,
    overlapped: AtomicBool,
}

impl RecordingReconciler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The next `times` calls for `key` return an error.
    pub fn fail_times(
        &self,
        key: &str,
        times: u32,
    ) {
        self.failures.lock().insert(ObjectKey::from(key), times);
    }

    /// The next `times` calls for `key` panic.
    pub fn panic_times(
        &self,
        key: &str,
        times: u32,
    ) {
        self.panics.lock().insert(ObjectKey::from(key), times);
    }

    /// Every call sleeps for `delay` before returning.
    pub fn set_delay(
        &self,
        delay: Duration,
    ) {
        *self.delay.lock() = Some(delay);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().iter().map(|(_, c)| c.clone()).collect()
    }

    /// Times at which `key` was handled, in order
    pub fn call_times(
        &self,
        key: &str,
    ) -> Vec<Instant> {
        let key = ObjectKey::from(key);
        self.calls
            .lock()
            .iter()
            .filter(|(_, c)| c.key() == &key)
            .map(|(at, _)| *at)
            .collect()
    }

    pub fn count_for(
        &self,
        key: &str,
    ) -> usize {
        self.call_times(key).len()
    }

    /// Whether two calls for the same key ever ran at the same time
    pub fn overlapped(&self) -> bool {
        self.overlapped.load(Ordering::SeqCst)
    }

    async fn handle(
        &self,
        call: Call,
    ) -> HandlerResult {
        let key = call.key().clone();
        if !self.in_flight.lock().insert(key.clone()) {
            self.overlapped.store(true, Ordering::SeqCst);
        }
        self.calls.lock().push((Instant::now(), call));

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.lock().remove(&key);

        if take_one(&self.panics, &key) {
            panic!("scripted panic for {key}");
        }
        if take_one(&self.failures, &key) {
            return Err(format!("scripted failure for {key}").into());
        }
        Ok(())
    }
}

fn take_one(
    budget: &Mutex<HashMap<ObjectKey, u32>>,
    key: &ObjectKey,
) -> bool {
    let mut budget = budget.lock();
    match budget.get_mut(key) {
        Some(remaining) if *remaining > 0 => {
            *remaining -= 1;
            true
        }
        _ => false,
    }
}

#[async_trait]
impl Reconciler<TestObject> for RecordingReconciler {
    async fn created_or_updated(
        &self,
        object: Arc<TestObject>,
    ) -> HandlerResult {
        self.handle(Call::CreatedOrUpdated(object.key(), object.generation))
            .await
    }

    async fn deleted(
        &self,
        object: Arc<TestObject>,
    ) -> HandlerResult {
        self.handle(Call::Deleted(object.key(), object.generation)).await
    }
}
