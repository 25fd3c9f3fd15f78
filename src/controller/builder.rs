use std::collections::HashSet;
use std::marker::PhantomData;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use super::Controller;
use super::ControllerState;
use super::TypedWatch;
use super::WatchedType;
use crate::CacheProvider;
use crate::EngineConfig;
use crate::LifecycleError;
use crate::Reconciler;
use crate::Resource;
use crate::ResourceConfig;
use crate::Result;

/// Registration waiting for [`Controller::initialize`] to build its queue.
pub(crate) trait PendingWatch: Send + Sync {
    fn kind(&self) -> &str;

    fn resource(&self) -> &ResourceConfig;

    fn into_watched(
        self: Box<Self>,
        cache: Arc<dyn CacheProvider>,
        config: &EngineConfig,
    ) -> Arc<dyn WatchedType>;
}

struct Registration<O, R> {
    resource: ResourceConfig,
    reconciler: R,
    _object: PhantomData<fn() -> O>,
}

impl<O, R> PendingWatch for Registration<O, R>
where
    O: Resource,
    R: Reconciler<O>,
{
    fn kind(&self) -> &str {
        &self.resource.name
    }

    fn resource(&self) -> &ResourceConfig {
        &self.resource
    }

    fn into_watched(
        self: Box<Self>,
        cache: Arc<dyn CacheProvider>,
        config: &EngineConfig,
    ) -> Arc<dyn WatchedType> {
        let Registration {
            resource, reconciler, ..
        } = *self;
        Arc::new(TypedWatch::new(
            resource,
            reconciler,
            cache,
            &config.rate_limit,
            config.controller.default_workers,
        ))
    }
}

/// Collects the watched object types of a [`Controller`].
///
/// Each registration pairs a [`ResourceConfig`] with the reconciler for one
/// Rust type `O`; the engine is instantiated once per registration.
///
/// ```ignore
/// let controller = ControllerBuilder::new(config, cache)
///     .register::<Widget, _>(ResourceConfig::namespaced("widget"), WidgetReconciler)
///     .build()?;
/// ```
pub struct ControllerBuilder {
    config: EngineConfig,
    cache: Arc<dyn CacheProvider>,
    registrations: Vec<Box<dyn PendingWatch>>,
    error: Option<LifecycleError>,
}

impl ControllerBuilder {
    pub fn new(
        config: EngineConfig,
        cache: Arc<dyn CacheProvider>,
    ) -> Self {
        Self {
            config,
            cache,
            registrations: Vec::new(),
            error: None,
        }
    }

    /// Watches objects of type `O` described by `resource`.
    pub fn register<O, R>(
        mut self,
        resource: ResourceConfig,
        reconciler: R,
    ) -> Self
    where
        O: Resource,
        R: Reconciler<O>,
    {
        debug!(kind = %resource.name, object = std::any::type_name::<O>(), "register");
        self.registrations.push(Box::new(Registration::<O, R> {
            resource,
            reconciler,
            _object: PhantomData,
        }));
        self
    }

    /// Watches objects of type `O` described by the `[[resources]]` entry
    /// named `name`.
    pub fn register_configured<O, R>(
        self,
        name: &str,
        reconciler: R,
    ) -> Self
    where
        O: Resource,
        R: Reconciler<O>,
    {
        match self.config.resource(name).cloned() {
            Some(resource) => self.register::<O, R>(resource, reconciler),
            None => self.fail(LifecycleError::UnknownResource(name.to_string())),
        }
    }

    fn fail(
        mut self,
        error: LifecycleError,
    ) -> Self {
        self.error.get_or_insert(error);
        self
    }

    /// Validates the configuration and the registrations and returns a
    /// controller in the `Created` state.
    ///
    /// # Errors
    /// A configuration error for any setting `EngineConfig::validate` or
    /// `ResourceConfig::validate` rejects, or a lifecycle error for missing,
    /// unknown or duplicate registrations.
    pub fn build(self) -> Result<Controller> {
        if let Some(error) = self.error {
            return Err(error.into());
        }
        if self.registrations.is_empty() {
            return Err(LifecycleError::NoResources.into());
        }
        let config = self.config.validate()?;

        let mut kinds = HashSet::new();
        for registration in &self.registrations {
            registration.resource().validate()?;
            if !kinds.insert(registration.kind().to_string()) {
                return Err(LifecycleError::DuplicateResource(registration.kind().to_string()).into());
            }
        }

        let (state_tx, _) = watch::channel(ControllerState::Created);
        Ok(Controller {
            config,
            cache: self.cache,
            pending: self.registrations,
            watched: Vec::new(),
            state_tx,
        })
    }
}
