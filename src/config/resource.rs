use serde::Deserialize;
use serde::Serialize;

use super::invalid;
use crate::Result;

/// Identity scheme of a watched object type
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scope {
    /// Objects are keyed `namespace/name`
    #[default]
    Namespaced,
    /// Objects are keyed `name`
    Cluster,
}

impl Scope {
    pub fn is_namespaced(self) -> bool {
        self == Scope::Namespaced
    }
}

/// One watched object type: its identity scheme, the change events it is
/// subscribed to and the size of its worker pool.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ResourceConfig {
    /// Kind name, used as the cache key of the type and as log/metric label
    pub name: String,

    /// Plural form, informational only
    #[serde(default)]
    pub plural: String,

    #[serde(default)]
    pub scope: Scope,

    /// Reconcile on creation notifications
    #[serde(default = "default_true")]
    pub create: bool,

    /// Reconcile on update notifications
    #[serde(default = "default_true")]
    pub update: bool,

    /// Reconcile on deletion notifications
    #[serde(default = "default_true")]
    pub delete: bool,

    /// Worker loops for this type; falls back to `controller.default_workers`
    #[serde(default)]
    pub workers: Option<usize>,
}

impl ResourceConfig {
    /// A namespaced resource subscribed to every event
    pub fn namespaced(name: &str) -> Self {
        Self {
            name: name.to_string(),
            plural: format!("{name}s"),
            scope: Scope::Namespaced,
            create: true,
            update: true,
            delete: true,
            workers: None,
        }
    }

    /// A cluster-scoped resource subscribed to every event
    pub fn cluster(name: &str) -> Self {
        Self {
            scope: Scope::Cluster,
            ..Self::namespaced(name)
        }
    }

    pub fn with_workers(
        mut self,
        workers: usize,
    ) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn with_events(
        mut self,
        create: bool,
        update: bool,
        delete: bool,
    ) -> Self {
        self.create = create;
        self.update = update;
        self.delete = delete;
        self
    }

    pub fn workers_or(
        &self,
        default_workers: usize,
    ) -> usize {
        self.workers.unwrap_or(default_workers)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(invalid("resource name cannot be empty".into()));
        }
        if !(self.create || self.update || self.delete) {
            return Err(invalid(format!(
                "resource {:?} must subscribe to at least one of create/update/delete",
                self.name
            )));
        }
        if self.workers == Some(0) {
            return Err(invalid(format!("resource {:?} needs at least 1 worker", self.name)));
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}
