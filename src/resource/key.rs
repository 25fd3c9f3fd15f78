use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::constants::NAMESPACE_SEPARATOR;
use crate::ReconcileError;
use crate::Scope;

/// Unique identity of one object within its type: `namespace/name` for
/// namespaced objects, `name` for cluster-scoped ones.
///
/// Keys are the only unit of queueing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey(String);

impl ObjectKey {
    pub fn new(
        namespace: Option<&str>,
        name: &str,
    ) -> Self {
        match namespace {
            Some(ns) if !ns.is_empty() => Self(format!("{ns}{NAMESPACE_SEPARATOR}{name}")),
            _ => Self(name.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Splits the key into `(namespace, name)` according to the type's scope.
    ///
    /// Cluster-scoped keys are used whole as the name. Namespaced keys must
    /// contain exactly one separator with non-empty parts on both sides.
    pub fn split(
        &self,
        kind: &str,
        scope: Scope,
    ) -> std::result::Result<(Option<&str>, &str), ReconcileError> {
        if !scope.is_namespaced() {
            if self.0.is_empty() {
                return Err(self.malformed(kind, "empty name"));
            }
            return Ok((None, &self.0));
        }

        let mut parts = self.0.split(NAMESPACE_SEPARATOR);
        match (parts.next(), parts.next(), parts.next()) {
            (Some(_), None, None) => Err(self.malformed(kind, "missing namespace separator")),
            (Some(""), Some(_), None) => Err(self.malformed(kind, "empty namespace")),
            (Some(_), Some(""), None) => Err(self.malformed(kind, "empty name")),
            (Some(ns), Some(name), None) => Ok((Some(ns), name)),
            _ => Err(self.malformed(kind, "unexpected extra separator")),
        }
    }

    fn malformed(
        &self,
        kind: &str,
        reason: &'static str,
    ) -> ReconcileError {
        ReconcileError::MalformedKey {
            kind: kind.to_string(),
            key: self.0.clone(),
            reason,
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for ObjectKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl AsRef<str> for ObjectKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
