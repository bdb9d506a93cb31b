//! Named value namespaces.
//!
//! Each extension resolves names in its own namespace first and falls back
//! to the broker's shared namespace, so two extensions can use the same
//! private name without colliding. Names under a restricted broker prefix
//! resolve the other way round: the shared entry always wins, so an
//! extension cannot shadow a broker service.

use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

type Entry = Arc<dyn Any + Send + Sync>;

/// Prefixes owned by the broker.
pub const RESTRICTED_PREFIXES: &[&str] = &["gatehouse.api.", "gatehouse.services."];

/// Broker-supplied entries shared by every extension. Populated at startup
/// and read-mostly afterwards.
pub struct SharedNamespace {
    entries: RwLock<HashMap<String, Entry>>,
    restricted: Vec<String>,
}

impl Default for SharedNamespace {
    fn default() -> Self {
        Self::new(RESTRICTED_PREFIXES.iter().map(|p| (*p).to_owned()).collect())
    }
}

impl SharedNamespace {
    pub fn new(restricted: Vec<String>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            restricted,
        }
    }

    pub fn publish<T: Any + Send + Sync>(&self, name: impl Into<String>, value: T) {
        self.entries.write().insert(name.into(), Arc::new(value));
    }

    pub fn is_restricted(&self, name: &str) -> bool {
        self.restricted.iter().any(|prefix| name.starts_with(prefix.as_str()))
    }

    fn lookup(&self, name: &str) -> Option<Entry> {
        self.entries.read().get(name).cloned()
    }
}

/// Private namespace of one extension.
pub struct ExtensionNamespace {
    local: RwLock<HashMap<String, Entry>>,
    shared: Arc<SharedNamespace>,
}

impl ExtensionNamespace {
    pub(crate) fn new(shared: Arc<SharedNamespace>) -> Self {
        Self {
            local: RwLock::new(HashMap::new()),
            shared,
        }
    }

    pub fn define<T: Any + Send + Sync>(&self, name: impl Into<String>, value: T) {
        self.local.write().insert(name.into(), Arc::new(value));
    }

    /// Resolves `name` to a value of type `T`. A name bound to a value of
    /// another type does not resolve.
    pub fn resolve<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        let local = || self.local.read().get(name).cloned();
        let shared = || self.shared.lookup(name);
        let entry = if self.shared.is_restricted(name) {
            shared().or_else(local)
        } else {
            local().or_else(shared)
        }?;
        entry.downcast::<T>().ok()
    }
}
