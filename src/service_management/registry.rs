use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use crate::service_management::types::TrackedService;

/// Tracked services keyed by container id.
///
/// Readers take cheap snapshots; the reconciler is the only writer and swaps the
/// whole map at once, so a half-built registry is never observable.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    entries: RwLock<Arc<BTreeMap<String, TrackedService>>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Arc<BTreeMap<String, TrackedService>> {
        match self.entries.read() {
            Ok(guard) => Arc::clone(&*guard),
            Err(poisoned) => Arc::clone(&*poisoned.into_inner()),
        }
    }

    pub fn list(&self) -> Vec<TrackedService> {
        self.snapshot().values().cloned().collect()
    }

    pub fn get(&self, container_id: &str) -> Option<TrackedService> {
        self.snapshot().get(container_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Replaces every entry and returns the ids that were dropped.
    pub(crate) fn replace(&self, entries: BTreeMap<String, TrackedService>) -> Vec<String> {
        let next = Arc::new(entries);
        let mut guard = match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let dropped = guard
            .keys()
            .filter(|id| !next.contains_key(*id))
            .cloned()
            .collect();
        *guard = next;
        dropped
    }
}
