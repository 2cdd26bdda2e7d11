use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::warn;

use crate::health::ServiceHealthInfo;

/// Listener for health status transitions.
pub type StatusCallback =
    Arc<dyn Fn(&str, &ServiceHealthInfo) -> anyhow::Result<()> + Send + Sync>;

/// Handle returned by registration, used to remove a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

/// Shared registry of status callbacks.
///
/// Cloning yields another handle to the same registry.
#[derive(Clone, Default)]
pub struct StatusCallbacks {
    entries: Arc<RwLock<Vec<(CallbackId, StatusCallback)>>>,
    next_id: Arc<AtomicU64>,
}

impl StatusCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&str, &ServiceHealthInfo) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = CallbackId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(callback)));
        id
    }

    /// Returns whether a callback was registered under `id`.
    pub fn remove(&self, id: CallbackId) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invokes every callback, logging errors and panics.
    ///
    /// The registry lock is released before any callback runs, so callbacks
    /// may register or remove callbacks themselves.
    pub fn notify(&self, service: &str, info: &ServiceHealthInfo) {
        let snapshot: Vec<(CallbackId, StatusCallback)> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for (id, callback) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| callback(service, info))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(service, callback = id.0, "Status callback failed: {:#}", e);
                }
                Err(_) => {
                    warn!(service, callback = id.0, "Status callback panicked");
                }
            }
        }
    }
}

impl std::fmt::Debug for StatusCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusCallbacks")
            .field("registered", &self.len())
            .finish()
    }
}
