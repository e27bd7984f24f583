//! Result snapshots and change listeners.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use slab::Slab;

use crate::error::OperationError;
use crate::request::Executor;

/// The last committed state of an operation.
///
/// `loading` implies `called`.
#[derive(Debug, Clone, Default)]
pub struct ResultSnapshot {
    /// Whether the operation has been issued at least once.
    pub called: bool,
    /// Whether the latest invocation is still in flight.
    pub loading: bool,
    /// Data of the latest committed response.
    pub data: Option<Value>,
    /// Error of the latest committed settlement.
    pub error: Option<OperationError>,
}

impl ResultSnapshot {
    /// The state before anything has been issued.
    pub fn initial() -> Self {
        Self::default()
    }

    /// Deserialize the data into `T`. Returns `Ok(None)` when there is no data.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<Option<T>, serde_json::Error> {
        self.data.clone().map(serde_json::from_value).transpose()
    }
}

/// Read-only projection handed to consumers: the snapshot plus the client the
/// controller is bound to.
///
/// Derefs to [`ResultSnapshot`].
#[derive(Clone)]
pub struct OperationResult {
    /// The committed state.
    pub snapshot: ResultSnapshot,
    /// The executor the controller dispatches to.
    pub client: Arc<dyn Executor>,
}

impl Deref for OperationResult {
    type Target = ResultSnapshot;

    fn deref(&self) -> &ResultSnapshot {
        &self.snapshot
    }
}

impl fmt::Debug for OperationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationResult")
            .field("snapshot", &self.snapshot)
            .finish_non_exhaustive()
    }
}

/// Callback run after every snapshot change.
pub type Listener = Arc<dyn Fn(&ResultSnapshot) + Send + Sync>;

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerKey(usize);

#[derive(Default)]
pub(crate) struct Listeners {
    slots: Mutex<Slab<Listener>>,
}

impl Listeners {
    pub(crate) fn insert(&self, listener: Listener) -> ListenerKey {
        ListenerKey(self.slots.lock().insert(listener))
    }

    pub(crate) fn remove(&self, key: ListenerKey) -> bool {
        self.slots.lock().try_remove(key.0).is_some()
    }

    /// Run every listener. The slot lock is released first so listeners may
    /// subscribe or unsubscribe.
    pub(crate) fn notify(&self, snapshot: &ResultSnapshot) {
        let listeners: Vec<Listener> = self.slots.lock().iter().map(|(_, l)| l.clone()).collect();
        for listener in listeners {
            listener(snapshot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_unsubscribed_listener_is_not_notified() {
        let listeners = Listeners::default();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = hits.clone();
        let key = listeners.insert(Arc::new(move |_: &ResultSnapshot| {
            counter.fetch_add(1, Ordering::Relaxed);
        }));

        listeners.notify(&ResultSnapshot::initial());
        assert!(listeners.remove(key));
        assert!(!listeners.remove(key));
        listeners.notify(&ResultSnapshot::initial());

        assert_eq!(hits.load(Ordering::Relaxed), 1);
    }
}
