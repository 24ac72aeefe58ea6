//! Listener registries for mutation events.
//!
//! The network layer registers a callback per event category and per
//! active connection; after an accepted mutation the engine invokes every
//! relevant callback synchronously, while the mutated entity's lock is
//! still held, so listeners observe a consistent and ordered event
//! stream.
//!
//! Contract: a listener must not call back into a mutating operation of
//! the engine for the same entity. The entity lock is held during
//! delivery; re-entry would deadlock. Registering or unregistering
//! listeners from inside a callback is fine: delivery walks a snapshot
//! of the subscriber list, not the live one.

use std::sync::{Arc, Mutex};

use serde::Serialize;

use sapphire_shared::{HardwareId, LevelId, LevelProgress, UserId};

/// Handle returned by `add_*_listener`, used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(u64);

/// What happened to a level.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum LevelChange {
    Added,
    Removed,
    Rated,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct LevelEvent {
    pub level: LevelId,
    pub change: LevelChange,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct MessageEvent {
    /// Global index of the appended message.
    pub index: u64,
    pub author: UserId,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct ProgressEvent {
    pub hardware: HardwareId,
    pub level: LevelId,
    pub progress: LevelProgress,
    /// Counter value after the accepted write.
    pub progress_id: u64,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct AssociationEvent {
    pub hardware: HardwareId,
    pub peer: HardwareId,
}

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// One event category's subscriber list.
pub struct Registry<E> {
    inner: Mutex<RegistryInner<E>>,
}

struct RegistryInner<E> {
    next_handle: u64,
    listeners: Vec<(ListenerHandle, Callback<E>)>,
}

impl<E> Registry<E> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                next_handle: 0,
                listeners: Vec::new(),
            }),
        }
    }

    pub fn add(&self, callback: Box<dyn Fn(&E) + Send + Sync>) -> ListenerHandle {
        let mut inner = lock(&self.inner);
        let handle = ListenerHandle(inner.next_handle);
        inner.next_handle += 1;
        inner.listeners.push((handle, Arc::from(callback)));
        handle
    }

    /// Returns `true` if the handle was registered.
    pub fn remove(&self, handle: ListenerHandle) -> bool {
        let mut inner = lock(&self.inner);
        let before = inner.listeners.len();
        inner.listeners.retain(|(h, _)| *h != handle);
        inner.listeners.len() != before
    }

    /// Invoke every listener in registration order. The list is
    /// snapshotted first so a callback may add or remove listeners on
    /// this registry without deadlocking.
    pub fn notify(&self, event: &E) {
        let snapshot: Vec<Callback<E>> = lock(&self.inner)
            .listeners
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in snapshot {
            callback(event);
        }
    }
}

impl<E> Default for Registry<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// All four event categories the engine broadcasts.
pub struct Listeners {
    pub level: Registry<LevelEvent>,
    pub message: Registry<MessageEvent>,
    pub progress: Registry<ProgressEvent>,
    pub association: Registry<AssociationEvent>,
}

impl Listeners {
    pub fn new() -> Self {
        Self {
            level: Registry::new(),
            message: Registry::new(),
            progress: Registry::new(),
            association: Registry::new(),
        }
    }
}

impl Default for Listeners {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
