//! Writable reactive cells.
//!
//! Reading a signal while a memo or effect runs subscribes that
//! computation. Writing a new value marks every subscriber dirty and
//! flushes the queued effects; writing a value equal to the current one
//! is a no-op, so idempotent writes from a render never loop.
//!
//! # Ownership
//!
//! A signal created inside a scope releases its subscriber set when the
//! scope is disposed. Reading or writing it afterwards still works, but
//! no computation created before the disposal hears about it.

use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use super::context::ReactiveContext;
use super::runtime::Runtime;
use super::scope::Scope;
use super::subscriber::SourceId;
use super::{Get, Set};

/// A shared, observable value. Clones refer to the same cell.
///
/// `PartialEq` on `T` decides whether a write is a change.
///
/// # Example
///
/// ```rust
/// use orbital_core::reactive::{Get, Set, Signal};
///
/// let count = Signal::new(0);
/// count.set(5);
/// assert_eq!(count.get(), 5);
/// ```
pub struct Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    id: SourceId,
    value: Arc<RwLock<T>>,
}

impl<T> Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a signal, released with the current scope if there is one.
    pub fn new(value: T) -> Self {
        let id = SourceId::new();
        if let Some(scope) = Scope::current() {
            scope.on_cleanup(move || Runtime::release_source(id));
        }
        Self {
            id,
            value: Arc::new(RwLock::new(value)),
        }
    }

    pub fn id(&self) -> SourceId {
        self.id
    }

    /// Read the value by reference, tracking the read.
    ///
    /// `f` sees a snapshot taken before it runs, so it may write to this
    /// signal.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.track();
        let snapshot = self.value.read().clone();
        f(&snapshot)
    }

    fn track(&self) {
        if let Some(subscriber_id) = ReactiveContext::track_dependency(self.id) {
            Runtime::add_dependency(self.id, subscriber_id);
        }
    }

    /// Write `f(current)`. The read lock is released before the write.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = f(&self.value.read());
        self.set(next);
    }

    /// Number of computations currently subscribed.
    pub fn subscriber_count(&self) -> usize {
        Runtime::subscriber_count(self.id)
    }

    /// Split into read and write halves sharing this signal.
    pub fn split(self) -> (ReadSignal<T>, WriteSignal<T>) {
        (ReadSignal(self.clone()), WriteSignal(self))
    }
}

impl<T> Get<T> for Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn get(&self) -> T {
        self.track();
        self.value.read().clone()
    }

    fn get_untracked(&self) -> T {
        self.value.read().clone()
    }
}

impl<T> Set<T> for Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Set a new value and notify subscribers if it differs.
    fn set(&self, value: T) {
        {
            let mut current = self.value.write();
            if *current == value {
                trace!(signal = self.id.raw(), "write of equal value ignored");
                return;
            }
            *current = value;
        }

        Runtime::notify_source_change(self.id);
    }
}

impl<T> Clone for Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
            id: self.id,
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + PartialEq + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.id)
            .field("value", &self.get_untracked())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Read half of a signal.
#[derive(Clone, Debug)]
pub struct ReadSignal<T>(Signal<T>)
where
    T: Clone + PartialEq + Send + Sync + 'static;

impl<T> Get<T> for ReadSignal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn get(&self) -> T {
        self.0.get()
    }

    fn get_untracked(&self) -> T {
        self.0.get_untracked()
    }
}

/// Write half of a signal.
#[derive(Clone, Debug)]
pub struct WriteSignal<T>(Signal<T>)
where
    T: Clone + PartialEq + Send + Sync + 'static;

impl<T> WriteSignal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Update the value from the current one.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        self.0.update(f);
    }
}

impl<T> Set<T> for WriteSignal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn set(&self, value: T) {
        self.0.set(value);
    }
}

/// Create a signal and return its read and write halves.
pub fn create_signal<T>(initial: T) -> (ReadSignal<T>, WriteSignal<T>)
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    Signal::new(initial).split()
}
