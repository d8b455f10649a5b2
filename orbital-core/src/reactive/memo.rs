//! Derived values.
//!
//! A memo caches the result of its computation and is pulled, never
//! pushed: a write upstream only flips its state. A direct source changing
//! makes it `Dirty`; an upstream memo that may have changed makes it
//! `MaybeDirty`, and the next read first refreshes those upstream memos,
//! recomputing only if one of them actually produced a new value.
//!
//! The dependency list is rebuilt on every recomputation, so a memo that
//! branches listens only to what the last taken branch read.

use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::trace;

use super::context::{Dependencies, ReactiveContext};
use super::runtime::{Reactive, Runtime};
use super::scope::{Disposable, Scope};
use super::subscriber::{DirtyState, SourceId, SubscriberId};
use super::Get;

struct MemoInner<T> {
    /// Identity dependents subscribe to.
    id: SourceId,
    /// Identity this memo's own reads are recorded under.
    subscriber_id: SubscriberId,
    compute: Box<dyn Fn() -> T + Send + Sync>,
    /// `None` until the first read.
    cached: RwLock<Option<T>>,
    state: Mutex<DirtyState>,
    sources: Mutex<Dependencies>,
    disposed: Mutex<bool>,
}

impl<T> MemoInner<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn recompute(&self) {
        let old = std::mem::take(&mut *self.sources.lock());
        Runtime::clear_dependencies(self.subscriber_id, &old);

        let (new_value, deps) = {
            let _ctx = ReactiveContext::enter(self.subscriber_id);
            let value = (self.compute)();
            (value, ReactiveContext::get_dependencies())
        };
        *self.sources.lock() = deps;

        let changed = {
            let mut cached = self.cached.write();
            let changed = cached.as_ref() != Some(&new_value);
            if changed {
                *cached = Some(new_value);
            }
            changed
        };
        *self.state.lock() = DirtyState::Clean;
        trace!(memo = self.id.raw(), changed, "memo recomputed");

        if changed {
            Runtime::mark_subscribers_dirty(self.id);
        }
    }
}

impl<T> Reactive for MemoInner<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn subscriber_id(&self) -> SubscriberId {
        self.subscriber_id
    }

    fn source_id(&self) -> Option<SourceId> {
        Some(self.id)
    }

    fn state(&self) -> DirtyState {
        *self.state.lock()
    }

    fn set_state(&self, state: DirtyState) {
        *self.state.lock() = state;
    }

    fn sources(&self) -> Dependencies {
        self.sources.lock().clone()
    }

    fn update(&self) {
        self.recompute();
    }

    fn is_eager(&self) -> bool {
        false
    }
}

impl<T> Drop for MemoInner<T> {
    fn drop(&mut self) {
        Runtime::unregister(self.subscriber_id, Some(self.id), &self.sources.lock());
    }
}

/// A lazily computed, cached value derived from other reactive values.
///
/// A recomputation that yields a value equal (`PartialEq`) to the cached
/// one stops there: dependents stay clean.
pub struct Memo<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    inner: Arc<MemoInner<T>>,
}

impl<T> Memo<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Wrap `compute`; nothing runs until the first read.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let inner = Arc::new(MemoInner {
            id: SourceId::new(),
            subscriber_id: SubscriberId::new(),
            compute: Box::new(compute),
            cached: RwLock::new(None),
            state: Mutex::new(DirtyState::Dirty),
            sources: Mutex::new(Dependencies::new()),
            disposed: Mutex::new(false),
        });
        let as_reactive: Arc<dyn Reactive> = inner.clone();
        Runtime::register(&as_reactive);

        let memo = Self { inner };
        if let Some(scope) = Scope::current() {
            scope.own(Arc::new(memo.clone()));
        }
        memo
    }

    pub fn id(&self) -> SourceId {
        self.inner.id
    }

    pub fn subscriber_id(&self) -> SubscriberId {
        self.inner.subscriber_id
    }

    /// Force a recomputation on the next read.
    pub fn mark_dirty(&self) {
        *self.inner.state.lock() = DirtyState::Dirty;
    }

    pub fn state(&self) -> DirtyState {
        *self.inner.state.lock()
    }

    /// Number of computations reading this memo.
    pub fn dependent_count(&self) -> usize {
        Runtime::subscriber_count(self.inner.id)
    }

    /// Whether the computation has run at least once.
    pub fn has_value(&self) -> bool {
        self.inner.cached.read().is_some()
    }

    fn is_disposed(&self) -> bool {
        *self.inner.disposed.lock()
    }

    fn read(&self) -> T {
        if self.is_disposed() {
            return super::context::untrack(|| (self.inner.compute)());
        }

        if self.state() != DirtyState::Clean {
            let as_reactive: Arc<dyn Reactive> = self.inner.clone();
            Runtime::update_if_necessary(&as_reactive);
        }

        match self.inner.cached.read().as_ref() {
            Some(value) => value.clone(),
            // Only reachable if the computation re-entered this memo.
            None => super::context::untrack(|| (self.inner.compute)()),
        }
    }
}

impl<T> Get<T> for Memo<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn get(&self) -> T {
        if let Some(subscriber_id) = ReactiveContext::track_dependency(self.inner.id) {
            Runtime::add_dependency(self.inner.id, subscriber_id);
        }
        self.read()
    }

    fn get_untracked(&self) -> T {
        self.read()
    }
}

impl<T> Disposable for Memo<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn dispose(&self) {
        let mut disposed = self.inner.disposed.lock();
        if *disposed {
            return;
        }
        *disposed = true;
        drop(disposed);
        let sources = std::mem::take(&mut *self.inner.sources.lock());
        Runtime::unregister(self.inner.subscriber_id, Some(self.inner.id), &sources);
    }
}

impl<T> Clone for Memo<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Debug for Memo<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memo")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("computed", &self.has_value())
            .field("dependents", &self.dependent_count())
            .finish()
    }
}

/// Create a lazily evaluated, cached derived value.
pub fn create_computed<T, F>(derive: F) -> Memo<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
    F: Fn() -> T + Send + Sync + 'static,
{
    Memo::new(derive)
}
