//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, memos, and
//! effects. It manages the dependency graph and schedules updates when
//! signals change.
//!
//! # How It Works
//!
//! 1. Memos and effects register with the runtime when created.
//!
//! 2. When a memo or effect reads a source, the runtime records the edge.
//!
//! 3. When a signal's value changes, the runtime:
//!    a. Marks its direct subscribers `Dirty`
//!    b. Marks everything downstream of a dirtied memo `MaybeDirty`
//!    c. Queues every effect that went from clean to stale, once
//!    d. Drains the queue. A `MaybeDirty` effect first pulls its upstream
//!       memos and only runs if one of them produced a new value
//!
//! Memos are lazy: nothing recomputes them except a read or a pull issued
//! by a stale dependent.
//!
//! # Thread Safety
//!
//! The graph lives in global concurrent maps so handles can move between
//! threads. The pending queue is thread-local: an update pass always
//! completes on the thread that performed the write.

use std::cell::RefCell;
use std::sync::{Arc, OnceLock, Weak};

use dashmap::DashMap;
use indexmap::{IndexMap, IndexSet};
use tracing::trace;

use super::context::Dependencies;
use super::subscriber::{DirtyState, SourceId, SubscriberId};

/// A node the runtime can mark, pull and re-run.
pub trait Reactive: Send + Sync {
    /// Get the subscriber ID for this reactive value.
    fn subscriber_id(&self) -> SubscriberId;

    /// The source ID under which dependents read this value (memos only).
    fn source_id(&self) -> Option<SourceId>;

    /// Current dirty state.
    fn state(&self) -> DirtyState;

    /// Overwrite the dirty state.
    fn set_state(&self, state: DirtyState);

    /// Sources read during the last run.
    fn sources(&self) -> Dependencies;

    /// Recompute (memo) or re-run (effect).
    fn update(&self);

    /// Check if this reactive value is an effect (eager) or memo (lazy).
    fn is_eager(&self) -> bool;
}

/// The global reactive runtime.
///
/// This is a singleton that manages all reactive values in the application.
#[derive(Debug)]
pub struct Runtime;

// Subscriber id -> node. Weak so that dropping the last handle frees a memo.
static REGISTRY: OnceLock<DashMap<SubscriberId, Weak<dyn Reactive>>> = OnceLock::new();
// Source id -> subscribers, in subscription order.
static SOURCE_SUBSCRIBERS: OnceLock<DashMap<SourceId, IndexSet<SubscriberId>>> = OnceLock::new();
// Memo source id -> memo subscriber id, for pulling upstream memos.
static DERIVED: OnceLock<DashMap<SourceId, SubscriberId>> = OnceLock::new();
// Effects created outside any scope stay alive here until disposed.
static DETACHED: OnceLock<DashMap<SubscriberId, Arc<dyn Reactive>>> = OnceLock::new();

fn get_registry() -> &'static DashMap<SubscriberId, Weak<dyn Reactive>> {
    REGISTRY.get_or_init(DashMap::new)
}

fn get_source_subscribers() -> &'static DashMap<SourceId, IndexSet<SubscriberId>> {
    SOURCE_SUBSCRIBERS.get_or_init(DashMap::new)
}

fn get_derived() -> &'static DashMap<SourceId, SubscriberId> {
    DERIVED.get_or_init(DashMap::new)
}

fn get_detached() -> &'static DashMap<SubscriberId, Arc<dyn Reactive>> {
    DETACHED.get_or_init(DashMap::new)
}

#[derive(Default)]
struct Pending {
    batch_depth: usize,
    flushing: bool,
    queue: IndexMap<SubscriberId, Arc<dyn Reactive>>,
}

thread_local! {
    static PENDING: RefCell<Pending> = RefCell::new(Pending::default());
}

/// Resets the flushing flag even if an effect panics mid-pass.
struct FlushGuard;

impl Drop for FlushGuard {
    fn drop(&mut self) {
        PENDING.with(|pending| {
            let mut pending = pending.borrow_mut();
            pending.flushing = false;
            pending.queue.clear();
        });
    }
}

struct BatchGuard;

impl Drop for BatchGuard {
    fn drop(&mut self) {
        PENDING.with(|pending| pending.borrow_mut().batch_depth -= 1);
    }
}

impl Runtime {
    /// Register a reactive value with the runtime.
    pub fn register(reactive: &Arc<dyn Reactive>) {
        let id = reactive.subscriber_id();
        get_registry().insert(id, Arc::downgrade(reactive));
        if let Some(source) = reactive.source_id() {
            get_derived().insert(source, id);
        }
    }

    /// Unregister a reactive value and drop every edge touching it.
    pub fn unregister(id: SubscriberId, source: Option<SourceId>, sources: &[SourceId]) {
        get_registry().remove(&id);
        get_detached().remove(&id);
        Self::clear_dependencies(id, sources);
        if let Some(source) = source {
            get_derived().remove(&source);
            get_source_subscribers().remove(&source);
        }
    }

    /// Keep an unowned effect alive until it is disposed.
    pub fn retain_detached(reactive: Arc<dyn Reactive>) {
        get_detached().insert(reactive.subscriber_id(), reactive);
    }

    /// Record that a subscriber depends on a source.
    ///
    /// Called automatically when a source is read within a reactive context.
    pub fn add_dependency(source: SourceId, subscriber_id: SubscriberId) {
        get_source_subscribers()
            .entry(source)
            .or_default()
            .insert(subscriber_id);
    }

    /// Remove the given edges for a subscriber.
    ///
    /// Called before re-running a computation to clear stale dependencies.
    pub fn clear_dependencies(subscriber_id: SubscriberId, sources: &[SourceId]) {
        let subscribers = get_source_subscribers();
        for source in sources {
            if let Some(mut subs) = subscribers.get_mut(source) {
                subs.shift_remove(&subscriber_id);
            }
        }
    }

    /// Forget every subscriber of a source that is going away.
    pub fn release_source(source: SourceId) {
        get_source_subscribers().remove(&source);
    }

    /// Number of subscribers currently registered on a source.
    pub fn subscriber_count(source: SourceId) -> usize {
        get_source_subscribers()
            .get(&source)
            .map(|subs| subs.len())
            .unwrap_or(0)
    }

    fn lookup(id: SubscriberId) -> Option<Arc<dyn Reactive>> {
        let weak = get_registry().get(&id).map(|entry| entry.value().clone())?;
        weak.upgrade()
    }

    fn derived(source: SourceId) -> Option<Arc<dyn Reactive>> {
        let id = get_derived().get(&source).map(|entry| *entry.value())?;
        Self::lookup(id)
    }

    fn subscribers_of(source: SourceId) -> Vec<SubscriberId> {
        get_source_subscribers()
            .get(&source)
            .map(|subs| subs.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Notify all subscribers that a source changed.
    ///
    /// This is the core update propagation mechanism. Unless a batch or an
    /// outer pass is already running, queued effects run before returning.
    pub fn notify_source_change(source: SourceId) {
        for id in Self::subscribers_of(source) {
            if let Some(reactive) = Self::lookup(id) {
                Self::mark_stale(&reactive, DirtyState::Dirty);
            }
        }
        Self::flush();
    }

    /// Mark the direct subscribers of a memo as definitely dirty.
    ///
    /// Called by a memo whose recomputation produced a new value. Dependents
    /// were already queued as `MaybeDirty` when the change started.
    pub fn mark_subscribers_dirty(source: SourceId) {
        for id in Self::subscribers_of(source) {
            if let Some(reactive) = Self::lookup(id) {
                if reactive.state() < DirtyState::Dirty {
                    reactive.set_state(DirtyState::Dirty);
                }
            }
        }
    }

    fn mark_stale(reactive: &Arc<dyn Reactive>, state: DirtyState) {
        let previous = reactive.state();
        if previous >= state {
            return;
        }
        reactive.set_state(state);
        if previous != DirtyState::Clean {
            return;
        }

        if reactive.is_eager() {
            PENDING.with(|pending| {
                pending
                    .borrow_mut()
                    .queue
                    .entry(reactive.subscriber_id())
                    .or_insert_with(|| Arc::clone(reactive));
            });
        } else if let Some(source) = reactive.source_id() {
            for id in Self::subscribers_of(source) {
                if let Some(downstream) = Self::lookup(id) {
                    Self::mark_stale(&downstream, DirtyState::MaybeDirty);
                }
            }
        }
    }

    /// Bring a node up to date, pulling stale upstream memos first.
    pub fn update_if_necessary(reactive: &Arc<dyn Reactive>) {
        if reactive.state() == DirtyState::MaybeDirty {
            for source in reactive.sources() {
                if let Some(upstream) = Self::derived(source) {
                    Self::update_if_necessary(&upstream);
                    if reactive.state() == DirtyState::Dirty {
                        break;
                    }
                }
            }
        }

        if reactive.state() == DirtyState::Dirty {
            reactive.update();
        }
        reactive.set_state(DirtyState::Clean);
    }

    /// Run `f`, deferring effects until it returns.
    ///
    /// An effect subscribed to several signals written inside the batch runs
    /// once.
    pub fn batch<R>(f: impl FnOnce() -> R) -> R {
        PENDING.with(|pending| pending.borrow_mut().batch_depth += 1);
        let result = {
            let _guard = BatchGuard;
            f()
        };
        Self::flush();
        result
    }

    fn flush() {
        let start = PENDING.with(|pending| {
            let mut pending = pending.borrow_mut();
            if pending.batch_depth > 0 || pending.flushing || pending.queue.is_empty() {
                false
            } else {
                pending.flushing = true;
                true
            }
        });
        if !start {
            return;
        }

        let _guard = FlushGuard;
        loop {
            let next = PENDING.with(|pending| {
                pending
                    .borrow_mut()
                    .queue
                    .shift_remove_index(0)
                    .map(|(_, reactive)| reactive)
            });
            let Some(reactive) = next else { break };
            trace!(subscriber = reactive.subscriber_id().raw(), "running queued effect");
            Self::update_if_necessary(&reactive);
        }
    }

    /// Get the current subscriber being tracked, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        super::context::ReactiveContext::current_subscriber()
    }

    /// Check if we're inside a reactive context.
    pub fn is_tracking() -> bool {
        super::context::ReactiveContext::is_active()
    }
}

/// Run `f`, deferring effects until it returns.
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    Runtime::batch(f)
}
