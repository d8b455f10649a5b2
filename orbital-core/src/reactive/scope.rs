//! Ownership Scopes
//!
//! A scope is a disposal unit. Effects, memos and signals created while a
//! scope is ambient are owned by it, and so are child scopes opened inside
//! it. Disposing a scope tears all of that down in one call:
//!
//! 1. child scopes, depth-first
//! 2. owned effects and memos, in creation order
//! 3. cleanup callbacks, last registered first
//!
//! The ambient scope is a thread-local stack, like the tracking context.

use std::cell::RefCell;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{trace, warn};

/// Something a scope can tear down.
pub trait Disposable: Send + Sync {
    /// Release everything held. Calling it twice is a no-op.
    fn dispose(&self);
}

type Cleanup = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct ScopeState {
    children: Vec<Scope>,
    owned: Vec<Arc<dyn Disposable>>,
    cleanups: Vec<Cleanup>,
}

struct ScopeInner {
    id: u64,
    parent: Option<Weak<ScopeInner>>,
    state: Mutex<ScopeState>,
    disposed: AtomicBool,
}

/// A node in the ownership tree.
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

thread_local! {
    static SCOPE_STACK: RefCell<Vec<Option<Scope>>> = const { RefCell::new(Vec::new()) };
}

struct ScopeGuard;

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        SCOPE_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

fn enter(scope: Option<Scope>) -> ScopeGuard {
    SCOPE_STACK.with(|stack| stack.borrow_mut().push(scope));
    ScopeGuard
}

impl Scope {
    fn with_parent(parent: Option<&Scope>) -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self {
            inner: Arc::new(ScopeInner {
                id: COUNTER.fetch_add(1, Ordering::Relaxed),
                parent: parent.map(|p| Arc::downgrade(&p.inner)),
                state: Mutex::new(ScopeState::default()),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// Create a root scope with no parent.
    pub fn root() -> Self {
        Self::with_parent(None)
    }

    /// Create a child of the ambient scope, or a root if there is none.
    pub fn new() -> Self {
        match Self::current() {
            Some(parent) => parent.child(),
            None => Self::root(),
        }
    }

    /// Create a child of this scope.
    ///
    /// A child of an already disposed scope starts out disposed.
    pub fn child(&self) -> Self {
        let child = Self::with_parent(Some(self));
        if self.is_disposed() {
            child.inner.disposed.store(true, Ordering::SeqCst);
            return child;
        }
        self.inner.state.lock().children.push(child.clone());
        child
    }

    /// The ambient scope, if any.
    pub fn current() -> Option<Scope> {
        SCOPE_STACK.with(|stack| stack.borrow().last().cloned().flatten())
    }

    /// Get the scope's unique ID.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Run `f` with this scope ambient.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = enter(Some(self.clone()));
        f()
    }

    /// Take ownership of a disposable.
    ///
    /// Owning something on a disposed scope disposes it immediately.
    pub fn own(&self, item: Arc<dyn Disposable>) {
        if self.is_disposed() {
            item.dispose();
            return;
        }
        self.inner.state.lock().owned.push(item);
    }

    /// Register a callback to run when this scope is disposed.
    pub fn on_cleanup(&self, cleanup: impl FnOnce() + Send + 'static) {
        if self.is_disposed() {
            cleanup();
            return;
        }
        self.inner.state.lock().cleanups.push(Box::new(cleanup));
    }

    /// Check if the scope has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Dispose this scope and everything it owns.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        trace!(scope = self.inner.id, "disposing scope");

        let state = std::mem::take(&mut *self.inner.state.lock());
        for child in state.children {
            child.dispose();
        }
        for item in state.owned {
            item.dispose();
        }
        for cleanup in state.cleanups.into_iter().rev() {
            cleanup();
        }

        if let Some(parent) = self.inner.parent.as_ref().and_then(Weak::upgrade) {
            let id = self.inner.id;
            parent.state.lock().children.retain(|c| c.inner.id != id);
        }
    }

    /// Number of direct children.
    pub fn child_count(&self) -> usize {
        self.inner.state.lock().children.len()
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl Disposable for Scope {
    fn dispose(&self) {
        Scope::dispose(self);
    }
}

impl Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.inner.id)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Idempotent handle that tears something down.
#[derive(Clone)]
pub struct Disposer(Arc<dyn Disposable>);

impl Disposer {
    /// Wrap a disposable.
    pub fn new(target: Arc<dyn Disposable>) -> Self {
        Self(target)
    }

    /// Dispose the target. Later calls do nothing.
    pub fn dispose(&self) {
        self.0.dispose();
    }
}

impl Debug for Disposer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Disposer")
    }
}

/// Run `f` in a new child scope of the ambient one.
///
/// Returns `f`'s result and a disposer for the new scope.
pub fn run_in_scope<R>(f: impl FnOnce() -> R) -> (R, Disposer) {
    let scope = Scope::new();
    let result = scope.run(f);
    (result, Disposer::new(Arc::new(scope)))
}

/// Run `f` with no ambient scope: whatever it creates is unowned.
pub fn run_unowned<R>(f: impl FnOnce() -> R) -> R {
    let _guard = enter(None);
    f()
}

/// Register a cleanup on the ambient scope.
///
/// Outside any scope the callback can never run, so it is dropped.
pub fn on_cleanup(cleanup: impl FnOnce() + Send + 'static) {
    match Scope::current() {
        Some(scope) => scope.on_cleanup(cleanup),
        None => warn!("on_cleanup called outside of any scope; callback dropped"),
    }
}
