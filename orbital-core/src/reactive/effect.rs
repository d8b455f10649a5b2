//! Side effects driven by reactive reads.
//!
//! An effect runs once when created and again after anything it read
//! changes. Changes queue it by subscriber id, so a single propagation pass
//! runs it at most once. Each run starts from an empty dependency list.
//!
//! # Cleanup
//!
//! Every run happens inside its own scope. Cleanups registered with
//! [`on_cleanup`](super::on_cleanup) during a run, and any effect or memo
//! created during it, are torn down before the next run and when the
//! effect is disposed.
//!
//! # Ownership
//!
//! An effect created while a scope is ambient belongs to that scope. One
//! created outside any scope stays alive until [`Effect::dispose`] is called.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use super::context::{Dependencies, ReactiveContext};
use super::runtime::{Reactive, Runtime};
use super::scope::{Disposable, Disposer, Scope};
use super::subscriber::{DirtyState, SourceId, SubscriberId};

struct EffectInner {
    subscriber_id: SubscriberId,
    body: Box<dyn Fn() + Send + Sync>,
    sources: Mutex<Dependencies>,
    state: Mutex<DirtyState>,
    disposed: AtomicBool,
    runs: AtomicUsize,
    /// Owns whatever the latest run created.
    run_scope: Mutex<Option<Scope>>,
}

impl EffectInner {
    fn execute(&self) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }

        let previous = self.run_scope.lock().take();
        if let Some(previous) = previous {
            previous.dispose();
        }

        let old = std::mem::take(&mut *self.sources.lock());
        Runtime::clear_dependencies(self.subscriber_id, &old);

        let scope = Scope::root();
        *self.run_scope.lock() = Some(scope.clone());

        // Writes the run makes to its own dependencies must not queue it again.
        self.set_state(DirtyState::Dirty);
        let deps = scope.run(|| {
            let _ctx = ReactiveContext::enter(self.subscriber_id);
            (self.body)();
            ReactiveContext::get_dependencies()
        });
        self.set_state(DirtyState::Clean);

        if self.disposed.load(Ordering::SeqCst) {
            // Disposed by its own run; do not keep the edges it just made.
            Runtime::clear_dependencies(self.subscriber_id, &deps);
            return;
        }
        *self.sources.lock() = deps;
        let runs = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
        trace!(effect = self.subscriber_id.raw(), runs, "effect ran");
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let run_scope = self.run_scope.lock().take();
        if let Some(scope) = run_scope {
            scope.dispose();
        }
        let sources = std::mem::take(&mut *self.sources.lock());
        Runtime::unregister(self.subscriber_id, None, &sources);
    }
}

impl Reactive for EffectInner {
    fn subscriber_id(&self) -> SubscriberId {
        self.subscriber_id
    }

    fn source_id(&self) -> Option<SourceId> {
        None
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
        self.execute();
    }

    fn is_eager(&self) -> bool {
        true
    }
}

/// Handle to a running effect. Clones control the same effect.
///
/// # Example
///
/// ```rust
/// use orbital_core::reactive::{Effect, Get, Set, Signal};
///
/// let title = Signal::new(String::from("draft"));
/// let effect = Effect::new({
///     let title = title.clone();
///     move || {
///         let title = title.get();
///         tracing::debug!(%title, "title changed");
///     }
/// });
///
/// title.set("final".into());
/// assert_eq!(effect.run_count(), 2);
/// effect.dispose();
/// ```
#[derive(Clone)]
pub struct Effect {
    inner: Arc<EffectInner>,
}

impl Effect {
    /// Create an effect and run it once to collect its dependencies.
    pub fn new<F>(body: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let effect = Self::new_lazy(body);
        effect.execute();
        effect
    }

    /// Create an effect that stays idle until [`Effect::execute`].
    pub fn new_lazy<F>(body: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let inner = Arc::new(EffectInner {
            subscriber_id: SubscriberId::new(),
            body: Box::new(body),
            sources: Mutex::new(Dependencies::new()),
            state: Mutex::new(DirtyState::Clean),
            disposed: AtomicBool::new(false),
            runs: AtomicUsize::new(0),
            run_scope: Mutex::new(None),
        });
        let as_reactive: Arc<dyn Reactive> = inner.clone();
        Runtime::register(&as_reactive);

        let effect = Self { inner };
        match Scope::current() {
            Some(scope) => scope.own(Arc::new(effect.clone())),
            None => Runtime::retain_detached(as_reactive),
        }
        effect
    }

    pub fn subscriber_id(&self) -> SubscriberId {
        self.inner.subscriber_id
    }

    /// Run the body now, replacing the previous dependencies.
    pub fn execute(&self) {
        self.inner.execute();
    }

    /// Force a re-run, as if a direct dependency had changed.
    pub fn schedule(&self) {
        if !self.is_disposed() {
            self.inner.set_state(DirtyState::Dirty);
            let as_reactive: Arc<dyn Reactive> = self.inner.clone();
            Runtime::update_if_necessary(&as_reactive);
        }
    }

    /// Stop the effect for good and tear down its current run.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Completed runs so far.
    pub fn run_count(&self) -> usize {
        self.inner.runs.load(Ordering::SeqCst)
    }

    /// Sources the latest run read.
    pub fn dependency_count(&self) -> usize {
        self.inner.sources.lock().len()
    }
}

impl Disposable for Effect {
    fn dispose(&self) {
        Effect::dispose(self);
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.subscriber_id)
            .field("runs", &self.run_count())
            .field("sources", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Run `f` now and again whenever what it read changes.
///
/// The returned disposer removes every subscription.
pub fn create_effect<F>(f: F) -> Disposer
where
    F: Fn() + Send + Sync + 'static,
{
    Disposer::new(Arc::new(Effect::new(f)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{batch, on_cleanup, run_in_scope, Get, Memo, Set, Signal};
    use std::sync::atomic::AtomicI32;

    fn counter() -> (Arc<AtomicI32>, Arc<AtomicI32>) {
        let count = Arc::new(AtomicI32::new(0));
        (count.clone(), count)
    }

    #[test]
    fn eager_and_lazy_construction() {
        let (eager_runs, eager_body) = counter();
        let eager = Effect::new(move || {
            eager_body.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(eager_runs.load(Ordering::SeqCst), 1);

        let (lazy_runs, lazy_body) = counter();
        let lazy = Effect::new_lazy(move || {
            lazy_body.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(lazy.run_count(), 0);
        lazy.execute();
        assert_eq!(lazy_runs.load(Ordering::SeqCst), 1);
        assert_eq!(lazy.run_count(), 1);

        eager.dispose();
        lazy.dispose();
        assert!(eager.is_disposed() && lazy.is_disposed());
    }

    #[test]
    fn effect_does_not_run_after_disposal() {
        let signal = Signal::new(0);
        let (run_count, run_count_clone) = counter();

        let dispose = create_effect({
            let signal = signal.clone();
            move || {
                signal.get();
                run_count_clone.fetch_add(1, Ordering::SeqCst);
            }
        });
        assert_eq!(run_count.load(Ordering::SeqCst), 1);

        dispose.dispose();
        signal.set(1);
        signal.set(2);
        assert_eq!(run_count.load(Ordering::SeqCst), 1);
        assert_eq!(signal.subscriber_count(), 0);
    }

    #[test]
    fn stale_dependencies_are_pruned() {
        let flag = Signal::new(true);
        let left = Signal::new(1);
        let right = Signal::new(2);
        let (runs, runs_clone) = counter();

        let effect = Effect::new({
            let (flag, left, right) = (flag.clone(), left.clone(), right.clone());
            move || {
                runs_clone.fetch_add(1, Ordering::SeqCst);
                if flag.get() {
                    left.get();
                } else {
                    right.get();
                }
            }
        });
        assert_eq!(effect.dependency_count(), 2);

        flag.set(false);
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        left.set(10);
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        right.set(20);
        assert_eq!(runs.load(Ordering::SeqCst), 3);
        effect.dispose();
    }

    #[test]
    fn batched_writes_run_effect_once() {
        let a = Signal::new(0);
        let b = Signal::new(0);
        let (runs, runs_clone) = counter();

        let effect = Effect::new({
            let (a, b) = (a.clone(), b.clone());
            move || {
                a.get();
                b.get();
                runs_clone.fetch_add(1, Ordering::SeqCst);
            }
        });

        batch(|| {
            a.set(1);
            b.set(1);
        });
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        effect.dispose();
    }

    #[test]
    fn diamond_runs_effect_once_per_write() {
        let source = Signal::new(1);
        let doubled = Memo::new({
            let source = source.clone();
            move || source.get() * 2
        });
        let tripled = Memo::new({
            let source = source.clone();
            move || source.get() * 3
        });
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let effect = Effect::new({
            let (source, doubled, tripled, seen) =
                (source.clone(), doubled.clone(), tripled.clone(), seen.clone());
            move || seen.lock().push((source.get(), doubled.get(), tripled.get()))
        });

        source.set(2);
        assert_eq!(*seen.lock(), vec![(1, 2, 3), (2, 4, 6)]);
        effect.dispose();
    }

    #[test]
    fn unchanged_memo_does_not_rerun_effect() {
        let number = Signal::new(2);
        let is_even = Memo::new({
            let number = number.clone();
            move || number.get() % 2 == 0
        });
        let (runs, runs_clone) = counter();

        let effect = Effect::new({
            let is_even = is_even.clone();
            move || {
                is_even.get();
                runs_clone.fetch_add(1, Ordering::SeqCst);
            }
        });

        number.set(4);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        number.set(5);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        effect.dispose();
    }

    #[test]
    fn run_cleanups_fire_before_rerun_and_on_dispose() {
        let signal = Signal::new(0);
        let (cleanups, cleanups_clone) = counter();

        let effect = Effect::new({
            let signal = signal.clone();
            move || {
                signal.get();
                let cleanups = cleanups_clone.clone();
                on_cleanup(move || {
                    cleanups.fetch_add(1, Ordering::SeqCst);
                });
            }
        });

        assert_eq!(cleanups.load(Ordering::SeqCst), 0);
        signal.set(1);
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
        effect.dispose();
        assert_eq!(cleanups.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn scope_disposal_cuts_propagation() {
        let x = Signal::new(0);
        let (runs, runs_clone) = counter();

        let (_, disposer) = run_in_scope(|| {
            Effect::new({
                let x = x.clone();
                move || {
                    x.get();
                    runs_clone.fetch_add(1, Ordering::SeqCst);
                }
            });
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        disposer.dispose();
        x.set(1);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn effect_disposed_mid_pass_is_skipped() {
        let trigger = Signal::new(0);
        let (runs, runs_clone) = counter();
        let victim: Arc<parking_lot::Mutex<Option<Disposer>>> = Arc::default();

        // Subscribes first, so it runs first in the pass.
        let killer = Effect::new({
            let (trigger, victim) = (trigger.clone(), victim.clone());
            move || {
                if trigger.get() > 0 {
                    let disposer = victim.lock().take();
                    if let Some(disposer) = disposer {
                        disposer.dispose();
                    }
                }
            }
        });

        let (_, disposer) = run_in_scope(|| {
            Effect::new({
                let trigger = trigger.clone();
                move || {
                    trigger.get();
                    runs_clone.fetch_add(1, Ordering::SeqCst);
                }
            });
        });
        *victim.lock() = Some(disposer);

        trigger.set(1);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        killer.dispose();
    }
}
