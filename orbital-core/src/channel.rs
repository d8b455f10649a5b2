//! Context Channel
//!
//! Tree-scoped value broadcast. Every component instance owns a
//! [`ContextNode`] whose parent is the node of the instance it was created
//! under. A provider is registered on a node; a consumer walks from its own
//! node towards the root and binds to the first provider of the same
//! [`Context`], so the nearest provider wins and exactly one responds.
//!
//! # Bindings
//!
//! A binding is an effect that copies the provider's memoized value into the
//! consumer's cell. It is owned by the consumer's ambient scope, so it goes
//! away with the consumer, and it is also recorded on the provider, so that
//! disposing the provider's scope silences every consumer bound to it.
//!
//! A consumer with no provider above it keeps `None` forever. That is a
//! valid state, not an error: components may run outside any provider.

use std::any::Any;
use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::reactive::{Disposer, Effect, Get, Memo, Scope, Set, Signal, SubscriberId};

static CONTEXT_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Identity of a context channel carrying values of type `T`.
///
/// Two contexts with the same name are still different channels; only the
/// same `Context` value (or a copy of it) matches.
pub struct Context<T> {
    id: u64,
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Context<T> {
    /// Create a new, distinct context.
    pub fn new(name: &'static str) -> Self {
        Self {
            id: CONTEXT_COUNTER.fetch_add(1, Ordering::Relaxed),
            name,
            _marker: PhantomData,
        }
    }

    /// The context's unique ID.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The name given at creation, for diagnostics.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for Context<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Context<T> {}

impl<T> PartialEq for Context<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Context<T> {}

impl<T> Debug for Context<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

/// Create a new context channel.
pub fn create_context<T>(name: &'static str) -> Context<T> {
    Context::new(name)
}

struct Provider<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    value: Memo<T>,
    /// Live bindings by the subscriber id of their effect.
    bindings: Mutex<IndexMap<SubscriberId, Disposer>>,
    closed: AtomicBool,
}

impl<T> Provider<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn bind(self: &Arc<Self>, target: Signal<Option<T>>) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        let value = self.value.clone();
        let effect = Effect::new(move || {
            let current = value.get();
            target.set(Some(current));
        });
        let id = effect.subscriber_id();
        self.bindings
            .lock()
            .insert(id, Disposer::new(Arc::new(effect)));

        if let Some(scope) = Scope::current() {
            let provider = Arc::downgrade(self);
            scope.on_cleanup(move || {
                if let Some(provider) = provider.upgrade() {
                    provider.bindings.lock().shift_remove(&id);
                }
            });
        }
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let bindings = std::mem::take(&mut *self.bindings.lock());
        for (_, binding) in bindings {
            binding.dispose();
        }
    }
}

type ProviderSlot = Arc<dyn Any + Send + Sync>;

struct NodeInner {
    id: u64,
    parent: Option<ContextNode>,
    providers: RwLock<IndexMap<u64, ProviderSlot>>,
}

/// A position in the context tree.
#[derive(Clone)]
pub struct ContextNode {
    inner: Arc<NodeInner>,
}

impl ContextNode {
    fn with_parent(parent: Option<ContextNode>) -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self {
            inner: Arc::new(NodeInner {
                id: COUNTER.fetch_add(1, Ordering::Relaxed),
                parent,
                providers: RwLock::new(IndexMap::new()),
            }),
        }
    }

    /// Create the root of a context tree (the document).
    pub fn root() -> Self {
        Self::with_parent(None)
    }

    /// Create a node below this one.
    pub fn child(&self) -> Self {
        Self::with_parent(Some(self.clone()))
    }

    /// The node's unique ID.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// The parent node, if this is not a root.
    pub fn parent(&self) -> Option<&ContextNode> {
        self.inner.parent.as_ref()
    }

    /// Provide `context` to this node and every node below it.
    ///
    /// `data` is memoized and re-evaluated when what it reads changes.
    /// Bound consumers stop receiving values when the ambient scope is
    /// disposed. Providing the same context twice on one node replaces the
    /// earlier provider for consumers that bind afterwards.
    pub fn provide<T, F>(&self, context: &Context<T>, data: F)
    where
        T: Clone + PartialEq + Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let provider = Arc::new(Provider {
            value: Memo::new(data),
            bindings: Mutex::new(IndexMap::new()),
            closed: AtomicBool::new(false),
        });

        if let Some(scope) = Scope::current() {
            let node = self.clone();
            let context_id = context.id;
            let owned = Arc::clone(&provider);
            scope.on_cleanup(move || {
                owned.close();
                let slot: ProviderSlot = owned;
                node.remove_provider(context_id, &slot);
            });
        }

        debug!(context = context.name, node = self.inner.id, "context provided");
        self.inner
            .providers
            .write()
            .insert(context.id, provider as ProviderSlot);
    }

    fn remove_provider(&self, context_id: u64, slot: &ProviderSlot) {
        let mut providers = self.inner.providers.write();
        if providers
            .get(&context_id)
            .is_some_and(|current| Arc::ptr_eq(current, slot))
        {
            providers.shift_remove(&context_id);
        }
    }

    fn find_provider<T>(&self, context: &Context<T>) -> Option<Arc<Provider<T>>>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
    {
        let mut node = Some(self);
        while let Some(current) = node {
            let slot = current.inner.providers.read().get(&context.id).cloned();
            if let Some(provider) = slot.and_then(|slot| slot.downcast::<Provider<T>>().ok()) {
                return Some(provider);
            }
            node = current.parent();
        }
        None
    }

    /// Check whether a provider for `context` is reachable from this node.
    pub fn has_provider<T>(&self, context: &Context<T>) -> bool
    where
        T: Clone + PartialEq + Send + Sync + 'static,
    {
        self.find_provider(context).is_some()
    }

    /// Bind to the nearest provider of `context`.
    ///
    /// The returned value follows the provider until either side's scope is
    /// disposed. Without a provider it stays `None`.
    pub fn consume<T>(&self, context: &Context<T>) -> ContextValue<T>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
    {
        let cell = Signal::new(None);
        match self.find_provider(context) {
            Some(provider) => provider.bind(cell.clone()),
            None => debug!(context = context.name, node = self.inner.id, "no provider; value stays unset"),
        }
        ContextValue { cell }
    }
}

impl Debug for ContextNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextNode")
            .field("id", &self.inner.id)
            .field("parent", &self.parent().map(ContextNode::id))
            .field("providers", &self.inner.providers.read().len())
            .finish()
    }
}

/// Read-only reactive view of a consumed context.
pub struct ContextValue<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    cell: Signal<Option<T>>,
}

impl<T> ContextValue<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Read the value by reference, tracking the read.
    pub fn with<R>(&self, f: impl FnOnce(Option<&T>) -> R) -> R {
        self.cell.with(|value| f(value.as_ref()))
    }
}

impl<T> Get<Option<T>> for ContextValue<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn get(&self) -> Option<T> {
        self.cell.get()
    }

    fn get_untracked(&self) -> Option<T> {
        self.cell.get_untracked()
    }
}

impl<T> Clone for ContextValue<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
        }
    }
}

impl<T> Debug for ContextValue<T>
where
    T: Clone + PartialEq + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ContextValue").field(&self.cell.get_untracked()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::run_in_scope;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn nearest_provider_wins() {
        let letter = create_context::<&'static str>("letter");
        let outer = ContextNode::root();
        let inner = outer.child();
        let leaf = inner.child();

        let (value, _scope) = run_in_scope(|| {
            outer.provide(&letter, || "A");
            inner.provide(&letter, || "B");
            leaf.consume(&letter)
        });

        assert_eq!(value.get(), Some("B"));
    }

    #[test]
    fn contexts_match_by_identity_not_name() {
        let first = create_context::<i32>("same");
        let second = create_context::<i32>("same");
        let root = ContextNode::root();

        let (value, _scope) = run_in_scope(|| {
            root.provide(&first, || 1);
            root.child().consume(&second)
        });

        assert_ne!(first, second);
        assert_eq!(value.get(), None);
    }

    #[test]
    fn orphan_consumer_stays_unset() {
        let theme = create_context::<String>("theme");
        let value = ContextNode::root().child().consume(&theme);
        assert_eq!(value.get(), None);
    }

    #[test]
    fn consumer_follows_provider_updates() {
        let count = create_context::<i32>("count");
        let root = ContextNode::root();
        let source = Signal::new(1);

        let (value, _scope) = run_in_scope(|| {
            let source = source.clone();
            root.provide(&count, move || source.get() * 10);
            root.child().consume(&count)
        });
        assert_eq!(value.get(), Some(10));

        source.set(2);
        assert_eq!(value.get(), Some(20));
    }

    #[test]
    fn provider_disposal_silences_consumers() {
        let count = create_context::<i32>("count");
        let root = ContextNode::root();
        let leaf = root.child();
        let source = Signal::new(1);
        let deliveries = Arc::new(AtomicI32::new(0));

        let (_, provider_scope) = run_in_scope(|| {
            let source = source.clone();
            root.provide(&count, move || source.get());
        });
        let (value, _consumer_scope) = run_in_scope(|| leaf.consume(&count));

        let watcher = Effect::new({
            let (value, deliveries) = (value.clone(), deliveries.clone());
            move || {
                value.get();
                deliveries.fetch_add(1, Ordering::SeqCst);
            }
        });
        assert_eq!(deliveries.load(Ordering::SeqCst), 1);

        provider_scope.dispose();
        source.set(5);
        assert_eq!(value.get(), Some(1));
        assert_eq!(deliveries.load(Ordering::SeqCst), 1);
        assert!(!leaf.has_provider(&count));
        watcher.dispose();
    }

    #[test]
    fn consumer_disposal_detaches_binding() {
        let count = create_context::<i32>("count");
        let root = ContextNode::root();
        let source = Signal::new(1);

        let (_, _provider_scope) = run_in_scope(|| {
            let source = source.clone();
            root.provide(&count, move || source.get());
        });
        let (value, consumer_scope) = run_in_scope(|| root.child().consume(&count));

        consumer_scope.dispose();
        source.set(3);
        assert_eq!(value.get(), Some(1));
    }

    #[test]
    fn disposed_consumers_release_their_bindings() {
        let count = create_context::<i32>("count");
        let root = ContextNode::root();
        let (_, _provider_scope) = run_in_scope(|| root.provide(&count, || 7));

        for _ in 0..100 {
            let (value, consumer_scope) = run_in_scope(|| root.child().consume(&count));
            assert_eq!(value.get(), Some(7));
            consumer_scope.dispose();
        }

        let provider = root.find_provider(&count).unwrap();
        assert!(provider.bindings.lock().is_empty());

        let (_, _live) = run_in_scope(|| root.child().consume(&count));
        assert_eq!(provider.bindings.lock().len(), 1);
    }
}
