//! Component instances.
//!
//! A [`HostElement`] is one instance of a [`ComponentDefinition`] with the
//! Custom Elements lifecycle: construction runs setup and the first render,
//! `attribute_changed` feeds prop cells, `connected` and `disconnected` run
//! the mount and unmount callbacks, and `dispose` tears the instance down.

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use super::definition::{Callback, ComponentDefinition, ElementHandle, Lifecycle, Props, SetupApi};
use crate::channel::ContextNode;
use crate::reactive::{untrack, Effect, Scope, Set};
use crate::surface::Surface;
use crate::template::Event;

struct ElementInner {
    tag: Arc<str>,
    surface: Arc<dyn Surface>,
    scope: Scope,
    props: Props,
    context: ContextNode,
    lifecycle: Arc<Lifecycle>,
    render: Effect,
    connected: Arc<AtomicBool>,
    disposed: AtomicBool,
}

impl ElementInner {
    fn run_callbacks(&self, callbacks: &Mutex<Vec<Callback>>) {
        // Callbacks may deliver attributes or register more callbacks.
        let callbacks: Vec<Callback> = callbacks.lock().clone();
        self.scope.run(|| {
            untrack(|| {
                for callback in &callbacks {
                    callback();
                }
            })
        });
    }

    fn teardown(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.connected.swap(false, Ordering::SeqCst) {
            self.run_callbacks(&self.lifecycle.unmount);
        }
        self.scope.dispose();
        debug!(tag = %self.tag, "element disposed");
    }
}

impl Drop for ElementInner {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// A live component instance.
///
/// Clones share the instance. Dropping the last clone disposes it.
#[derive(Clone)]
pub struct HostElement {
    inner: Arc<ElementInner>,
}

impl HostElement {
    /// Construct an instance rendering into `surface`, below `parent` in the
    /// context tree.
    ///
    /// Setup runs here, untracked, followed by the first render.
    pub fn construct(
        tag: &str,
        definition: &ComponentDefinition,
        surface: Arc<dyn Surface>,
        parent: &ContextNode,
    ) -> Self {
        let tag: Arc<str> = Arc::from(tag);
        let scope = Scope::root();
        let context = parent.child();
        let lifecycle = Arc::new(Lifecycle::default());
        let connected = Arc::new(AtomicBool::new(false));
        let handle = ElementHandle::new(Arc::clone(&tag), Arc::clone(&surface), Arc::clone(&connected));

        let (props, render) = scope.run(|| {
            untrack(|| {
                let props = Props::from_schema(definition.schema());
                let api = SetupApi::new(handle, props.clone(), context.clone(), Arc::clone(&lifecycle));
                let render_fn = definition.run_setup(&api);
                let target = Arc::clone(&surface);
                let render = Effect::new(move || target.diff(&render_fn()));
                (props, render)
            })
        });
        debug!(tag = %tag, props = props.names().count(), "element constructed");

        Self {
            inner: Arc::new(ElementInner {
                tag,
                surface,
                scope,
                props,
                context,
                lifecycle,
                render,
                connected,
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// The tag the instance was created under.
    pub fn tag(&self) -> &str {
        &self.inner.tag
    }

    /// The instance's surface.
    pub fn surface(&self) -> &Arc<dyn Surface> {
        &self.inner.surface
    }

    /// The instance's prop cells.
    pub fn props(&self) -> &Props {
        &self.inner.props
    }

    /// The instance's node in the context tree. Children are created below it.
    pub fn context(&self) -> &ContextNode {
        &self.inner.context
    }

    /// The committed markup of the surface.
    pub fn content(&self) -> Option<String> {
        self.inner.surface.content()
    }

    /// Deliver an event to the rendered listeners.
    pub fn dispatch(&self, event: &Event) -> usize {
        if self.is_disposed() {
            warn!(tag = %self.inner.tag, event = event.kind(), "event dispatched to disposed element");
            return 0;
        }
        self.inner.surface.dispatch(event)
    }

    /// Number of times the render function has run.
    pub fn render_count(&self) -> usize {
        self.inner.render.run_count()
    }

    /// Whether the instance is connected.
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// Whether the instance has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// An observed attribute changed.
    ///
    /// The new value is written to the prop cell of the same name and the
    /// render effect re-runs before this returns. Undeclared names are
    /// ignored.
    pub fn attribute_changed(&self, name: &str, old: Option<&str>, new: Option<&str>) {
        if self.is_disposed() {
            warn!(tag = %self.inner.tag, name, "attribute change on disposed element");
            return;
        }
        match self.inner.props.signal(name) {
            Some(cell) => cell.set(new.map(str::to_owned)),
            None => trace!(tag = %self.inner.tag, name, ?old, ?new, "undeclared attribute ignored"),
        }
    }

    /// The element was inserted into a document.
    ///
    /// Mount callbacks run in registration order. A second call without a
    /// disconnect in between does nothing.
    pub fn connected(&self) {
        if self.is_disposed() {
            warn!(tag = %self.inner.tag, "connect on disposed element");
            return;
        }
        if self.inner.connected.swap(true, Ordering::SeqCst) {
            trace!(tag = %self.inner.tag, "already connected");
            return;
        }
        debug!(tag = %self.inner.tag, "element connected");
        self.inner.run_callbacks(&self.inner.lifecycle.mount);
    }

    /// The element was removed from its document.
    ///
    /// Unmount callbacks run in registration order.
    pub fn disconnected(&self) {
        if self.is_disposed() {
            warn!(tag = %self.inner.tag, "disconnect on disposed element");
            return;
        }
        if !self.inner.connected.swap(false, Ordering::SeqCst) {
            trace!(tag = %self.inner.tag, "not connected");
            return;
        }
        debug!(tag = %self.inner.tag, "element disconnected");
        self.inner.run_callbacks(&self.inner.lifecycle.unmount);
    }

    /// Tear the instance down.
    ///
    /// A connected instance is disconnected first. Effects, prop cells and
    /// context bindings are released; later lifecycle calls do nothing.
    pub fn dispose(&self) {
        self.inner.teardown();
    }
}

impl Debug for HostElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostElement")
            .field("tag", &self.inner.tag)
            .field("props", &self.inner.props)
            .field("connected", &self.is_connected())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
