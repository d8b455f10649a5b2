//! Rendering surfaces.
//!
//! A surface is the isolated subtree a component instance renders into
//! (a shadow root in a browser). Diffing is the surface's business: the
//! host only hands it the latest [`Template`].
//!
//! [`MemorySurface`] keeps the committed markup in memory. It is what the
//! element registry uses unless told otherwise, and what the tests inspect.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::template::{Event, Listener, Template};

/// Encapsulation mode of a surface, as in `attachShadow({ mode })`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShadowMode {
    /// Reachable from outside the element.
    #[default]
    Open,
    /// Hidden from outside the element.
    Closed,
}

/// An isolated rendering target owned by one component instance.
pub trait Surface: Send + Sync {
    /// Bring the surface in line with `template`.
    ///
    /// `Template::nothing()` removes all content.
    fn diff(&self, template: &Template);

    /// Deliver an event to the listeners of the committed template.
    ///
    /// Returns how many listeners handled it.
    fn dispatch(&self, event: &Event) -> usize;

    /// The committed markup, `None` when nothing is rendered.
    fn content(&self) -> Option<String>;
}

#[derive(Debug, Default)]
struct SurfaceState {
    content: Option<String>,
    listeners: Vec<Listener>,
    commits: usize,
}

/// A surface that keeps its content in memory.
#[derive(Debug, Default)]
pub struct MemorySurface {
    mode: ShadowMode,
    state: Mutex<SurfaceState>,
}

impl MemorySurface {
    /// Create an empty surface.
    pub fn new(mode: ShadowMode) -> Self {
        Self {
            mode,
            state: Mutex::new(SurfaceState::default()),
        }
    }

    /// Create an empty surface behind an `Arc`.
    pub fn shared(mode: ShadowMode) -> Arc<Self> {
        Arc::new(Self::new(mode))
    }

    /// The encapsulation mode.
    pub fn mode(&self) -> ShadowMode {
        self.mode
    }

    /// Number of diffs that actually changed the content.
    pub fn commit_count(&self) -> usize {
        self.state.lock().commits
    }
}

impl Surface for MemorySurface {
    fn diff(&self, template: &Template) {
        let mut state = self.state.lock();
        let next = template.markup();
        if state.content.as_deref() != next {
            state.content = next.map(str::to_owned);
            state.commits += 1;
            trace!(commits = state.commits, removed = next.is_none(), "surface committed");
        }
        state.listeners = template.listeners().to_vec();
    }

    fn dispatch(&self, event: &Event) -> usize {
        // Handlers may write signals that re-render this very surface.
        let listeners: Vec<Listener> = self
            .state
            .lock()
            .listeners
            .iter()
            .filter(|l| l.event() == event.kind())
            .cloned()
            .collect();
        for listener in &listeners {
            listener.call(event);
        }
        listeners.len()
    }

    fn content(&self) -> Option<String> {
        self.state.lock().content.clone()
    }
}
