//! Router Bridge
//!
//! A reactive wrapper around a client-side router. The router itself is
//! anything implementing [`Router`]: it owns location, matching and
//! loaders, and reports every change through its subscribers. The bridge
//! provides a router through the context channel and turns its callbacks
//! into signals and memos components can read.
//!
//! [`MemoryRouter`] is the in-memory implementation: a history stack, nested
//! route matching with `:param` segments, and sync or async loaders.

mod bridge;
mod memory;
mod outlet;
mod route;
mod state;

use std::fmt::Debug;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use bridge::{
    consume_loader_data, consume_location, consume_navigate, consume_router_state, link_handler,
    provide_router, router_context, LinkError, Navigate, RouterHandle,
};
pub use memory::{MemoryRouter, MemoryRouterConfig};
pub use outlet::{outlet_definition, OUTLET_TAG};
pub use route::{validate_routes, Loader, LoaderArgs, LoaderResult, RouteDescriptor};
pub use state::{Location, NavigationState, RouteMatch, RouterState};

/// Errors raised by routers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RouterError {
    /// Two routes in one table share an id.
    #[error("duplicate route id: {0}")]
    DuplicateRouteId(String),

    /// No route in the table matches the path.
    #[error("no route matches {0}")]
    NoMatch(String),

    /// An async loader had to run outside a tokio runtime.
    #[error("async loaders need a tokio runtime")]
    NoRuntime,

    /// A navigation target could not be resolved.
    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl {
        /// The target as given.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// No router is provided above the caller.
    #[error("no router provided")]
    NotProvided,
}

/// Result type alias for router operations.
pub type RouterResult<T> = Result<T, RouterError>;

/// Where to navigate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NavigateTo {
    /// A path, absolute or relative to the current location.
    Path(String),
    /// A move through history, e.g. `-1` for back.
    Delta(isize),
}

impl From<&str> for NavigateTo {
    fn from(path: &str) -> Self {
        Self::Path(path.to_owned())
    }
}

impl From<String> for NavigateTo {
    fn from(path: String) -> Self {
        Self::Path(path)
    }
}

impl From<isize> for NavigateTo {
    fn from(delta: isize) -> Self {
        Self::Delta(delta)
    }
}

/// Options for [`Router::navigate`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigateOptions {
    /// Replace the current history entry instead of pushing.
    pub replace: bool,
    /// State stored with the history entry.
    pub state: Option<serde_json::Value>,
}

/// Called with the new state after every router change.
pub type StateListener = Arc<dyn Fn(&RouterState) + Send + Sync>;

/// Handle to a router subscription. Dropping it unsubscribes.
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Wrap an unsubscribe callback.
    pub fn new(unsubscribe: impl FnOnce() + Send + 'static) -> Self {
        Self {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// Stop receiving updates.
    pub fn unsubscribe(mut self) {
        if let Some(f) = self.unsubscribe.take() {
            f();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(f) = self.unsubscribe.take() {
            f();
        }
    }
}

impl Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}

/// A client-side router.
pub trait Router: Send + Sync {
    /// Match the initial location and start loading its data.
    fn initialize(&self) -> RouterResult<()>;

    /// Snapshot of the current state.
    fn state(&self) -> RouterState;

    /// Register a listener called after every state change.
    fn subscribe(&self, listener: StateListener) -> Subscription;

    /// Navigate to a path or through history.
    fn navigate(&self, to: NavigateTo, options: NavigateOptions) -> RouterResult<()>;
}
