//! Context glue between a [`Router`] and components.

use std::fmt::Debug;
use std::ops::Deref;
use std::sync::{Arc, OnceLock};

use thiserror::Error;
use tracing::{debug, trace};
use url::Url;

use super::state::{Location, RouterState};
use super::{NavigateOptions, NavigateTo, Router, RouterError, RouterResult};
use crate::channel::{Context, ContextNode, ContextValue};
use crate::reactive::{create_signal, on_cleanup, Effect, Get, Memo, ReadSignal, Set};
use crate::template::{Event, EventTarget};

/// Errors raised by [`link_handler`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// No anchor element on the event's composed path.
    #[error("link handler: event must have an anchor element in its composed path")]
    MissingAnchor,

    /// The anchor's `href` is not an absolute URL.
    #[error("link handler: invalid href {href:?}: {reason}")]
    InvalidHref {
        /// The anchor's `href`.
        href: String,
        /// Why it could not be parsed.
        reason: String,
    },

    /// The router rejected the navigation.
    #[error(transparent)]
    Navigation(#[from] RouterError),
}

/// A shared router, compared by identity.
#[derive(Clone)]
pub struct RouterHandle(Arc<dyn Router>);

impl RouterHandle {
    /// Wrap a router.
    pub fn new(router: Arc<dyn Router>) -> Self {
        Self(router)
    }
}

impl Deref for RouterHandle {
    type Target = dyn Router;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

impl PartialEq for RouterHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Debug for RouterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("RouterHandle")
            .field(&self.0.state().location.href())
            .finish()
    }
}

/// The context routers are provided under.
pub fn router_context() -> Context<RouterHandle> {
    static CONTEXT: OnceLock<Context<RouterHandle>> = OnceLock::new();
    *CONTEXT.get_or_init(|| Context::new("router"))
}

/// Initialize `router` and provide it to `node` and everything below it.
pub fn provide_router<R>(node: &ContextNode, router: R) -> RouterResult<RouterHandle>
where
    R: Router + 'static,
{
    router.initialize()?;
    let handle = RouterHandle::new(Arc::new(router));
    let provided = handle.clone();
    node.provide(&router_context(), move || provided.clone());
    debug!(node = node.id(), "router provided");
    Ok(handle)
}

/// The router state, updated on every router change.
///
/// Follows the nearest provided router, re-subscribing if a different
/// router is provided, and unsubscribes when the ambient scope is disposed.
/// `None` without a router.
pub fn consume_router_state(node: &ContextNode) -> ReadSignal<Option<RouterState>> {
    let router = node.consume(&router_context());
    let (state, set_state) = create_signal(router.get_untracked().map(|r| r.state()));

    Effect::new(move || {
        let Some(router) = router.get() else {
            set_state.set(None);
            return;
        };
        set_state.set(Some(router.state()));

        let setter = set_state.clone();
        let subscription = router.subscribe(Arc::new(move |next: &RouterState| {
            setter.set(Some(next.clone()));
        }));
        trace!("subscribed to router");
        on_cleanup(move || subscription.unsubscribe());
    });

    state
}

/// The current location. `None` without a router.
pub fn consume_location(node: &ContextNode) -> Memo<Option<Location>> {
    let state = consume_router_state(node);
    Memo::new(move || state.get().map(|s| s.location))
}

/// Loader data of route `route_id`. `None` without a router or data.
pub fn consume_loader_data(node: &ContextNode, route_id: &str) -> Memo<Option<serde_json::Value>> {
    let state = consume_router_state(node);
    let route_id = route_id.to_owned();
    Memo::new(move || state.get().and_then(|s| s.loader_data(&route_id).cloned()))
}

/// Navigation capability of the nearest router.
pub fn consume_navigate(node: &ContextNode) -> Navigate {
    Navigate {
        router: node.consume(&router_context()),
    }
}

/// Navigates the nearest router.
#[derive(Clone, Debug)]
pub struct Navigate {
    router: ContextValue<RouterHandle>,
}

impl Navigate {
    /// Navigate to a path or through history.
    pub fn navigate(&self, to: impl Into<NavigateTo>, options: NavigateOptions) -> RouterResult<()> {
        let router = self.router.get_untracked().ok_or(RouterError::NotProvided)?;
        router.navigate(to.into(), options)
    }

    /// Whether a router is reachable.
    pub fn is_available(&self) -> bool {
        self.router.with(|router| router.is_some())
    }
}

/// Handle a click on a link: cancel the default action and navigate to the
/// path of the first anchor on the event's composed path.
pub fn link_handler(navigate: &Navigate, event: &Event) -> Result<(), LinkError> {
    event.prevent_default();
    let href = event
        .composed_path()
        .iter()
        .find_map(|target| match target {
            EventTarget::Anchor { href } => Some(href),
            _ => None,
        })
        .ok_or(LinkError::MissingAnchor)?;
    let url = Url::parse(href).map_err(|error| LinkError::InvalidHref {
        href: href.clone(),
        reason: error.to_string(),
    })?;
    debug!(href = %href, "link followed");
    navigate.navigate(url.path(), NavigateOptions::default())?;
    Ok(())
}
