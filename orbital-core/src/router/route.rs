//! Route tables and matching.

use std::collections::HashSet;
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use indexmap::IndexMap;

use super::state::{Location, RouteMatch};
use super::{RouterError, RouterResult};

/// What a loader produces: data for the route, or an error message.
pub type LoaderResult = Result<serde_json::Value, String>;

/// Input to a loader.
#[derive(Debug, Clone, PartialEq)]
pub struct LoaderArgs {
    /// Values of the `:param` segments matched for the route.
    pub params: IndexMap<String, String>,
    /// The location being loaded.
    pub location: Location,
}

type SyncLoader = Arc<dyn Fn(&LoaderArgs) -> LoaderResult + Send + Sync>;
type AsyncLoader = Arc<dyn Fn(LoaderArgs) -> BoxFuture<'static, LoaderResult> + Send + Sync>;

/// Fetches the data a route needs before it is shown.
#[derive(Clone)]
pub enum Loader {
    /// Runs inside `navigate`.
    Sync(SyncLoader),
    /// Runs on the tokio runtime; the navigation completes when it does.
    Async(AsyncLoader),
}

impl Loader {
    /// A loader that runs inside `navigate`.
    pub fn sync(f: impl Fn(&LoaderArgs) -> LoaderResult + Send + Sync + 'static) -> Self {
        Self::Sync(Arc::new(f))
    }

    /// A loader that runs on the tokio runtime.
    pub fn future<F, Fut>(f: F) -> Self
    where
        F: Fn(LoaderArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = LoaderResult> + Send + 'static,
    {
        Self::Async(Arc::new(move |args| f(args).boxed()))
    }

    /// Check whether this loader is async.
    pub fn is_async(&self) -> bool {
        matches!(self, Self::Async(_))
    }
}

impl Debug for Loader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sync(_) => f.write_str("Loader::Sync"),
            Self::Async(_) => f.write_str("Loader::Async"),
        }
    }
}

/// One entry of a route table.
#[derive(Debug, Clone)]
pub struct RouteDescriptor {
    /// Unique id across the whole table.
    pub id: String,
    /// Path pattern, relative to the parent. `:name` segments capture,
    /// `*` captures the rest, an empty path matches without consuming.
    pub path: String,
    /// Optional data loader.
    pub loader: Option<Loader>,
    /// Nested routes.
    pub children: Vec<RouteDescriptor>,
    /// Tag of the element rendering this route.
    pub element: Option<String>,
}

impl RouteDescriptor {
    /// A route with no loader, children or element.
    pub fn new(id: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            loader: None,
            children: Vec::new(),
            element: None,
        }
    }

    /// Set the loader.
    pub fn loader(mut self, loader: Loader) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Add a nested route.
    pub fn child(mut self, child: RouteDescriptor) -> Self {
        self.children.push(child);
        self
    }

    /// Set the element tag.
    pub fn element(mut self, tag: impl Into<String>) -> Self {
        self.element = Some(tag.into());
        self
    }
}

/// Check that route ids are unique across the whole table.
pub fn validate_routes(routes: &[RouteDescriptor]) -> RouterResult<()> {
    fn walk<'a>(routes: &'a [RouteDescriptor], seen: &mut HashSet<&'a str>) -> RouterResult<()> {
        for route in routes {
            if !seen.insert(route.id.as_str()) {
                return Err(RouterError::DuplicateRouteId(route.id.clone()));
            }
            walk(&route.children, seen)?;
        }
        Ok(())
    }
    walk(routes, &mut HashSet::new())
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// A matched route with its captured params.
pub(crate) struct Matched<'a> {
    pub(crate) route: &'a RouteDescriptor,
    pub(crate) info: RouteMatch,
}

/// Match `pathname` against the table. Routes are tried in declaration
/// order, children before accepting a parent on its own.
pub(crate) fn match_routes<'a>(routes: &'a [RouteDescriptor], pathname: &str) -> Option<Vec<Matched<'a>>> {
    let rest = segments(pathname);
    match_level(routes, &rest, &[], &IndexMap::new())
}

fn match_level<'a, 's>(
    routes: &'a [RouteDescriptor],
    rest: &[&'s str],
    consumed: &[&'s str],
    params: &IndexMap<String, String>,
) -> Option<Vec<Matched<'a>>> {
    routes
        .iter()
        .find_map(|route| match_route(route, rest, consumed, params))
}

fn match_route<'a, 's>(
    route: &'a RouteDescriptor,
    rest: &[&'s str],
    consumed: &[&'s str],
    params: &IndexMap<String, String>,
) -> Option<Vec<Matched<'a>>> {
    let mut params = params.clone();
    let mut consumed = consumed.to_vec();
    let mut rest = rest;

    for pattern in segments(&route.path) {
        if pattern == "*" {
            params.insert("*".to_owned(), rest.join("/"));
            consumed.extend_from_slice(rest);
            rest = &[];
            break;
        }
        let (segment, tail) = rest.split_first()?;
        match pattern.strip_prefix(':') {
            Some(name) => {
                params.insert(name.to_owned(), (*segment).to_owned());
            }
            None if pattern == *segment => {}
            None => return None,
        }
        consumed.push(*segment);
        rest = tail;
    }

    let own = Matched {
        route,
        info: RouteMatch {
            route_id: route.id.clone(),
            pathname: format!("/{}", consumed.join("/")),
            params: params.clone(),
        },
    };

    if let Some(mut chain) = match_level(&route.children, rest, &consumed, &params) {
        chain.insert(0, own);
        return Some(chain);
    }
    rest.is_empty().then(|| vec![own])
}
