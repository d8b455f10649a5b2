//! In-memory router.
//!
//! Keeps a history stack instead of talking to a browser. Navigation
//! matches the route table, runs the loaders of every matched route and
//! publishes the new state to subscribers.
//!
//! Sync loaders run inside `navigate` and the new state is published before
//! it returns. When any matched route has an async loader, the router first
//! publishes [`NavigationState::Loading`] with the old location, spawns the
//! loaders on the ambient tokio runtime and publishes the final state when
//! they complete. A navigation started while another is loading supersedes
//! it; the stale results are dropped.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::route::{match_routes, validate_routes, Loader, LoaderArgs, LoaderResult, RouteDescriptor};
use super::state::{Location, NavigationState, RouteMatch, RouterState};
use super::{NavigateOptions, NavigateTo, Router, RouterError, RouterResult, StateListener, Subscription};

/// Configuration of a [`MemoryRouter`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryRouterConfig {
    /// Location the router starts at.
    pub initial_entry: String,
    /// Prefix every application path lives under, e.g. `/app`.
    pub base: Option<String>,
}

impl Default for MemoryRouterConfig {
    fn default() -> Self {
        Self {
            initial_entry: "/".to_owned(),
            base: None,
        }
    }
}

#[derive(Debug, Default)]
struct History {
    entries: Vec<Location>,
    index: usize,
}

struct RouterInner {
    routes: Vec<RouteDescriptor>,
    config: MemoryRouterConfig,
    state: RwLock<RouterState>,
    history: Mutex<History>,
    listeners: Mutex<IndexMap<u64, StateListener>>,
    next_listener: AtomicU64,
    generation: AtomicU64,
    in_flight: Mutex<Vec<JoinHandle<()>>>,
}

/// A pending loader, either already finished or still to be awaited.
enum Pending {
    Ready(String, LoaderResult),
    Deferred(String, futures::future::BoxFuture<'static, LoaderResult>),
}

impl RouterInner {
    fn strip_base<'p>(&self, pathname: &'p str) -> Option<&'p str> {
        match self.config.base.as_deref().map(|b| b.trim_end_matches('/')) {
            None | Some("") => Some(pathname),
            Some(base) => match pathname.strip_prefix(base)? {
                "" => Some("/"),
                rest if rest.starts_with('/') => Some(rest),
                _ => None,
            },
        }
    }

    fn publish(&self, update: impl FnOnce(&mut RouterState)) {
        let snapshot = {
            let mut state = self.state.write();
            update(&mut state);
            state.clone()
        };
        let listeners: Vec<StateListener> = self.listeners.lock().values().cloned().collect();
        trace!(listeners = listeners.len(), location = %snapshot.location.href(), "publishing router state");
        for listener in listeners {
            listener(&snapshot);
        }
    }

    /// Match `location`, start its loaders and publish.
    fn load(self: &Arc<Self>, location: Location) -> RouterResult<()> {
        let path = self
            .strip_base(&location.pathname)
            .ok_or_else(|| RouterError::NoMatch(location.pathname.clone()))?;
        let chain = match_routes(&self.routes, path).ok_or_else(|| RouterError::NoMatch(location.pathname.clone()))?;

        let needs_runtime = chain
            .iter()
            .any(|m| m.route.loader.as_ref().is_some_and(Loader::is_async));
        let runtime = if needs_runtime {
            Some(Handle::try_current().map_err(|_| RouterError::NoRuntime)?)
        } else {
            None
        };

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let matches: Vec<RouteMatch> = chain.iter().map(|m| m.info.clone()).collect();
        let pending: Vec<Pending> = chain
            .iter()
            .filter_map(|m| {
                let args = LoaderArgs {
                    params: m.info.params.clone(),
                    location: location.clone(),
                };
                let id = m.route.id.clone();
                match m.route.loader.as_ref()? {
                    Loader::Sync(f) => Some(Pending::Ready(id, f(&args))),
                    Loader::Async(f) => Some(Pending::Deferred(id, f(args))),
                }
            })
            .collect();

        let Some(runtime) = runtime else {
            let results = pending.into_iter().filter_map(|p| match p {
                Pending::Ready(id, result) => Some((id, result)),
                Pending::Deferred(..) => None,
            });
            self.commit(generation, location, matches, results.collect());
            return Ok(());
        };

        debug!(to = %location.href(), "waiting for loaders");
        self.publish(|state| {
            state.navigation = NavigationState::Loading {
                location: location.clone(),
            }
        });

        let inner = Arc::clone(self);
        let handle = runtime.spawn(async move {
            let results = join_all(pending.into_iter().map(|p| async move {
                match p {
                    Pending::Ready(id, result) => (id, result),
                    Pending::Deferred(id, future) => (id, future.await),
                }
            }))
            .await;
            inner.commit(generation, location, matches, results);
        });
        let mut in_flight = self.in_flight.lock();
        in_flight.retain(|task| !task.is_finished());
        in_flight.push(handle);
        Ok(())
    }

    fn commit(
        &self,
        generation: u64,
        location: Location,
        matches: Vec<RouteMatch>,
        results: Vec<(String, LoaderResult)>,
    ) {
        if self.generation.load(Ordering::SeqCst) != generation {
            trace!(to = %location.href(), "superseded navigation dropped");
            return;
        }

        let mut loader_data = IndexMap::new();
        let mut errors = IndexMap::new();
        for (id, result) in results {
            match result {
                Ok(data) => {
                    loader_data.insert(id, data);
                }
                Err(message) => {
                    warn!(route = %id, %message, "loader failed");
                    errors.insert(id, message);
                }
            }
        }

        debug!(to = %location.href(), matches = matches.len(), "navigation committed");
        self.publish(move |state| {
            state.initialized = true;
            state.location = location;
            state.matches = matches;
            state.loader_data = loader_data;
            state.errors = errors;
            state.navigation = NavigationState::Idle;
        });
    }
}

/// A router backed by an in-memory history stack.
#[derive(Clone)]
pub struct MemoryRouter {
    inner: Arc<RouterInner>,
}

impl MemoryRouter {
    /// Create a router over `routes`. Route ids must be unique.
    pub fn new(routes: Vec<RouteDescriptor>, config: MemoryRouterConfig) -> RouterResult<Self> {
        validate_routes(&routes)?;
        Ok(Self {
            inner: Arc::new(RouterInner {
                routes,
                config,
                state: RwLock::new(RouterState::default()),
                history: Mutex::new(History::default()),
                listeners: Mutex::new(IndexMap::new()),
                next_listener: AtomicU64::new(0),
                generation: AtomicU64::new(0),
                in_flight: Mutex::new(Vec::new()),
            }),
        })
    }

    /// The route table.
    pub fn routes(&self) -> &[RouteDescriptor] {
        &self.inner.routes
    }

    /// Number of history entries.
    pub fn history_len(&self) -> usize {
        self.inner.history.lock().entries.len()
    }

    /// Number of subscribed listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    /// Number of spawned loader tasks still running.
    pub fn pending_loads(&self) -> usize {
        let mut in_flight = self.inner.in_flight.lock();
        in_flight.retain(|task| !task.is_finished());
        in_flight.len()
    }

    /// Wait until every spawned loader has finished.
    pub async fn idle(&self) {
        loop {
            let handles = std::mem::take(&mut *self.inner.in_flight.lock());
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                if let Err(error) = handle.await {
                    warn!(%error, "loader task failed");
                }
            }
        }
    }
}

impl Router for MemoryRouter {
    fn initialize(&self) -> RouterResult<()> {
        if !self.inner.history.lock().entries.is_empty() {
            trace!("router already initialized");
            return Ok(());
        }
        let location = Location::parse(&self.inner.config.initial_entry)?;
        debug!(initial = %location.href(), "router initialized");
        self.inner.load(location.clone())?;
        let mut history = self.inner.history.lock();
        history.entries = vec![location];
        history.index = 0;
        Ok(())
    }

    fn state(&self) -> RouterState {
        self.inner.state.read().clone()
    }

    fn subscribe(&self, listener: StateListener) -> Subscription {
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.lock().insert(id, listener);
        let inner = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = inner.upgrade() {
                inner.listeners.lock().shift_remove(&id);
            }
        })
    }

    fn navigate(&self, to: NavigateTo, options: NavigateOptions) -> RouterResult<()> {
        match to {
            NavigateTo::Path(path) => {
                let current = self.inner.state.read().location.clone();
                let mut location = current.resolve(&path)?;
                location.state = options.state;
                debug!(to = %location.href(), replace = options.replace, "navigate");
                self.inner.load(location.clone())?;

                let mut history = self.inner.history.lock();
                if options.replace && !history.entries.is_empty() {
                    let index = history.index;
                    history.entries[index] = location;
                } else {
                    let keep = if history.entries.is_empty() { 0 } else { history.index + 1 };
                    history.entries.truncate(keep);
                    history.entries.push(location);
                    history.index = history.entries.len() - 1;
                }
                Ok(())
            }
            NavigateTo::Delta(delta) => {
                let target = {
                    let history = self.inner.history.lock();
                    let index = history.index as isize + delta;
                    if delta == 0 || index < 0 || index as usize >= history.entries.len() {
                        debug!(delta, "history move out of range ignored");
                        return Ok(());
                    }
                    (index as usize, history.entries[index as usize].clone())
                };
                debug!(delta, to = %target.1.href(), "navigate through history");
                self.inner.load(target.1)?;
                self.inner.history.lock().index = target.0;
                Ok(())
            }
        }
    }
}

impl Debug for MemoryRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryRouter")
            .field("config", &self.inner.config)
            .field("location", &self.inner.state.read().location.href())
            .field("history_len", &self.history_len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn routes() -> Vec<RouteDescriptor> {
        vec![RouteDescriptor::new("root", "/")
            .loader(Loader::sync(|_| Ok(json!({"app": "orbital"}))))
            .child(RouteDescriptor::new("home", ""))
            .child(
                RouteDescriptor::new("user", "users/:id")
                    .loader(Loader::sync(|args| Ok(json!({"id": args.params["id"]})))),
            )
            .child(RouteDescriptor::new("broken", "broken").loader(Loader::sync(|_| Err("boom".into()))))]
    }

    fn router() -> MemoryRouter {
        let router = MemoryRouter::new(routes(), MemoryRouterConfig::default()).unwrap();
        router.initialize().unwrap();
        router
    }

    #[test]
    fn initialize_matches_initial_entry() {
        let state = router().state();
        assert!(state.initialized);
        assert_eq!(state.location.pathname, "/");
        assert_eq!(state.route_ids().collect::<Vec<_>>(), vec!["root", "home"]);
        assert_eq!(state.loader_data("root"), Some(&json!({"app": "orbital"})));
    }

    #[test]
    fn sync_loaders_complete_inside_navigate() {
        let router = router();
        router.navigate("/users/7".into(), NavigateOptions::default()).unwrap();
        let state = router.state();
        assert_eq!(state.loader_data("user"), Some(&json!({"id": "7"})));
        assert_eq!(state.navigation, NavigationState::Idle);
    }

    #[test]
    fn loader_errors_are_recorded() {
        let router = router();
        router.navigate("/broken".into(), NavigateOptions::default()).unwrap();
        let state = router.state();
        assert_eq!(state.errors.get("broken").map(String::as_str), Some("boom"));
        assert!(state.loader_data("broken").is_none());
    }

    #[test]
    fn unmatched_paths_leave_state_alone() {
        let router = router();
        let before = router.state();
        assert_eq!(
            router.navigate("/missing".into(), NavigateOptions::default()),
            Err(RouterError::NoMatch("/missing".into()))
        );
        assert_eq!(router.state(), before);
        assert_eq!(router.history_len(), 1);
    }

    #[test]
    fn history_moves_back_and_forward() {
        let router = router();
        router.navigate("/users/1".into(), NavigateOptions::default()).unwrap();
        router.navigate("/users/2".into(), NavigateOptions::default()).unwrap();
        assert_eq!(router.history_len(), 3);

        router.navigate(NavigateTo::Delta(-2), NavigateOptions::default()).unwrap();
        assert_eq!(router.state().location.pathname, "/");

        router.navigate(NavigateTo::Delta(1), NavigateOptions::default()).unwrap();
        assert_eq!(router.state().location.pathname, "/users/1");

        router.navigate(NavigateTo::Delta(5), NavigateOptions::default()).unwrap();
        assert_eq!(router.state().location.pathname, "/users/1");

        // Pushing from the middle drops the forward entries.
        router.navigate("/users/3".into(), NavigateOptions::default()).unwrap();
        assert_eq!(router.history_len(), 3);
    }

    #[test]
    fn replace_keeps_history_length() {
        let router = router();
        router
            .navigate(
                "/users/1".into(),
                NavigateOptions {
                    replace: true,
                    state: Some(json!(1)),
                },
            )
            .unwrap();
        assert_eq!(router.history_len(), 1);
        assert_eq!(router.state().location.state, Some(json!(1)));
    }

    #[test]
    fn base_is_stripped_before_matching() {
        let router = MemoryRouter::new(
            routes(),
            MemoryRouterConfig {
                initial_entry: "/app/users/4".into(),
                base: Some("/app".into()),
            },
        )
        .unwrap();
        router.initialize().unwrap();
        assert_eq!(router.state().location.pathname, "/app/users/4");
        assert_eq!(router.state().loader_data("user"), Some(&json!({"id": "4"})));

        assert!(router.navigate("/users/4".into(), NavigateOptions::default()).is_err());
    }

    #[test]
    fn subscription_drop_unsubscribes() {
        let router = router();
        let calls = Arc::new(AtomicU64::new(0));
        let subscription = router.subscribe({
            let calls = calls.clone();
            Arc::new(move |_: &RouterState| {
                calls.fetch_add(1, Ordering::SeqCst);
            })
        });
        router.navigate("/users/1".into(), NavigateOptions::default()).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        drop(subscription);
        router.navigate("/users/2".into(), NavigateOptions::default()).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(router.listener_count(), 0);
    }

    #[test]
    fn async_loader_outside_runtime_is_an_error() {
        let routes = vec![RouteDescriptor::new("slow", "/").loader(Loader::future(|_| async { Ok(json!(null)) }))];
        let router = MemoryRouter::new(routes, MemoryRouterConfig::default()).unwrap();
        assert_eq!(router.initialize(), Err(RouterError::NoRuntime));
    }

    #[tokio::test]
    async fn async_loaders_publish_loading_then_idle() {
        let routes = vec![RouteDescriptor::new("root", "/")
            .child(RouteDescriptor::new("home", ""))
            .child(RouteDescriptor::new("slow", "slow").loader(Loader::future(|_| async {
                tokio::task::yield_now().await;
                Ok(json!("done"))
            })))];
        let router = MemoryRouter::new(routes, MemoryRouterConfig::default()).unwrap();
        router.initialize().unwrap();

        let seen: Arc<Mutex<Vec<RouterState>>> = Arc::default();
        let _subscription = router.subscribe({
            let seen = seen.clone();
            Arc::new(move |state: &RouterState| seen.lock().push(state.clone()))
        });

        router.navigate("/slow".into(), NavigateOptions::default()).unwrap();
        let loading = router.state();
        assert!(loading.is_loading());
        assert_eq!(loading.location.pathname, "/");

        router.idle().await;
        let done = router.state();
        assert_eq!(done.location.pathname, "/slow");
        assert_eq!(done.loader_data("slow"), Some(&json!("done")));
        assert_eq!(seen.lock().len(), 2);
    }

    #[tokio::test]
    async fn superseded_navigation_is_dropped() {
        let routes = vec![RouteDescriptor::new("root", "/")
            .child(RouteDescriptor::new("home", ""))
            .child(RouteDescriptor::new("slow", "slow").loader(Loader::future(|_| async {
                tokio::task::yield_now().await;
                Ok(json!("late"))
            })))
            .child(RouteDescriptor::new("fast", "fast"))];
        let router = MemoryRouter::new(routes, MemoryRouterConfig::default()).unwrap();
        router.initialize().unwrap();

        router.navigate("/slow".into(), NavigateOptions::default()).unwrap();
        router.navigate("/fast".into(), NavigateOptions::default()).unwrap();
        router.idle().await;

        let state = router.state();
        assert_eq!(state.location.pathname, "/fast");
        assert!(state.loader_data("slow").is_none());
    }

    #[tokio::test]
    async fn finished_loader_tasks_are_not_retained() {
        let routes = vec![RouteDescriptor::new("root", "/")
            .child(RouteDescriptor::new("home", ""))
            .child(RouteDescriptor::new("slow", "slow").loader(Loader::future(|_| async {
                tokio::task::yield_now().await;
                Ok(json!("done"))
            })))];
        let router = MemoryRouter::new(routes, MemoryRouterConfig::default()).unwrap();
        router.initialize().unwrap();

        for _ in 0..50 {
            router.navigate("/slow".into(), NavigateOptions::default()).unwrap();
            assert!(router.inner.in_flight.lock().len() <= 1);
            while router.state().is_loading() {
                tokio::task::yield_now().await;
            }
        }

        assert_eq!(router.state().loader_data("slow"), Some(&json!("done")));
        for _ in 0..10 {
            if router.pending_loads() == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(router.pending_loads(), 0);
    }
}
