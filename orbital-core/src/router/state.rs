//! Router state snapshots.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{RouterError, RouterResult};

const ORIGIN: &str = "http://localhost";

/// A location inside the application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Path, always starting with `/`.
    pub pathname: String,
    /// Query string including the leading `?`, or empty.
    #[serde(default)]
    pub search: String,
    /// Fragment including the leading `#`, or empty.
    #[serde(default)]
    pub hash: String,
    /// State stored with the history entry.
    #[serde(default)]
    pub state: Option<serde_json::Value>,
}

impl Default for Location {
    fn default() -> Self {
        Self {
            pathname: "/".to_owned(),
            search: String::new(),
            hash: String::new(),
            state: None,
        }
    }
}

impl Location {
    /// Parse an absolute path such as `/users/7?tab=posts#top`.
    pub fn parse(path: &str) -> RouterResult<Self> {
        Self::default().resolve(path)
    }

    /// Resolve `to` against this location, the way a browser resolves a
    /// link's `href`.
    pub fn resolve(&self, to: &str) -> RouterResult<Self> {
        let invalid = |reason: url::ParseError| RouterError::InvalidUrl {
            url: to.to_owned(),
            reason: reason.to_string(),
        };
        let url = Url::parse(ORIGIN)
            .and_then(|origin| origin.join(&self.href()))
            .and_then(|base| base.join(to))
            .map_err(invalid)?;
        Ok(Self::from_url(&url))
    }

    pub(crate) fn from_url(url: &Url) -> Self {
        Self {
            pathname: url.path().to_owned(),
            search: url.query().map(|q| format!("?{q}")).unwrap_or_default(),
            hash: url.fragment().map(|f| format!("#{f}")).unwrap_or_default(),
            state: None,
        }
    }

    /// Path, query and fragment joined.
    pub fn href(&self) -> String {
        format!("{}{}{}", self.pathname, self.search, self.hash)
    }
}

/// One route of the matched chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteMatch {
    /// Id of the matched route.
    pub route_id: String,
    /// Portion of the path matched up to and including this route.
    pub pathname: String,
    /// Values of `:param` segments matched so far.
    #[serde(default)]
    pub params: IndexMap<String, String>,
}

/// Whether loaders are running.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum NavigationState {
    /// Nothing in flight.
    #[default]
    Idle,
    /// Loaders for `location` are running; the state still shows the
    /// previous location.
    Loading {
        /// Where the navigation is going.
        location: Location,
    },
}

/// Snapshot of a router.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterState {
    /// Whether the initial location has been matched and loaded.
    pub initialized: bool,
    /// Current location.
    pub location: Location,
    /// Matched route chain, outermost first.
    pub matches: Vec<RouteMatch>,
    /// Loader results keyed by route id.
    pub loader_data: IndexMap<String, serde_json::Value>,
    /// Loader failures keyed by route id.
    pub errors: IndexMap<String, String>,
    /// Navigation status.
    pub navigation: NavigationState,
}

impl RouterState {
    /// Ids of the matched routes, outermost first.
    pub fn route_ids(&self) -> impl Iterator<Item = &str> {
        self.matches.iter().map(|m| m.route_id.as_str())
    }

    /// Loader data of one route.
    pub fn loader_data(&self, route_id: &str) -> Option<&serde_json::Value> {
        self.loader_data.get(route_id)
    }

    /// The innermost match.
    pub fn leaf(&self) -> Option<&RouteMatch> {
        self.matches.last()
    }

    /// Whether loaders are running.
    pub fn is_loading(&self) -> bool {
        matches!(self.navigation, NavigationState::Loading { .. })
    }
}
