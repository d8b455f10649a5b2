//! Component definitions and the setup API.
//!
//! A [`ComponentDefinition`] is a setup function plus a prop schema. Setup
//! runs once per instance and returns the render function; the render
//! function runs every time something it read changes.

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::channel::ContextNode;
use crate::reactive::{Get, Signal};
use crate::surface::{ShadowMode, Surface};
use crate::template::Template;

/// Expected shape of a prop value.
///
/// Attributes always arrive as strings; the shape documents what a
/// component expects and is not enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropShape {
    /// Any string.
    #[default]
    String,
    /// A number in string form.
    Number,
    /// Presence or absence of the attribute.
    Boolean,
    /// No expectation.
    Any,
}

/// Declared props of a component, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropSchema {
    props: IndexMap<String, PropShape>,
}

impl PropSchema {
    /// An empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a prop.
    pub fn prop(mut self, name: impl Into<String>, shape: PropShape) -> Self {
        self.props.insert(name.into(), shape);
        self
    }

    /// Declared names, in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.props.keys().map(String::as_str)
    }

    /// Shape of a declared prop.
    pub fn shape(&self, name: &str) -> Option<PropShape> {
        self.props.get(name).copied()
    }

    /// Number of declared props.
    pub fn len(&self) -> usize {
        self.props.len()
    }

    /// Check if no props are declared.
    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, PropShape)> for PropSchema {
    fn from_iter<I: IntoIterator<Item = (S, PropShape)>>(iter: I) -> Self {
        Self {
            props: iter.into_iter().map(|(name, shape)| (name.into(), shape)).collect(),
        }
    }
}

/// Per-definition element options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ElementOptions {
    /// Encapsulation mode of the instance's surface.
    pub shadow_mode: ShadowMode,
}

/// The function setup returns.
pub type RenderFn = Box<dyn Fn() -> Template + Send + Sync>;

type SetupFn = Box<dyn Fn(&SetupApi) -> RenderFn + Send + Sync>;

/// A component: setup function, prop schema and element options.
pub struct ComponentDefinition {
    setup: SetupFn,
    schema: PropSchema,
    options: ElementOptions,
}

impl ComponentDefinition {
    /// Create a definition with no props and default options.
    pub fn new<S, R>(setup: S) -> Self
    where
        S: Fn(&SetupApi) -> R + Send + Sync + 'static,
        R: Fn() -> Template + Send + Sync + 'static,
    {
        Self {
            setup: Box::new(move |api| Box::new(setup(api)) as RenderFn),
            schema: PropSchema::default(),
            options: ElementOptions::default(),
        }
    }

    /// Set the prop schema.
    pub fn with_props(mut self, schema: PropSchema) -> Self {
        self.schema = schema;
        self
    }

    /// Set the element options.
    pub fn with_options(mut self, options: ElementOptions) -> Self {
        self.options = options;
        self
    }

    /// The prop schema.
    pub fn schema(&self) -> &PropSchema {
        &self.schema
    }

    /// The element options.
    pub fn options(&self) -> ElementOptions {
        self.options
    }

    /// Attribute names the host reacts to: the schema's names.
    pub fn observed_attributes(&self) -> Vec<String> {
        self.schema.names().map(str::to_owned).collect()
    }

    pub(crate) fn run_setup(&self, api: &SetupApi) -> RenderFn {
        (self.setup)(api)
    }
}

impl Debug for ComponentDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentDefinition")
            .field("schema", &self.schema)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Reactive prop cells of one instance, one per declared prop.
#[derive(Clone, Default)]
pub struct Props {
    cells: IndexMap<String, Signal<Option<String>>>,
}

impl Props {
    pub(crate) fn from_schema(schema: &PropSchema) -> Self {
        Self {
            cells: schema
                .names()
                .map(|name| (name.to_owned(), Signal::new(None)))
                .collect(),
        }
    }

    /// Read a prop, tracking it. `None` for unset or undeclared props.
    pub fn get(&self, name: &str) -> Option<String> {
        self.cells.get(name).and_then(Get::get)
    }

    /// Read a prop without tracking it.
    pub fn get_untracked(&self, name: &str) -> Option<String> {
        self.cells.get(name).and_then(Get::get_untracked)
    }

    /// The cell behind a declared prop.
    pub fn signal(&self, name: &str) -> Option<&Signal<Option<String>>> {
        self.cells.get(name)
    }

    /// Check whether a prop is declared.
    pub fn contains(&self, name: &str) -> bool {
        self.cells.contains_key(name)
    }

    /// Declared names, in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.cells.keys().map(String::as_str)
    }
}

impl Debug for Props {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.cells.iter().map(|(k, v)| (k, v.get_untracked())))
            .finish()
    }
}

pub(crate) type Callback = Arc<dyn Fn() + Send + Sync>;

/// Mount and unmount callbacks of one instance.
#[derive(Default)]
pub(crate) struct Lifecycle {
    pub(crate) mount: Mutex<Vec<Callback>>,
    pub(crate) unmount: Mutex<Vec<Callback>>,
}

/// What setup can see of its element.
#[derive(Clone)]
pub struct ElementHandle {
    tag: Arc<str>,
    surface: Arc<dyn Surface>,
    connected: Arc<AtomicBool>,
}

impl ElementHandle {
    pub(crate) fn new(tag: Arc<str>, surface: Arc<dyn Surface>, connected: Arc<AtomicBool>) -> Self {
        Self {
            tag,
            surface,
            connected,
        }
    }

    /// The tag the element was defined under.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// The element's surface.
    pub fn surface(&self) -> &Arc<dyn Surface> {
        &self.surface
    }

    /// Whether the element is currently connected.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Debug for ElementHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElementHandle")
            .field("tag", &self.tag)
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Everything setup receives.
pub struct SetupApi {
    element: ElementHandle,
    props: Props,
    context: ContextNode,
    lifecycle: Arc<Lifecycle>,
}

impl SetupApi {
    pub(crate) fn new(
        element: ElementHandle,
        props: Props,
        context: ContextNode,
        lifecycle: Arc<Lifecycle>,
    ) -> Self {
        Self {
            element,
            props,
            context,
            lifecycle,
        }
    }

    /// The element being set up.
    pub fn element(&self) -> &ElementHandle {
        &self.element
    }

    /// The instance's prop cells.
    pub fn props(&self) -> &Props {
        &self.props
    }

    /// The instance's node in the context tree.
    pub fn context(&self) -> &ContextNode {
        &self.context
    }

    /// Run `f` every time the element is connected.
    pub fn on_mount(&self, f: impl Fn() + Send + Sync + 'static) {
        self.lifecycle.mount.lock().push(Arc::new(f));
    }

    /// Run `f` every time the element is disconnected.
    pub fn on_cleanup(&self, f: impl Fn() + Send + Sync + 'static) {
        self.lifecycle.unmount.lock().push(Arc::new(f));
    }
}

impl Debug for SetupApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SetupApi")
            .field("element", &self.element)
            .field("props", &self.props)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}
