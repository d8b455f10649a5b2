//! The custom element registry.

use std::fmt::Debug;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::debug;

use super::definition::ComponentDefinition;
use super::element::HostElement;
use crate::channel::ContextNode;
use crate::surface::{MemorySurface, ShadowMode, Surface};

/// Errors raised by [`ElementRegistry`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The name is not a valid custom element name.
    #[error("invalid custom element name: {0:?}")]
    InvalidTagName(String),

    /// The name already has a definition.
    #[error("custom element already defined: {0}")]
    AlreadyDefined(String),

    /// No definition exists for the name.
    #[error("unknown custom element: {0}")]
    UnknownTag(String),
}

/// Result type alias for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Creates the surface for a new instance.
pub type SurfaceFactory = Arc<dyn Fn(ShadowMode) -> Arc<dyn Surface> + Send + Sync>;

const RESERVED_NAMES: &[&str] = &[
    "annotation-xml",
    "color-profile",
    "font-face",
    "font-face-src",
    "font-face-uri",
    "font-face-format",
    "font-face-name",
    "missing-glyph",
];

/// Check a tag against the custom element name rules: starts with a
/// lowercase ASCII letter, contains a hyphen, has no uppercase letters and
/// is not one of the reserved names.
pub fn is_valid_tag_name(tag: &str) -> bool {
    let mut chars = tag.chars();
    let starts_lower = chars.next().is_some_and(|c| c.is_ascii_lowercase());
    starts_lower
        && tag.contains('-')
        && tag
            .chars()
            .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '-' | '.' | '_') || !c.is_ascii())
        && !RESERVED_NAMES.contains(&tag)
}

/// Tag name to definition map, plus the document's context root.
pub struct ElementRegistry {
    definitions: RwLock<IndexMap<String, Arc<ComponentDefinition>>>,
    surface_factory: SurfaceFactory,
    document: ContextNode,
}

impl ElementRegistry {
    /// A registry whose instances render into [`MemorySurface`]s.
    pub fn new() -> Self {
        Self::with_surface_factory(Arc::new(|mode| MemorySurface::shared(mode) as Arc<dyn Surface>))
    }

    /// A registry using a custom surface factory.
    pub fn with_surface_factory(factory: SurfaceFactory) -> Self {
        Self {
            definitions: RwLock::new(IndexMap::new()),
            surface_factory: factory,
            document: ContextNode::root(),
        }
    }

    /// Register `definition` under `tag`.
    pub fn define(&self, tag: &str, definition: ComponentDefinition) -> RegistryResult<()> {
        if !is_valid_tag_name(tag) {
            return Err(RegistryError::InvalidTagName(tag.to_owned()));
        }
        let mut definitions = self.definitions.write();
        if definitions.contains_key(tag) {
            return Err(RegistryError::AlreadyDefined(tag.to_owned()));
        }
        debug!(tag, observed = ?definition.observed_attributes(), "element defined");
        definitions.insert(tag.to_owned(), Arc::new(definition));
        Ok(())
    }

    /// The definition registered under `tag`.
    pub fn get(&self, tag: &str) -> Option<Arc<ComponentDefinition>> {
        self.definitions.read().get(tag).cloned()
    }

    /// Check whether `tag` is defined.
    pub fn is_defined(&self, tag: &str) -> bool {
        self.definitions.read().contains_key(tag)
    }

    /// Defined tags, in definition order.
    pub fn tags(&self) -> Vec<String> {
        self.definitions.read().keys().cloned().collect()
    }

    /// Attribute names instances of `tag` react to.
    pub fn observed_attributes(&self, tag: &str) -> RegistryResult<Vec<String>> {
        self.get(tag)
            .map(|definition| definition.observed_attributes())
            .ok_or_else(|| RegistryError::UnknownTag(tag.to_owned()))
    }

    /// The document's node in the context tree.
    pub fn document(&self) -> &ContextNode {
        &self.document
    }

    /// Create a top-level instance of `tag`.
    pub fn create(&self, tag: &str) -> RegistryResult<HostElement> {
        self.create_within(tag, &self.document)
    }

    /// Create an instance of `tag` below `parent` in the context tree.
    pub fn create_within(&self, tag: &str, parent: &ContextNode) -> RegistryResult<HostElement> {
        let definition = self
            .get(tag)
            .ok_or_else(|| RegistryError::UnknownTag(tag.to_owned()))?;
        let surface = (self.surface_factory)(definition.options().shadow_mode);
        Ok(HostElement::construct(tag, &definition, surface, parent))
    }
}

impl Default for ElementRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for ElementRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElementRegistry")
            .field("tags", &self.tags())
            .finish_non_exhaustive()
    }
}
