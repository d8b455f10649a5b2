//! Component Host
//!
//! Turns a setup/render definition into an element with the Custom
//! Elements lifecycle. Each instance owns:
//!
//! - an isolated [`Surface`](crate::surface::Surface) it renders into
//! - a scope that owns its render effect, prop cells and context bindings
//! - one `Signal<Option<String>>` per declared prop
//! - a [`ContextNode`](crate::channel::ContextNode) below its parent's
//!
//! Setup runs once, at construction. The render function it returns runs
//! inside a single effect; whenever a prop, a consumed context or any other
//! signal it read changes, the effect re-runs and the new template is
//! diffed into the surface.

mod definition;
mod element;
mod registry;
mod show;

pub use definition::{
    ComponentDefinition, ElementHandle, ElementOptions, PropSchema, PropShape, Props, RenderFn,
    SetupApi,
};
pub use element::HostElement;
pub use registry::{is_valid_tag_name, ElementRegistry, RegistryError, RegistryResult, SurfaceFactory};
pub use show::{show, show_with_fallback};
