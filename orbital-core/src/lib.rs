//! Orbital Core
//!
//! This crate provides the runtime for the Orbital component framework.
//! It implements:
//!
//! - Reactive primitives (signals, memos, effects) and ownership scopes
//! - A context channel passing values down the component tree
//! - A component host with the Custom Elements lifecycle
//! - A router bridge exposing router state as signals
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Core reactive primitives, dependency tracking and scopes
//! - `template`: Render output and events, opaque to the host
//! - `surface`: Rendering targets that diff templates into content
//! - `channel`: Tree-scoped provide/consume
//! - `host`: Component definitions, instances and the element registry
//! - `router`: Router trait, in-memory router and the reactive bridge
//!
//! Everything above `reactive` only uses its `Get`/`Set` traits and the
//! signal, memo, effect and scope types.
//!
//! # Example
//!
//! ```rust
//! use orbital_core::host::{ComponentDefinition, ElementRegistry, SetupApi};
//! use orbital_core::reactive::{Get, Signal};
//! use orbital_core::template::{Event, Template};
//!
//! let registry = ElementRegistry::new();
//! registry
//!     .define(
//!         "x-counter",
//!         ComponentDefinition::new(|_: &SetupApi| {
//!             let count = Signal::new(0);
//!             move || {
//!                 let count = count.clone();
//!                 Template::html(format!("<button>{}</button>", count.get()))
//!                     .on("click", move |_| count.update(|n| n + 1))
//!             }
//!         }),
//!     )
//!     .unwrap();
//!
//! let counter = registry.create("x-counter").unwrap();
//! counter.connected();
//! counter.dispatch(&Event::new("click"));
//! assert_eq!(counter.content().as_deref(), Some("<button>1</button>"));
//! ```

pub mod channel;
pub mod host;
pub mod reactive;
pub mod router;
pub mod surface;
pub mod template;
