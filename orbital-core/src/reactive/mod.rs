//! Fine-grained reactivity.
//!
//! Signals hold state, memos derive from it lazily, effects push it out to
//! the world, and scopes bound how long all of them live. The component
//! host, the context channel and the router bridge are built only on what
//! this module exports.
//!
//! Dependencies are discovered at run time: a memo or effect pushes a
//! tracking frame while it runs, and every `get` inside that frame
//! subscribes it to the value read. Propagation is push-pull. A write marks
//! subscribers `Dirty` and everything further downstream `MaybeDirty`;
//! queued effects then pull their inputs, and memos whose value comes out
//! unchanged stop the wave.

mod context;
mod effect;
mod memo;
mod runtime;
mod scope;
mod signal;
mod subscriber;

pub use context::{untrack, Dependencies, ReactiveContext};
pub use effect::{create_effect, Effect};
pub use memo::{create_computed, Memo};
pub use runtime::{batch, Reactive, Runtime};
pub use scope::{on_cleanup, run_in_scope, run_unowned, Disposable, Disposer, Scope};
pub use signal::{create_signal, ReadSignal, Signal, WriteSignal};
pub use subscriber::{DirtyState, SourceId, SubscriberId};

/// Read access to a reactive value.
pub trait Get<T> {
    /// Read the value, tracking it as a dependency of the running computation.
    fn get(&self) -> T;

    /// Read the value without tracking it.
    fn get_untracked(&self) -> T;
}

/// Write access to a reactive value.
pub trait Set<T> {
    /// Replace the value, notifying dependents if it changed.
    fn set(&self, value: T);
}
