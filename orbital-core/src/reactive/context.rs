//! Tracking Context
//!
//! Records which computation is running so that reads can subscribe it.
//! Each memo recomputation and each effect run pushes a frame onto a
//! thread-local stack; every source read while the frame is on top is
//! appended to the frame's dependency list, once per source. Popping the
//! frame hands that list to the computation.
//!
//! A frame without a subscriber marks an untracked region: reads inside it
//! register nothing, even when an outer computation is running.

use std::cell::RefCell;

use smallvec::SmallVec;

use super::subscriber::{SourceId, SubscriberId};

/// Dependencies collected during a single run of a computation.
pub type Dependencies = SmallVec<[SourceId; 4]>;

#[derive(Debug)]
struct Frame {
    /// `None` for an untracked region.
    subscriber: Option<SubscriberId>,
    /// Sources read so far, deduplicated, in read order.
    reads: Dependencies,
}

thread_local! {
    static TRACKING: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

/// Guard for one frame of the tracking stack; dropping it pops the frame.
///
/// Frames are popped even when the computation panics, so the stack
/// stays balanced.
#[derive(Debug)]
pub struct ReactiveContext {
    subscriber: Option<SubscriberId>,
}

impl ReactiveContext {
    /// Start tracking reads on behalf of `subscriber`.
    pub fn enter(subscriber: SubscriberId) -> Self {
        Self::push(Some(subscriber))
    }

    /// Start an untracked region.
    pub fn untracked() -> Self {
        Self::push(None)
    }

    fn push(subscriber: Option<SubscriberId>) -> Self {
        TRACKING.with(|frames| {
            frames.borrow_mut().push(Frame {
                subscriber,
                reads: Dependencies::new(),
            })
        });
        Self { subscriber }
    }

    /// Check if reads are currently being tracked.
    pub fn is_active() -> bool {
        Self::current_subscriber().is_some()
    }

    /// The computation reads are attributed to, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        TRACKING.with(|frames| frames.borrow().last().and_then(|frame| frame.subscriber))
    }

    /// Record a read of `source`.
    ///
    /// Returns the subscriber to register when this is the first read of
    /// `source` in the current pass, `None` for repeated or untracked reads.
    pub fn track_dependency(source: SourceId) -> Option<SubscriberId> {
        TRACKING.with(|frames| {
            let mut frames = frames.borrow_mut();
            let frame = frames.last_mut()?;
            let subscriber = frame.subscriber?;
            if frame.reads.contains(&source) {
                return None;
            }
            frame.reads.push(source);
            Some(subscriber)
        })
    }

    /// Sources read so far in the top frame.
    pub fn get_dependencies() -> Dependencies {
        TRACKING.with(|frames| {
            frames
                .borrow()
                .last()
                .map(|frame| frame.reads.clone())
                .unwrap_or_default()
        })
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        let popped = TRACKING.with(|frames| frames.borrow_mut().pop());
        debug_assert!(
            popped.is_some_and(|frame| frame.subscriber == self.subscriber),
            "tracking frames popped out of order"
        );
    }
}

/// Run `f` without tracking any reads it performs.
pub fn untrack<R>(f: impl FnOnce() -> R) -> R {
    let _frame = ReactiveContext::untracked();
    f()
}
