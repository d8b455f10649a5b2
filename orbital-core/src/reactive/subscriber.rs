//! Identifiers and dirty states shared by every reactive node.
//!
//! A *source* is anything that can be read inside a tracking context
//! (signals and memos). A *subscriber* is anything that tracks reads
//! (memos and effects). A memo is both, so it carries one id of each kind.

use std::sync::atomic::{AtomicU64, Ordering};

/// Identity of a memo or effect as the reader of sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    pub fn new() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// Identity of a signal or memo as something that can be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(u64);

impl SourceId {
    pub fn new() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Numeric value, for logs.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SourceId {
    fn default() -> Self {
        Self::new()
    }
}

/// Staleness of a memo or effect. Propagation only raises it, never
/// lowers it: `Clean < MaybeDirty < Dirty`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DirtyState {
    Clean,
    /// Some upstream memo may have a new value; pull it to find out.
    MaybeDirty,
    /// A direct source changed.
    Dirty,
}
