//! Subscriber types for the reactive system.
//!
//! A subscriber is any computation that re-evaluates when the state it read
//! changes: plain effects, computed getters, watchers and component render
//! effects. The dependency store only knows subscribers by id and reaches
//! them through the [`Subscriber`] trait.

use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a subscriber.
///
/// Each effect gets a unique ID when created. The dependency store keys its
/// per-subscriber bookkeeping (run tag, dependency list, dirty flag) by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// Freshness of a subscriber's last result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DirtyLevel {
    /// The last run saw the current state of every dependency.
    Clean,
    /// A dependency changed since the last run, or it never ran.
    #[default]
    Dirty,
}

/// A computation the dependency store can notify.
///
/// Implementors must not touch the dependency store from `subscriber_id` or
/// `is_eager`; `schedule` is always called after the store is released.
pub trait Subscriber {
    /// Get the subscriber ID for this computation.
    fn subscriber_id(&self) -> SubscriberId;

    /// React to a dependency change.
    ///
    /// Eager subscribers run or enqueue themselves. Lazy subscribers (computed
    /// values) propagate the change to their own dependents.
    fn schedule(&self);

    /// Eager subscribers are scheduled on every change; lazy ones only on the
    /// clean-to-dirty transition.
    fn is_eager(&self) -> bool;
}
