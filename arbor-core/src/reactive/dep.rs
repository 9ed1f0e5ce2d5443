//! Dependency identifiers.
//!
//! Every piece of trackable state is a *target* (a record, a ref, a computed
//! value) addressed by a [`TargetId`]. A target is divided into *keys*: the
//! fields of a record, the iteration order of a record, or the single value
//! of a ref. The pair `(target, key)` names one dependency set.

use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

use super::SubscriberId;

/// Identity of a trackable piece of state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(u64);

impl TargetId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for TargetId {
    fn default() -> Self {
        Self::new()
    }
}

/// The part of a target a computation read.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DepKey {
    /// A named field of a record.
    Field(String),
    /// The key set of a record. Adding or deleting a field triggers it.
    Iterate,
    /// The whole value of a ref or computed.
    Value,
}

impl From<&str> for DepKey {
    fn from(key: &str) -> Self {
        DepKey::Field(key.to_string())
    }
}

/// Handle of a dependency set inside the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct DepId(pub(crate) u64);

/// One dependency set: the subscribers that read `(target, key)`.
///
/// Each subscriber is stored with the run tag under which it last read the
/// key. A tag that differs from the subscriber's current run tag marks a
/// stale edge left over from an earlier run.
#[derive(Debug)]
pub(crate) struct Dep {
    pub(crate) target: TargetId,
    pub(crate) key: DepKey,
    pub(crate) subscribers: IndexMap<SubscriberId, u64>,
}

impl Dep {
    pub(crate) fn new(target: TargetId, key: DepKey) -> Self {
        Self {
            target,
            key,
            subscribers: IndexMap::new(),
        }
    }
}
