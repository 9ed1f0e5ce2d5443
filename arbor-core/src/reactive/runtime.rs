//! Reactive Runtime
//!
//! The runtime owns the dependency store: the bipartite graph between
//! dependency sets (one per `(target, key)` pair) and the subscribers that
//! read them.
//!
//! # How It Works
//!
//! 1. A subscriber registers with the runtime and receives a handle. The
//!    handle unregisters it (and detaches all its edges) when dropped.
//!
//! 2. Before each run, [`Runtime::begin_run`] bumps the subscriber's run tag
//!    and sets its previous dependency list aside.
//!
//! 3. Every tracked read calls [`Runtime::track`], which stamps the edge with
//!    the current run tag. An edge already stamped this run is not added
//!    twice.
//!
//! 4. After the run, [`Runtime::end_run`] walks the previous list and drops
//!    every edge that was not re-stamped. Dependency sets left empty are
//!    removed entirely.
//!
//! 5. [`Runtime::trigger`] marks every current subscriber of a dependency set
//!    dirty and collects the ones to notify. Notification happens after the
//!    store is released, so schedulers may freely read and write state.
//!
//! # Threading
//!
//! The store is thread-local. Reactive state created on one thread is
//! invisible to computations on another.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;
use tracing::trace;

use super::context::ReactiveContext;
use super::dep::{Dep, DepId, DepKey, TargetId};
use super::subscriber::{DirtyLevel, Subscriber, SubscriberId};

/// Handle to a registered subscriber.
///
/// Dropping this handle unregisters the subscriber from the runtime.
pub struct SubscriberHandle {
    subscriber_id: SubscriberId,
}

impl SubscriberHandle {
    pub fn subscriber_id(&self) -> SubscriberId {
        self.subscriber_id
    }
}

impl Drop for SubscriberHandle {
    fn drop(&mut self) {
        Runtime::unregister(self.subscriber_id);
    }
}

/// Per-subscriber bookkeeping.
struct SubscriberRecord {
    node: Weak<dyn Subscriber>,
    eager: bool,
    track_id: u64,
    deps: SmallVec<[DepId; 8]>,
    /// Dependencies of the previous run, pending release at `end_run`.
    stale: SmallVec<[DepId; 8]>,
    dirty: DirtyLevel,
    running: bool,
    active: bool,
}

#[derive(Default)]
struct DepStore {
    targets: HashMap<TargetId, HashMap<DepKey, DepId>>,
    deps: HashMap<DepId, Dep>,
    subscribers: HashMap<SubscriberId, SubscriberRecord>,
    next_dep: u64,
}

thread_local! {
    static STORE: RefCell<DepStore> = RefCell::new(DepStore::default());
}

fn with_store<R>(f: impl FnOnce(&mut DepStore) -> R) -> R {
    STORE.with(|store| f(&mut store.borrow_mut()))
}

/// Like `with_store` but silent when the thread is shutting down or the store
/// is busy. Used from `Drop` paths.
fn try_with_store(f: impl FnOnce(&mut DepStore)) {
    let _ = STORE.try_with(|store| {
        if let Ok(mut store) = store.try_borrow_mut() {
            f(&mut store);
        }
    });
}

impl DepStore {
    fn dep_for(&mut self, target: TargetId, key: DepKey) -> DepId {
        let next = &mut self.next_dep;
        let deps = &mut self.deps;
        *self
            .targets
            .entry(target)
            .or_default()
            .entry(key.clone())
            .or_insert_with(|| {
                *next += 1;
                let id = DepId(*next);
                deps.insert(id, Dep::new(target, key));
                id
            })
    }

    fn track(&mut self, subscriber: SubscriberId, target: TargetId, key: DepKey) {
        let track_id = match self.subscribers.get(&subscriber) {
            Some(record) if record.active => record.track_id,
            _ => return,
        };

        let dep_id = self.dep_for(target, key);
        let Some(dep) = self.deps.get_mut(&dep_id) else {
            return;
        };

        if dep.subscribers.get(&subscriber) == Some(&track_id) {
            return;
        }
        dep.subscribers.insert(subscriber, track_id);
        trace!(?subscriber, ?target, key = ?dep.key, "dependency tracked");

        if let Some(record) = self.subscribers.get_mut(&subscriber) {
            record.deps.push(dep_id);
        }
    }

    fn begin_run(&mut self, subscriber: SubscriberId) -> bool {
        let Some(record) = self.subscribers.get_mut(&subscriber) else {
            return false;
        };
        if !record.active || record.running {
            return false;
        }

        record.running = true;
        record.dirty = DirtyLevel::Clean;
        record.track_id += 1;
        record.stale = std::mem::take(&mut record.deps);
        true
    }

    fn end_run(&mut self, subscriber: SubscriberId) {
        let Some(record) = self.subscribers.get_mut(&subscriber) else {
            return;
        };
        record.running = false;
        let track_id = record.track_id;
        let stale = std::mem::take(&mut record.stale);

        for dep_id in stale {
            let Some(dep) = self.deps.get_mut(&dep_id) else {
                continue;
            };
            // Re-read during this run.
            if dep.subscribers.get(&subscriber) == Some(&track_id) {
                continue;
            }
            dep.subscribers.shift_remove(&subscriber);
            trace!(?subscriber, target = ?dep.target, key = ?dep.key, "stale dependency released");
            if dep.subscribers.is_empty() {
                self.drop_dep(dep_id);
            }
        }
    }

    fn detach_all(&mut self, subscriber: SubscriberId) {
        let Some(record) = self.subscribers.get_mut(&subscriber) else {
            return;
        };
        let mut edges = std::mem::take(&mut record.deps);
        edges.extend(std::mem::take(&mut record.stale));

        for dep_id in edges {
            let Some(dep) = self.deps.get_mut(&dep_id) else {
                continue;
            };
            dep.subscribers.shift_remove(&subscriber);
            if dep.subscribers.is_empty() {
                self.drop_dep(dep_id);
            }
        }
    }

    fn drop_dep(&mut self, dep_id: DepId) {
        let Some(dep) = self.deps.remove(&dep_id) else {
            return;
        };
        if let Some(keys) = self.targets.get_mut(&dep.target) {
            keys.remove(&dep.key);
            if keys.is_empty() {
                self.targets.remove(&dep.target);
            }
        }
    }

    fn collect_triggered(
        &mut self,
        target: TargetId,
        key: &DepKey,
    ) -> SmallVec<[Rc<dyn Subscriber>; 4]> {
        let mut notify = SmallVec::new();

        let Some(dep_id) = self.targets.get(&target).and_then(|keys| keys.get(key)).copied() else {
            return notify;
        };
        let Some(dep) = self.deps.get(&dep_id) else {
            return notify;
        };
        let edges: SmallVec<[(SubscriberId, u64); 8]> =
            dep.subscribers.iter().map(|(id, tag)| (*id, *tag)).collect();

        for (id, tag) in edges {
            let Some(record) = self.subscribers.get_mut(&id) else {
                continue;
            };
            // A running subscriber never re-triggers itself, and an edge
            // stamped by an earlier run is pending release.
            if !record.active || record.running || record.track_id != tag {
                continue;
            }

            let was_clean = record.dirty == DirtyLevel::Clean;
            record.dirty = DirtyLevel::Dirty;
            if !(record.eager || was_clean) {
                continue;
            }
            if let Some(node) = record.node.upgrade() {
                notify.push(node);
            }
        }

        notify
    }

    fn forget_target(&mut self, target: TargetId) {
        let Some(keys) = self.targets.remove(&target) else {
            return;
        };
        for dep_id in keys.into_values() {
            let Some(dep) = self.deps.remove(&dep_id) else {
                continue;
            };
            for subscriber in dep.subscribers.keys() {
                if let Some(record) = self.subscribers.get_mut(subscriber) {
                    record.deps.retain(|d| *d != dep_id);
                    record.stale.retain(|d| *d != dep_id);
                }
            }
        }
    }
}

/// Ends a run when dropped, so that stale edges are released even if the
/// computation panics.
pub(crate) struct RunGuard {
    subscriber_id: SubscriberId,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let id = self.subscriber_id;
        try_with_store(|store| store.end_run(id));
    }
}

/// The thread's reactive runtime.
///
/// All state lives in a thread-local store; this type only groups the
/// operations on it.
pub struct Runtime;

impl Runtime {
    /// Register a subscriber with the runtime.
    ///
    /// New subscribers start dirty. Returns a handle that unregisters the
    /// subscriber when dropped.
    pub fn register(
        subscriber_id: SubscriberId,
        node: Weak<dyn Subscriber>,
        eager: bool,
    ) -> SubscriberHandle {
        with_store(|store| {
            store.subscribers.insert(
                subscriber_id,
                SubscriberRecord {
                    node,
                    eager,
                    track_id: 0,
                    deps: SmallVec::new(),
                    stale: SmallVec::new(),
                    dirty: DirtyLevel::Dirty,
                    running: false,
                    active: true,
                },
            );
        });
        SubscriberHandle { subscriber_id }
    }

    fn unregister(id: SubscriberId) {
        try_with_store(|store| {
            store.detach_all(id);
            store.subscribers.remove(&id);
        });
    }

    /// Start a tracked run.
    ///
    /// Returns `None` when the subscriber is stopped or already running; the
    /// caller then runs the computation untracked.
    pub(crate) fn begin_run(id: SubscriberId) -> Option<RunGuard> {
        with_store(|store| store.begin_run(id)).then(|| RunGuard { subscriber_id: id })
    }

    /// Record that the current computation read `key` of `target`.
    ///
    /// A no-op outside any computation or while tracking is paused.
    pub fn track(target: TargetId, key: DepKey) {
        let Some(subscriber) = ReactiveContext::current_subscriber() else {
            return;
        };
        with_store(|store| store.track(subscriber, target, key));
    }

    /// Notify the subscribers of `key` on `target`.
    ///
    /// Every current subscriber is marked dirty. Eager subscribers are always
    /// scheduled; lazy subscribers only when they were clean, which keeps a
    /// chain of computed values from re-notifying on every write.
    pub fn trigger(target: TargetId, key: DepKey) {
        let notify = with_store(|store| store.collect_triggered(target, &key));
        if notify.is_empty() {
            return;
        }
        trace!(?target, ?key, count = notify.len(), "trigger");
        for node in notify {
            node.schedule();
        }
    }

    /// Detach a subscriber from all of its dependencies and deactivate it.
    ///
    /// A stopped subscriber is never notified again and its runs are not
    /// tracked. Stopping twice is a no-op.
    pub fn stop(id: SubscriberId) {
        with_store(|store| {
            store.detach_all(id);
            if let Some(record) = store.subscribers.get_mut(&id) {
                record.active = false;
            }
        });
    }

    pub fn is_active(id: SubscriberId) -> bool {
        with_store(|store| store.subscribers.get(&id).is_some_and(|r| r.active))
    }

    /// Whether the subscriber's last result is out of date.
    pub fn is_dirty(id: SubscriberId) -> bool {
        with_store(|store| {
            store
                .subscribers
                .get(&id)
                .map_or(true, |r| r.dirty == DirtyLevel::Dirty)
        })
    }

    pub fn mark_dirty(id: SubscriberId) {
        with_store(|store| {
            if let Some(record) = store.subscribers.get_mut(&id) {
                record.dirty = DirtyLevel::Dirty;
            }
        });
    }

    /// Release every dependency set of a target that is going away.
    pub fn forget_target(target: TargetId) {
        try_with_store(|store| store.forget_target(target));
    }

    /// Number of dependency sets the subscriber currently belongs to.
    pub fn dependency_count(id: SubscriberId) -> usize {
        with_store(|store| store.subscribers.get(&id).map_or(0, |r| r.deps.len()))
    }

    /// Number of subscribers of `key` on `target`.
    pub fn subscriber_count(target: TargetId, key: &DepKey) -> usize {
        with_store(|store| {
            store
                .targets
                .get(&target)
                .and_then(|keys| keys.get(key))
                .and_then(|dep_id| store.deps.get(dep_id))
                .map_or(0, |dep| dep.subscribers.len())
        })
    }

    /// Whether any dependency set of `target` is alive.
    pub fn has_dependents(target: TargetId) -> bool {
        with_store(|store| store.targets.contains_key(&target))
    }

    /// Get the current subscriber being tracked, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        ReactiveContext::current_subscriber()
    }

    /// Check if reads are currently tracked.
    pub fn is_tracking() -> bool {
        ReactiveContext::is_active()
    }
}
