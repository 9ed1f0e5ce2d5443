//! Watchers.
//!
//! A watcher observes a source and calls back with the new and previous
//! value whenever the source changes. The source is evaluated by a tracked
//! effect; the callback itself runs untracked as a scheduler job, so a burst
//! of writes in one synchronous frame produces a single callback.
//!
//! Sources can be refs, computed values, object refs, arbitrary getters, or
//! whole reactive records. A record source is traversed so that a write to
//! any nested field fires the watcher; [`WatchDepth`] bounds the traversal.
//!
//! # Example
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use arbor_core::{scheduler, watch, Ref, WatchOptions};
//!
//! let count = Ref::new(0);
//! let log = Rc::new(RefCell::new(Vec::new()));
//!
//! let _handle = watch(
//!     count.clone(),
//!     {
//!         let log = log.clone();
//!         move |new: &i32, old: Option<&i32>, _| log.borrow_mut().push((*new, old.copied()))
//!     },
//!     WatchOptions::default(),
//! );
//!
//! count.set(1);
//! count.set(2);
//! scheduler::flush_jobs();
//!
//! assert_eq!(*log.borrow(), vec![(2, Some(0))]);
//! ```

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::computed::Computed;
use super::context::untracked;
use super::dep::TargetId;
use super::effect::ReactiveEffect;
use super::proxy::Reactive;
use super::refs::{ObjectRef, Ref};
use super::scope::{self, Stoppable};
use crate::scheduler::{self, Job};
use crate::value::Value;

/// How far a watcher descends into record sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchDepth {
    #[default]
    Unlimited,
    /// Read this many levels of fields. `Levels(1)` reads the top-level
    /// fields only.
    Levels(usize),
}

/// When a watcher's callback runs relative to the triggering write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushTiming {
    /// As a queued job, once per flush.
    #[default]
    Queued,
    /// Synchronously inside the write.
    Sync,
}

/// Options for [`watch`] and [`watch_effect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchOptions {
    /// Traversal depth for record sources.
    pub deep: WatchDepth,

    /// Call back once right away, with no previous value.
    pub immediate: bool,

    pub flush: FlushTiming,
}

impl WatchOptions {
    pub fn immediate() -> Self {
        Self {
            immediate: true,
            ..Self::default()
        }
    }

    /// Watch only the top-level fields of a record source.
    pub fn shallow() -> Self {
        Self {
            deep: WatchDepth::Levels(1),
            ..Self::default()
        }
    }

    pub fn sync() -> Self {
        Self {
            flush: FlushTiming::Sync,
            ..Self::default()
        }
    }
}

/// Registers a function to run before the next callback and when the
/// watcher stops.
///
/// Registering again replaces the previous cleanup.
#[derive(Clone, Default)]
pub struct OnCleanup {
    slot: Rc<RefCell<Option<Box<dyn FnOnce()>>>>,
}

impl OnCleanup {
    pub fn register(&self, f: impl FnOnce() + 'static) {
        self.slot.replace(Some(Box::new(f)));
    }

    fn run(&self) {
        let pending = self.slot.borrow_mut().take();
        if let Some(cleanup) = pending {
            untracked(cleanup);
        }
    }
}

impl fmt::Debug for OnCleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnCleanup")
            .field("pending", &self.slot.borrow().is_some())
            .finish()
    }
}

// ============================================================================
// Sources
// ============================================================================

/// Something a watcher can observe.
///
/// Build one from a getter with [`WatchSource::getter`], or convert a
/// [`Ref`], [`Computed`], [`ObjectRef`] or [`Reactive`] with `into()`.
pub struct WatchSource<T> {
    getter: Box<dyn Fn(WatchDepth) -> T>,
}

impl<T: 'static> WatchSource<T> {
    pub fn getter(f: impl Fn() -> T + 'static) -> Self {
        Self {
            getter: Box::new(move |_| f()),
        }
    }
}

impl<T: Clone + PartialEq + 'static> From<Ref<T>> for WatchSource<T> {
    fn from(source: Ref<T>) -> Self {
        Self::getter(move || source.get())
    }
}

impl<T: Clone + 'static> From<Computed<T>> for WatchSource<T> {
    fn from(source: Computed<T>) -> Self {
        Self::getter(move || source.get())
    }
}

impl From<ObjectRef> for WatchSource<Value> {
    fn from(source: ObjectRef) -> Self {
        Self::getter(move || source.get())
    }
}

impl From<Reactive> for WatchSource<Reactive> {
    fn from(source: Reactive) -> Self {
        Self {
            getter: Box::new(move |depth| {
                let limit = match depth {
                    WatchDepth::Unlimited => None,
                    WatchDepth::Levels(n) => Some(n),
                };
                traverse(&Value::Reactive(source.clone()), limit, &mut HashSet::new());
                source.clone()
            }),
        }
    }
}

/// Read every field reachable from `value`, so the running effect subscribes
/// to all of them. Records already visited are skipped.
fn traverse(value: &Value, remaining: Option<usize>, seen: &mut HashSet<TargetId>) {
    if remaining == Some(0) {
        return;
    }
    let next = remaining.map(|n| n - 1);

    match value {
        Value::Reactive(view) => {
            if !seen.insert(view.id()) {
                return;
            }
            for key in view.keys() {
                traverse(&view.get(&key), next, seen);
            }
        }
        Value::List(items) => {
            for item in items.iter() {
                traverse(item, next, seen);
            }
        }
        _ => {}
    }
}

// ============================================================================
// Watcher
// ============================================================================

type Callback<T> = Box<dyn FnMut(&T, Option<&T>, &OnCleanup)>;

struct Watcher<T: 'static> {
    effect: ReactiveEffect<T>,
    job: Job,
    callback: RefCell<Option<Callback<T>>>,
    has_callback: bool,
    old: RefCell<Option<T>>,
    cleanup: OnCleanup,
}

impl<T: Clone + 'static> Watcher<T> {
    fn new(
        source: WatchSource<T>,
        callback: Option<Callback<T>>,
        cleanup: OnCleanup,
        options: WatchOptions,
    ) -> Rc<Self> {
        Rc::new_cyclic(|weak: &Weak<Watcher<T>>| {
            let job = Job::new({
                let weak = weak.clone();
                move || {
                    if let Some(watcher) = weak.upgrade() {
                        watcher.fire();
                    }
                }
            });

            let scheduler: Box<dyn Fn()> = match options.flush {
                FlushTiming::Queued => {
                    let job = job.clone();
                    Box::new(move || scheduler::queue_job(&job))
                }
                FlushTiming::Sync => {
                    let job = job.clone();
                    Box::new(move || job.run())
                }
            };

            let depth = options.deep;
            let getter = source.getter;
            let effect = ReactiveEffect::new(move || getter(depth), Some(scheduler));

            Watcher {
                effect,
                job,
                has_callback: callback.is_some(),
                callback: RefCell::new(callback),
                old: RefCell::new(None),
                cleanup,
            }
        })
    }

    /// Re-evaluate the source and, for `watch`, call back.
    fn fire(&self) {
        if !self.effect.is_active() || !self.effect.dirty() {
            return;
        }

        if !self.has_callback {
            self.effect.run();
            return;
        }

        // The callback is taken out while it runs; a re-entrant fire finds
        // the slot empty and leaves the watcher dirty.
        let Some(mut callback) = self.callback.borrow_mut().take() else {
            return;
        };

        let value = self.effect.run();
        self.cleanup.run();
        let old = self.old.borrow_mut().take();
        trace!(subscriber = ?self.effect.subscriber_id(), "watch callback");
        untracked(|| callback(&value, old.as_ref(), &self.cleanup));

        *self.old.borrow_mut() = Some(value);
        *self.callback.borrow_mut() = Some(callback);
    }
}

impl<T: 'static> Stoppable for Watcher<T> {
    fn stop(&self) {
        self.effect.stop();
        scheduler::invalidate_job(&self.job);
        self.cleanup.run();
    }
}

/// Handle to a running watcher.
///
/// Dropping the handle stops the watcher unless it was created inside an
/// [`EffectScope`](super::scope::EffectScope), which then owns it.
#[must_use = "dropping the handle stops the watcher"]
pub struct WatchHandle {
    watcher: Rc<dyn Stoppable>,
}

impl WatchHandle {
    pub fn stop(&self) {
        self.watcher.stop();
    }
}

impl fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchHandle").finish_non_exhaustive()
    }
}

/// Watch `source` and call `callback(new, old, on_cleanup)` when it changes.
///
/// The previous value is `None` on an immediate first call. The callback
/// runs after every change of the source's dependencies, even when the new
/// value equals the old one.
pub fn watch<T, F>(source: impl Into<WatchSource<T>>, callback: F, options: WatchOptions) -> WatchHandle
where
    T: Clone + 'static,
    F: FnMut(&T, Option<&T>, &OnCleanup) + 'static,
{
    let watcher = Watcher::new(source.into(), Some(Box::new(callback)), OnCleanup::default(), options);

    if options.immediate {
        watcher.fire();
    } else {
        let initial = watcher.effect.run();
        *watcher.old.borrow_mut() = Some(initial);
    }

    let handle: Rc<dyn Stoppable> = watcher;
    scope::record(handle.clone());
    WatchHandle { watcher: handle }
}

/// Run `f` now and again whenever anything it read changes.
///
/// `f` may register a cleanup, which runs before the next run and when the
/// watcher stops.
pub fn watch_effect<F>(f: F, options: WatchOptions) -> WatchHandle
where
    F: Fn(&OnCleanup) + 'static,
{
    let cleanup = OnCleanup::default();
    let source = WatchSource::getter({
        let cleanup = cleanup.clone();
        move || {
            cleanup.run();
            f(&cleanup);
        }
    });
    let watcher = Watcher::new(source, None, cleanup, options);
    watcher.effect.run();

    let handle: Rc<dyn Stoppable> = watcher;
    scope::record(handle.clone());
    WatchHandle { watcher: handle }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        // Two strong references means the scope holds the other one.
        if Rc::strong_count(&self.watcher) == 1 {
            self.watcher.stop();
        }
    }
}
