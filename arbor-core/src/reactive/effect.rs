//! Effect Implementation
//!
//! A [`ReactiveEffect`] is a computation whose reads are tracked by the
//! dependency store. It is the common engine behind plain effects, computed
//! values, watchers and component render effects; they differ only in what
//! happens when a dependency changes.
//!
//! # How Effects Work
//!
//! 1. `run` marks the effect clean, bumps its run tag and executes the
//!    function inside a reactive context, so that every tracked read lands
//!    in the effect's dependency list.
//!
//! 2. When a dependency changes, the store marks the effect dirty and calls
//!    its scheduler. Without a scheduler nothing else happens; the owner is
//!    expected to check [`ReactiveEffect::dirty`].
//!
//! 3. After `stop`, the effect is detached from every dependency. Running a
//!    stopped effect still executes the function, but untracked.
//!
//! # Differences from Computed
//!
//! - Effects are eager: every change reaches the scheduler.
//! - Computed getters are lazy: only the clean-to-dirty transition is
//!   propagated, and the value is recomputed on the next read.

use std::cell::Cell;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::trace;

use super::context::ReactiveContext;
use super::runtime::{Runtime, SubscriberHandle};
use super::scope::{self, Stoppable};
use super::subscriber::{Subscriber, SubscriberId};

/// Scheduling behavior of an effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectKind {
    /// Scheduled on every change of a dependency.
    Eager,
    /// Scheduled only when going from clean to dirty.
    Lazy,
}

/// A tracked computation.
///
/// Cloning shares the underlying effect.
///
/// # Example
///
/// ```
/// use arbor_core::{ReactiveEffect, Ref};
///
/// let count = Ref::new(1);
/// let effect = ReactiveEffect::new({
///     let count = count.clone();
///     move || count.get() * 2
/// }, None);
///
/// assert!(effect.dirty());
/// assert_eq!(effect.run(), 2);
/// assert!(!effect.dirty());
///
/// count.set(5);
/// assert!(effect.dirty());
/// ```
pub struct ReactiveEffect<T: 'static = ()> {
    inner: Rc<EffectInner<T>>,
}

struct EffectInner<T> {
    subscriber_id: SubscriberId,
    func: Box<dyn Fn() -> T>,
    scheduler: Option<Box<dyn Fn()>>,
    kind: EffectKind,
    run_count: Cell<usize>,
    _handle: SubscriberHandle,
}

impl<T> Subscriber for EffectInner<T> {
    fn subscriber_id(&self) -> SubscriberId {
        self.subscriber_id
    }

    fn schedule(&self) {
        if let Some(scheduler) = &self.scheduler {
            scheduler();
        }
    }

    fn is_eager(&self) -> bool {
        self.kind == EffectKind::Eager
    }
}

/// Weak reference to an effect, for schedulers that need to reach the effect
/// that owns them.
pub struct WeakEffect<T: 'static> {
    inner: Weak<EffectInner<T>>,
}

impl<T: 'static> WeakEffect<T> {
    pub fn upgrade(&self) -> Option<ReactiveEffect<T>> {
        self.inner.upgrade().map(|inner| ReactiveEffect { inner })
    }
}

impl<T: 'static> Clone for WeakEffect<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: 'static> ReactiveEffect<T> {
    /// Create an eager effect. It does not run until [`run`](Self::run) is
    /// called.
    pub fn new<F>(func: F, scheduler: Option<Box<dyn Fn()>>) -> Self
    where
        F: Fn() -> T + 'static,
    {
        Self::with_kind(func, EffectKind::Eager, |_| scheduler)
    }

    /// Create an effect whose scheduler is built from a weak handle to the
    /// effect itself.
    pub fn with_kind<F, S>(func: F, kind: EffectKind, make_scheduler: S) -> Self
    where
        F: Fn() -> T + 'static,
        S: FnOnce(WeakEffect<T>) -> Option<Box<dyn Fn()>>,
    {
        let inner = Rc::new_cyclic(|weak: &Weak<EffectInner<T>>| {
            let subscriber_id = SubscriberId::new();
            let node: Weak<dyn Subscriber> = weak.clone();
            EffectInner {
                subscriber_id,
                func: Box::new(func),
                scheduler: make_scheduler(WeakEffect {
                    inner: weak.clone(),
                }),
                kind,
                run_count: Cell::new(0),
                _handle: Runtime::register(subscriber_id, node, kind == EffectKind::Eager),
            }
        });
        Self { inner }
    }

    /// Run the function, collecting a fresh dependency set.
    ///
    /// A stopped effect runs its function untracked. So does an effect that
    /// is already running further up the stack.
    pub fn run(&self) -> T {
        let inner = &self.inner;
        inner.run_count.set(inner.run_count.get() + 1);

        let Some(_run) = Runtime::begin_run(inner.subscriber_id) else {
            trace!(subscriber = ?inner.subscriber_id, "untracked run");
            let _ctx = ReactiveContext::pause();
            return (inner.func)();
        };
        let _ctx = ReactiveContext::enter(inner.subscriber_id);
        (inner.func)()
    }

    /// Detach from every dependency and never track again. Idempotent.
    pub fn stop(&self) {
        Runtime::stop(self.inner.subscriber_id);
    }

    pub fn is_active(&self) -> bool {
        Runtime::is_active(self.inner.subscriber_id)
    }

    /// Whether a dependency changed since the last run.
    pub fn dirty(&self) -> bool {
        Runtime::is_dirty(self.inner.subscriber_id)
    }

    /// Force the next dirty check to report a change.
    pub fn mark_dirty(&self) {
        Runtime::mark_dirty(self.inner.subscriber_id);
    }

    pub fn kind(&self) -> EffectKind {
        self.inner.kind
    }

    /// Get the subscriber ID for this effect.
    pub fn subscriber_id(&self) -> SubscriberId {
        self.inner.subscriber_id
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.get()
    }

    /// Get the number of dependency sets the effect belongs to.
    pub fn dependency_count(&self) -> usize {
        Runtime::dependency_count(self.inner.subscriber_id)
    }

    pub fn downgrade(&self) -> WeakEffect<T> {
        WeakEffect {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: 'static> Clone for ReactiveEffect<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> Stoppable for ReactiveEffect<T> {
    fn stop(&self) {
        ReactiveEffect::stop(self);
    }
}

impl<T: 'static> fmt::Debug for ReactiveEffect<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveEffect")
            .field("subscriber_id", &self.inner.subscriber_id)
            .field("kind", &self.inner.kind)
            .field("run_count", &self.run_count())
            .field("active", &self.is_active())
            .finish()
    }
}

// ============================================================================
// effect()
// ============================================================================

/// Options for [`effect`].
#[derive(Clone, Default)]
pub struct EffectOptions {
    /// Called instead of re-running the effect when a dependency changes.
    pub scheduler: Option<Rc<dyn Fn()>>,

    /// Skip the initial run.
    pub lazy: bool,
}

impl EffectOptions {
    pub fn lazy() -> Self {
        Self {
            lazy: true,
            ..Self::default()
        }
    }

    pub fn with_scheduler(scheduler: impl Fn() + 'static) -> Self {
        Self {
            scheduler: Some(Rc::new(scheduler)),
            lazy: false,
        }
    }
}

/// Handle returned by [`effect`].
#[derive(Clone, Debug)]
pub struct EffectRunner {
    effect: ReactiveEffect<()>,
}

impl EffectRunner {
    /// Run the effect now, regardless of its dirty state.
    pub fn run(&self) {
        self.effect.run();
    }

    pub fn stop(&self) {
        self.effect.stop();
    }

    pub fn effect(&self) -> &ReactiveEffect<()> {
        &self.effect
    }
}

/// Create an effect that re-runs synchronously whenever a dependency changes.
///
/// With a custom scheduler the scheduler is called instead, and re-running is
/// left to it. The effect is recorded in the active [`EffectScope`], if any.
///
/// [`EffectScope`]: super::scope::EffectScope
///
/// # Example
///
/// ```
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use arbor_core::{effect, EffectOptions, Ref};
///
/// let count = Ref::new(0);
/// let seen = Rc::new(Cell::new(-1));
///
/// let _runner = effect(
///     {
///         let (count, seen) = (count.clone(), seen.clone());
///         move || seen.set(count.get())
///     },
///     EffectOptions::default(),
/// );
///
/// count.set(3);
/// assert_eq!(seen.get(), 3);
/// ```
pub fn effect<F>(func: F, options: EffectOptions) -> EffectRunner
where
    F: Fn() + 'static,
{
    let EffectOptions { scheduler, lazy } = options;

    let effect = ReactiveEffect::with_kind(func, EffectKind::Eager, |weak| {
        let scheduler: Box<dyn Fn()> = match scheduler {
            Some(custom) => Box::new(move || custom()),
            None => Box::new(move || {
                if let Some(effect) = weak.upgrade() {
                    effect.run();
                }
            }),
        };
        Some(scheduler)
    });

    scope::record(Rc::new(effect.clone()));
    if !lazy {
        effect.run();
    }

    EffectRunner { effect }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::refs::Ref;

    fn counter() -> Rc<Cell<i32>> {
        Rc::new(Cell::new(0))
    }

    #[test]
    fn effect_runs_on_creation() {
        let runs = counter();
        let runs_clone = runs.clone();

        let _runner = effect(move || runs_clone.set(runs_clone.get() + 1), EffectOptions::default());

        // Effect should have run once on creation
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn lazy_effect_does_not_run_on_creation() {
        let runs = counter();
        let runs_clone = runs.clone();

        let runner = effect(move || runs_clone.set(runs_clone.get() + 1), EffectOptions::lazy());
        assert_eq!(runs.get(), 0);
        assert_eq!(runner.effect().run_count(), 0);

        runner.run();
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn effect_reruns_when_dependency_changes() {
        let source = Ref::new(1);
        let seen = counter();

        let _runner = effect(
            {
                let (source, seen) = (source.clone(), seen.clone());
                move || seen.set(source.get())
            },
            EffectOptions::default(),
        );

        source.set(2);
        assert_eq!(seen.get(), 2);

        // Writing the same value is not a change
        source.set(2);
        assert_eq!(source.subscriber_count(), 1);
    }

    #[test]
    fn custom_scheduler_replaces_rerun() {
        let source = Ref::new(0);
        let runs = counter();
        let scheduled = counter();

        let runner = effect(
            {
                let (source, runs) = (source.clone(), runs.clone());
                move || {
                    source.get();
                    runs.set(runs.get() + 1);
                }
            },
            EffectOptions::with_scheduler({
                let scheduled = scheduled.clone();
                move || scheduled.set(scheduled.get() + 1)
            }),
        );

        source.set(1);
        source.set(2);
        assert_eq!(runs.get(), 1);
        assert_eq!(scheduled.get(), 2);
        assert!(runner.effect().dirty());
    }

    #[test]
    fn stopped_effect_runs_untracked() {
        let source = Ref::new(0);
        let runs = counter();

        let runner = effect(
            {
                let (source, runs) = (source.clone(), runs.clone());
                move || {
                    source.get();
                    runs.set(runs.get() + 1);
                }
            },
            EffectOptions::default(),
        );

        runner.stop();
        runner.stop();
        source.set(1);
        assert_eq!(runs.get(), 1);

        runner.run();
        assert_eq!(runs.get(), 2);
        assert_eq!(runner.effect().dependency_count(), 0);
        assert!(!runner.effect().is_active());
    }

    #[test]
    fn effect_does_not_retrigger_itself() {
        let source = Ref::new(0);
        let runner = effect(
            {
                let source = source.clone();
                move || source.set(source.get() + 1)
            },
            EffectOptions::default(),
        );

        assert_eq!(source.get_untracked(), 1);
        assert_eq!(runner.effect().run_count(), 1);
    }

    #[test]
    fn nested_effects_track_independently() {
        let outer_source = Ref::new(0);
        let inner_source = Ref::new(0);
        let inner_runs = counter();

        let inner = ReactiveEffect::new(
            {
                let (inner_source, inner_runs) = (inner_source.clone(), inner_runs.clone());
                move || {
                    inner_source.get();
                    inner_runs.set(inner_runs.get() + 1);
                }
            },
            None,
        );

        let outer = ReactiveEffect::new(
            {
                let (outer_source, inner) = (outer_source.clone(), inner.clone());
                move || {
                    inner.run();
                    outer_source.get();
                }
            },
            None,
        );

        outer.run();
        assert_eq!(outer.dependency_count(), 1);
        assert_eq!(inner.dependency_count(), 1);

        inner_source.set(1);
        assert!(inner.dirty());
        assert!(!outer.dirty());
    }

    #[test]
    fn effect_clone_shares_state() {
        let effect1 = ReactiveEffect::new(|| {}, None);
        let effect2 = effect1.clone();

        assert_eq!(effect1.subscriber_id(), effect2.subscriber_id());

        effect1.run();
        assert_eq!(effect2.run_count(), 1);

        effect1.stop();
        assert!(!effect2.is_active());
    }
}
