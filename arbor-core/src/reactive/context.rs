//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when reactive state is read,
//! the store registers the current computation as a dependent.
//!
//! # Implementation
//!
//! A thread-local stack records the currently executing computation. Running
//! an effect pushes its subscriber; the guard pops it when the run completes,
//! even if the computation panics.
//!
//! Tracking can also be paused: [`ReactiveContext::pause`] pushes an empty
//! entry so that reads made inside it (cleanup callbacks, hook invocations,
//! nested untracked runs) register nothing, while the outer computation is
//! restored when the guard drops.

use std::cell::RefCell;

use super::SubscriberId;

thread_local! {
    /// `Some` entries are tracking computations, `None` entries pause tracking.
    static CONTEXT_STACK: RefCell<Vec<Option<SubscriberId>>> = const { RefCell::new(Vec::new()) };
}

/// Guard that pops the context when dropped.
#[must_use = "the context is exited as soon as the guard drops"]
pub struct ReactiveContext {
    entry: Option<SubscriberId>,
}

impl ReactiveContext {
    /// Enter a new reactive context for the given subscriber.
    ///
    /// While this context is active, any reactive reads register the
    /// subscriber as a dependent.
    pub fn enter(subscriber_id: SubscriberId) -> Self {
        Self::push(Some(subscriber_id))
    }

    /// Suspend tracking until the returned guard drops.
    pub fn pause() -> Self {
        Self::push(None)
    }

    fn push(entry: Option<SubscriberId>) -> Self {
        CONTEXT_STACK.with(|stack| stack.borrow_mut().push(entry));
        Self { entry }
    }

    /// Check if reads would currently be tracked.
    pub fn is_active() -> bool {
        Self::current_subscriber().is_some()
    }

    /// Get the current subscriber ID, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().copied().flatten())
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        let _ = CONTEXT_STACK.try_with(|stack| {
            let popped = stack.borrow_mut().pop();

            if let Some(entry) = popped {
                debug_assert_eq!(
                    entry, self.entry,
                    "ReactiveContext mismatch: expected {:?}, got {:?}",
                    self.entry, entry
                );
            }
        });
    }
}

/// Suspend tracking for the current frame; reads resume tracking once the
/// guard drops.
pub fn pause_tracking() -> ReactiveContext {
    ReactiveContext::pause()
}

/// Run `f` without recording any dependencies.
///
/// ```
/// use arbor_core::{effect, untracked, EffectOptions, Ref};
///
/// let tracked = Ref::new(1);
/// let ignored = Ref::new(1);
///
/// let runner = effect(
///     {
///         let (tracked, ignored) = (tracked.clone(), ignored.clone());
///         move || {
///             tracked.get();
///             untracked(|| ignored.get());
///         }
///     },
///     EffectOptions::default(),
/// );
///
/// assert_eq!(runner.effect().dependency_count(), 1);
/// ```
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _paused = pause_tracking();
    f()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_tracks_subscriber() {
        let id = SubscriberId::new();

        assert!(!ReactiveContext::is_active());
        assert!(ReactiveContext::current_subscriber().is_none());

        {
            let _ctx = ReactiveContext::enter(id);

            assert!(ReactiveContext::is_active());
            assert_eq!(ReactiveContext::current_subscriber(), Some(id));
        }

        // Context should be cleaned up after drop
        assert!(!ReactiveContext::is_active());
        assert!(ReactiveContext::current_subscriber().is_none());
    }

    #[test]
    fn pause_hides_outer_subscriber() {
        let id = SubscriberId::new();
        let _ctx = ReactiveContext::enter(id);

        untracked(|| {
            assert!(!ReactiveContext::is_active());
            assert!(ReactiveContext::current_subscriber().is_none());
        });

        assert_eq!(ReactiveContext::current_subscriber(), Some(id));
    }

    #[test]
    fn pause_tracking_lasts_until_guard_drops() {
        let id = SubscriberId::new();
        let _ctx = ReactiveContext::enter(id);

        let paused = pause_tracking();
        assert!(!ReactiveContext::is_active());
        drop(paused);

        assert!(ReactiveContext::is_active());
    }

    #[test]
    fn nested_contexts() {
        let id1 = SubscriberId::new();
        let id2 = SubscriberId::new();

        {
            let _ctx1 = ReactiveContext::enter(id1);
            assert_eq!(ReactiveContext::current_subscriber(), Some(id1));

            {
                let _ctx2 = ReactiveContext::enter(id2);
                assert_eq!(ReactiveContext::current_subscriber(), Some(id2));
            }

            // After inner context drops, outer should be current
            assert_eq!(ReactiveContext::current_subscriber(), Some(id1));
        }

        assert!(ReactiveContext::current_subscriber().is_none());
    }
}
