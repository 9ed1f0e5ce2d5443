//! Computed Implementation
//!
//! A [`Computed`] is a derived value that caches its result. It re-evaluates
//! only when read after one of its dependencies changed.
//!
//! # States
//!
//! A computed value is either clean (the cache is current) or dirty (a
//! dependency changed, or it never ran). Reading a dirty computed value runs
//! the getter; reading a clean one returns the cache.
//!
//! # Propagation
//!
//! When a dependency changes, the getter is not re-run. Instead the computed
//! value notifies its own subscribers, and only on the clean-to-dirty
//! transition, so a burst of writes produces a single notification.
//!
//! # Example
//!
//! ```
//! use arbor_core::{computed, Ref};
//!
//! let count = Ref::new(2);
//! let doubled = computed({
//!     let count = count.clone();
//!     move || count.get() * 2
//! });
//!
//! assert_eq!(doubled.get(), 4);
//! count.set(5);
//! assert_eq!(doubled.get(), 10);
//! ```

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::warn;

use super::dep::{DepKey, TargetId};
use super::effect::{EffectKind, ReactiveEffect};
use super::runtime::Runtime;
use super::scope;

/// A cached derived value.
///
/// Cloning shares the cache.
pub struct Computed<T: 'static> {
    inner: Rc<ComputedInner<T>>,
}

struct ComputedInner<T: 'static> {
    target: TargetId,
    effect: ReactiveEffect<T>,
    value: RefCell<Option<T>>,
    setter: Option<Box<dyn Fn(T)>>,
}

impl<T: 'static> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        Runtime::forget_target(self.target);
    }
}

impl<T: Clone + 'static> Computed<T> {
    fn build<F>(getter: F, setter: Option<Box<dyn Fn(T)>>) -> Self
    where
        F: Fn() -> T + 'static,
    {
        let target = TargetId::new();
        let effect = ReactiveEffect::with_kind(getter, EffectKind::Lazy, move |_| {
            let notify: Box<dyn Fn()> = Box::new(move || Runtime::trigger(target, DepKey::Value));
            Some(notify)
        });
        scope::record(Rc::new(effect.clone()));

        Self {
            inner: Rc::new(ComputedInner {
                target,
                effect,
                value: RefCell::new(None),
                setter,
            }),
        }
    }

    /// Get the value, recomputing it if a dependency changed.
    ///
    /// The running computation subscribes to this value whether or not a
    /// recomputation happened.
    pub fn get(&self) -> T {
        let inner = &*self.inner;

        let cached = if inner.effect.dirty() {
            None
        } else {
            inner.value.borrow().clone()
        };
        let value = match cached {
            Some(value) => value,
            None => {
                let fresh = inner.effect.run();
                inner.value.replace(Some(fresh.clone()));
                fresh
            }
        };

        Runtime::track(inner.target, DepKey::Value);
        value
    }

    /// Write through the setter.
    ///
    /// Computed values built with [`computed`] have no setter; writing to
    /// them logs a warning and changes nothing.
    pub fn set(&self, value: T) {
        match &self.inner.setter {
            Some(setter) => setter(value),
            None => warn!(target = ?self.inner.target, "write to a read-only computed value ignored"),
        }
    }

    /// Whether the next read will recompute.
    pub fn dirty(&self) -> bool {
        self.inner.effect.dirty()
    }

    /// Check if a value has been computed at least once.
    pub fn has_value(&self) -> bool {
        self.inner.value.borrow().is_some()
    }

    /// Get the number of times the getter ran.
    pub fn compute_count(&self) -> usize {
        self.inner.effect.run_count()
    }

    pub fn target_id(&self) -> TargetId {
        self.inner.target
    }

    /// Detach the getter from its dependencies. Later reads run it untracked.
    pub fn stop(&self) {
        self.inner.effect.stop();
    }

    pub fn effect(&self) -> &ReactiveEffect<T> {
        &self.inner.effect
    }
}

impl<T: 'static> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("target", &self.inner.target)
            .field("value", &*self.inner.value.borrow())
            .field("dirty", &self.inner.effect.dirty())
            .finish()
    }
}

/// Create a read-only computed value.
pub fn computed<T, F>(getter: F) -> Computed<T>
where
    T: Clone + 'static,
    F: Fn() -> T + 'static,
{
    Computed::build(getter, None)
}

/// Create a computed value whose writes are forwarded to `setter`.
pub fn computed_with_setter<T, F, S>(getter: F, setter: S) -> Computed<T>
where
    T: Clone + 'static,
    F: Fn() -> T + 'static,
    S: Fn(T) + 'static,
{
    Computed::build(getter, Some(Box::new(setter)))
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
