//! Effect scopes.
//!
//! An [`EffectScope`] collects the effects, computed values and watchers
//! created while it is active, so they can all be stopped at once. Every
//! component instance owns one; unmounting the component stops it.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use tracing::debug;

/// Anything an effect scope can stop.
pub trait Stoppable {
    fn stop(&self);
}

thread_local! {
    static ACTIVE_SCOPES: RefCell<Vec<EffectScope>> = const { RefCell::new(Vec::new()) };
}

/// A collection of effects stopped together.
///
/// Cloning shares the scope.
#[derive(Clone, Default)]
pub struct EffectScope {
    inner: Rc<ScopeInner>,
}

#[derive(Default)]
struct ScopeInner {
    effects: RefCell<Vec<Rc<dyn Stoppable>>>,
    stopped: Cell<bool>,
}

struct ScopeGuard;

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        let _ = ACTIVE_SCOPES.try_with(|scopes| scopes.borrow_mut().pop());
    }
}

impl EffectScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` with this scope active. Effects created inside are recorded.
    ///
    /// A stopped scope still runs `f` but records nothing.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> R {
        ACTIVE_SCOPES.with(|scopes| scopes.borrow_mut().push(self.clone()));
        let _guard = ScopeGuard;
        f()
    }

    /// Stop every recorded effect. Idempotent.
    pub fn stop(&self) {
        if self.inner.stopped.replace(true) {
            return;
        }
        let effects = std::mem::take(&mut *self.inner.effects.borrow_mut());
        debug!(count = effects.len(), "stopping effect scope");
        for effect in effects {
            effect.stop();
        }
    }

    pub fn is_active(&self) -> bool {
        !self.inner.stopped.get()
    }

    /// Number of effects recorded so far.
    pub fn len(&self) -> usize {
        self.inner.effects.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record an effect created outside [`run`](Self::run). Ignored once the
    /// scope is stopped.
    pub fn add(&self, effect: Rc<dyn Stoppable>) {
        if self.is_active() {
            self.inner.effects.borrow_mut().push(effect);
        }
    }
}

impl fmt::Debug for EffectScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectScope")
            .field("effects", &self.len())
            .field("active", &self.is_active())
            .finish()
    }
}

/// The innermost scope currently running, if any.
pub fn current_scope() -> Option<EffectScope> {
    ACTIVE_SCOPES.with(|scopes| scopes.borrow().last().cloned())
}

/// Record an effect in the active scope.
pub(crate) fn record(effect: Rc<dyn Stoppable>) {
    if let Some(scope) = current_scope() {
        scope.add(effect);
    }
}
