//! Lifecycle hooks.
//!
//! Hooks are registered from a component's setup function and kept per
//! phase in registration order.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

/// A registered hook callback.
pub type HookFn = Rc<dyn Fn()>;

/// The points in an instance's life at which hooks run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleHook {
    BeforeMount,
    Mounted,
    BeforeUpdate,
    Updated,
    BeforeUnmount,
    Unmounted,
    /// A kept-alive instance was moved back into the tree.
    Activated,
    /// A kept-alive instance was moved out of the tree instead of unmounted.
    Deactivated,
}

impl LifecycleHook {
    /// Hooks that run after the render effect has finished, so that state
    /// written inside them schedules a fresh update.
    pub fn is_post(&self) -> bool {
        matches!(
            self,
            LifecycleHook::Mounted
                | LifecycleHook::Updated
                | LifecycleHook::Activated
                | LifecycleHook::Deactivated
        )
    }
}

/// Hooks of one instance.
#[derive(Default)]
pub struct LifecycleHooks {
    hooks: HashMap<LifecycleHook, Vec<HookFn>>,
}

impl LifecycleHooks {
    pub fn register(&mut self, phase: LifecycleHook, hook: HookFn) {
        self.hooks.entry(phase).or_default().push(hook);
    }

    /// The hooks of `phase`, cloned so they can run without holding a borrow.
    pub fn get(&self, phase: LifecycleHook) -> Vec<HookFn> {
        self.hooks.get(&phase).cloned().unwrap_or_default()
    }

    pub fn count(&self, phase: LifecycleHook) -> usize {
        self.hooks.get(&phase).map_or(0, Vec::len)
    }
}

impl fmt::Debug for LifecycleHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.hooks.iter().map(|(phase, hooks)| (phase, hooks.len())))
            .finish()
    }
}
