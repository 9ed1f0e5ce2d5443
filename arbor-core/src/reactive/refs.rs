//! Ref Implementation
//!
//! A [`Ref`] is a single reactive cell. Reading it inside a computation
//! subscribes the computation; writing a different value notifies every
//! subscriber.
//!
//! # Example
//!
//! ```
//! use arbor_core::Ref;
//!
//! let count = Ref::new(0);
//! assert_eq!(count.get(), 0);
//!
//! count.set(5);
//! count.update(|n| n + 1);
//! assert_eq!(count.get(), 6);
//! ```
//!
//! Object-valued refs hold a [`Value::Reactive`] so that field reads through
//! the ref are tracked too; [`Ref::deep`] performs that wrapping.
//!
//! [`ObjectRef`] is the other kind of ref: a (reactive record, key) pair
//! whose reads and writes go through the record.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use super::dep::{DepKey, TargetId};
use super::proxy::{to_reactive, Reactive};
use super::runtime::Runtime;
use crate::value::Value;

/// A reactive cell holding a value of type `T`.
///
/// Cloning shares the cell.
pub struct Ref<T: 'static> {
    inner: Rc<RefInner<T>>,
}

struct RefInner<T> {
    target: TargetId,
    value: RefCell<T>,
}

impl<T> Drop for RefInner<T> {
    fn drop(&mut self) {
        Runtime::forget_target(self.target);
    }
}

impl<T: Clone + PartialEq + 'static> Ref<T> {
    /// Create a new ref with the given initial value.
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(RefInner {
                target: TargetId::new(),
                value: RefCell::new(value),
            }),
        }
    }

    /// Get the current value, subscribing the running computation.
    pub fn get(&self) -> T {
        Runtime::track(self.inner.target, DepKey::Value);
        self.inner.value.borrow().clone()
    }

    /// Get the current value without subscribing.
    pub fn get_untracked(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Borrow the current value, subscribing the running computation.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        Runtime::track(self.inner.target, DepKey::Value);
        f(&self.inner.value.borrow())
    }

    /// Set a new value. Subscribers are notified only if it differs.
    pub fn set(&self, value: T) {
        {
            let mut current = self.inner.value.borrow_mut();
            if *current == value {
                return;
            }
            *current = value;
        }
        Runtime::trigger(self.inner.target, DepKey::Value);
    }

    /// Update the value from the current one.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = f(&self.inner.value.borrow());
        self.set(next);
    }

    /// Notify subscribers without changing the value.
    ///
    /// Useful after mutating a value in place through interior mutability.
    pub fn trigger(&self) {
        Runtime::trigger(self.inner.target, DepKey::Value);
    }

    pub fn target_id(&self) -> TargetId {
        self.inner.target
    }

    /// Number of computations currently subscribed.
    pub fn subscriber_count(&self) -> usize {
        Runtime::subscriber_count(self.inner.target, &DepKey::Value)
    }
}

impl Ref<Value> {
    /// A value ref whose records are exposed through their reactive view.
    pub fn deep(value: impl Into<Value>) -> Self {
        Self::new(to_reactive(value.into()))
    }

    /// Write through [`to_reactive`], keeping record values reactive.
    pub fn set_deep(&self, value: impl Into<Value>) {
        self.set(to_reactive(value.into()));
    }
}

impl<T: 'static> Clone for Ref<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ref")
            .field("target", &self.inner.target)
            .field("value", &*self.inner.value.borrow())
            .finish()
    }
}

/// Create a ref. Shorthand for [`Ref::new`].
pub fn ref_value<T: Clone + PartialEq + 'static>(value: T) -> Ref<T> {
    Ref::new(value)
}

// ============================================================================
// Object refs
// ============================================================================

/// A ref that reads and writes one field of a reactive record.
#[derive(Clone, Debug)]
pub struct ObjectRef {
    source: Reactive,
    key: String,
}

impl ObjectRef {
    pub fn get(&self) -> Value {
        self.source.get(&self.key)
    }

    pub fn set(&self, value: impl Into<Value>) {
        self.source.set(&self.key, value);
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn source(&self) -> &Reactive {
        &self.source
    }
}

/// A ref bound to `key` of `source`.
pub fn to_ref(source: &Reactive, key: impl Into<String>) -> ObjectRef {
    ObjectRef {
        source: source.clone(),
        key: key.into(),
    }
}

/// One [`ObjectRef`] per current field of `source`, in field order.
pub fn to_refs(source: &Reactive) -> IndexMap<String, ObjectRef> {
    source
        .raw()
        .keys()
        .into_iter()
        .map(|key| {
            let object_ref = to_ref(source, key.clone());
            (key, object_ref)
        })
        .collect()
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
