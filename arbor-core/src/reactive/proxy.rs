//! Reactive records.
//!
//! [`Reactive`] is a tracked view over a [`Record`]. Reads through the view
//! register dependencies on the field read; writes that change a field
//! notify its subscribers. Adding or deleting a field also notifies the
//! subscribers of the record's key set, so loops over `keys()` re-run.
//!
//! Nested records are wrapped lazily: reading a field that holds a raw
//! record returns its reactive view, created on first access. Writes always
//! store the raw record, so a view never ends up nested inside raw data.
//!
//! # Identity
//!
//! Views are cached per record. While a view is alive, wrapping the same
//! record again returns that same view, so `reactive(&r) == reactive(&r)`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::trace;

use super::dep::{DepKey, TargetId};
use super::runtime::Runtime;
use crate::value::{Record, Value};

thread_local! {
    static VIEWS: RefCell<HashMap<TargetId, Weak<ViewData>>> = RefCell::new(HashMap::new());
}

/// A reactive view of a record.
///
/// Cloning shares the view.
#[derive(Clone)]
pub struct Reactive(Rc<ViewData>);

struct ViewData {
    raw: Record,
}

/// Get the reactive view of `raw`, creating it if needed.
///
/// # Example
///
/// ```
/// use arbor_core::{reactive, Record, Value};
///
/// let raw = Record::from_iter([("count", 0)]);
/// let state = reactive(&raw);
///
/// state.set("count", 1);
/// assert_eq!(raw.get("count"), Some(Value::from(1)));
/// assert!(reactive(&raw).ptr_eq(&state));
/// ```
pub fn reactive(raw: &Record) -> Reactive {
    VIEWS.with(|views| {
        let mut views = views.borrow_mut();
        if let Some(existing) = views.get(&raw.id()).and_then(Weak::upgrade) {
            return Reactive(existing);
        }
        let data = Rc::new(ViewData { raw: raw.clone() });
        views.insert(raw.id(), Rc::downgrade(&data));
        Reactive(data)
    })
}

/// Wrap record values in their reactive view; other values pass through.
pub fn to_reactive(value: Value) -> Value {
    match value {
        Value::Object(raw) => Value::Reactive(reactive(&raw)),
        other => other,
    }
}

/// Unwrap reactive views to their raw record; other values pass through.
pub fn to_raw(value: Value) -> Value {
    match value {
        Value::Reactive(view) => Value::Object(view.raw().clone()),
        other => other,
    }
}

pub fn is_reactive(value: &Value) -> bool {
    matches!(value, Value::Reactive(_))
}

/// Drop the cache entry of a record that is going away.
pub(crate) fn forget_view(id: TargetId) {
    let _ = VIEWS.try_with(|views| {
        if let Ok(mut views) = views.try_borrow_mut() {
            views.remove(&id);
        }
    });
}

impl Reactive {
    /// Create a view over a new record holding `fields`.
    pub fn from_fields<K, V>(fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        reactive(&fields.into_iter().collect())
    }

    pub fn new() -> Self {
        reactive(&Record::new())
    }

    /// The underlying record. Access through it is not tracked.
    pub fn raw(&self) -> &Record {
        &self.0.raw
    }

    pub fn id(&self) -> TargetId {
        self.0.raw.id()
    }

    pub fn ptr_eq(&self, other: &Reactive) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Tracked read. Missing fields read as `Null`; records come back as
    /// their reactive view.
    pub fn get(&self, key: &str) -> Value {
        Runtime::track(self.id(), DepKey::from(key));
        to_reactive(self.0.raw.get(key).unwrap_or_default())
    }

    /// Untracked read, still wrapping records.
    pub fn get_untracked(&self, key: &str) -> Value {
        to_reactive(self.0.raw.get(key).unwrap_or_default())
    }

    /// Write a field. Returns whether anything changed.
    ///
    /// A new field notifies both the field and the key set. An existing
    /// field notifies only when the value differs under
    /// [`Value::same_value`].
    pub fn set(&self, key: &str, value: impl Into<Value>) -> bool {
        let value = to_raw(value.into());
        let previous = self.0.raw.get(key);
        let added = previous.is_none();
        if previous.is_some_and(|old| old.same_value(&value)) {
            return false;
        }

        self.0.raw.insert(key, value);
        trace!(target = ?self.id(), key, added, "field written");

        Runtime::trigger(self.id(), DepKey::from(key));
        if added {
            Runtime::trigger(self.id(), DepKey::Iterate);
        }
        true
    }

    /// Write a field computed from its current (untracked) value.
    pub fn update(&self, key: &str, f: impl FnOnce(&Value) -> Value) -> bool {
        let next = f(&self.get_untracked(key));
        self.set(key, next)
    }

    /// Delete a field. Returns whether it existed.
    pub fn delete(&self, key: &str) -> bool {
        if self.0.raw.remove(key).is_none() {
            return false;
        }
        trace!(target = ?self.id(), key, "field deleted");
        Runtime::trigger(self.id(), DepKey::from(key));
        Runtime::trigger(self.id(), DepKey::Iterate);
        true
    }

    /// Tracked membership test.
    pub fn has(&self, key: &str) -> bool {
        Runtime::track(self.id(), DepKey::from(key));
        self.0.raw.contains_key(key)
    }

    /// Field names, tracked on the key set.
    pub fn keys(&self) -> Vec<String> {
        Runtime::track(self.id(), DepKey::Iterate);
        self.0.raw.keys()
    }

    /// Number of fields, tracked on the key set.
    pub fn len(&self) -> usize {
        Runtime::track(self.id(), DepKey::Iterate);
        self.0.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Reactive {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Reactive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Reactive").field(&self.0.raw).finish()
    }
}
