//! Dynamic values stored in reactive records and vnode props.
//!
//! [`Value`] is the currency of the object side of the runtime: reactive
//! records hold values, element props are values, and watchers traverse
//! values. Plain data (`Null`, numbers, strings, lists) is immutable and
//! compared structurally. Records have identity: two `Object` values are the
//! same only when they point at the same record.
//!
//! # Example
//!
//! ```
//! use arbor_core::{Record, Value};
//!
//! let user = Record::from_iter([("name", Value::from("Ada")), ("age", Value::from(36))]);
//! assert_eq!(user.get("name"), Some(Value::from("Ada")));
//!
//! let same = Value::Object(user.clone());
//! assert!(same.same_value(&Value::Object(user)));
//! ```

use std::any::Any;
use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::reactive::dep::TargetId;
use crate::reactive::proxy::{self, Reactive};
use crate::reactive::runtime::Runtime;

/// A dynamically typed value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    List(Rc<[Value]>),
    /// A raw record. Reads and writes through it are not tracked.
    Object(Record),
    /// A reactive view of a record.
    Reactive(Reactive),
    /// Any host value the runtime does not inspect, compared by identity.
    Opaque(Opaque),
}

impl Value {
    /// Change-detection equality.
    ///
    /// Like `==` on numbers except that NaN equals NaN, so writing NaN over
    /// NaN is not a change. Records compare by identity, regardless of
    /// whether either side is the raw record or its reactive view.
    pub fn same_value(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                Rc::ptr_eq(a, b)
                    || (a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.same_value(y)))
            }
            (Value::Opaque(a), Value::Opaque(b)) => a.ptr_eq(b),
            _ => match (self.target_id(), other.target_id()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// True for raw records and reactive views.
    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_) | Value::Reactive(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view, widening integers.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// The underlying record of an `Object` or `Reactive` value.
    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Object(record) => Some(record),
            Value::Reactive(view) => Some(view.raw()),
            _ => None,
        }
    }

    pub fn as_reactive(&self) -> Option<&Reactive> {
        match self {
            Value::Reactive(view) => Some(view),
            _ => None,
        }
    }

    pub fn as_opaque(&self) -> Option<&Opaque> {
        match self {
            Value::Opaque(o) => Some(o),
            _ => None,
        }
    }

    /// JavaScript-like truthiness, used by templates for conditionals.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0 && !f.is_nan(),
            Value::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// Convert to a `serde_json::Value`, reading records without tracking.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null | Value::Opaque(_) => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Str(s) => serde_json::Value::String(s.to_string()),
            Value::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Object(_) | Value::Reactive(_) => {
                let mut map = serde_json::Map::new();
                if let Some(record) = self.as_record() {
                    for (key, value) in record.fields().iter() {
                        map.insert(key.clone(), value.to_json());
                    }
                }
                serde_json::Value::Object(map)
            }
        }
    }

    fn target_id(&self) -> Option<TargetId> {
        self.as_record().map(Record::id)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.same_value(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "{b:?}"),
            Value::Int(i) => write!(f, "{i:?}"),
            Value::Float(x) => write!(f, "{x:?}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::List(items) => f.debug_list().entries(items.iter()).finish(),
            Value::Object(record) => record.fmt(f),
            Value::Reactive(view) => view.fmt(f),
            Value::Opaque(o) => o.fmt(f),
        }
    }
}

/// Text form used when a value is rendered as text content.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => f.write_str(s),
            Value::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            Value::Object(_) | Value::Reactive(_) => f.write_str("[object]"),
            Value::Opaque(_) => f.write_str("[opaque]"),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null | Value::Opaque(_) => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(x) => serializer.serialize_f64(*x),
            Value::Str(s) => serializer.serialize_str(s),
            Value::List(items) => serializer.collect_seq(items.iter()),
            Value::Object(record) => serializer.collect_map(record.fields().iter()),
            Value::Reactive(view) => serializer.collect_map(view.raw().fields().iter()),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Str(s.into()),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<usize> for Value {
    fn from(i: usize) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s.into())
    }
}

impl From<Rc<str>> for Value {
    fn from(s: Rc<str>) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items.into())
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::Object(record)
    }
}

impl From<Reactive> for Value {
    fn from(view: Reactive) -> Self {
        Value::Reactive(view)
    }
}

impl From<Opaque> for Value {
    fn from(o: Opaque) -> Self {
        Value::Opaque(o)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

// ============================================================================
// Record
// ============================================================================

/// A keyed bag of values with identity.
///
/// Cloning a `Record` clones the handle, not the fields. Each record carries a
/// [`TargetId`] under which the dependency store files its edges; the edges
/// are released when the last handle drops.
#[derive(Clone)]
pub struct Record(Rc<RecordData>);

struct RecordData {
    id: TargetId,
    fields: RefCell<IndexMap<String, Value>>,
}

impl Drop for RecordData {
    fn drop(&mut self) {
        Runtime::forget_target(self.id);
        proxy::forget_view(self.id);
    }
}

impl Record {
    pub fn new() -> Self {
        Self(Rc::new(RecordData {
            id: TargetId::new(),
            fields: RefCell::new(IndexMap::new()),
        }))
    }

    pub fn id(&self) -> TargetId {
        self.0.id
    }

    /// Untracked read of a field.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.fields.borrow().get(key).cloned()
    }

    /// Untracked write. Returns the previous value.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.fields.borrow_mut().insert(key.into(), value.into())
    }

    /// Untracked delete, preserving the order of the remaining fields.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.0.fields.borrow_mut().shift_remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.fields.borrow().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.0.fields.borrow().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.0.fields.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.fields.borrow().is_empty()
    }

    pub fn ptr_eq(&self, other: &Record) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Borrow the fields for inspection. Do not hold the borrow across writes.
    pub fn fields(&self) -> Ref<'_, IndexMap<String, Value>> {
        self.0.fields.borrow()
    }

    /// A new record with a shallow copy of the fields.
    pub fn shallow_clone(&self) -> Record {
        self.fields().iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

impl Default for Record {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.fields.try_borrow() {
            Ok(fields) => f
                .debug_struct("Record")
                .field("id", &self.0.id)
                .field("fields", &*fields)
                .finish(),
            Err(_) => f.debug_struct("Record").field("id", &self.0.id).finish_non_exhaustive(),
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let record = Record::new();
        {
            let mut fields = record.0.fields.borrow_mut();
            for (key, value) in iter {
                fields.insert(key.into(), value.into());
            }
        }
        record
    }
}

// ============================================================================
// Opaque
// ============================================================================

/// A host value carried through props without inspection.
#[derive(Clone)]
pub struct Opaque(Rc<dyn Any>);

impl Opaque {
    pub fn new<T: Any>(value: T) -> Self {
        Self(Rc::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    pub fn ptr_eq(&self, other: &Opaque) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Opaque {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Opaque({:p})", Rc::as_ptr(&self.0))
    }
}

// ============================================================================
// Tests
// ============================================================================
