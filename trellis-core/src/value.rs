//! Dynamic Values
//!
//! Component state in Trellis is dynamically shaped: a component's `data`
//! may hold nested objects and lists that are mutated in place and shared
//! between the component, its computed values and its watchers. This module
//! defines that value model.
//!
//! # Identity
//!
//! Primitive values (`Null`, `Bool`, `Number`, `String`) compare by value.
//! Objects and lists live inside a [`Target`], a shared container with a
//! stable identity; two values holding targets are equal only when they hold
//! the *same* target. This is the comparison the reactive layer uses to
//! decide whether a write actually changed anything.
//!
//! # Raw vs Reactive
//!
//! A `Target` by itself is raw data: reading or writing it directly is never
//! tracked. Wrapping it with [`Runtime::reactive`](crate::Runtime::reactive)
//! produces a [`Reactive`](crate::reactive::Reactive) view that performs the
//! dependency bookkeeping. Wrapping is cheap and idempotent; the view and the
//! raw target share storage.

use std::cell::{Ref as BorrowRef, RefCell, RefMut};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

/// Unique identifier for a [`Target`].
///
/// Dependency bookkeeping is keyed by this id rather than by a handle to the
/// target, so the dependency graph never keeps a target alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(u64);

impl TargetId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Storage behind a [`Target`].
#[derive(Debug, Clone)]
pub enum Data {
    /// An ordered string-keyed map.
    Map(IndexMap<String, Value>),
    /// A list.
    List(Vec<Value>),
}

/// A shared, identity-bearing object or list.
#[derive(Clone)]
pub struct Target {
    inner: Rc<TargetInner>,
}

struct TargetInner {
    id: TargetId,
    data: RefCell<Data>,
}

impl Target {
    fn new(data: Data) -> Self {
        Self {
            inner: Rc::new(TargetInner {
                id: TargetId::next(),
                data: RefCell::new(data),
            }),
        }
    }

    /// Create an empty map target.
    pub fn map() -> Self {
        Self::new(Data::Map(IndexMap::new()))
    }

    /// Create an empty list target.
    pub fn list() -> Self {
        Self::new(Data::List(Vec::new()))
    }

    /// Create a map target from entries.
    pub fn from_map(map: IndexMap<String, Value>) -> Self {
        Self::new(Data::Map(map))
    }

    /// Create a list target from items.
    pub fn from_vec(items: Vec<Value>) -> Self {
        Self::new(Data::List(items))
    }

    /// The target's identity.
    pub fn id(&self) -> TargetId {
        self.inner.id
    }

    /// Whether both handles point at the same target.
    pub fn ptr_eq(&self, other: &Target) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Whether this target holds a list.
    pub fn is_list(&self) -> bool {
        matches!(&*self.inner.data.borrow(), Data::List(_))
    }

    /// Number of entries (map) or items (list). Untracked.
    pub fn len(&self) -> usize {
        match &*self.inner.data.borrow() {
            Data::Map(map) => map.len(),
            Data::List(list) => list.len(),
        }
    }

    /// Whether the target has no entries. Untracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow the raw storage. Untracked.
    pub fn data(&self) -> BorrowRef<'_, Data> {
        self.inner.data.borrow()
    }

    /// Mutably borrow the raw storage. Untracked and untriggered.
    pub fn data_mut(&self) -> RefMut<'_, Data> {
        self.inner.data.borrow_mut()
    }

    /// Read a map entry without tracking.
    pub fn get_raw(&self, key: &str) -> Option<Value> {
        match &*self.inner.data.borrow() {
            Data::Map(map) => map.get(key).cloned(),
            Data::List(list) => key.parse::<usize>().ok().and_then(|i| list.get(i).cloned()),
        }
    }
}

impl fmt::Debug for Target {
    // Targets may contain themselves; print a summary instead of recursing.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("id", &self.inner.id.0)
            .field("kind", &if self.is_list() { "list" } else { "map" })
            .field("len", &self.len())
            .finish()
    }
}

/// A dynamically typed value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// Absence of a value.
    #[default]
    Null,
    /// A boolean.
    Bool(bool),
    /// A number. All numbers are stored as `f64`.
    Number(f64),
    /// A string.
    String(String),
    /// An object or list.
    Object(Target),
}

impl Value {
    /// Build an object value from key/value pairs.
    pub fn object<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let map = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Value::Object(Target::from_map(map))
    }

    /// Build a list value.
    pub fn list<V: Into<Value>>(items: impl IntoIterator<Item = V>) -> Self {
        Value::Object(Target::from_vec(items.into_iter().map(Into::into).collect()))
    }

    /// Whether this is `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Whether this holds an object or list.
    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    /// The boolean, if this is a `Bool`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The number, if this is a `Number`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The number as an integer, if it is integral.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Number(n) if n.is_finite() && n.fract() == 0.0 => Some(*n as i64),
            _ => None,
        }
    }

    /// The string slice, if this is a `String`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// The target, if this is an `Object`.
    pub fn as_target(&self) -> Option<&Target> {
        match self {
            Value::Object(target) => Some(target),
            _ => None,
        }
    }

    /// JavaScript-style truthiness.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Object(_) => true,
        }
    }

    /// Deep structural copy with fresh identities. Untracked.
    ///
    /// Shared and cyclic targets are copied once and stay shared in the copy.
    pub fn snapshot(&self) -> Value {
        let mut seen = HashMap::new();
        snapshot_value(self, &mut seen)
    }

    /// Convert to a JSON value. Cycles become `null`. Untracked.
    pub fn to_json(&self) -> serde_json::Value {
        let mut stack = Vec::new();
        to_json_value(self, &mut stack)
    }
}

fn snapshot_value(value: &Value, seen: &mut HashMap<TargetId, Target>) -> Value {
    let Value::Object(target) = value else {
        return value.clone();
    };
    if let Some(copy) = seen.get(&target.id()) {
        return Value::Object(copy.clone());
    }

    let copy = if target.is_list() {
        Target::list()
    } else {
        Target::map()
    };
    seen.insert(target.id(), copy.clone());

    // Clone the source first so no borrow is held while recursing.
    let data = target.data().clone();
    let filled = match data {
        Data::Map(map) => Data::Map(
            map.iter()
                .map(|(k, v)| (k.clone(), snapshot_value(v, seen)))
                .collect(),
        ),
        Data::List(list) => Data::List(list.iter().map(|v| snapshot_value(v, seen)).collect()),
    };
    *copy.data_mut() = filled;
    Value::Object(copy)
}

/// Integral numbers in the exactly representable range.
fn as_integer(n: f64) -> Option<i64> {
    const MAX_EXACT: f64 = 9_007_199_254_740_992.0;
    (n.fract() == 0.0 && n.abs() <= MAX_EXACT).then_some(n as i64)
}

fn to_json_value(value: &Value, stack: &mut Vec<TargetId>) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => match as_integer(*n) {
            Some(i) => serde_json::Value::from(i),
            None => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
        },
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Object(target) => {
            if stack.contains(&target.id()) {
                return serde_json::Value::Null;
            }
            stack.push(target.id());
            let data = target.data().clone();
            let json = match data {
                Data::Map(map) => serde_json::Value::Object(
                    map.iter()
                        .map(|(k, v)| (k.clone(), to_json_value(v, stack)))
                        .collect(),
                ),
                Data::List(list) => {
                    serde_json::Value::Array(list.iter().map(|v| to_json_value(v, stack)).collect())
                }
            };
            stack.pop();
            json
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => f.write_str(s),
            Value::Object(_) => write!(f, "{}", self.to_json()),
        }
    }
}

/// A target that contains itself serializes as `null` at the point of
/// recursion, the same as [`Value::to_json`].
impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let stack = RefCell::new(Vec::new());
        Guarded { value: self, stack: &stack }.serialize(serializer)
    }
}

/// A value being serialized, with the targets currently open above it.
struct Guarded<'a> {
    value: &'a Value,
    stack: &'a RefCell<Vec<TargetId>>,
}

impl Guarded<'_> {
    fn child<'b>(&'b self, value: &'b Value) -> Guarded<'b> {
        Guarded {
            value,
            stack: self.stack,
        }
    }
}

impl Serialize for Guarded<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.value {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) => match as_integer(*n) {
                Some(i) => serializer.serialize_i64(i),
                None => serializer.serialize_f64(*n),
            },
            Value::String(s) => serializer.serialize_str(s),
            Value::Object(target) => {
                if self.stack.borrow().contains(&target.id()) {
                    return serializer.serialize_unit();
                }
                self.stack.borrow_mut().push(target.id());
                let data = target.data().clone();
                let result = match &data {
                    Data::Map(map) => (|| {
                        let mut out = serializer.serialize_map(Some(map.len()))?;
                        for (k, v) in map {
                            out.serialize_entry(k, &self.child(v))?;
                        }
                        out.end()
                    })(),
                    Data::List(list) => (|| {
                        let mut out = serializer.serialize_seq(Some(list.len()))?;
                        for v in list {
                            out.serialize_element(&self.child(v))?;
                        }
                        out.end()
                    })(),
                };
                self.stack.borrow_mut().pop();
                result
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Conversions
// ----------------------------------------------------------------------------

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

macro_rules! number_from {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(n: $t) -> Self {
                Value::Number(n as f64)
            }
        })*
    };
}

number_from!(i8, i16, i32, i64, u8, u16, u32, u64, usize, isize, f32, f64);

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Target> for Value {
    fn from(target: Target) -> Self {
        Value::Object(target)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Object(Target::from_vec(items))
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(map: IndexMap<String, Value>) -> Self {
        Value::Object(Target::from_map(map))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Object(Target::from_vec(items.into_iter().map(Value::from).collect()))
            }
            serde_json::Value::Object(map) => Value::Object(Target::from_map(
                map.into_iter().map(|(k, v)| (k, Value::from(v))).collect(),
            )),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
