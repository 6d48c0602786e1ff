//! Reactive Objects
//!
//! A [`Reactive`] is a tracked view over a [`Target`]. Reads through the
//! view subscribe the running effect to the exact key that was read; writes
//! through it notify exactly the effects that read the written key.
//!
//! # How Keys Are Tracked
//!
//! | Read                           | Subscribes to                   |
//! |--------------------------------|---------------------------------|
//! | `get("name")` on a map         | `Prop("name")`                  |
//! | `at(i)` / `get("3")` on a list | `Index(i)` and `Iterate`        |
//! | `len()` on a list              | `Length`                        |
//! | `len()`, `keys()` on a map     | `Iterate`                       |
//!
//! | Write                              | Notifies                        |
//! |------------------------------------|---------------------------------|
//! | `set` an existing key              | `Prop(key)`, if the value changed |
//! | `set` a new key, `remove`          | `Prop(key)` and `Iterate`       |
//! | `set_at` in range                  | `Index(i)`, if the value changed |
//! | `set_at` past the end              | `Index(i)`, `Length`, `Iterate` |
//! | `push`, `pop`, `shift`, `unshift`, `splice`, `set_len` | `Length` and `Iterate` |
//!
//! Structural list operations notify once per call, no matter how many
//! slots moved, so an effect that reads `len()` re-runs once per `push`.
//!
//! # Deep Reactivity
//!
//! Nested objects are stored raw and wrapped on access: [`Reactive::nested`]
//! and [`Reactive::path`] hand out views over nested targets. Views are
//! created on demand and share storage with the raw target, so wrapping the
//! same target twice yields two equal views.

use std::fmt;

use super::runtime::Runtime;
use crate::graph::deps::Key;
use crate::value::{Data, Target, TargetId, Value};

/// Tracked view over a map or list.
#[derive(Clone)]
pub struct Reactive {
    rt: Runtime,
    target: Target,
}

impl Reactive {
    pub(crate) fn new(rt: &Runtime, target: Target) -> Self {
        Self {
            rt: rt.clone(),
            target,
        }
    }

    /// The raw target. Access through it is untracked.
    pub fn raw(&self) -> &Target {
        &self.target
    }

    pub fn id(&self) -> TargetId {
        self.target.id()
    }

    /// The target as a value.
    pub fn to_value(&self) -> Value {
        Value::Object(self.target.clone())
    }

    pub fn is_list(&self) -> bool {
        self.target.is_list()
    }

    /// Whether both views wrap the same target.
    pub fn ptr_eq(&self, other: &Reactive) -> bool {
        self.target.ptr_eq(&other.target)
    }

    pub fn runtime(&self) -> &Runtime {
        &self.rt
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Read a map property. On a list, `key` may be an index or `"length"`.
    pub fn get(&self, key: &str) -> Value {
        if self.is_list() {
            if key == "length" {
                return Value::from(self.len());
            }
            return match key.parse::<usize>() {
                Ok(index) => self.at(index).unwrap_or_default(),
                Err(_) => Value::Null,
            };
        }
        self.rt.track(self.id(), Key::from(key));
        self.target.get_raw(key).unwrap_or_default()
    }

    /// Whether a map has the property. Tracked like a read of it.
    pub fn has(&self, key: &str) -> bool {
        if self.is_list() {
            return key
                .parse::<usize>()
                .map(|index| index < self.len())
                .unwrap_or(false);
        }
        self.rt.track(self.id(), Key::from(key));
        self.target.get_raw(key).is_some()
    }

    /// Read a property and open it as a view if it holds an object.
    pub fn nested(&self, key: &str) -> Option<Reactive> {
        match self.get(key) {
            Value::Object(target) => Some(Reactive::new(&self.rt, target)),
            _ => None,
        }
    }

    /// Read a dotted path such as `"user.address.city"` or `"items.0"`.
    /// Every segment is tracked. Missing segments yield `Null`.
    pub fn path(&self, path: &str) -> Value {
        let mut segments = path.split('.');
        let Some(first) = segments.next() else {
            return Value::Null;
        };
        let mut value = self.get(first);
        for segment in segments {
            value = match &value {
                Value::Object(target) => Reactive::new(&self.rt, target.clone()).get(segment),
                _ => return Value::Null,
            };
        }
        value
    }

    /// Read a list slot. Also subscribes to structural changes, since a
    /// reshape moves what sits at every index.
    pub fn at(&self, index: usize) -> Option<Value> {
        self.rt.track(self.id(), Key::Index(index));
        self.rt.track(self.id(), Key::Iterate);
        match &*self.target.data() {
            Data::List(list) => list.get(index).cloned(),
            Data::Map(_) => None,
        }
    }

    /// Number of items (list) or keys (map).
    pub fn len(&self) -> usize {
        let key = if self.is_list() {
            Key::Length
        } else {
            Key::Iterate
        };
        self.rt.track(self.id(), key);
        self.target.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Map keys in insertion order, or list indices as strings.
    pub fn keys(&self) -> Vec<String> {
        self.rt.track(self.id(), Key::Iterate);
        match &*self.target.data() {
            Data::Map(map) => map.keys().cloned().collect(),
            Data::List(list) => (0..list.len()).map(|i| i.to_string()).collect(),
        }
    }

    /// Map values in key order, or list items. Every entry is tracked.
    pub fn values(&self) -> Vec<Value> {
        self.entries().into_iter().map(|(_, v)| v).collect()
    }

    /// Key/value pairs. Every entry is tracked.
    pub fn entries(&self) -> Vec<(String, Value)> {
        if self.is_list() {
            self.rt.track(self.id(), Key::Length);
            let len = self.target.len();
            return (0..len)
                .map(|i| (i.to_string(), self.at(i).unwrap_or_default()))
                .collect();
        }
        self.keys()
            .into_iter()
            .map(|key| {
                let value = self.get(&key);
                (key, value)
            })
            .collect()
    }

    /// List items. Tracks the length and every slot.
    pub fn to_vec(&self) -> Vec<Value> {
        self.values()
    }

    /// Deep copy with fresh identities. Untracked.
    pub fn snapshot(&self) -> Value {
        self.to_value().snapshot()
    }

    /// Convert to JSON. Untracked.
    pub fn to_json(&self) -> serde_json::Value {
        self.to_value().to_json()
    }

    // ------------------------------------------------------------------
    // Map writes
    // ------------------------------------------------------------------

    /// Write a property. On a list, `key` may be an index or `"length"`.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        if self.is_list() {
            if key == "length" {
                match value.as_f64().filter(|n| *n >= 0.0 && n.fract() == 0.0) {
                    Some(len) if len <= self.rt.config().max_list_len as f64 => {
                        self.set_len(len as usize)
                    }
                    _ => tracing::warn!(length = %value, "invalid list length; write ignored"),
                }
                return;
            }
            if let Ok(index) = key.parse::<usize>() {
                self.set_at(index, value);
            }
            return;
        }

        let added = {
            let mut data = self.target.data_mut();
            let Data::Map(map) = &mut *data else {
                return;
            };
            match map.get_mut(key) {
                Some(current) if *current == value => return,
                Some(current) => {
                    *current = value;
                    false
                }
                None => {
                    map.insert(key.to_string(), value);
                    true
                }
            }
        };

        if added {
            self.rt
                .trigger_many(self.id(), &[Key::from(key), Key::Iterate]);
        } else {
            self.rt.trigger(self.id(), Key::from(key));
        }
    }

    /// Delete a property, returning its old value.
    pub fn remove(&self, key: &str) -> Option<Value> {
        let removed = {
            let mut data = self.target.data_mut();
            let Data::Map(map) = &mut *data else {
                return None;
            };
            map.shift_remove(key)?
        };
        self.rt
            .trigger_many(self.id(), &[Key::from(key), Key::Iterate]);
        Some(removed)
    }

    // ------------------------------------------------------------------
    // List writes
    // ------------------------------------------------------------------

    /// Write a list slot. Writing past the end pads with `Null`.
    pub fn set_at(&self, index: usize, value: impl Into<Value>) {
        let value = value.into();
        let grew = {
            let mut data = self.target.data_mut();
            let Data::List(list) = &mut *data else {
                return;
            };
            if index < list.len() {
                if list[index] == value {
                    return;
                }
                list[index] = value;
                false
            } else {
                if !self.within_limit(index.saturating_add(1)) {
                    return;
                }
                list.resize(index, Value::Null);
                list.push(value);
                true
            }
        };

        if grew {
            self.rt
                .trigger_many(self.id(), &[Key::Index(index), Key::Length, Key::Iterate]);
        } else {
            self.rt.trigger(self.id(), Key::Index(index));
        }
    }

    /// Truncate or pad the list. Always notifies length readers.
    pub fn set_len(&self, len: usize) {
        if !self.within_limit(len) {
            return;
        }
        self.reshape(|list| list.resize(len, Value::Null));
    }

    /// Whether a list may grow to `len` under [`RuntimeConfig::max_list_len`](crate::RuntimeConfig::max_list_len).
    fn within_limit(&self, len: usize) -> bool {
        let max = self.rt.config().max_list_len;
        if len > max {
            tracing::warn!(len, max, "list would exceed the maximum length; write ignored");
            return false;
        }
        true
    }

    /// Append an item. Returns the new length.
    pub fn push(&self, value: impl Into<Value>) -> usize {
        let value = value.into();
        self.reshape(|list| {
            list.push(value);
            list.len()
        })
        .unwrap_or(0)
    }

    /// Remove the last item.
    pub fn pop(&self) -> Option<Value> {
        self.reshape(|list| list.pop()).flatten()
    }

    /// Remove the first item.
    pub fn shift(&self) -> Option<Value> {
        self.reshape(|list| (!list.is_empty()).then(|| list.remove(0)))
            .flatten()
    }

    /// Prepend an item. Returns the new length.
    pub fn unshift(&self, value: impl Into<Value>) -> usize {
        let value = value.into();
        self.reshape(|list| {
            list.insert(0, value);
            list.len()
        })
        .unwrap_or(0)
    }

    /// Remove `delete_count` items starting at `start` and insert `items`
    /// in their place. Out-of-range bounds are clamped. Returns the removed
    /// items.
    pub fn splice(
        &self,
        start: usize,
        delete_count: usize,
        items: impl IntoIterator<Item = Value>,
    ) -> Vec<Value> {
        self.reshape(|list| {
            let start = start.min(list.len());
            let end = start.saturating_add(delete_count).min(list.len());
            list.splice(start..end, items).collect()
        })
        .unwrap_or_default()
    }

    /// Run a structural mutation and notify `Length` and `Iterate` once.
    /// Returns `None` if the target is not a list.
    fn reshape<R>(&self, mutate: impl FnOnce(&mut Vec<Value>) -> R) -> Option<R> {
        let result = {
            let mut data = self.target.data_mut();
            let Data::List(list) = &mut *data else {
                return None;
            };
            mutate(list)
        };
        self.rt
            .trigger_many(self.id(), &[Key::Length, Key::Iterate]);
        Some(result)
    }
}

impl PartialEq for Reactive {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Reactive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Reactive").field(&self.target).finish()
    }
}

impl From<Reactive> for Value {
    fn from(reactive: Reactive) -> Self {
        reactive.to_value()
    }
}

impl Runtime {
    /// Open a value as a reactive view.
    ///
    /// Objects and lists yield a view sharing storage with the value.
    /// Primitives yield `None`.
    pub fn reactive(&self, value: impl Into<Value>) -> Option<Reactive> {
        match value.into() {
            Value::Object(target) => Some(Reactive::new(self, target)),
            _ => None,
        }
    }

    /// Open a target as a reactive view.
    pub fn reactive_target(&self, target: Target) -> Reactive {
        Reactive::new(self, target)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RuntimeConfig;
    use serde_json::json;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    fn counter() -> (Rc<Cell<usize>>, Rc<Cell<usize>>) {
        let c = Rc::new(Cell::new(0));
        (c.clone(), c)
    }

    #[test]
    fn primitives_are_not_wrapped() {
        let rt = Runtime::new();
        assert!(rt.reactive(1).is_none());
        assert!(rt.reactive("x").is_none());
        assert!(rt.reactive(json!({})).is_some());
    }

    #[test]
    fn wrapping_shares_storage() {
        let rt = Runtime::new();
        let value = Value::from(json!({ "a": 1 }));
        let first = rt.reactive(value.clone()).unwrap();
        let second = rt.reactive(value.clone()).unwrap();

        first.set("a", 2);
        assert_eq!(second.get("a"), Value::from(2));
        assert_eq!(first, second);
    }

    #[test]
    fn dependency_precision() {
        let rt = Runtime::new();
        let state = rt.reactive(json!({ "a": 1, "b": 1 })).unwrap();
        let (runs, r) = counter();

        let s = state.clone();
        rt.effect(move || {
            s.get("a");
            r.set(r.get() + 1);
        });

        state.set("b", 2);
        assert_eq!(runs.get(), 1);
        state.set("a", 2);
        assert_eq!(runs.get(), 2);
        state.set("a", 2);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn nested_objects_are_deeply_reactive() {
        let rt = Runtime::new();
        let state = rt
            .reactive(json!({ "user": { "address": { "city": "Paris" } } }))
            .unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let s = state.clone();
        let out = seen.clone();
        rt.effect(move || out.borrow_mut().push(s.path("user.address.city").to_string()));

        let address = state.nested("user").unwrap().nested("address").unwrap();
        address.set("city", "Lyon");
        assert_eq!(*seen.borrow(), vec!["Paris", "Lyon"]);
    }

    #[test]
    fn new_keys_notify_enumerators() {
        let rt = Runtime::new();
        let state = rt.reactive(json!({ "a": 1 })).unwrap();
        let (runs, r) = counter();

        let s = state.clone();
        rt.effect(move || {
            s.keys();
            r.set(r.get() + 1);
        });

        state.set("a", 5);
        assert_eq!(runs.get(), 1);
        state.set("b", 1);
        assert_eq!(runs.get(), 2);
        state.remove("b");
        assert_eq!(runs.get(), 3);
    }

    #[test]
    fn push_notifies_length_readers_once() {
        let rt = Runtime::new();
        let list = rt.reactive(json!([1, 2])).unwrap();
        let (runs, r) = counter();

        let l = list.clone();
        rt.effect(move || {
            l.len();
            r.set(r.get() + 1);
        });

        assert_eq!(list.push(3), 3);
        assert_eq!(runs.get(), 2);

        list.splice(0, 2, vec![Value::from(9)]);
        assert_eq!(runs.get(), 3);
        assert_eq!(list.to_json(), json!([9, 3]));
    }

    #[test]
    fn index_reads_follow_reshapes() {
        let rt = Runtime::new();
        let list = rt.reactive(json!(["a", "b"])).unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let l = list.clone();
        let out = seen.clone();
        rt.effect(move || out.borrow_mut().push(l.get("0").to_string()));

        list.shift();
        list.set_at(0, "z");
        assert_eq!(*seen.borrow(), vec!["a", "b", "z"]);
    }

    #[test]
    fn writing_past_end_grows_list() {
        let rt = Runtime::new();
        let list = rt.reactive(json!([1])).unwrap();

        list.set_at(3, 4);
        assert_eq!(list.to_json(), json!([1, null, null, 4]));

        list.set("length", 1);
        assert_eq!(list.len(), 1);
        assert_eq!(list.pop(), Some(Value::from(1)));
        assert_eq!(list.pop(), None);
    }

    #[test]
    fn oversized_lengths_are_ignored() {
        let rt = Runtime::with_config(RuntimeConfig::default().max_list_len(4));
        let list = rt.reactive(json!([1, 2])).unwrap();
        let (runs, r) = counter();

        let l = list.clone();
        rt.watch_effect(move || {
            r.set(r.get() + 1);
            let _ = l.len();
        });

        list.set("length", Value::from(1e20));
        list.set("length", -1);
        list.set("length", 1.5);
        list.set_len(5);
        list.set_at(usize::MAX, 0);
        list.set("4", 0);
        assert_eq!(list.to_json(), json!([1, 2]));
        assert_eq!(runs.get(), 1);

        list.set("length", 4);
        assert_eq!(list.len(), 4);
        assert_eq!(runs.get(), 2);
    }
}
