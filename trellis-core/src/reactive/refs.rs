//! Ref Implementation
//!
//! A [`Ref`] is a single reactive cell. It is the simplest reactive
//! primitive: reading it subscribes the running effect, writing a different
//! value notifies the subscribers.
//!
//! # How Refs Work
//!
//! 1. Each ref owns one dependency set. [`Ref::value`] subscribes the
//!    running effect to it.
//!
//! 2. [`Ref::set`] compares the new value with the current one and only
//!    stores and notifies when they differ. Setting a ref to the value it
//!    already holds is free.
//!
//! 3. A `Ref<Value>` holding an object can be opened as a
//!    [`Reactive`](super::Reactive) view, which gives deep reactivity over
//!    the object's fields.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::object::Reactive;
use super::runtime::Runtime;
use crate::graph::deps::Dep;
use crate::value::Value;

/// A reactive cell holding a value of type `T`.
///
/// # Example
///
/// ```rust,ignore
/// let count = rt.create_ref(0);
///
/// // Read the value (tracked)
/// let value = count.value();
///
/// // Update the value (notifies subscribers)
/// count.set(5);
/// ```
pub struct Ref<T> {
    inner: Rc<RefInner<T>>,
}

struct RefInner<T> {
    rt: Runtime,
    value: RefCell<T>,
    dep: Dep,
}

impl<T> Ref<T>
where
    T: Clone + PartialEq + 'static,
{
    pub(crate) fn new(rt: &Runtime, value: T) -> Self {
        Self {
            inner: Rc::new(RefInner {
                rt: rt.clone(),
                value: RefCell::new(value),
                dep: Dep::standalone(),
            }),
        }
    }

    /// Get the current value, subscribing the running effect.
    pub fn value(&self) -> T {
        self.inner.rt.track_dep(&self.inner.dep);
        self.inner.value.borrow().clone()
    }

    /// Read the value through a closure without cloning it. Tracked.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.inner.rt.track_dep(&self.inner.dep);
        f(&self.inner.value.borrow())
    }

    /// Get the current value without subscribing.
    pub fn get_untracked(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Store a new value. Subscribers are notified only if it differs from
    /// the current one.
    pub fn set(&self, value: T) {
        {
            let mut current = self.inner.value.borrow_mut();
            if *current == value {
                return;
            }
            *current = value;
        }
        // Borrow released: subscribers may read this ref.
        self.inner.rt.trigger_dep(&self.inner.dep);
    }

    /// Compute a new value from the current one. The read is untracked.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = f(&self.inner.value.borrow());
        self.set(next);
    }

    /// Number of effects subscribed to this ref.
    pub fn subscriber_count(&self) -> usize {
        self.inner.dep.len()
    }

    /// Whether both handles refer to the same ref.
    pub fn ptr_eq(&self, other: &Ref<T>) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Ref<Value> {
    /// Open the held object as a reactive view. Tracked.
    ///
    /// Returns `None` if the ref holds a primitive.
    pub fn reactive(&self) -> Option<Reactive> {
        let value = self.value();
        self.inner.rt.reactive(value)
    }
}

impl<T> Clone for Ref<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ref")
            .field("value", &*self.inner.value.borrow())
            .field("subscribers", &self.inner.dep.len())
            .finish()
    }
}

impl Runtime {
    /// Create a ref holding `value`.
    pub fn create_ref<T>(&self, value: T) -> Ref<T>
    where
        T: Clone + PartialEq + 'static,
    {
        Ref::new(self, value)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::Cell;

    #[test]
    fn ref_get_and_set() {
        let rt = Runtime::new();
        let count = rt.create_ref(0);

        assert_eq!(count.value(), 0);
        count.set(5);
        assert_eq!(count.value(), 5);

        count.update(|n| n + 1);
        assert_eq!(count.get_untracked(), 6);
    }

    #[test]
    fn equal_write_does_not_notify() {
        let rt = Runtime::new();
        let name = rt.create_ref(String::from("ada"));
        let runs = Rc::new(Cell::new(0));

        let n = name.clone();
        let r = runs.clone();
        rt.effect(move || {
            n.with(|s| s.len());
            r.set(r.get() + 1);
        });

        name.set("ada".to_string());
        assert_eq!(runs.get(), 1);
        name.set("grace".to_string());
        assert_eq!(runs.get(), 2);
        assert_eq!(name.subscriber_count(), 1);
    }

    #[test]
    fn clones_share_state() {
        let rt = Runtime::new();
        let a = rt.create_ref(1);
        let b = a.clone();

        b.set(2);
        assert_eq!(a.value(), 2);
        assert!(a.ptr_eq(&b));
    }

    #[test]
    fn value_ref_opens_reactive_view() {
        let rt = Runtime::new();
        let user = rt.create_ref(Value::from(json!({ "name": "ada" })));
        let plain = rt.create_ref(Value::from(3));

        let view = user.reactive().unwrap();
        assert_eq!(view.get("name"), Value::from("ada"));
        assert!(plain.reactive().is_none());
    }
}
