//! Watchers
//!
//! A watcher runs a callback with the new and old value of a source every
//! time the source changes.
//!
//! # How Watchers Work
//!
//! 1. The source is turned into a getter and run inside a lazy effect whose
//!    scheduler is the watcher job. The first run records the initial value.
//!
//! 2. When a dependency changes, the job re-runs the getter. If the value
//!    differs from the stored one (or the watcher is deep) the callback
//!    receives `(new, old)` and the new value is stored.
//!
//! 3. Deep watchers traverse the value after the getter runs, so a change
//!    anywhere inside it triggers. Their stored old value is a deep snapshot,
//!    so the callback can compare against the state before the mutation.
//!
//! Watchers run synchronously when their source changes; they are not
//! batched into the component job queue.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use super::computed::Computed;
use super::effect::{EffectOptions, ReactiveEffect, Runner};
use super::object::Reactive;
use super::refs::Ref;
use super::runtime::Runtime;
use crate::value::{TargetId, Value};

/// Options for [`Runtime::watch`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchOptions {
    /// Trigger on changes anywhere inside the value.
    pub deep: bool,
    /// Call the callback once right away with the initial value.
    pub immediate: bool,
}

impl WatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deep(mut self) -> Self {
        self.deep = true;
        self
    }

    pub fn immediate(mut self) -> Self {
        self.immediate = true;
        self
    }
}

/// Values a watcher can observe.
///
/// `traverse` reads everything reachable from the value so a deep watcher
/// subscribes to all of it. `snapshot` produces the copy kept as the old
/// value. Both default to the shallow behavior, which is right for plain
/// data.
pub trait Traverse: Clone {
    fn traverse(&self, _rt: &Runtime) {}

    fn snapshot(&self) -> Self {
        self.clone()
    }
}

macro_rules! shallow_traverse {
    ($($t:ty),*) => {
        $(impl Traverse for $t {})*
    };
}

shallow_traverse!(
    (), bool, char, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64, String,
    &'static str
);

impl Traverse for Value {
    fn traverse(&self, rt: &Runtime) {
        let mut seen = HashSet::new();
        traverse_value(rt, self, &mut seen);
    }

    fn snapshot(&self) -> Self {
        Value::snapshot(self)
    }
}

fn traverse_value(rt: &Runtime, value: &Value, seen: &mut HashSet<TargetId>) {
    let Value::Object(target) = value else {
        return;
    };
    if !seen.insert(target.id()) {
        return;
    }
    for child in rt.reactive_target(target.clone()).values() {
        traverse_value(rt, &child, seen);
    }
}

impl<T: Traverse> Traverse for Option<T> {
    fn traverse(&self, rt: &Runtime) {
        if let Some(value) = self {
            value.traverse(rt);
        }
    }

    fn snapshot(&self) -> Self {
        self.as_ref().map(Traverse::snapshot)
    }
}

impl<T: Traverse> Traverse for Vec<T> {
    fn traverse(&self, rt: &Runtime) {
        for value in self {
            value.traverse(rt);
        }
    }

    fn snapshot(&self) -> Self {
        self.iter().map(Traverse::snapshot).collect()
    }
}

/// Something a watcher can observe: a getter closure, a ref, a computed
/// value or a reactive object.
pub trait WatchSource<T> {
    /// Turn the source into a getter.
    fn into_getter(self) -> Rc<dyn Fn() -> T>;

    /// Whether the source is watched deeply even without
    /// [`WatchOptions::deep`].
    fn is_deep(&self) -> bool {
        false
    }
}

impl<T, F> WatchSource<T> for F
where
    F: Fn() -> T + 'static,
{
    fn into_getter(self) -> Rc<dyn Fn() -> T> {
        Rc::new(self)
    }
}

impl<T: Clone + PartialEq + 'static> WatchSource<T> for Ref<T> {
    fn into_getter(self) -> Rc<dyn Fn() -> T> {
        Rc::new(move || self.value())
    }
}

impl<T: Clone + 'static> WatchSource<T> for Computed<T> {
    fn into_getter(self) -> Rc<dyn Fn() -> T> {
        Rc::new(move || self.value())
    }
}

impl WatchSource<Value> for Reactive {
    fn into_getter(self) -> Rc<dyn Fn() -> Value> {
        Rc::new(move || self.to_value())
    }

    /// Watching a reactive object means watching its contents.
    fn is_deep(&self) -> bool {
        true
    }
}

impl Runtime {
    /// Call `callback(new, old)` whenever `source` changes.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let count = rt.create_ref(0);
    /// rt.watch(count.clone(), |new, old| println!("{old:?} -> {new}"), WatchOptions::new());
    /// count.set(1); // prints "Some(0) -> 1"
    /// ```
    pub fn watch<T, S, C>(&self, source: S, callback: C, options: WatchOptions) -> Runner<T>
    where
        T: Traverse + PartialEq + 'static,
        S: WatchSource<T>,
        C: Fn(&T, Option<&T>) + 'static,
    {
        let deep = options.deep || source.is_deep();
        let base = source.into_getter();
        let getter: Rc<dyn Fn() -> T> = if deep {
            let rt = self.downgrade();
            Rc::new(move || {
                let value = base();
                if let Some(rt) = rt.upgrade() {
                    value.traverse(&rt);
                }
                value
            })
        } else {
            base
        };

        let callback = Rc::new(callback);
        let old: Rc<RefCell<Option<T>>> = Rc::new(RefCell::new(None));
        let slot: Rc<RefCell<Option<ReactiveEffect<T>>>> = Rc::new(RefCell::new(None));

        let job = {
            let callback = Rc::clone(&callback);
            let old = Rc::clone(&old);
            let slot = Rc::clone(&slot);
            move || {
                let Some(effect) = slot.borrow().clone() else {
                    return;
                };
                let new = effect.run();
                let prev = old.borrow().clone();
                if deep || prev.as_ref() != Some(&new) {
                    callback(&new, prev.as_ref());
                    let stored = if deep { new.snapshot() } else { new };
                    *old.borrow_mut() = Some(stored);
                }
            }
        };

        // Stopping the effect drops the job, which releases the slot.
        let effect = ReactiveEffect::new(self, getter, EffectOptions::new().lazy().scheduler(job));
        *slot.borrow_mut() = Some(effect.clone());

        let initial = effect.run();
        *old.borrow_mut() = Some(if deep { initial.snapshot() } else { initial.clone() });
        if options.immediate {
            callback(&initial, None);
        }

        Runner::new(effect)
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

    type Calls<T> = Rc<RefCell<Vec<(T, Option<T>)>>>;

    fn recorder<T: Clone + 'static>() -> (Calls<T>, impl Fn(&T, Option<&T>) + 'static) {
        let calls: Calls<T> = Rc::new(RefCell::new(Vec::new()));
        let sink = calls.clone();
        let callback = move |new: &T, old: Option<&T>| {
            sink.borrow_mut().push((new.clone(), old.cloned()));
        };
        (calls, callback)
    }

    #[test]
    fn ref_source_reports_new_and_old() {
        let rt = Runtime::new();
        let count = rt.create_ref(0);
        let (calls, callback) = recorder::<i32>();

        rt.watch(count.clone(), callback, WatchOptions::new());
        assert!(calls.borrow().is_empty());

        count.set(1);
        count.set(1);
        count.set(2);
        assert_eq!(*calls.borrow(), vec![(1, Some(0)), (2, Some(1))]);
    }

    #[test]
    fn getter_source_skips_equal_results() {
        let rt = Runtime::new();
        let count = rt.create_ref(1);
        let parity = {
            let count = count.clone();
            move || count.value() % 2
        };
        let (calls, callback) = recorder::<i32>();

        rt.watch(parity, callback, WatchOptions::new());
        count.set(3);
        assert!(calls.borrow().is_empty());
        count.set(4);
        assert_eq!(*calls.borrow(), vec![(0, Some(1))]);
    }

    #[test]
    fn immediate_fires_with_no_old_value() {
        let rt = Runtime::new();
        let name = rt.create_ref("a".to_string());
        let (calls, callback) = recorder::<String>();

        rt.watch(name, callback, WatchOptions::new().immediate());
        assert_eq!(*calls.borrow(), vec![("a".to_string(), None)]);
    }

    #[test]
    fn deep_watch_sees_nested_writes() {
        let rt = Runtime::new();
        let state = rt.reactive(json!({ "user": { "name": "ada" } })).unwrap();
        let hits = Rc::new(Cell::new(0));
        let old_name = Rc::new(RefCell::new(String::new()));

        let (h, o) = (hits.clone(), old_name.clone());
        rt.watch(
            state.clone(),
            move |_new: &Value, old: Option<&Value>| {
                h.set(h.get() + 1);
                if let Some(Value::Object(old)) = old {
                    let user = old.get_raw("user").unwrap_or_default();
                    if let Value::Object(user) = user {
                        *o.borrow_mut() = user.get_raw("name").unwrap_or_default().to_string();
                    }
                }
            },
            WatchOptions::new(),
        );

        state.nested("user").unwrap().set("name", "grace");
        assert_eq!(hits.get(), 1);
        // The old value is a snapshot taken before the write.
        assert_eq!(*old_name.borrow(), "ada");
    }

    #[test]
    fn shallow_getter_ignores_nested_writes_unless_deep() {
        let rt = Runtime::new();
        let state = rt.reactive(json!({ "items": [1] })).unwrap();
        let getter = {
            let state = state.clone();
            move || state.get("items")
        };
        let shallow = Rc::new(Cell::new(0));
        let deep = Rc::new(Cell::new(0));

        let s = shallow.clone();
        rt.watch(
            getter.clone(),
            move |_: &Value, _: Option<&Value>| s.set(s.get() + 1),
            WatchOptions::new(),
        );
        let d = deep.clone();
        rt.watch(
            getter,
            move |_: &Value, _: Option<&Value>| d.set(d.get() + 1),
            WatchOptions::new().deep(),
        );

        state.nested("items").unwrap().push(2);
        assert_eq!(shallow.get(), 0);
        assert_eq!(deep.get(), 1);
    }

    #[test]
    fn stopped_watcher_is_silent() {
        let rt = Runtime::new();
        let count = rt.create_ref(0);
        let (calls, callback) = recorder::<i32>();

        let runner = rt.watch(count.clone(), callback, WatchOptions::new());
        runner.stop();
        count.set(5);
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn computed_source() {
        let rt = Runtime::new();
        let count = rt.create_ref(5);
        let double = {
            let count = count.clone();
            rt.computed(move || count.value() * 2)
        };
        let (calls, callback) = recorder::<i32>();

        rt.watch(double, callback, WatchOptions::new());
        count.set(6);
        assert_eq!(*calls.borrow(), vec![(12, Some(10))]);
    }
}
