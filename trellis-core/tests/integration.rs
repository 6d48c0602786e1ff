//! Integration Tests for the Reactive System
//!
//! These tests verify that refs, reactive objects, computed values, effects
//! and watchers work together through the public API.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde_json::json;
use trellis_core::{Runtime, RuntimeConfig, Value, WatchOptions};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn counter() -> (Rc<Cell<usize>>, impl Fn() -> Rc<Cell<usize>>) {
    let count = Rc::new(Cell::new(0));
    let handle = count.clone();
    (count, move || handle.clone())
}

/// An effect stops depending on a property once a branch no longer reads it.
#[test]
fn effect_drops_dependencies_of_untaken_branch() {
    init_tracing();
    let rt = Runtime::new();
    let state = rt.reactive(json!({ "show": true, "detail": "a" })).unwrap();
    let (runs, runs_handle) = counter();

    let s = state.clone();
    let r = runs_handle();
    rt.watch_effect(move || {
        r.set(r.get() + 1);
        if s.get("show").truthy() {
            let _ = s.get("detail");
        }
    });
    assert_eq!(runs.get(), 1);

    state.set("detail", "b");
    assert_eq!(runs.get(), 2);

    state.set("show", false);
    assert_eq!(runs.get(), 3);

    // `detail` is no longer read.
    state.set("detail", "c");
    assert_eq!(runs.get(), 3);
}

/// A computed getter runs only when its value is read while dirty.
#[test]
fn computed_is_lazy() {
    let rt = Runtime::new();
    let count = rt.create_ref(1);
    let (calls, calls_handle) = counter();

    let c = count.clone();
    let h = calls_handle();
    let double = rt.computed(move || {
        h.set(h.get() + 1);
        c.value() * 2
    });
    assert_eq!(calls.get(), 0);

    assert_eq!(double.value(), 2);
    assert_eq!(double.value(), 2);
    assert_eq!(calls.get(), 1);

    count.set(2);
    count.set(3);
    assert_eq!(calls.get(), 1);
    assert!(double.is_dirty());

    assert_eq!(double.value(), 6);
    assert_eq!(calls.get(), 2);
}

/// An effect reading a computed re-runs when the computed's input changes.
#[test]
fn effect_over_computed_chain() {
    let rt = Runtime::new();
    let count = rt.create_ref(1);
    let c = count.clone();
    let double = rt.computed(move || c.value() * 2);
    let seen = Rc::new(RefCell::new(Vec::new()));

    let s = seen.clone();
    rt.watch_effect(move || s.borrow_mut().push(double.value()));
    count.set(4);

    assert_eq!(*seen.borrow(), vec![2, 8]);
}

/// `push` notifies readers of `length` once.
#[test]
fn push_triggers_length_readers_once() {
    let rt = Runtime::new();
    let list = rt.reactive(json!([1, 2])).unwrap();
    let (runs, runs_handle) = counter();

    let l = list.clone();
    let r = runs_handle();
    rt.watch_effect(move || {
        r.set(r.get() + 1);
        let _ = l.get("length");
    });

    list.push(3);
    assert_eq!(runs.get(), 2);
    assert_eq!(list.len(), 3);
}

/// Writing one property does not disturb readers of another.
#[test]
fn dependencies_are_per_property() {
    let rt = Runtime::new();
    let state = rt.reactive(json!({ "a": 1, "b": 1 })).unwrap();
    let (runs, runs_handle) = counter();

    let s = state.clone();
    let r = runs_handle();
    rt.watch_effect(move || {
        r.set(r.get() + 1);
        let _ = s.get("a");
    });

    state.set("b", 2);
    assert_eq!(runs.get(), 1);
    state.set("a", 2);
    assert_eq!(runs.get(), 2);
}

/// Adding a key re-runs effects that iterate the object.
#[test]
fn new_keys_trigger_iteration() {
    let rt = Runtime::new();
    let state = rt.reactive(json!({ "a": 1 })).unwrap();
    let keys = Rc::new(RefCell::new(Vec::new()));

    let s = state.clone();
    let k = keys.clone();
    rt.watch_effect(move || *k.borrow_mut() = s.keys());

    state.set("b", 2);
    assert_eq!(*keys.borrow(), vec!["a".to_string(), "b".to_string()]);
}

/// An effect that writes what it reads does not loop.
#[test]
fn self_writing_effect_does_not_recurse() {
    let rt = Runtime::new();
    let count = rt.create_ref(0);
    let (runs, runs_handle) = counter();

    let c = count.clone();
    let r = runs_handle();
    rt.watch_effect(move || {
        r.set(r.get() + 1);
        c.set(c.value() + 1);
    });

    assert_eq!(runs.get(), 1);
    assert_eq!(count.get_untracked(), 1);
}

/// ref + computed + watch: one callback with the new and old double.
#[tokio::test(flavor = "current_thread")]
async fn watch_computed_scenario() {
    init_tracing();
    let rt = Runtime::new();
    let count = rt.create_ref(0);
    let c = count.clone();
    let double = rt.computed(move || c.value() * 2);
    let calls = Rc::new(RefCell::new(Vec::new()));

    let sink = calls.clone();
    rt.watch(
        double.clone(),
        move |new: &i32, old: Option<&i32>| sink.borrow_mut().push((*new, old.copied())),
        WatchOptions::new(),
    );

    count.set(5);
    rt.next_tick().await;

    assert_eq!(double.value(), 10);
    assert_eq!(*calls.borrow(), vec![(10, Some(0))]);
}

/// `deep` + `immediate`: fires right away, then only on nested changes.
#[test]
fn watch_deep_immediate() {
    let rt = Runtime::new();
    let state = rt
        .reactive(json!({ "obj": { "inner": { "n": 1 } }, "other": 0 }))
        .unwrap();
    let calls = Rc::new(RefCell::new(Vec::<bool>::new()));

    let s = state.clone();
    let sink = calls.clone();
    rt.watch(
        move || s.get("obj"),
        move |_new: &Value, old: Option<&Value>| sink.borrow_mut().push(old.is_some()),
        WatchOptions::new().deep().immediate(),
    );
    assert_eq!(*calls.borrow(), vec![false]);

    state.set("other", 1);
    assert_eq!(calls.borrow().len(), 1);

    let inner = state.nested("obj").and_then(|obj| obj.nested("inner")).unwrap();
    inner.set("n", 2);
    assert_eq!(*calls.borrow(), vec![false, true]);
}

/// Effects created in a scope stop with it.
#[test]
fn effect_scope_stops_its_effects() {
    let rt = Runtime::new();
    let count = rt.create_ref(0);
    let (runs, runs_handle) = counter();

    let scope = rt.effect_scope();
    scope.run(|| {
        let c = count.clone();
        let r = runs_handle();
        rt.watch_effect(move || {
            r.set(r.get() + 1);
            let _ = c.value();
        });
    });
    scope.stop();

    count.set(1);
    assert_eq!(runs.get(), 1);
    assert_eq!(count.subscriber_count(), 0);
}

/// Two runtimes never see each other's effects.
#[test]
fn runtimes_are_independent() {
    let a = Runtime::new();
    let b = Runtime::with_config(RuntimeConfig::default().dev_warnings(false));
    let count = a.create_ref(0);
    let (runs, runs_handle) = counter();

    let c = count.clone();
    let r = runs_handle();
    a.watch_effect(move || {
        r.set(r.get() + 1);
        let _ = c.value();
    });

    assert_eq!(b.tracked_targets(), 0);
    b.run_microtasks();
    count.set(1);
    assert_eq!(runs.get(), 2);
}

/// Configuration parses from partial JSON.
#[test]
fn config_from_json() {
    let config = RuntimeConfig::from_json(r#"{ "max_microtask_turns": 8 }"#).unwrap();
    assert_eq!(config.max_microtask_turns, 8);
    assert!(config.dev_warnings);
    assert!(RuntimeConfig::from_json("not json").is_err());
}

/// Values round-trip through JSON.
#[test]
fn value_json_conversion() {
    let rt = Runtime::new();
    let state = rt.reactive(json!({ "list": [1, "two", null], "ok": true })).unwrap();
    state.nested("list").unwrap().push(4);

    assert_eq!(
        state.to_json(),
        json!({ "list": [1, "two", null, 4], "ok": true })
    );
    assert_eq!(Value::from(json!("x")).to_string(), "x");
}
