//! Component Context
//!
//! [`ComponentContext`] is what render functions, methods, watch handlers
//! and hooks receive. It gives access to the instance's state, props, slots,
//! refs and parent.
//!
//! Name lookup through [`ComponentContext::get`] checks, in order:
//!
//! 1. the `data` object of an options-style component
//! 2. setup bindings, computed entries and injected values (refs and
//!    computed values are unwrapped)
//! 3. props
//!
//! All reads are tracked, so a render function that calls `ctx.get("x")`
//! re-renders when `x` changes.
//!
//! The context holds the instance weakly. Once the instance is gone every
//! read returns `Null` or nothing and every write is ignored.

use std::fmt;

use indexmap::IndexMap;

use super::definition::Binding;
use super::instance::{InstanceId, LifecycleState, WeakInstance};
use super::node::Node;
use crate::reactive::{Reactive, Runtime};
use crate::render::NodeHandle;
use crate::value::Value;

/// Handle to a component instance, passed to user callbacks.
#[derive(Clone)]
pub struct ComponentContext {
    instance: WeakInstance,
    rt: Runtime,
}

impl ComponentContext {
    pub(crate) fn new(instance: WeakInstance, rt: Runtime) -> Self {
        Self { instance, rt }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.rt
    }

    /// Name of the component.
    pub fn name(&self) -> String {
        self.instance
            .upgrade()
            .map(|instance| instance.name().to_string())
            .unwrap_or_default()
    }

    pub fn instance_id(&self) -> Option<InstanceId> {
        self.instance.upgrade().map(|instance| instance.id())
    }

    pub fn lifecycle(&self) -> LifecycleState {
        self.instance
            .upgrade()
            .map(|instance| instance.lifecycle())
            .unwrap_or(LifecycleState::Unmounted)
    }

    pub fn is_mounted(&self) -> bool {
        matches!(
            self.lifecycle(),
            LifecycleState::Mounted | LifecycleState::Updating
        )
    }

    /// Look up a name in data, then bindings, then props.
    pub fn get(&self, key: &str) -> Value {
        let Some(instance) = self.instance.upgrade() else {
            return Value::Null;
        };
        if let Some(data) = instance.data() {
            if data.has(key) {
                return data.get(key);
            }
        }
        if let Some(binding) = instance.binding(key) {
            return binding.value();
        }
        instance.props().get(key)
    }

    /// Read a dotted path such as `"user.name"`. The first segment is
    /// looked up like [`get`](Self::get).
    pub fn path(&self, path: &str) -> Value {
        let mut segments = path.split('.');
        let Some(first) = segments.next() else {
            return Value::Null;
        };
        let mut value = self.get(first);
        for segment in segments {
            value = match value {
                Value::Object(target) => self.rt.reactive_target(target).get(segment),
                _ => return Value::Null,
            };
        }
        value
    }

    /// Look up a name and open it as a reactive view if it holds an object.
    pub fn nested(&self, key: &str) -> Option<Reactive> {
        match self.get(key) {
            Value::Object(target) => Some(self.rt.reactive_target(target)),
            _ => None,
        }
    }

    /// Write a name: a `data` property if one exists, otherwise a ref
    /// binding, otherwise a new `data` property.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        let Some(instance) = self.instance.upgrade() else {
            return;
        };
        let value = value.into();
        let data = instance.data();
        if let Some(data) = &data {
            if data.raw().get_raw(key).is_some() {
                data.set(key, value);
                return;
            }
        }
        match instance.binding(key) {
            Some(Binding::Ref(r)) => r.set(value),
            Some(_) => self.rt.dev_warn("set", &format!("`{key}` is read-only")),
            None => match data {
                Some(data) => data.set(key, value),
                None => self
                    .rt
                    .dev_warn("set", &format!("`{key}` is not a data property or ref")),
            },
        }
    }

    /// Call a method from the `methods` option or a method binding.
    pub fn call(&self, name: &str, args: &[Value]) -> Value {
        let Some(instance) = self.instance.upgrade() else {
            return Value::Null;
        };
        if let Some(method) = instance.method(name) {
            return method(self, args);
        }
        if let Some(Binding::Method(method)) = instance.binding(name) {
            return method(self, args);
        }
        self.rt
            .dev_warn("call", &format!("no method `{name}` on `{}`", instance.name()));
        Value::Null
    }

    /// Emit an event to the listener the parent attached: `my-event` calls
    /// the `onMyEvent` listener. Without a listener nothing happens.
    pub fn emit(&self, event: &str, args: &[Value]) {
        let Some(instance) = self.instance.upgrade() else {
            return;
        };
        match instance.listener(event) {
            Some(listener) => listener(args),
            None => tracing::trace!(component = instance.name(), event, "no listener"),
        }
    }

    /// Render a slot. A missing slot renders nothing.
    pub fn slot(&self, name: &str) -> Vec<Node> {
        self.instance
            .upgrade()
            .and_then(|instance| instance.slot(name))
            .map(|slot| slot())
            .unwrap_or_default()
    }

    pub fn has_slot(&self, name: &str) -> bool {
        self.instance
            .upgrade()
            .is_some_and(|instance| instance.slot(name).is_some())
    }

    pub fn slot_names(&self) -> Vec<String> {
        self.instance
            .upgrade()
            .map(|instance| instance.slot_names())
            .unwrap_or_default()
    }

    /// The reactive props object.
    pub fn props(&self) -> Option<Reactive> {
        self.instance.upgrade().map(|instance| instance.props())
    }

    /// Read one prop.
    pub fn prop(&self, name: &str) -> Value {
        self.props().map(|props| props.get(name)).unwrap_or_default()
    }

    /// The reactive `data` object of an options-style component.
    pub fn data(&self) -> Option<Reactive> {
        self.instance.upgrade().and_then(|instance| instance.data())
    }

    /// A setup, computed or injected binding.
    pub fn binding(&self, name: &str) -> Option<Binding> {
        self.instance
            .upgrade()
            .and_then(|instance| instance.binding(name))
    }

    /// Look up a provided value from this instance or its ancestors.
    pub fn inject(&self, key: &str) -> Option<Binding> {
        self.instance
            .upgrade()
            .and_then(|instance| instance.inject_binding(key))
    }

    /// Handles of the elements named with `ref`, as of the last paint.
    pub fn refs(&self) -> IndexMap<String, NodeHandle> {
        self.instance
            .upgrade()
            .map(|instance| instance.refs())
            .unwrap_or_default()
    }

    pub fn ref_handle(&self, name: &str) -> Option<NodeHandle> {
        self.refs().get(name).copied()
    }

    pub fn parent(&self) -> Option<ComponentContext> {
        self.instance
            .upgrade()
            .and_then(|instance| instance.parent())
            .map(|parent| parent.context())
    }

    /// Number of live child instances.
    pub fn child_count(&self) -> usize {
        self.instance
            .upgrade()
            .map(|instance| instance.child_count())
            .unwrap_or(0)
    }

    /// Whether both contexts refer to the same live instance.
    pub fn ptr_eq(&self, other: &ComponentContext) -> bool {
        match (self.instance.upgrade(), other.instance.upgrade()) {
            (Some(a), Some(b)) => a.ptr_eq(&b),
            _ => false,
        }
    }
}

impl fmt::Debug for ComponentContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentContext")
            .field("component", &self.name())
            .field("state", &self.lifecycle())
            .finish()
    }
}

/// Second argument of a setup function.
#[derive(Clone)]
pub struct SetupContext {
    ctx: ComponentContext,
}

impl SetupContext {
    pub(crate) fn new(ctx: ComponentContext) -> Self {
        Self { ctx }
    }

    pub fn emit(&self, event: &str, args: &[Value]) {
        self.ctx.emit(event, args);
    }

    pub fn slot(&self, name: &str) -> Vec<Node> {
        self.ctx.slot(name)
    }

    pub fn has_slot(&self, name: &str) -> bool {
        self.ctx.has_slot(name)
    }

    pub fn runtime(&self) -> &Runtime {
        self.ctx.runtime()
    }

    /// The full context, for closures that outlive setup.
    pub fn context(&self) -> &ComponentContext {
        &self.ctx
    }
}

impl fmt::Debug for SetupContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SetupContext").field(&self.ctx).finish()
    }
}
