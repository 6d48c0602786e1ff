//! Component Definitions
//!
//! A [`Component`] describes how to build an instance. There are two ways to
//! write one.
//!
//! # Setup Style
//!
//! A setup function runs once per instance with the reactive props and a
//! [`SetupContext`]. It creates state with the runtime's primitives and
//! returns either a render function or a map of named bindings that the
//! definition's own render function reads through the [`ComponentContext`].
//!
//! ```rust,ignore
//! let counter = Component::setup("Counter", |rt, _props, _cx| {
//!     let count = rt.create_ref(Value::from(0));
//!     SetupResult::render(move |_ctx| h("span").text(count.value().to_string()).into())
//! })
//! .build();
//! ```
//!
//! # Options Style
//!
//! The definition lists `data`, `methods`, `computed`, `watch`, `inject`,
//! `provide` and lifecycle hooks; the runtime wires them up in a fixed order
//! (see [`Instance`](super::instance) for the order).
//!
//! ```rust,ignore
//! let todo = Component::options("TodoList")
//!     .data(|_| json!({ "items": [], "draft": "" }).into())
//!     .computed("count", |ctx| ctx.path("items.length"))
//!     .method("add", |ctx, _| { /* ... */ Value::Null })
//!     .render(|ctx| h("p").text(ctx.get("count").to_string()).into())
//!     .build();
//! ```

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

use super::context::{ComponentContext, SetupContext};
use super::node::{ComponentNode, Node};
use crate::error::ComponentError;
use crate::reactive::{Computed, Reactive, Ref, Runtime, WatchOptions};
use crate::value::Value;

/// Render function: produces the node tree of an instance.
pub type RenderFn = Rc<dyn Fn(&ComponentContext) -> Result<Node, ComponentError>>;

/// Setup function.
pub type SetupFn =
    Rc<dyn Fn(&Runtime, &Reactive, &SetupContext) -> Result<SetupResult, ComponentError>>;

/// Lifecycle or option hook.
pub type Hook = Rc<dyn Fn(&ComponentContext)>;

/// A method callable through [`ComponentContext::call`].
pub type Method = Rc<dyn Fn(&ComponentContext, &[Value]) -> Value>;

/// Getter for a `computed` entry.
pub type Getter = Rc<dyn Fn(&ComponentContext) -> Value>;

/// Option that runs during setup and may fail it: `before_create`,
/// `created`.
pub type SetupHook = Rc<dyn Fn(&ComponentContext) -> Result<(), ComponentError>>;

/// Factory of an options-style `data` object.
pub type DataFn = Rc<dyn Fn(&ComponentContext) -> Result<Value, ComponentError>>;

/// Unique identifier for a component definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentId(u64);

impl ComponentId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// A named piece of state exposed by an instance.
///
/// Bindings come from setup state maps, options-style `computed` entries,
/// `inject` and provide/inject itself. Reading a binding through
/// [`value`](Binding::value) unwraps refs and computed values.
#[derive(Clone)]
pub enum Binding {
    /// A plain value.
    Value(Value),
    /// A ref. Reads are tracked, writes go through [`Ref::set`].
    Ref(Ref<Value>),
    /// A computed value.
    Computed(Computed<Value>),
    /// A reactive object.
    Reactive(Reactive),
    /// A callable.
    Method(Method),
}

impl Binding {
    /// The current value. Refs and computed values are unwrapped; methods
    /// read as `Null`.
    pub fn value(&self) -> Value {
        match self {
            Binding::Value(value) => value.clone(),
            Binding::Ref(r) => r.value(),
            Binding::Computed(c) => c.value(),
            Binding::Reactive(r) => r.to_value(),
            Binding::Method(_) => Value::Null,
        }
    }

    /// The ref, if this binding is one.
    pub fn to_ref(&self) -> Option<Ref<Value>> {
        match self {
            Binding::Ref(r) => Some(r.clone()),
            _ => None,
        }
    }

    /// The reactive object, if this binding is one.
    pub fn to_reactive(&self) -> Option<Reactive> {
        match self {
            Binding::Reactive(r) => Some(r.clone()),
            Binding::Ref(r) => r.reactive(),
            _ => None,
        }
    }

    /// Wrap a closure as a method binding.
    pub fn method(f: impl Fn(&ComponentContext, &[Value]) -> Value + 'static) -> Self {
        Binding::Method(Rc::new(f))
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Binding::Ref(r) => f.debug_tuple("Ref").field(r).finish(),
            Binding::Computed(c) => f.debug_tuple("Computed").field(c).finish(),
            Binding::Reactive(r) => f.debug_tuple("Reactive").field(r).finish(),
            Binding::Method(_) => f.write_str("Method"),
        }
    }
}

impl From<Value> for Binding {
    fn from(value: Value) -> Self {
        Binding::Value(value)
    }
}

impl From<Ref<Value>> for Binding {
    fn from(r: Ref<Value>) -> Self {
        Binding::Ref(r)
    }
}

impl From<Computed<Value>> for Binding {
    fn from(c: Computed<Value>) -> Self {
        Binding::Computed(c)
    }
}

impl From<Reactive> for Binding {
    fn from(r: Reactive) -> Self {
        Binding::Reactive(r)
    }
}

macro_rules! binding_from_value {
    ($($t:ty),*) => {
        $(impl From<$t> for Binding {
            fn from(v: $t) -> Self {
                Binding::Value(Value::from(v))
            }
        })*
    };
}

binding_from_value!(bool, i32, i64, u32, u64, usize, f64, &str, String);

/// What a setup function returns.
pub enum SetupResult {
    /// The instance renders with this function.
    Render(RenderFn),
    /// Named bindings, readable through the context by the definition's
    /// render function.
    State(IndexMap<String, Binding>),
    /// Nothing to expose.
    Empty,
}

impl SetupResult {
    /// Return an infallible render function.
    pub fn render(f: impl Fn(&ComponentContext) -> Node + 'static) -> Self {
        SetupResult::Render(Rc::new(move |ctx| Ok(f(ctx))))
    }

    /// Return a fallible render function.
    pub fn try_render(
        f: impl Fn(&ComponentContext) -> Result<Node, ComponentError> + 'static,
    ) -> Self {
        SetupResult::Render(Rc::new(f))
    }

    /// Return named bindings.
    pub fn state<K, B>(entries: impl IntoIterator<Item = (K, B)>) -> Self
    where
        K: Into<String>,
        B: Into<Binding>,
    {
        SetupResult::State(
            entries
                .into_iter()
                .map(|(k, b)| (k.into(), b.into()))
                .collect(),
        )
    }
}

impl fmt::Debug for SetupResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetupResult::Render(_) => f.write_str("Render"),
            SetupResult::State(state) => f.debug_tuple("State").field(state).finish(),
            SetupResult::Empty => f.write_str("Empty"),
        }
    }
}

// ----------------------------------------------------------------------------
// Options
// ----------------------------------------------------------------------------

/// Handler of an options-style watch entry.
#[derive(Clone)]
pub enum WatchHandler {
    /// Called with `(ctx, new, old)`.
    Callback(Rc<dyn Fn(&ComponentContext, &Value, Option<&Value>)>),
    /// Name of a method, called with `[new, old]`.
    Method(String),
}

#[derive(Clone)]
pub(crate) struct WatchEntry {
    pub handler: WatchHandler,
    pub options: WatchOptions,
}

/// An options-style `inject` entry.
#[derive(Debug, Clone)]
pub(crate) struct InjectEntry {
    /// Name the value is exposed under.
    pub name: String,
    /// Provide key to look up.
    pub from: String,
    pub default: Option<Value>,
}

#[derive(Clone)]
pub(crate) enum ProvideOption {
    Static(IndexMap<String, Binding>),
    Factory(Rc<dyn Fn(&ComponentContext) -> IndexMap<String, Binding>>),
}

/// Options-style members of a definition, applied in a fixed order.
#[derive(Clone, Default)]
pub(crate) struct Options {
    pub before_create: Option<SetupHook>,
    pub methods: IndexMap<String, Method>,
    pub data: Option<DataFn>,
    pub computed: IndexMap<String, Getter>,
    pub watch: IndexMap<String, WatchEntry>,
    pub inject: Vec<InjectEntry>,
    pub provide: Vec<ProvideOption>,
    pub before_mount: Option<Hook>,
    pub mounted: Option<Hook>,
    pub updated: Option<Hook>,
    pub unmounted: Option<Hook>,
    pub created: Option<SetupHook>,
}

// ----------------------------------------------------------------------------
// Component
// ----------------------------------------------------------------------------

/// A component definition. Cloning is cheap and shares the definition.
#[derive(Clone)]
pub struct Component {
    inner: Rc<ComponentDef>,
}

pub(crate) struct ComponentDef {
    pub id: ComponentId,
    pub name: String,
    pub setup: Option<SetupFn>,
    pub options: Options,
    pub render: Option<RenderFn>,
    pub registry: ComponentRegistry,
    pub prop_defaults: IndexMap<String, Value>,
}

impl Component {
    /// Start a setup-style definition.
    pub fn setup(
        name: impl Into<String>,
        setup: impl Fn(&Runtime, &Reactive, &SetupContext) -> SetupResult + 'static,
    ) -> ComponentBuilder {
        Self::try_setup(name, move |rt, props, cx| Ok(setup(rt, props, cx)))
    }

    /// Start a setup-style definition whose setup may fail.
    pub fn try_setup(
        name: impl Into<String>,
        setup: impl Fn(&Runtime, &Reactive, &SetupContext) -> Result<SetupResult, ComponentError>
            + 'static,
    ) -> ComponentBuilder {
        let mut builder = ComponentBuilder::new(name);
        builder.setup = Some(Rc::new(setup));
        builder
    }

    /// Start an options-style definition.
    pub fn options(name: impl Into<String>) -> ComponentBuilder {
        ComponentBuilder::new(name)
    }

    pub fn id(&self) -> ComponentId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Components usable by tag name inside this component's render output.
    pub fn registry(&self) -> &ComponentRegistry {
        &self.inner.registry
    }

    /// A node instantiating this component.
    pub fn node(&self) -> ComponentNode {
        ComponentNode::new(self)
    }

    pub(crate) fn def(&self) -> &ComponentDef {
        &self.inner
    }

    pub fn ptr_eq(&self, other: &Component) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("name", &self.inner.name)
            .field("setup", &self.inner.setup.is_some())
            .field("components", &self.inner.registry.len())
            .finish()
    }
}

/// Builder for [`Component`].
pub struct ComponentBuilder {
    name: String,
    setup: Option<SetupFn>,
    options: Options,
    render: Option<RenderFn>,
    registry: ComponentRegistry,
    prop_defaults: IndexMap<String, Value>,
}

impl ComponentBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            setup: None,
            options: Options::default(),
            render: None,
            registry: ComponentRegistry::new(),
            prop_defaults: IndexMap::new(),
        }
    }

    /// Render function used when setup does not return one.
    pub fn render(self, f: impl Fn(&ComponentContext) -> Node + 'static) -> Self {
        self.try_render(move |ctx| Ok(f(ctx)))
    }

    /// Fallible render function.
    pub fn try_render(
        mut self,
        f: impl Fn(&ComponentContext) -> Result<Node, ComponentError> + 'static,
    ) -> Self {
        self.render = Some(Rc::new(f));
        self
    }

    /// Register a child component under a tag name.
    pub fn component(mut self, tag: impl Into<String>, component: &Component) -> Self {
        self.registry.register(tag, component);
        self
    }

    /// Default value of a prop the parent does not pass.
    pub fn prop_default(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.prop_defaults.insert(name.into(), value.into());
        self
    }

    pub fn before_create(self, f: impl Fn(&ComponentContext) + 'static) -> Self {
        self.try_before_create(move |ctx| {
            f(ctx);
            Ok(())
        })
    }

    /// `before_create` that may fail the setup.
    pub fn try_before_create(
        mut self,
        f: impl Fn(&ComponentContext) -> Result<(), ComponentError> + 'static,
    ) -> Self {
        self.options.before_create = Some(Rc::new(f));
        self
    }

    pub fn method(
        mut self,
        name: impl Into<String>,
        f: impl Fn(&ComponentContext, &[Value]) -> Value + 'static,
    ) -> Self {
        self.options.methods.insert(name.into(), Rc::new(f));
        self
    }

    /// Factory of the instance's reactive `data` object.
    pub fn data(self, f: impl Fn(&ComponentContext) -> Value + 'static) -> Self {
        self.try_data(move |ctx| Ok(f(ctx)))
    }

    /// `data` factory that may fail the setup.
    pub fn try_data(
        mut self,
        f: impl Fn(&ComponentContext) -> Result<Value, ComponentError> + 'static,
    ) -> Self {
        self.options.data = Some(Rc::new(f));
        self
    }

    pub fn computed(
        mut self,
        name: impl Into<String>,
        getter: impl Fn(&ComponentContext) -> Value + 'static,
    ) -> Self {
        self.options.computed.insert(name.into(), Rc::new(getter));
        self
    }

    /// Watch a dotted path of the instance's state.
    pub fn watch(
        mut self,
        path: impl Into<String>,
        handler: impl Fn(&ComponentContext, &Value, Option<&Value>) + 'static,
        options: WatchOptions,
    ) -> Self {
        self.options.watch.insert(
            path.into(),
            WatchEntry {
                handler: WatchHandler::Callback(Rc::new(handler)),
                options,
            },
        );
        self
    }

    /// Watch a dotted path and call a method with `[new, old]`.
    pub fn watch_method(
        mut self,
        path: impl Into<String>,
        method: impl Into<String>,
        options: WatchOptions,
    ) -> Self {
        self.options.watch.insert(
            path.into(),
            WatchEntry {
                handler: WatchHandler::Method(method.into()),
                options,
            },
        );
        self
    }

    /// Inject a provided value under the same name.
    pub fn inject(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.options.inject.push(InjectEntry {
            from: name.clone(),
            name,
            default: None,
        });
        self
    }

    /// Inject the value provided under `from`, exposed as `name`, with a
    /// fallback when no ancestor provides it.
    pub fn inject_from(
        mut self,
        name: impl Into<String>,
        from: impl Into<String>,
        default: Option<Value>,
    ) -> Self {
        self.options.inject.push(InjectEntry {
            name: name.into(),
            from: from.into(),
            default,
        });
        self
    }

    /// Provide a fixed binding to descendants.
    pub fn provide(mut self, key: impl Into<String>, binding: impl Into<Binding>) -> Self {
        let mut map = IndexMap::new();
        map.insert(key.into(), binding.into());
        self.options.provide.push(ProvideOption::Static(map));
        self
    }

    /// Provide bindings computed from the instance at setup time.
    pub fn provide_with(
        mut self,
        f: impl Fn(&ComponentContext) -> IndexMap<String, Binding> + 'static,
    ) -> Self {
        self.options.provide.push(ProvideOption::Factory(Rc::new(f)));
        self
    }

    pub fn before_mount(mut self, f: impl Fn(&ComponentContext) + 'static) -> Self {
        self.options.before_mount = Some(Rc::new(f));
        self
    }

    pub fn mounted(mut self, f: impl Fn(&ComponentContext) + 'static) -> Self {
        self.options.mounted = Some(Rc::new(f));
        self
    }

    pub fn updated(mut self, f: impl Fn(&ComponentContext) + 'static) -> Self {
        self.options.updated = Some(Rc::new(f));
        self
    }

    pub fn unmounted(mut self, f: impl Fn(&ComponentContext) + 'static) -> Self {
        self.options.unmounted = Some(Rc::new(f));
        self
    }

    pub fn created(self, f: impl Fn(&ComponentContext) + 'static) -> Self {
        self.try_created(move |ctx| {
            f(ctx);
            Ok(())
        })
    }

    /// `created` that may fail the setup. The error is returned from
    /// [`App::mount`](super::App::mount) for the root, and expands the
    /// component to nothing anywhere else.
    pub fn try_created(
        mut self,
        f: impl Fn(&ComponentContext) -> Result<(), ComponentError> + 'static,
    ) -> Self {
        self.options.created = Some(Rc::new(f));
        self
    }

    /// Finish the definition.
    pub fn build(self) -> Component {
        Component {
            inner: Rc::new(ComponentDef {
                id: ComponentId::next(),
                name: self.name,
                setup: self.setup,
                options: self.options,
                render: self.render,
                registry: self.registry,
                prop_defaults: self.prop_defaults,
            }),
        }
    }
}

// ----------------------------------------------------------------------------
// Registry
// ----------------------------------------------------------------------------

/// Normalize a tag for fuzzy lookup: lowercase, dashes removed.
///
/// `todo-item`, `TodoItem` and `todoitem` all normalize to `todoitem`.
pub fn normalize_tag(tag: &str) -> String {
    tag.chars()
        .filter(|c| *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Tag-name lookup of child components.
///
/// Lookup tries the exact tag first, then its normalized form. When two
/// registrations normalize to the same key, the first one wins the fuzzy
/// lookup.
#[derive(Clone, Default)]
pub struct ComponentRegistry {
    exact: IndexMap<String, Component>,
    normalized: HashMap<String, Component>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tag: impl Into<String>, component: &Component) {
        let tag = tag.into();
        self.normalized
            .entry(normalize_tag(&tag))
            .or_insert_with(|| component.clone());
        self.exact.insert(tag, component.clone());
    }

    pub fn resolve(&self, tag: &str) -> Option<&Component> {
        self.exact
            .get(tag)
            .or_else(|| self.normalized.get(&normalize_tag(tag)))
    }

    pub fn len(&self) -> usize {
        self.exact.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty()
    }
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.exact.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(name: &str) -> Component {
        Component::options(name).build()
    }

    #[test]
    fn normalization() {
        assert_eq!(normalize_tag("Todo-Item"), "todoitem");
        assert_eq!(normalize_tag("todoitem"), "todoitem");
    }

    #[test]
    fn registry_exact_then_fuzzy() {
        let item = named("TodoItem");
        let other = named("Other");
        let mut registry = ComponentRegistry::new();
        registry.register("TodoItem", &item);
        registry.register("todo-item", &other);

        assert!(registry.resolve("todo-item").unwrap().ptr_eq(&other));
        assert!(registry.resolve("TodoItem").unwrap().ptr_eq(&item));
        // Fuzzy: first registration wins.
        assert!(registry.resolve("TODOITEM").unwrap().ptr_eq(&item));
        assert!(registry.resolve("missing").is_none());
    }

    #[test]
    fn bindings_unwrap() {
        let rt = Runtime::new();
        let count = rt.create_ref(Value::from(1));
        let binding = Binding::from(count.clone());

        assert_eq!(binding.value(), Value::from(1));
        count.set(Value::from(2));
        assert_eq!(binding.value(), Value::from(2));
        assert!(binding.to_ref().is_some());
        assert_eq!(Binding::from("x").value(), Value::from("x"));
        assert!(Binding::method(|_, _| Value::Null).value().is_null());
    }

    #[test]
    fn builder_collects_options() {
        let child = named("Child");
        let component = Component::options("Parent")
            .data(|_| Value::Null)
            .method("go", |_, _| Value::Null)
            .inject("theme")
            .inject_from("size", "fontSize", Some(Value::from(12)))
            .component("child", &child)
            .build();

        let def = component.def();
        assert_eq!(component.name(), "Parent");
        assert!(def.setup.is_none());
        assert_eq!(def.options.inject.len(), 2);
        assert_eq!(def.options.inject[1].from, "fontSize");
        assert!(component.registry().resolve("Child").is_some());
    }
}
