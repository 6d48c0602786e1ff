//! Declarative Nodes
//!
//! Render functions return a [`Node`] tree. A node is either a plain tag,
//! a component (to be instantiated during expansion), text, a fragment, or
//! nothing. Nodes are cheap descriptions: building one does not create any
//! instance or touch the render service.
//!
//! # Building Nodes
//!
//! ```rust,ignore
//! h("ul")
//!     .class("todos")
//!     .children(render_list(&items, |item, _, _| {
//!         h("li").text(item.to_string()).into()
//!     }))
//!     .child(counter.node().prop("start", 3).on("change", on_change))
//!     .into()
//! ```
//!
//! Event listeners are stored under their handler name: `on("my-event", f)`
//! registers `onMyEvent`, which is what [`emit`](super::ComponentContext::emit)
//! looks up.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use super::definition::Component;
use crate::reactive::Reactive;
use crate::value::{Data, Value};

/// An event listener. Receives the emitted arguments.
pub type Listener = Rc<dyn Fn(&[Value])>;

/// Produces the nodes of a slot. Called by the component that renders it.
pub type SlotFn = Rc<dyn Fn() -> Vec<Node>>;

/// Convert an event name to its handler name: `my-event` → `onMyEvent`.
///
/// Names that already look like handler names are returned unchanged.
pub fn handler_name(event: &str) -> String {
    let mut chars = event.chars();
    if event.starts_with("on") && chars.nth(2).is_some_and(char::is_uppercase) {
        return event.to_string();
    }

    let mut name = String::with_capacity(event.len() + 2);
    name.push_str("on");
    let mut upper = true;
    for c in event.chars() {
        if c == '-' {
            upper = true;
        } else if upper {
            name.extend(c.to_uppercase());
            upper = false;
        } else {
            name.push(c);
        }
    }
    name
}

/// Attributes and listeners attached to a node.
#[derive(Clone, Default)]
pub struct Props {
    attrs: IndexMap<String, Value>,
    listeners: IndexMap<String, Listener>,
}

impl Props {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an attribute.
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert_attr(name, value);
        self
    }

    /// Add a listener for `event`.
    pub fn on(mut self, event: &str, listener: impl Fn(&[Value]) + 'static) -> Self {
        self.insert_listener(event, Rc::new(listener));
        self
    }

    pub fn insert_attr(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.attrs.insert(name.into(), value.into());
    }

    pub fn insert_listener(&mut self, event: &str, listener: Listener) {
        self.listeners.insert(handler_name(event), listener);
    }

    pub fn remove_attr(&mut self, name: &str) -> Option<Value> {
        self.attrs.shift_remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attrs.get(name)
    }

    /// Look up a listener by event name or handler name.
    pub fn listener(&self, event: &str) -> Option<&Listener> {
        self.listeners.get(&handler_name(event))
    }

    pub fn attrs(&self) -> &IndexMap<String, Value> {
        &self.attrs
    }

    pub fn listeners(&self) -> &IndexMap<String, Listener> {
        &self.listeners
    }

    /// The explicit `key` attribute, if any.
    pub fn key(&self) -> Option<&Value> {
        self.attrs.get("key")
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty() && self.listeners.is_empty()
    }
}

impl fmt::Debug for Props {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Props")
            .field("attrs", &self.attrs)
            .field("listeners", &self.listeners.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Slot content passed from a parent to a component.
#[derive(Clone, Default)]
pub struct Slots {
    slots: IndexMap<String, SlotFn>,
}

impl Slots {
    pub fn new() -> Self {
        Self::default()
    }

    /// The default slot rendering `children`. Empty children give no slot.
    pub fn from_children(children: Vec<Node>) -> Self {
        let mut slots = Self::new();
        if !children.is_empty() {
            slots.insert("default", Rc::new(move || children.clone()));
        }
        slots
    }

    pub fn insert(&mut self, name: impl Into<String>, slot: SlotFn) {
        self.slots.insert(name.into(), slot);
    }

    pub fn get(&self, name: &str) -> Option<&SlotFn> {
        self.slots.get(name)
    }

    /// Render a slot. A missing slot renders nothing.
    pub fn render(&self, name: &str) -> Vec<Node> {
        self.slots.get(name).map(|slot| slot()).unwrap_or_default()
    }

    pub fn has(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl fmt::Debug for Slots {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.slots.keys()).finish()
    }
}

/// A declarative tree node returned by render functions.
#[derive(Clone, Debug, Default)]
pub enum Node {
    /// A plain tag, unless its name matches a registered component.
    Tag(TagNode),
    /// A component to instantiate.
    Component(ComponentNode),
    /// Text content.
    Text(String),
    /// Several nodes without a wrapper.
    Fragment(Vec<Node>),
    /// Nothing.
    #[default]
    Empty,
}

impl Node {
    pub fn text(text: impl Into<String>) -> Self {
        Node::Text(text.into())
    }

    pub fn fragment(nodes: impl IntoIterator<Item = Node>) -> Self {
        Node::Fragment(nodes.into_iter().collect())
    }
}

/// A tag node.
#[derive(Clone, Debug)]
pub struct TagNode {
    pub tag: String,
    pub props: Props,
    pub children: Vec<Node>,
}

/// Start building a tag node.
pub fn h(tag: impl Into<String>) -> TagNode {
    TagNode {
        tag: tag.into(),
        props: Props::new(),
        children: Vec::new(),
    }
}

impl TagNode {
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.insert_attr(name, value);
        self
    }

    pub fn on(mut self, event: &str, listener: impl Fn(&[Value]) + 'static) -> Self {
        self.props.insert_listener(event, Rc::new(listener));
        self
    }

    pub fn key(self, key: impl Into<Value>) -> Self {
        self.attr("key", key)
    }

    /// Name this element so it shows up in the owner's refs.
    pub fn reference(self, name: impl Into<String>) -> Self {
        self.attr("ref", name.into())
    }

    pub fn id(self, id: impl Into<String>) -> Self {
        self.attr("id", id.into())
    }

    pub fn class(self, class: impl Into<String>) -> Self {
        self.attr("class", class.into())
    }

    pub fn child(mut self, child: impl Into<Node>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = Node>) -> Self {
        self.children.extend(children);
        self
    }

    /// Append a text child.
    pub fn text(self, text: impl Into<String>) -> Self {
        self.child(Node::Text(text.into()))
    }
}

/// A component node.
#[derive(Clone)]
pub struct ComponentNode {
    pub component: Component,
    pub props: Props,
    pub slots: Slots,
}

impl ComponentNode {
    pub fn new(component: &Component) -> Self {
        Self {
            component: component.clone(),
            props: Props::new(),
            slots: Slots::new(),
        }
    }

    /// Pass a prop.
    pub fn prop(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.insert_attr(name, value);
        self
    }

    /// Listen to an event the component emits.
    pub fn on(mut self, event: &str, listener: impl Fn(&[Value]) + 'static) -> Self {
        self.props.insert_listener(event, Rc::new(listener));
        self
    }

    pub fn key(self, key: impl Into<Value>) -> Self {
        self.prop("key", key)
    }

    pub fn reference(self, name: impl Into<String>) -> Self {
        self.prop("ref", name.into())
    }

    pub fn id(self, id: impl Into<String>) -> Self {
        self.prop("id", id.into())
    }

    pub fn class(self, class: impl Into<String>) -> Self {
        self.prop("class", class.into())
    }

    /// Provide a named slot.
    pub fn slot(mut self, name: impl Into<String>, slot: impl Fn() -> Vec<Node> + 'static) -> Self {
        self.slots.insert(name, Rc::new(slot));
        self
    }

    /// Provide the default slot as fixed children.
    pub fn default_slot(mut self, children: Vec<Node>) -> Self {
        self.slots.insert("default", Rc::new(move || children.clone()));
        self
    }
}

impl fmt::Debug for ComponentNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentNode")
            .field("component", &self.component.name())
            .field("props", &self.props)
            .field("slots", &self.slots)
            .finish()
    }
}

impl From<TagNode> for Node {
    fn from(node: TagNode) -> Self {
        Node::Tag(node)
    }
}

impl From<ComponentNode> for Node {
    fn from(node: ComponentNode) -> Self {
        Node::Component(node)
    }
}

impl From<&str> for Node {
    fn from(text: &str) -> Self {
        Node::Text(text.to_string())
    }
}

impl From<String> for Node {
    fn from(text: String) -> Self {
        Node::Text(text)
    }
}

impl From<Vec<Node>> for Node {
    fn from(nodes: Vec<Node>) -> Self {
        Node::Fragment(nodes)
    }
}

impl<T: Into<Node>> From<Option<T>> for Node {
    fn from(node: Option<T>) -> Self {
        node.map(Into::into).unwrap_or(Node::Empty)
    }
}

// ----------------------------------------------------------------------------
// Lists
// ----------------------------------------------------------------------------

/// Something [`render_list`] can iterate.
///
/// Yields `(value, key)` pairs:
///
/// - lists: `(item, index)`
/// - maps: `(value, key)`
/// - a number `n`: `(1, 0)`, `(2, 1)`, ... `(n, n - 1)`
pub trait ListSource {
    fn list_entries(&self) -> Vec<(Value, Value)>;
}

impl ListSource for Value {
    /// Untracked. Iterate a [`Reactive`] to re-render when the list changes.
    fn list_entries(&self) -> Vec<(Value, Value)> {
        match self {
            Value::Number(n) if *n > 0.0 => {
                let count = n.floor() as usize;
                (0..count)
                    .map(|i| (Value::from(i + 1), Value::from(i)))
                    .collect()
            }
            Value::Object(target) => match &*target.data() {
                Data::List(items) => items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| (item.clone(), Value::from(i)))
                    .collect(),
                Data::Map(map) => map
                    .iter()
                    .map(|(k, v)| (v.clone(), Value::from(k.as_str())))
                    .collect(),
            },
            _ => Vec::new(),
        }
    }
}

impl ListSource for Reactive {
    /// Tracked: the caller re-renders when items are added, removed or
    /// replaced.
    fn list_entries(&self) -> Vec<(Value, Value)> {
        let list = self.is_list();
        self.entries()
            .into_iter()
            .map(|(key, value)| {
                let key = match key.parse::<usize>() {
                    Ok(i) if list => Value::from(i),
                    _ => Value::from(key),
                };
                (value, key)
            })
            .collect()
    }
}

impl ListSource for usize {
    fn list_entries(&self) -> Vec<(Value, Value)> {
        Value::from(*self).list_entries()
    }
}

/// Map every entry of `source` to a node with `f(value, key, index)`.
pub fn render_list<S>(source: &S, mut f: impl FnMut(&Value, &Value, usize) -> Node) -> Vec<Node>
where
    S: ListSource + ?Sized,
{
    source
        .list_entries()
        .iter()
        .enumerate()
        .map(|(index, (value, key))| f(value, key, index))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Runtime;
    use serde_json::json;

    #[test]
    fn handler_names() {
        assert_eq!(handler_name("click"), "onClick");
        assert_eq!(handler_name("my-event"), "onMyEvent");
        assert_eq!(handler_name("update-model-value"), "onUpdateModelValue");
        assert_eq!(handler_name("onSave"), "onSave");
    }

    #[test]
    fn listeners_found_by_event_name() {
        let props = Props::new().on("my-event", |_| {});
        assert!(props.listener("my-event").is_some());
        assert!(props.listener("onMyEvent").is_some());
        assert!(props.listener("other").is_none());
    }

    #[test]
    fn tag_builder() {
        let node = h("a")
            .key(1)
            .reference("link")
            .class("btn")
            .text("go");

        assert_eq!(node.tag, "a");
        assert_eq!(node.props.key(), Some(&Value::from(1)));
        assert_eq!(node.props.get("ref"), Some(&Value::from("link")));
        assert_eq!(node.children.len(), 1);
    }

    #[test]
    fn default_slot_from_children() {
        assert!(Slots::from_children(Vec::new()).is_empty());

        let slots = Slots::from_children(vec![Node::text("hi")]);
        assert!(slots.has("default"));
        assert_eq!(slots.render("default").len(), 1);
        assert!(slots.render("footer").is_empty());
    }

    #[test]
    fn render_list_sources() {
        let labels = |source: &dyn ListSource| {
            render_list(source, |value, key, index| {
                Node::text(format!("{index}:{key}={value}"))
            })
            .into_iter()
            .map(|node| match node {
                Node::Text(text) => text,
                _ => String::new(),
            })
            .collect::<Vec<_>>()
        };

        assert_eq!(labels(&Value::from(json!(["a", "b"]))), vec!["0:0=a", "1:1=b"]);
        assert_eq!(labels(&3usize), vec!["0:0=1", "1:1=2", "2:2=3"]);
        assert_eq!(labels(&Value::from(json!({ "x": 1 }))), vec!["0:x=1"]);
        assert!(labels(&Value::Null).is_empty());

        let rt = Runtime::new();
        let items = rt.reactive(json!(["a"])).unwrap();
        assert_eq!(labels(&items), vec!["0:0=a"]);
    }
}
