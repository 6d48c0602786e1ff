//! Tree Expansion
//!
//! Expansion turns the [`Node`] tree returned by a render function into a
//! [`Layout`]: the same tree with every component node replaced by a slot
//! pointing at a live child instance.
//!
//! # How Expansion Works
//!
//! 1. A tag node whose name is registered in the rendering component's
//!    registry is treated as that component, with the tag's children as its
//!    default slot. Other tags stay tags and their children are expanded in
//!    turn.
//!
//! 2. A component node is matched against the children of the previous
//!    render by `(component, key)`. The key is the node's `key` prop, or its
//!    position among unkeyed nodes of the same component. A match receives
//!    the new props and slots; anything else spawns a new instance.
//!
//! 3. Children of the previous render that were not matched are returned as
//!    stale and unmounted by the caller.
//!
//! 4. A child that fails to spawn is logged and expands to nothing. Its
//!    siblings are unaffected.
//!
//! A [`Materializer`] then composes an instance's layout with its
//! children's layouts into a plain [`Element`] tree, forwarding the `key`,
//! `ref`, `id` and `class` of each component node onto the root element of
//! what it rendered. While it walks it records, per instance, the path of
//! every element that instance named with `ref`. Paths are taken from the
//! finished tree, so forwarded attributes and repeated components cannot
//! confuse them.

use std::collections::HashMap;

use indexmap::IndexMap;

use super::definition::{Component, ComponentId};
use super::instance::Instance;
use super::node::{Node, Props, Slots};
use crate::error::Error;
use crate::render::{Element, TagElement};
use crate::value::Value;

/// Attributes copied from a component node onto its rendered root.
const FORWARDED: [&str; 4] = ["key", "ref", "id", "class"];

/// Attributes that belong to the node, not to the component's props.
const RESERVED: [&str; 2] = ["key", "ref"];

/// An instance's expanded output.
#[derive(Debug, Clone, Default)]
pub(crate) enum Layout {
    Tag {
        tag: String,
        props: Props,
        children: Vec<Layout>,
    },
    Child(ChildSlot),
    Text(String),
    Fragment(Vec<Layout>),
    #[default]
    Empty,
}

/// Placeholder for a child instance inside a layout.
#[derive(Debug, Clone)]
pub(crate) struct ChildSlot {
    key: ChildKey,
    forward: IndexMap<String, Value>,
}

/// Identity of a child across renders.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct ChildKey {
    component: ComponentId,
    key: SlotKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum SlotKey {
    Explicit(String),
    Ordinal(usize),
}

/// State of one expansion run.
pub(crate) struct ExpandCx<'a> {
    owner: &'a Instance,
    previous: IndexMap<ChildKey, Instance>,
    next: IndexMap<ChildKey, Instance>,
    ordinals: HashMap<ComponentId, usize>,
}

impl<'a> ExpandCx<'a> {
    pub fn new(owner: &'a Instance, previous: IndexMap<ChildKey, Instance>) -> Self {
        Self {
            owner,
            previous,
            next: IndexMap::new(),
            ordinals: HashMap::new(),
        }
    }

    pub fn expand(&mut self, node: Node) -> Layout {
        match node {
            Node::Tag(tag) => {
                let registered = self.owner.component().registry().resolve(&tag.tag).cloned();
                match registered {
                    Some(component) => {
                        let slots = Slots::from_children(tag.children);
                        self.expand_component(&component, tag.props, slots)
                    }
                    None => Layout::Tag {
                        tag: tag.tag,
                        props: tag.props,
                        children: tag.children.into_iter().map(|c| self.expand(c)).collect(),
                    },
                }
            }
            Node::Component(node) => self.expand_component(&node.component, node.props, node.slots),
            Node::Text(text) => Layout::Text(text),
            Node::Fragment(nodes) => {
                Layout::Fragment(nodes.into_iter().map(|n| self.expand(n)).collect())
            }
            Node::Empty => Layout::Empty,
        }
    }

    fn expand_component(&mut self, component: &Component, mut props: Props, slots: Slots) -> Layout {
        let key = self.child_key(component, props.key());
        let forward: IndexMap<String, Value> = FORWARDED
            .iter()
            .filter_map(|name| props.get(name).map(|value| (name.to_string(), value.clone())))
            .collect();
        for name in RESERVED {
            props.remove_attr(name);
        }

        let instance = match self.previous.shift_remove(&key) {
            Some(existing) => {
                existing.receive(props, slots);
                existing
            }
            None => match Instance::spawn(self.owner, component, props, slots) {
                Ok(instance) => instance,
                Err(err) => {
                    let err = Error::expansion(component.name(), err);
                    tracing::error!(
                        parent = self.owner.name(),
                        error = &err as &dyn std::error::Error,
                        "component rendered as empty"
                    );
                    return Layout::Empty;
                }
            },
        };

        self.next.insert(key.clone(), instance);
        Layout::Child(ChildSlot { key, forward })
    }

    fn child_key(&mut self, component: &Component, key: Option<&Value>) -> ChildKey {
        if let Some(key) = key {
            let candidate = ChildKey {
                component: component.id(),
                key: SlotKey::Explicit(key.to_string()),
            };
            if !self.next.contains_key(&candidate) {
                return candidate;
            }
            tracing::warn!(
                component = component.name(),
                key = %key,
                "duplicate key; matching by position instead"
            );
        }
        let ordinal = self.ordinals.entry(component.id()).or_insert(0);
        let key = SlotKey::Ordinal(*ordinal);
        *ordinal += 1;
        ChildKey {
            component: component.id(),
            key,
        }
    }

    /// Children of this run, and the unmatched ones of the previous run.
    pub fn finish(self) -> (IndexMap<ChildKey, Instance>, IndexMap<ChildKey, Instance>) {
        (self.next, self.previous)
    }
}

/// Paths of the elements one instance named with `ref`.
pub(crate) type RefPaths = IndexMap<String, Vec<usize>>;

/// Builds element trees and tracks where each `ref` lands in them.
#[derive(Default)]
pub(crate) struct Materializer {
    path: Vec<usize>,
    refs: Vec<(Option<Instance>, RefPaths)>,
}

impl Materializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// An instance's whole subtree, placed at the current path.
    pub fn instance(&mut self, instance: &Instance) -> Element {
        let owner = self.refs.len();
        self.refs.push((Some(instance.clone()), RefPaths::new()));
        instance.with_layout(|layout, children| self.layout(owner, layout, children))
    }

    /// Every instance visited, with its ref paths.
    pub fn into_refs(self) -> Vec<(Instance, RefPaths)> {
        self.refs
            .into_iter()
            .filter_map(|(instance, refs)| instance.map(|instance| (instance, refs)))
            .collect()
    }

    fn layout(
        &mut self,
        owner: usize,
        layout: &Layout,
        children: &IndexMap<ChildKey, Instance>,
    ) -> Element {
        match layout {
            Layout::Tag {
                tag,
                props,
                children: nested,
            } => {
                if let Some(name) = props.get("ref").and_then(Value::as_str) {
                    self.record(owner, name);
                }
                Element::Tag(TagElement {
                    tag: tag.clone(),
                    attrs: props.attrs().clone(),
                    listeners: props.listeners().clone(),
                    children: self.items(owner, nested, children),
                })
            }
            Layout::Child(slot) => match children.get(&slot.key) {
                Some(child) => {
                    let element = apply_forward(self.instance(child), &slot.forward);
                    let name = slot.forward.get("ref").and_then(Value::as_str);
                    if let (Some(name), Element::Tag(_)) = (name, &element) {
                        self.record(owner, name);
                    }
                    element
                }
                None => Element::Empty,
            },
            Layout::Text(text) => Element::Text(text.clone()),
            Layout::Fragment(items) => Element::Fragment(self.items(owner, items, children)),
            Layout::Empty => Element::Empty,
        }
    }

    fn items(
        &mut self,
        owner: usize,
        items: &[Layout],
        children: &IndexMap<ChildKey, Instance>,
    ) -> Vec<Element> {
        items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                self.path.push(i);
                let element = self.layout(owner, item, children);
                self.path.pop();
                element
            })
            .collect()
    }

    fn record(&mut self, owner: usize, name: &str) {
        let path = self.path.clone();
        if let Some((_, refs)) = self.refs.get_mut(owner) {
            refs.insert(name.to_string(), path);
        }
    }
}

/// Copy forwarded attributes onto a tag root. `class` is appended, the
/// rest overwrite. Roots that are not tags take nothing.
fn apply_forward(mut element: Element, forward: &IndexMap<String, Value>) -> Element {
    if let Element::Tag(tag) = &mut element {
        for (name, value) in forward {
            let value = match (name.as_str(), tag.attrs.get(name)) {
                ("class", Some(Value::String(existing))) if !existing.is_empty() => {
                    Value::from(format!("{existing} {value}"))
                }
                _ => value.clone(),
            };
            tag.attrs.insert(name.clone(), value);
        }
    }
    element
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a layout that belongs to no instance.
    fn detached(layout: &Layout) -> (Element, RefPaths) {
        let mut walk = Materializer::new();
        walk.refs.push((None, RefPaths::new()));
        let element = walk.layout(0, layout, &IndexMap::new());
        let refs = walk.refs.pop().map(|(_, refs)| refs).unwrap_or_default();
        (element, refs)
    }

    fn tag_layout(tag: &str, props: Props, children: Vec<Layout>) -> Layout {
        Layout::Tag {
            tag: tag.to_string(),
            props,
            children,
        }
    }

    #[test]
    fn materialize_plain_layout() {
        let layout = tag_layout(
            "ul",
            Props::new().attr("class", "list"),
            vec![
                tag_layout("li", Props::new(), vec![Layout::Text("a".into())]),
                Layout::Fragment(vec![Layout::Text("b".into()), Layout::Empty]),
            ],
        );

        let (element, refs) = detached(&layout);
        assert!(refs.is_empty());
        assert_eq!(element.to_html(), r#"<ul class="list"><li>a</li>b</ul>"#);
    }

    #[test]
    fn forwarded_class_is_appended() {
        let root = Element::Tag(TagElement {
            tag: "button".into(),
            attrs: [("class".to_string(), Value::from("btn"))].into_iter().collect(),
            listeners: IndexMap::new(),
            children: Vec::new(),
        });
        let forward: IndexMap<String, Value> = [
            ("class".to_string(), Value::from("primary")),
            ("id".to_string(), Value::from("save")),
        ]
        .into_iter()
        .collect();

        let element = apply_forward(root, &forward);
        assert_eq!(element.to_html(), r#"<button class="btn primary" id="save"></button>"#);

        // Text roots take nothing.
        let text = apply_forward(Element::Text("x".into()), &forward);
        assert_eq!(text, Element::Text("x".into()));
    }

    #[test]
    fn ref_paths_follow_the_built_tree() {
        let layout = tag_layout(
            "form",
            Props::new(),
            vec![
                Layout::Text("name".into()),
                Layout::Fragment(vec![
                    tag_layout("input", Props::new().attr("ref", "first"), Vec::new()),
                    tag_layout("input", Props::new().attr("ref", "second"), Vec::new()),
                ]),
            ],
        );

        let (element, refs) = detached(&layout);
        assert_eq!(refs.get("first"), Some(&vec![1, 0]));
        assert_eq!(refs.get("second"), Some(&vec![1, 1]));
        let second = element.at_path(&refs["second"]).and_then(Element::as_tag);
        assert_eq!(second.and_then(TagElement::ref_name), Some("second"));
    }
}
