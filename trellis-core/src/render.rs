//! Render Service
//!
//! Expansion turns component output into an [`Element`] tree: tags, text and
//! fragments only, with every component replaced by what it rendered. The
//! runtime hands that tree to a [`RenderService`], which owns the actual
//! output (a DOM, a terminal, a string buffer).
//!
//! # Protocol
//!
//! 1. The first paint of an app calls [`RenderService::mount`] with the
//!    container selector passed to [`App::mount`](crate::component::App::mount).
//! 2. Every later paint calls [`RenderService::patch`] with the new tree and
//!    the tree painted last time.
//! 3. After a successful paint the runtime asks for a handle to each element
//!    named with `ref` through [`RenderService::resolve_handle`]. The element
//!    is addressed by its path in the painted tree: child indices from the
//!    root, counting the items of tags and fragments alike. Services that do
//!    not support refs keep the default, which returns `None`.
//!
//! [`HeadlessRenderer`] is an in-memory service used by tests and for
//! server-side string output.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::component::Listener;
use crate::error::{Error, Result};
use crate::value::Value;

/// A fully expanded output tree.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Element {
    Tag(TagElement),
    Text(String),
    Fragment(Vec<Element>),
    #[default]
    Empty,
}

/// A tag in the output tree.
#[derive(Clone)]
pub struct TagElement {
    pub tag: String,
    pub attrs: IndexMap<String, Value>,
    pub listeners: IndexMap<String, Listener>,
    pub children: Vec<Element>,
}

impl TagElement {
    pub fn attr(&self, name: &str) -> Option<&Value> {
        self.attrs.get(name)
    }

    /// The `ref` name, if the element carries one.
    pub fn ref_name(&self) -> Option<&str> {
        self.attrs.get("ref").and_then(Value::as_str)
    }
}

/// Listeners compare by event name only; closures have no equality.
impl PartialEq for TagElement {
    fn eq(&self, other: &Self) -> bool {
        self.tag == other.tag
            && self.attrs == other.attrs
            && self.listeners.keys().eq(other.listeners.keys())
            && self.children == other.children
    }
}

impl fmt::Debug for TagElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TagElement")
            .field("tag", &self.tag)
            .field("attrs", &self.attrs)
            .field("listeners", &self.listeners.keys().collect::<Vec<_>>())
            .field("children", &self.children)
            .finish()
    }
}

impl Element {
    /// Serialize to HTML.
    ///
    /// `key` and `ref` are runtime attributes and are not written. `null`
    /// and `false` attributes are omitted, `true` is written as a bare
    /// attribute name. Listeners are not serialized. Void tags such as
    /// `input` have no closing tag.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        write_html(self, &mut out);
        out
    }

    /// Concatenated text of the tree.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }

    pub fn as_tag(&self) -> Option<&TagElement> {
        match self {
            Element::Tag(tag) => Some(tag),
            _ => None,
        }
    }

    /// The element at `path`: child indices of tags and fragments, starting
    /// at this element.
    pub fn at_path(&self, path: &[usize]) -> Option<&Element> {
        let Some((first, rest)) = path.split_first() else {
            return Some(self);
        };
        let children = match self {
            Element::Tag(tag) => &tag.children,
            Element::Fragment(children) => children,
            Element::Text(_) | Element::Empty => return None,
        };
        children.get(*first)?.at_path(rest)
    }

    /// First tag in document order matching `pred`.
    pub fn find(&self, pred: &dyn Fn(&TagElement) -> bool) -> Option<&TagElement> {
        match self {
            Element::Tag(tag) => {
                if pred(tag) {
                    return Some(tag);
                }
                tag.children.iter().find_map(|child| child.find(pred))
            }
            Element::Fragment(children) => children.iter().find_map(|child| child.find(pred)),
            Element::Text(_) | Element::Empty => None,
        }
    }
}

/// Tags written without children or a closing tag.
const VOID_TAGS: [&str; 13] = [
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

fn write_html(element: &Element, out: &mut String) {
    match element {
        Element::Tag(tag) => {
            out.push('<');
            out.push_str(&tag.tag);
            for (name, value) in &tag.attrs {
                if name == "key" || name == "ref" {
                    continue;
                }
                match value {
                    Value::Null | Value::Bool(false) => {}
                    Value::Bool(true) => {
                        out.push(' ');
                        out.push_str(name);
                    }
                    other => {
                        out.push(' ');
                        out.push_str(name);
                        out.push_str("=\"");
                        escape_into(&other.to_string(), out);
                        out.push('"');
                    }
                }
            }
            out.push('>');
            if VOID_TAGS.contains(&tag.tag.as_str()) {
                return;
            }
            for child in &tag.children {
                write_html(child, out);
            }
            out.push_str("</");
            out.push_str(&tag.tag);
            out.push('>');
        }
        Element::Text(text) => escape_into(text, out),
        Element::Fragment(children) => {
            for child in children {
                write_html(child, out);
            }
        }
        Element::Empty => {}
    }
}

fn escape_into(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
}

fn collect_text(element: &Element, out: &mut String) {
    match element {
        Element::Tag(tag) => tag.children.iter().for_each(|child| collect_text(child, out)),
        Element::Text(text) => out.push_str(text),
        Element::Fragment(children) => children.iter().for_each(|child| collect_text(child, out)),
        Element::Empty => {}
    }
}

/// Opaque handle to a painted element, handed out by a [`RenderService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeHandle(pub u64);

/// Where expanded trees are painted.
pub trait RenderService {
    /// Paint `tree` into an empty container.
    fn mount(&mut self, container: &str, tree: &Element) -> Result<()>;

    /// Replace `prev` (the last painted tree) with `next`.
    fn patch(&mut self, container: &str, next: &Element, prev: &Element) -> Result<()>;

    /// Handle of the painted element at `path`, used to fill component refs.
    fn resolve_handle(&self, _container: &str, _path: &[usize]) -> Option<NodeHandle> {
        None
    }
}

impl<R: RenderService + ?Sized> RenderService for Box<R> {
    fn mount(&mut self, container: &str, tree: &Element) -> Result<()> {
        (**self).mount(container, tree)
    }

    fn patch(&mut self, container: &str, next: &Element, prev: &Element) -> Result<()> {
        (**self).patch(container, next, prev)
    }

    fn resolve_handle(&self, container: &str, path: &[usize]) -> Option<NodeHandle> {
        (**self).resolve_handle(container, path)
    }
}

// ----------------------------------------------------------------------------
// Headless renderer
// ----------------------------------------------------------------------------

/// In-memory render service.
///
/// Clones share state, so a test can keep one clone and hand the other to
/// [`Runtime::create_app`](crate::Runtime::create_app).
///
/// ```rust,ignore
/// let renderer = HeadlessRenderer::new().with_container("#app");
/// let mut app = rt.create_app(&root, renderer.clone());
/// app.mount("#app")?;
/// assert_eq!(renderer.html("#app").as_deref(), Some("<p>hi</p>"));
/// ```
#[derive(Clone, Default)]
pub struct HeadlessRenderer {
    state: Rc<RefCell<HeadlessState>>,
}

#[derive(Default)]
struct HeadlessState {
    containers: IndexMap<String, Option<Element>>,
    mounts: usize,
    patches: usize,
    handles: HashMap<(String, Vec<usize>), NodeHandle>,
    next_handle: u64,
}

impl HeadlessRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an empty container.
    pub fn with_container(self, selector: impl Into<String>) -> Self {
        self.state
            .borrow_mut()
            .containers
            .insert(selector.into(), None);
        self
    }

    /// The tree currently painted into `container`.
    pub fn tree(&self, container: &str) -> Option<Element> {
        self.state.borrow().containers.get(container).cloned().flatten()
    }

    /// HTML of the tree currently painted into `container`.
    pub fn html(&self, container: &str) -> Option<String> {
        self.tree(container).map(|tree| tree.to_html())
    }

    /// Number of `mount` calls.
    pub fn mounts(&self) -> usize {
        self.state.borrow().mounts
    }

    /// Number of `patch` calls.
    pub fn patches(&self) -> usize {
        self.state.borrow().patches
    }
}

impl fmt::Debug for HeadlessRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("HeadlessRenderer")
            .field("containers", &state.containers.keys().collect::<Vec<_>>())
            .field("mounts", &state.mounts)
            .field("patches", &state.patches)
            .finish()
    }
}

impl RenderService for HeadlessRenderer {
    fn mount(&mut self, container: &str, tree: &Element) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let slot = state
            .containers
            .get_mut(container)
            .ok_or_else(|| Error::ContainerNotFound(container.to_string()))?;
        *slot = Some(tree.clone());
        state.mounts += 1;
        Ok(())
    }

    fn patch(&mut self, container: &str, next: &Element, _prev: &Element) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let slot = state
            .containers
            .get_mut(container)
            .ok_or_else(|| Error::ContainerNotFound(container.to_string()))?;
        *slot = Some(next.clone());
        state.patches += 1;
        Ok(())
    }

    /// Handles are keyed by position, so an element that stays in place
    /// keeps its handle across patches. Paths that do not lead to a tag
    /// resolve to nothing.
    fn resolve_handle(&self, container: &str, path: &[usize]) -> Option<NodeHandle> {
        let mut state = self.state.borrow_mut();
        let tree = state.containers.get(container)?.as_ref()?;
        tree.at_path(path)?.as_tag()?;

        let next = state.next_handle;
        let handle = *state
            .handles
            .entry((container.to_string(), path.to_vec()))
            .or_insert(NodeHandle(next));
        if handle.0 == next {
            state.next_handle += 1;
        }
        Some(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(name: &str, attrs: &[(&str, Value)], children: Vec<Element>) -> Element {
        Element::Tag(TagElement {
            tag: name.to_string(),
            attrs: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
            listeners: IndexMap::new(),
            children,
        })
    }

    #[test]
    fn html_serialization() {
        let tree = tag(
            "div",
            &[
                ("class", Value::from("box")),
                ("key", Value::from(1)),
                ("hidden", Value::from(false)),
                ("disabled", Value::from(true)),
            ],
            vec![
                Element::Text("a < b".into()),
                Element::Fragment(vec![tag("br", &[], vec![])]),
                Element::Empty,
            ],
        );
        assert_eq!(
            tree.to_html(),
            r#"<div class="box" disabled>a &lt; b<br></div>"#
        );
        assert_eq!(tree.text_content(), "a < b");
    }

    #[test]
    fn unknown_container_is_an_error() {
        let mut renderer = HeadlessRenderer::new();
        let err = renderer.mount("#missing", &Element::Empty).unwrap_err();
        assert!(matches!(err, Error::ContainerNotFound(name) if name == "#missing"));
    }

    #[test]
    fn handles_stay_stable_across_patches() {
        let mut renderer = HeadlessRenderer::new().with_container("#app");
        let input = |value: &str| {
            tag(
                "input",
                &[("ref", Value::from("field")), ("value", Value::from(value))],
                vec![],
            )
        };
        let first = tag("form", &[], vec![input("a"), input("a")]);
        renderer.mount("#app", &first).unwrap();
        let handle = renderer.resolve_handle("#app", &[0]).unwrap();
        let twin = renderer.resolve_handle("#app", &[1]).unwrap();
        assert_ne!(handle, twin);

        let second = tag("form", &[], vec![input("b"), input("b")]);
        renderer.patch("#app", &second, &first).unwrap();

        assert_eq!(renderer.resolve_handle("#app", &[0]), Some(handle));
        assert_eq!(renderer.resolve_handle("#app", &[1]), Some(twin));
        assert_eq!(renderer.mounts(), 1);
        assert_eq!(renderer.patches(), 1);
    }

    #[test]
    fn paths_address_tags_and_fragments() {
        let tree = tag(
            "div",
            &[],
            vec![
                Element::Text("t".into()),
                Element::Fragment(vec![tag("b", &[], vec![])]),
            ],
        );
        assert_eq!(tree.at_path(&[]), Some(&tree));
        assert_eq!(tree.at_path(&[1, 0]).and_then(Element::as_tag).map(|t| t.tag.as_str()), Some("b"));
        assert!(tree.at_path(&[0, 0]).is_none());
        assert!(tree.at_path(&[2]).is_none());

        let mut renderer = HeadlessRenderer::new().with_container("#app");
        renderer.mount("#app", &tree).unwrap();
        assert!(renderer.resolve_handle("#app", &[0]).is_none());
        assert!(renderer.resolve_handle("#app", &[1, 0]).is_some());
        assert!(renderer.resolve_handle("#nope", &[]).is_none());
    }
}
