//! Apps and Mount Points
//!
//! An [`App`] binds a root component to a [`RenderService`]. Mounting it
//! creates the root instance; from then on the root and every child update
//! on their own as their state changes.
//!
//! # Render Passes
//!
//! Every run of an update effect is a render pass. Passes nest: a parent's
//! pass creates and updates children, which run their own passes inside it.
//! The [`MountPoint`] counts the depth, and only when the outermost pass
//! ends successfully does it paint:
//!
//! 1. The root's complete tree is materialized and handed to the render
//!    service (`mount` the first time, `patch` afterwards).
//! 2. Every instance in the tree gets its refs rebound from the positions
//!    recorded while the tree was built, and every instance that rendered in
//!    the pass is marked mounted.
//! 3. `mounted` and `updated` hooks are queued in the order the instances
//!    finished rendering (children before their parent) and run once the
//!    update effect has returned, so state written from a hook schedules a
//!    normal update instead of being swallowed.
//!
//! A failed paint keeps the previously painted tree. On the first paint the
//! error is reported from [`App::mount`]; afterwards it is logged.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use super::context::ComponentContext;
use super::definition::Component;
use super::expand::Materializer;
use super::instance::{HookKind, Instance, LifecycleState, WeakInstance};
use super::node::Props;
use crate::error::{Error, Result};
use crate::reactive::Runtime;
use crate::render::{Element, RenderService};

type SharedRenderer = Rc<RefCell<Box<dyn RenderService>>>;

/// Paint state of one mounted app, shared by all of its instances.
pub(crate) struct MountPoint {
    container: String,
    renderer: SharedRenderer,
    root: RefCell<WeakInstance>,
    painted: RefCell<Option<Element>>,
    depth: Cell<usize>,
    deferred: RefCell<Vec<(WeakInstance, HookKind)>>,
    post: RefCell<Vec<(WeakInstance, HookKind)>>,
}

impl MountPoint {
    fn new(container: &str, renderer: SharedRenderer) -> Self {
        Self {
            container: container.to_string(),
            renderer,
            root: RefCell::new(WeakInstance::default()),
            painted: RefCell::new(None),
            depth: Cell::new(0),
            deferred: RefCell::new(Vec::new()),
            post: RefCell::new(Vec::new()),
        }
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn set_root(&self, root: &Instance) {
        *self.root.borrow_mut() = root.downgrade();
    }

    pub fn painted(&self) -> Option<Element> {
        self.painted.borrow().clone()
    }

    pub fn enter_pass(&self) {
        self.depth.set(self.depth.get() + 1);
    }

    /// Leave a pass. Returns `true` when it was the outermost one.
    pub fn leave_pass(&self) -> bool {
        let depth = self.depth.get().saturating_sub(1);
        self.depth.set(depth);
        depth == 0
    }

    /// Remember an instance that rendered in the current pass.
    pub fn defer(&self, instance: &Instance, kind: HookKind) {
        self.deferred.borrow_mut().push((instance.downgrade(), kind));
    }

    /// Forget the current pass without painting.
    pub fn discard(&self) {
        let deferred = std::mem::take(&mut *self.deferred.borrow_mut());
        for (instance, _) in deferred {
            if let Some(instance) = instance.upgrade() {
                if instance.lifecycle() == LifecycleState::Updating {
                    instance.set_state(LifecycleState::Mounted);
                }
            }
        }
    }

    /// Paint the root's tree and queue the hooks of the finished pass.
    pub fn paint(&self) {
        let Some(root) = self.root.borrow().upgrade() else {
            self.discard();
            return;
        };
        let rt = root.context().runtime().clone();
        rt.untracked(|| self.paint_tree(&root));
    }

    fn paint_tree(&self, root: &Instance) {
        let mut walk = Materializer::new();
        let next = walk.instance(root);
        let prev = self.painted.borrow_mut().take();
        let result = {
            let mut renderer = self.renderer.borrow_mut();
            match &prev {
                None => renderer.mount(&self.container, &next),
                Some(prev) => renderer.patch(&self.container, &next, prev),
            }
        };

        let deferred: Vec<(Instance, HookKind)> = std::mem::take(&mut *self.deferred.borrow_mut())
            .into_iter()
            .filter_map(|(instance, kind)| instance.upgrade().map(|instance| (instance, kind)))
            .filter(|(instance, _)| instance.lifecycle() != LifecycleState::Unmounted)
            .collect();

        match result {
            Ok(()) => {
                *self.painted.borrow_mut() = Some(next);
                {
                    let renderer = self.renderer.borrow();
                    for (instance, paths) in walk.into_refs() {
                        instance.bind_refs(&**renderer, &self.container, &paths);
                    }
                }
                let mut post = self.post.borrow_mut();
                for (instance, kind) in deferred {
                    instance.set_state(LifecycleState::Mounted);
                    post.push((instance.downgrade(), kind));
                }
                tracing::debug!(container = %self.container, "painted");
            }
            Err(err) => {
                let first = prev.is_none();
                *self.painted.borrow_mut() = prev;
                // Nothing was ever shown on a failed first paint, so those
                // instances never count as mounted.
                for (instance, kind) in &deferred {
                    if !first || *kind == HookKind::Updated {
                        instance.set_state(LifecycleState::Mounted);
                    }
                }
                if first {
                    root.set_pending_error(err);
                } else {
                    tracing::error!(
                        container = %self.container,
                        error = %err,
                        "patch failed; keeping the previous output"
                    );
                }
            }
        }
    }

    /// Run queued `mounted`/`updated` hooks. Does nothing while a pass is
    /// still in progress.
    pub fn flush_post(&self) {
        if self.depth.get() > 0 {
            return;
        }
        loop {
            let batch = std::mem::take(&mut *self.post.borrow_mut());
            if batch.is_empty() {
                break;
            }
            for (instance, kind) in batch {
                let Some(instance) = instance.upgrade() else {
                    continue;
                };
                if instance.lifecycle() != LifecycleState::Unmounted {
                    instance.run_hooks(kind);
                }
            }
        }
    }

    /// Replace the painted tree with nothing.
    fn clear(&self) {
        let prev = self.painted.borrow_mut().take();
        let Some(prev) = prev else {
            return;
        };
        let result = self
            .renderer
            .borrow_mut()
            .patch(&self.container, &Element::Empty, &prev);
        if let Err(err) = result {
            tracing::warn!(container = %self.container, error = %err, "could not clear container");
        }
    }
}

/// A root component bound to a render service.
///
/// # Example
///
/// ```rust,ignore
/// let rt = Runtime::new();
/// let renderer = HeadlessRenderer::new().with_container("#app");
/// let mut app = rt.create_app(&root, renderer.clone());
/// let ctx = app.mount("#app")?;
/// ```
pub struct App {
    rt: Runtime,
    component: Component,
    props: Props,
    renderer: SharedRenderer,
    mount: Option<Rc<MountPoint>>,
    root: Option<Instance>,
}

impl Runtime {
    /// Create an app that renders `component` through `renderer`.
    pub fn create_app(&self, component: &Component, renderer: impl RenderService + 'static) -> App {
        App {
            rt: self.clone(),
            component: component.clone(),
            props: Props::new(),
            renderer: Rc::new(RefCell::new(Box::new(renderer))),
            mount: None,
            root: None,
        }
    }
}

impl App {
    /// Props passed to the root component.
    pub fn with_props(mut self, props: Props) -> Self {
        self.props = props;
        self
    }

    /// Set up and render the root component, then paint it into
    /// `selector`.
    ///
    /// Returns the root's context. A failing setup, a failing first render
    /// of the root, or a failing first paint is returned as an error and
    /// leaves nothing mounted.
    pub fn mount(&mut self, selector: &str) -> Result<ComponentContext> {
        if let Some(mount) = &self.mount {
            return Err(Error::AlreadyMounted(mount.container().to_string()));
        }
        tracing::debug!(component = self.component.name(), container = selector, "mounting app");

        let mount = Rc::new(MountPoint::new(selector, Rc::clone(&self.renderer)));
        let root = Instance::spawn_root(&self.rt, &self.component, Rc::clone(&mount), self.props.clone())?;
        let ctx = root.context();
        self.mount = Some(mount);
        self.root = Some(root);
        Ok(ctx)
    }

    /// Unmount the whole tree and clear the container.
    pub fn unmount(&mut self) {
        let Some(root) = self.root.take() else {
            return;
        };
        root.unmount();
        if let Some(mount) = self.mount.take() {
            mount.clear();
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.root.is_some()
    }

    /// Context of the root instance, while mounted.
    pub fn root(&self) -> Option<ComponentContext> {
        self.root.as_ref().map(Instance::context)
    }

    /// The tree painted last.
    pub fn tree(&self) -> Option<Element> {
        self.mount.as_ref().and_then(|mount| mount.painted())
    }

    /// HTML of the tree painted last.
    pub fn html(&self) -> Option<String> {
        self.tree().map(|tree| tree.to_html())
    }

    pub fn runtime(&self) -> &Runtime {
        &self.rt
    }

    pub fn component(&self) -> &Component {
        &self.component
    }
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("component", &self.component.name())
            .field("container", &self.mount.as_ref().map(|m| m.container().to_string()))
            .field("root", &self.root)
            .finish()
    }
}
