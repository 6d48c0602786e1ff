//! Component Instances
//!
//! An instance is one live use of a [`Component`] in the tree. It owns the
//! component's reactive props, its setup state, its child instances and the
//! update effect that re-renders it.
//!
//! # How an Instance Lives
//!
//! 1. **Created**: props are a reactive object (defaults overlaid with what
//!    the parent passed), the provide scope is chained to the parent's, and
//!    slots come from the owning node.
//!
//! 2. **Setting up**: the instance becomes current and tracking is paused.
//!    The setup function runs, then options are applied in this order:
//!    `before_create`, `methods`, `data`, `computed`, `watch`, `inject`,
//!    `provide`, lifecycle hooks, `created`. Everything runs inside the
//!    instance's effect scope, so watchers and computed values created here
//!    are stopped on unmount.
//!
//! 3. **Mounted**: the update effect is created with a scheduler that
//!    queues the instance's job. Its first run calls `before_mount` hooks,
//!    renders and expands. Once the outermost render pass finishes the whole
//!    tree is painted, refs are bound and `mounted` hooks run, children
//!    before parents.
//!
//! 4. **Updating**: later runs render and expand again, patch, rebind refs
//!    and run `updated` hooks. A parent re-render hands new props and slots
//!    to an existing child with [`Instance::receive`]; if they changed the
//!    child updates right away in the same pass.
//!
//! 5. **Unmounted**: children first, then `unmounted` hooks, then the update
//!    effect, the job and the effect scope are stopped.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

use super::app::MountPoint;
use super::context::{ComponentContext, SetupContext};
use super::definition::{Binding, Component, Hook, Method, ProvideOption, RenderFn, SetupResult, WatchHandler};
use super::expand::{ChildKey, ExpandCx, Layout, RefPaths};
use super::node::{Listener, Node, Props, SlotFn, Slots};
use crate::error::{ComponentError, Error, Result};
use crate::graph::Job;
use crate::reactive::{EffectOptions, EffectScope, Reactive, ReactiveEffect, Runtime};
use crate::render::{NodeHandle, RenderService};
use crate::value::{Data, Target, Value};

/// Where an instance is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Created,
    SettingUp,
    Mounted,
    Updating,
    Unmounted,
}

/// Unique identifier for an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId(u64);

impl InstanceId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HookKind {
    BeforeMount,
    Mounted,
    Updated,
    Unmounted,
}

#[derive(Default)]
struct Hooks {
    before_mount: Vec<Hook>,
    mounted: Vec<Hook>,
    updated: Vec<Hook>,
    unmounted: Vec<Hook>,
}

impl Hooks {
    fn list(&self, kind: HookKind) -> &Vec<Hook> {
        match kind {
            HookKind::BeforeMount => &self.before_mount,
            HookKind::Mounted => &self.mounted,
            HookKind::Updated => &self.updated,
            HookKind::Unmounted => &self.unmounted,
        }
    }

    fn push(&mut self, kind: HookKind, hook: Hook) {
        match kind {
            HookKind::BeforeMount => self.before_mount.push(hook),
            HookKind::Mounted => self.mounted.push(hook),
            HookKind::Updated => self.updated.push(hook),
            HookKind::Unmounted => self.unmounted.push(hook),
        }
    }
}

/// Provided values of one instance, chained to its ancestors.
pub(crate) struct ProvideScope {
    values: RefCell<HashMap<String, Binding>>,
    parent: Option<Rc<ProvideScope>>,
}

impl ProvideScope {
    fn child_of(parent: Option<Rc<ProvideScope>>) -> Rc<Self> {
        Rc::new(Self {
            values: RefCell::new(HashMap::new()),
            parent,
        })
    }

    fn insert(&self, key: String, binding: Binding) {
        self.values.borrow_mut().insert(key, binding);
    }

    /// Own values first, then the nearest ancestor providing `key`.
    fn lookup(&self, key: &str) -> Option<Binding> {
        if let Some(binding) = self.values.borrow().get(key) {
            return Some(binding.clone());
        }
        self.parent.as_ref().and_then(|parent| parent.lookup(key))
    }
}

/// A live component instance. Cloning shares the instance.
#[derive(Clone)]
pub(crate) struct Instance {
    inner: Rc<InstanceInner>,
}

/// Non-owning instance handle.
#[derive(Clone, Default)]
pub(crate) struct WeakInstance(Weak<InstanceInner>);

impl WeakInstance {
    pub fn upgrade(&self) -> Option<Instance> {
        self.0.upgrade().map(|inner| Instance { inner })
    }
}

pub(crate) struct InstanceInner {
    id: InstanceId,
    rt: Runtime,
    component: Component,
    parent: WeakInstance,
    mount: Rc<MountPoint>,
    state: Cell<LifecycleState>,
    props: Reactive,
    listeners: RefCell<IndexMap<String, Listener>>,
    slots: RefCell<Slots>,
    data: RefCell<Option<Reactive>>,
    bindings: RefCell<IndexMap<String, Binding>>,
    methods: RefCell<IndexMap<String, Method>>,
    provides: Rc<ProvideScope>,
    render: RefCell<Option<RenderFn>>,
    hooks: RefCell<Hooks>,
    scope: EffectScope,
    update: RefCell<Option<ReactiveEffect<()>>>,
    job: RefCell<Option<Job>>,
    /// Set when the update effect is scheduled, cleared by each update.
    needs_update: Cell<bool>,
    layout: RefCell<Layout>,
    children: RefCell<IndexMap<ChildKey, Instance>>,
    refs: RefCell<IndexMap<String, NodeHandle>>,
    pending_error: RefCell<Option<Error>>,
}

impl Instance {
    fn create(
        rt: &Runtime,
        component: &Component,
        parent: Option<&Instance>,
        mount: Rc<MountPoint>,
        props: Props,
        slots: Slots,
    ) -> Self {
        let mut initial = component.def().prop_defaults.clone();
        for (name, value) in props.attrs() {
            initial.insert(name.clone(), value.clone());
        }

        Self {
            inner: Rc::new(InstanceInner {
                id: InstanceId::next(),
                rt: rt.clone(),
                component: component.clone(),
                parent: parent.map(Instance::downgrade).unwrap_or_default(),
                mount,
                state: Cell::new(LifecycleState::Created),
                props: rt.reactive_target(Target::from_map(initial)),
                listeners: RefCell::new(props.listeners().clone()),
                slots: RefCell::new(slots),
                data: RefCell::new(None),
                bindings: RefCell::new(IndexMap::new()),
                methods: RefCell::new(IndexMap::new()),
                provides: ProvideScope::child_of(parent.map(|p| Rc::clone(&p.inner.provides))),
                render: RefCell::new(None),
                hooks: RefCell::new(Hooks::default()),
                scope: rt.effect_scope(),
                update: RefCell::new(None),
                job: RefCell::new(None),
                needs_update: Cell::new(false),
                layout: RefCell::new(Layout::Empty),
                children: RefCell::new(IndexMap::new()),
                refs: RefCell::new(IndexMap::new()),
                pending_error: RefCell::new(None),
            }),
        }
    }

    /// Create, set up and mount the root instance of an app.
    pub(crate) fn spawn_root(
        rt: &Runtime,
        component: &Component,
        mount: Rc<MountPoint>,
        props: Props,
    ) -> Result<Self> {
        let instance = Self::create(rt, component, None, Rc::clone(&mount), props, Slots::new());
        mount.set_root(&instance);
        instance.boot()?;
        Ok(instance)
    }

    /// Create, set up and render a child instance during the parent's pass.
    pub(crate) fn spawn(
        parent: &Instance,
        component: &Component,
        props: Props,
        slots: Slots,
    ) -> Result<Self> {
        let instance = Self::create(
            &parent.inner.rt,
            component,
            Some(parent),
            Rc::clone(&parent.inner.mount),
            props,
            slots,
        );
        instance.boot()?;
        Ok(instance)
    }

    fn boot(&self) -> Result<()> {
        let result = self.setup().and_then(|()| self.start());
        if let Err(err) = &result {
            tracing::debug!(component = self.name(), error = %err, "instance failed to mount");
            self.unmount();
        }
        result
    }

    // ------------------------------------------------------------------
    // Setup
    // ------------------------------------------------------------------

    fn setup(&self) -> Result<()> {
        self.set_state(LifecycleState::SettingUp);
        let rt = self.inner.rt.clone();
        let def = self.inner.component.def();
        let ctx = self.context();

        {
            let _current = rt.enter_instance(self.clone());
            let _paused = rt.pause_tracking();
            self.inner.scope.run(|| -> Result<()> {
                if let Some(setup) = &def.setup {
                    let cx = SetupContext::new(ctx.clone());
                    let result = setup(&rt, &self.inner.props, &cx)
                        .map_err(|err| Error::setup(&def.name, err))?;
                    match result {
                        SetupResult::Render(render) => {
                            *self.inner.render.borrow_mut() = Some(render);
                        }
                        SetupResult::State(state) => self.inner.bindings.borrow_mut().extend(state),
                        SetupResult::Empty => {}
                    }
                }
                self.apply_options(&ctx)
                    .map_err(|err| Error::setup(&def.name, err))
            })?;
        }

        if self.inner.render.borrow().is_none() {
            *self.inner.render.borrow_mut() = def.render.clone();
        }
        tracing::debug!(component = %def.name, instance = self.inner.id.raw(), "setup complete");
        Ok(())
    }

    fn apply_options(&self, ctx: &ComponentContext) -> std::result::Result<(), ComponentError> {
        let rt = &self.inner.rt;
        let options = &self.inner.component.def().options;

        if let Some(hook) = &options.before_create {
            hook(ctx)?;
        }

        self.inner.methods.borrow_mut().extend(
            options
                .methods
                .iter()
                .map(|(name, method)| (name.clone(), Rc::clone(method))),
        );

        if let Some(data) = &options.data {
            match rt.reactive(data(ctx)?) {
                Some(state) => *self.inner.data.borrow_mut() = Some(state),
                None => rt.dev_warn("data", "data() must return an object; ignoring it"),
            }
        }

        for (name, getter) in &options.computed {
            let getter = Rc::clone(getter);
            let cx = ctx.clone();
            let computed = rt.computed(move || getter(&cx));
            self.inner
                .bindings
                .borrow_mut()
                .insert(name.clone(), Binding::Computed(computed));
        }

        for (path, entry) in &options.watch {
            let source = {
                let cx = ctx.clone();
                let path = path.clone();
                move || cx.path(&path)
            };
            let cx = ctx.clone();
            let handler = entry.handler.clone();
            rt.watch(
                source,
                move |new: &Value, old: Option<&Value>| match &handler {
                    WatchHandler::Callback(f) => f(&cx, new, old),
                    WatchHandler::Method(name) => {
                        cx.call(name, &[new.clone(), old.cloned().unwrap_or_default()]);
                    }
                },
                entry.options,
            );
        }

        for entry in &options.inject {
            let found = self
                .inject_binding(&entry.from)
                .or_else(|| entry.default.clone().map(Binding::Value));
            match found {
                Some(binding) => {
                    self.inner
                        .bindings
                        .borrow_mut()
                        .insert(entry.name.clone(), binding);
                }
                None => {
                    tracing::debug!(component = self.name(), key = %entry.from, "nothing provided")
                }
            }
        }

        for provide in &options.provide {
            let entries = match provide {
                ProvideOption::Static(entries) => entries.clone(),
                ProvideOption::Factory(factory) => factory(ctx),
            };
            for (key, binding) in entries {
                self.inner.provides.insert(key, binding);
            }
        }

        {
            let mut hooks = self.inner.hooks.borrow_mut();
            let declared = [
                (HookKind::BeforeMount, &options.before_mount),
                (HookKind::Mounted, &options.mounted),
                (HookKind::Updated, &options.updated),
                (HookKind::Unmounted, &options.unmounted),
            ];
            for (kind, hook) in declared {
                if let Some(hook) = hook {
                    hooks.push(kind, Rc::clone(hook));
                }
            }
        }

        if let Some(hook) = &options.created {
            hook(ctx)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------

    /// Create the update effect and run it once.
    fn start(&self) -> Result<()> {
        let weak = self.downgrade();
        let job = Job::new(move || {
            if let Some(instance) = weak.upgrade() {
                if instance.inner.needs_update.get() {
                    instance.update_now();
                }
            }
        });

        let weak = self.downgrade();
        let body: Rc<dyn Fn()> = Rc::new(move || {
            if let Some(instance) = weak.upgrade() {
                instance.run_update();
            }
        });
        let rt = self.inner.rt.downgrade();
        let weak = self.downgrade();
        let queued = job.clone();
        let effect = ReactiveEffect::new(
            &self.inner.rt,
            body,
            EffectOptions::new().lazy().scheduler(move || {
                if let (Some(rt), Some(instance)) = (rt.upgrade(), weak.upgrade()) {
                    instance.inner.needs_update.set(true);
                    rt.queue_job(queued.clone());
                }
            }),
        );

        *self.inner.job.borrow_mut() = Some(job);
        *self.inner.update.borrow_mut() = Some(effect);
        self.update_now();

        let pending = self.inner.pending_error.borrow_mut().take();
        match pending {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Run the update effect, then any post-paint hooks it produced.
    fn update_now(&self) {
        let effect = self.inner.update.borrow().clone();
        if let Some(effect) = effect {
            effect.run();
        }
        self.inner.mount.flush_post();
    }

    /// Body of the update effect.
    fn run_update(&self) {
        self.inner.needs_update.set(false);
        let state = self.lifecycle();
        if state == LifecycleState::Unmounted {
            return;
        }
        let first = matches!(state, LifecycleState::Created | LifecycleState::SettingUp);
        let mount = Rc::clone(&self.inner.mount);

        mount.enter_pass();
        if first {
            self.run_hooks(HookKind::BeforeMount);
        } else {
            self.set_state(LifecycleState::Updating);
        }

        let ok = match self.render_layout() {
            Ok(()) => {
                let kind = if first { HookKind::Mounted } else { HookKind::Updated };
                mount.defer(self, kind);
                true
            }
            Err(err) if first => {
                *self.inner.pending_error.borrow_mut() = Some(err);
                false
            }
            Err(err) => {
                tracing::error!(
                    component = self.name(),
                    error = %err,
                    "update failed; keeping the previous output"
                );
                self.set_state(LifecycleState::Mounted);
                false
            }
        };

        if mount.leave_pass() {
            if ok {
                mount.paint();
            } else {
                mount.discard();
            }
        }
    }

    /// Render, expand the result against the current children, and drop
    /// the children that are no longer rendered.
    fn render_layout(&self) -> Result<()> {
        let render = self.inner.render.borrow().clone();
        let node = match render {
            Some(render) => {
                render(&self.context()).map_err(|err| Error::render(self.name(), err))?
            }
            None => Node::Empty,
        };

        let previous = std::mem::take(&mut *self.inner.children.borrow_mut());
        let mut cx = ExpandCx::new(self, previous);
        let layout = cx.expand(node);
        let (next, stale) = cx.finish();

        *self.inner.children.borrow_mut() = next;
        *self.inner.layout.borrow_mut() = layout;
        for child in stale.into_values() {
            child.unmount();
        }
        Ok(())
    }

    /// Take new props and slots from a re-rendering parent.
    ///
    /// Changed props are written into the props object, which queues this
    /// instance's job. The job is pulled back out and run right away, so the
    /// child is current by the time the parent's pass paints. A job already
    /// taken into the running batch finds nothing left to do and is skipped.
    pub(crate) fn receive(&self, props: Props, slots: Slots) {
        self.inner.rt.untracked(|| self.write_props(&props));
        *self.inner.listeners.borrow_mut() = props.listeners().clone();

        let had_slots = !self.inner.slots.borrow().is_empty();
        let has_slots = !slots.is_empty();
        *self.inner.slots.borrow_mut() = slots;

        let job = self.inner.job.borrow().clone();
        let dequeued = job.is_some_and(|job| self.inner.rt.dequeue_job(job.id()));
        let pending = dequeued || self.inner.needs_update.get();
        if pending || had_slots || has_slots {
            self.update_now();
        }
    }

    fn write_props(&self, props: &Props) {
        let target = &self.inner.props;
        for (name, value) in props.attrs() {
            target.set(name, value.clone());
        }

        let stale: Vec<String> = match &*target.raw().data() {
            Data::Map(map) => map
                .keys()
                .filter(|name| !props.attrs().contains_key(*name))
                .cloned()
                .collect(),
            Data::List(_) => Vec::new(),
        };
        let defaults = &self.inner.component.def().prop_defaults;
        for name in stale {
            match defaults.get(&name) {
                Some(default) => target.set(&name, default.clone()),
                None => {
                    target.remove(&name);
                }
            }
        }
    }

    /// Unmount children, run `unmounted` hooks and stop everything the
    /// instance started. Idempotent.
    pub(crate) fn unmount(&self) {
        if self.lifecycle() == LifecycleState::Unmounted {
            return;
        }

        let children = std::mem::take(&mut *self.inner.children.borrow_mut());
        for child in children.into_values() {
            child.unmount();
        }

        if matches!(
            self.lifecycle(),
            LifecycleState::Mounted | LifecycleState::Updating
        ) {
            self.run_hooks(HookKind::Unmounted);
        }

        let effect = self.inner.update.borrow_mut().take();
        if let Some(effect) = effect {
            effect.stop();
        }
        let job = self.inner.job.borrow_mut().take();
        if let Some(job) = job {
            job.deactivate();
        }
        self.inner.scope.stop();
        self.inner.refs.borrow_mut().clear();
        *self.inner.layout.borrow_mut() = Layout::Empty;
        self.set_state(LifecycleState::Unmounted);
        tracing::debug!(component = self.name(), instance = self.inner.id.raw(), "unmounted");
    }

    /// Run `f` over this instance's layout and its children.
    pub(crate) fn with_layout<R>(
        &self,
        f: impl FnOnce(&Layout, &IndexMap<ChildKey, Instance>) -> R,
    ) -> R {
        f(&self.inner.layout.borrow(), &self.inner.children.borrow())
    }

    /// Resolve the handles of the elements this instance named with `ref`.
    pub(crate) fn bind_refs(&self, renderer: &dyn RenderService, container: &str, paths: &RefPaths) {
        let refs = paths
            .iter()
            .filter_map(|(name, path)| {
                renderer
                    .resolve_handle(container, path)
                    .map(|handle| (name.clone(), handle))
            })
            .collect();
        *self.inner.refs.borrow_mut() = refs;
    }

    pub(crate) fn run_hooks(&self, kind: HookKind) {
        let hooks = self.inner.hooks.borrow().list(kind).clone();
        if hooks.is_empty() {
            return;
        }
        let ctx = self.context();
        self.inner.rt.untracked(|| {
            for hook in &hooks {
                hook(&ctx);
            }
        });
    }

    pub(crate) fn add_hook(&self, kind: HookKind, hook: Hook) {
        self.inner.hooks.borrow_mut().push(kind, hook);
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub(crate) fn downgrade(&self) -> WeakInstance {
        WeakInstance(Rc::downgrade(&self.inner))
    }

    pub(crate) fn context(&self) -> ComponentContext {
        ComponentContext::new(self.downgrade(), self.inner.rt.clone())
    }

    pub(crate) fn id(&self) -> InstanceId {
        self.inner.id
    }

    pub(crate) fn name(&self) -> &str {
        self.inner.component.name()
    }

    pub(crate) fn component(&self) -> &Component {
        &self.inner.component
    }

    pub(crate) fn lifecycle(&self) -> LifecycleState {
        self.inner.state.get()
    }

    pub(crate) fn set_state(&self, state: LifecycleState) {
        self.inner.state.set(state);
    }

    pub(crate) fn parent(&self) -> Option<Instance> {
        self.inner.parent.upgrade()
    }

    pub(crate) fn props(&self) -> Reactive {
        self.inner.props.clone()
    }

    pub(crate) fn data(&self) -> Option<Reactive> {
        self.inner.data.borrow().clone()
    }

    pub(crate) fn binding(&self, name: &str) -> Option<Binding> {
        self.inner.bindings.borrow().get(name).cloned()
    }

    pub(crate) fn method(&self, name: &str) -> Option<Method> {
        self.inner.methods.borrow().get(name).cloned()
    }

    pub(crate) fn listener(&self, event: &str) -> Option<Listener> {
        self.inner
            .listeners
            .borrow()
            .get(&super::node::handler_name(event))
            .cloned()
    }

    pub(crate) fn slot(&self, name: &str) -> Option<SlotFn> {
        self.inner.slots.borrow().get(name).cloned()
    }

    pub(crate) fn slot_names(&self) -> Vec<String> {
        self.inner.slots.borrow().names().map(str::to_string).collect()
    }

    pub(crate) fn refs(&self) -> IndexMap<String, NodeHandle> {
        self.inner.refs.borrow().clone()
    }

    pub(crate) fn child_count(&self) -> usize {
        self.inner.children.borrow().len()
    }

    pub(crate) fn provide(&self, key: String, binding: Binding) {
        self.inner.provides.insert(key, binding);
    }

    pub(crate) fn inject_binding(&self, key: &str) -> Option<Binding> {
        self.inner.provides.lookup(key)
    }

    pub(crate) fn ptr_eq(&self, other: &Instance) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn set_pending_error(&self, err: Error) {
        *self.inner.pending_error.borrow_mut() = Some(err);
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.inner.id)
            .field("component", &self.name())
            .field("state", &self.lifecycle())
            .field("children", &self.child_count())
            .finish()
    }
}
