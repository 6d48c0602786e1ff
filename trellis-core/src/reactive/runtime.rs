//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects refs, reactive
//! objects, computed values, effects and component instances. It owns:
//!
//! - the dependency graph (`target → key → effects`)
//! - the stack of running effects and the "should track" switch
//! - the job queue that batches component updates
//! - the microtask queue that flushes it
//! - the instance currently running its setup
//!
//! # How It Works
//!
//! 1. When a reactive read happens while an effect is running (and tracking
//!    is not paused), [`Runtime::track`] subscribes that effect to the
//!    `(target, key)` pair and remembers the dep on the effect.
//!
//! 2. When a write changes something, [`Runtime::trigger`] collects every
//!    subscriber of the affected keys and notifies each one once. The
//!    effect that is currently running is skipped, so an effect that writes
//!    what it reads does not loop.
//!
//! 3. Before an effect re-runs, all of its old subscriptions are removed
//!    and entries left empty are pruned, so only the reads of the latest
//!    run count.
//!
//! # Threading
//!
//! A runtime is single-threaded: handles are `Rc`-based and `!Send`. Create
//! one runtime per thread (or per test). Independent runtimes never see each
//! other's effects.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll};

use indexmap::IndexMap;

use super::context::{EffectStack, PauseGuard};
use super::scope::EffectScope;
use super::subscriber::{EffectCore, EffectId};
use crate::component::instance::Instance;
use crate::config::RuntimeConfig;
use crate::graph::deps::{Dep, DepGraph, DepOwner, Key};
use crate::graph::scheduler::{Job, JobId, JobQueue};
use crate::value::TargetId;

type Microtask = Box<dyn FnOnce()>;

/// Handle to a reactive runtime. Cloning is cheap and shares the runtime.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

pub(crate) struct RuntimeInner {
    config: RuntimeConfig,
    stack: EffectStack,
    graph: RefCell<DepGraph>,
    jobs: JobQueue,
    microtasks: RefCell<VecDeque<Microtask>>,
    scopes: RefCell<Vec<EffectScope>>,
    instances: RefCell<Vec<Instance>>,
}

/// A non-owning runtime handle, held by closures stored inside the runtime.
#[derive(Clone)]
pub(crate) struct WeakRuntime(Weak<RuntimeInner>);

impl WeakRuntime {
    pub fn upgrade(&self) -> Option<Runtime> {
        self.0.upgrade().map(|inner| Runtime { inner })
    }
}

impl Runtime {
    /// Create a runtime with the default configuration.
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a runtime with the given configuration.
    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            inner: Rc::new(RuntimeInner {
                config,
                stack: EffectStack::new(),
                graph: RefCell::new(DepGraph::new()),
                jobs: JobQueue::new(),
                microtasks: RefCell::new(VecDeque::new()),
                scopes: RefCell::new(Vec::new()),
                instances: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub(crate) fn downgrade(&self) -> WeakRuntime {
        WeakRuntime(Rc::downgrade(&self.inner))
    }

    /// Whether both handles refer to the same runtime.
    pub fn ptr_eq(&self, other: &Runtime) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    // ------------------------------------------------------------------
    // Tracking
    // ------------------------------------------------------------------

    /// Subscribe the running effect to `(target, key)`.
    ///
    /// No-op when no effect is running or tracking is paused.
    pub(crate) fn track(&self, target: TargetId, key: Key) {
        if !self.inner.stack.is_tracking() {
            return;
        }
        let dep = self.inner.graph.borrow_mut().dep_for(target, &key);
        tracing::trace!(target_id = target.raw(), %key, "track");
        self.track_dep(&dep);
    }

    /// Subscribe the running effect to a standalone dep.
    pub(crate) fn track_dep(&self, dep: &Dep) {
        if !self.inner.stack.is_tracking() {
            return;
        }
        let Some(active) = self.inner.stack.active() else {
            return;
        };
        if dep.add(&active) {
            active.push_dep(dep.clone());
        }
    }

    /// Notify the subscribers of `(target, key)`.
    pub(crate) fn trigger(&self, target: TargetId, key: Key) {
        self.trigger_many(target, &[key]);
    }

    /// Notify the subscribers of several keys of one target. An effect
    /// subscribed to more than one of them is notified once.
    pub(crate) fn trigger_many(&self, target: TargetId, keys: &[Key]) {
        let mut effects: IndexMap<EffectId, Rc<EffectCore>> = IndexMap::new();
        {
            let graph = self.inner.graph.borrow();
            for key in keys {
                if let Some(dep) = graph.get(target, key) {
                    for core in dep.subscribers() {
                        effects.entry(core.id()).or_insert(core);
                    }
                }
            }
        }
        if effects.is_empty() {
            return;
        }
        tracing::trace!(target_id = target.raw(), keys = ?keys, effects = effects.len(), "trigger");
        self.notify_all(effects.into_values());
    }

    /// Notify the subscribers of a standalone dep.
    pub(crate) fn trigger_dep(&self, dep: &Dep) {
        let effects = dep.subscribers();
        if effects.is_empty() {
            return;
        }
        self.notify_all(effects.into_iter());
    }

    fn notify_all(&self, effects: impl Iterator<Item = Rc<EffectCore>>) {
        let running = self.inner.stack.active_id();
        for core in effects {
            if Some(core.id()) == running || !core.is_active() {
                continue;
            }
            core.notify();
        }
    }

    /// Run `f` without subscribing the running effect to anything it reads.
    pub fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        let _paused = self.inner.stack.pause();
        f()
    }

    pub(crate) fn pause_tracking(&self) -> PauseGuard<'_> {
        self.inner.stack.pause()
    }

    /// Whether a reactive read right now would be tracked.
    pub fn is_tracking(&self) -> bool {
        self.inner.stack.is_tracking()
    }

    /// Number of targets that currently have at least one subscriber.
    pub fn tracked_targets(&self) -> usize {
        self.inner.graph.borrow().target_count()
    }

    /// Number of subscribed keys on a target.
    pub fn tracked_keys(&self, target: TargetId) -> usize {
        self.inner.graph.borrow().key_count(target)
    }

    // ------------------------------------------------------------------
    // Effect execution
    // ------------------------------------------------------------------

    /// Run an effect body with dependency collection.
    ///
    /// An inactive effect, or one that is already running further up the
    /// stack, runs its body untracked instead.
    pub(crate) fn run_effect<T>(&self, core: &Rc<EffectCore>, f: &dyn Fn() -> T) -> T {
        if !core.is_active() {
            return self.untracked(f);
        }
        if self.inner.stack.contains(core.id()) {
            tracing::debug!(effect = core.id().raw(), "effect re-entered itself; running untracked");
            return self.untracked(f);
        }

        self.cleanup(core);
        let _guard = self.inner.stack.enter(Rc::clone(core));
        core.record_run();
        f()
    }

    /// Remove an effect from every dep it is subscribed to.
    fn cleanup(&self, core: &EffectCore) {
        let deps = core.take_deps();
        if deps.is_empty() {
            return;
        }
        let mut graph = self.inner.graph.borrow_mut();
        for dep in deps {
            dep.remove(core.id());
            if let DepOwner::Target { target, key } = dep.owner() {
                graph.prune(*target, key);
            }
        }
    }

    /// Stop an effect: unsubscribe it and call its stop callback.
    pub(crate) fn stop_effect(&self, core: &EffectCore) {
        if !core.is_active() {
            return;
        }
        self.cleanup(core);
        if let Some(on_stop) = core.deactivate() {
            on_stop();
        }
    }

    // ------------------------------------------------------------------
    // Effect scopes
    // ------------------------------------------------------------------

    /// Create a scope that collects the effects created inside
    /// [`EffectScope::run`] so they can be stopped together.
    pub fn effect_scope(&self) -> EffectScope {
        EffectScope::new(self)
    }

    pub(crate) fn push_scope(&self, scope: EffectScope) {
        self.inner.scopes.borrow_mut().push(scope);
    }

    pub(crate) fn pop_scope(&self) {
        self.inner.scopes.borrow_mut().pop();
    }

    /// Hand a new effect to the innermost scope, if any.
    pub(crate) fn adopt_effect(&self, core: &Rc<EffectCore>) {
        let scope = self.inner.scopes.borrow().last().cloned();
        if let Some(scope) = scope {
            scope.adopt(core);
        }
    }

    // ------------------------------------------------------------------
    // Jobs and microtasks
    // ------------------------------------------------------------------

    /// Queue a job for the next flush. Duplicate jobs are ignored.
    pub fn queue_job(&self, job: Job) {
        let id = job.id();
        if !self.inner.jobs.push(job) {
            return;
        }
        tracing::trace!(job = ?id, "job queued");
        if self.inner.jobs.request_flush() {
            let rt = self.downgrade();
            self.enqueue_microtask(move || {
                if let Some(rt) = rt.upgrade() {
                    rt.flush_jobs();
                }
            });
        }
    }

    /// Remove a pending job. Returns whether it was pending.
    pub fn dequeue_job(&self, id: JobId) -> bool {
        self.inner.jobs.remove(id)
    }

    /// Whether a job is waiting for the next flush.
    pub fn is_job_pending(&self, id: JobId) -> bool {
        self.inner.jobs.contains(id)
    }

    /// Number of jobs waiting for the next flush.
    pub fn pending_jobs(&self) -> usize {
        self.inner.jobs.len()
    }

    /// Run every pending job in queue order.
    pub fn flush_jobs(&self) {
        let batch = self.inner.jobs.take_batch();
        if batch.is_empty() {
            return;
        }
        let _flushing = self.inner.jobs.begin_flush();
        tracing::debug!(jobs = batch.len(), "flushing job queue");
        for job in batch {
            job.run();
        }
    }

    /// Whether a flush is in progress.
    pub fn is_flushing(&self) -> bool {
        self.inner.jobs.is_flushing()
    }

    pub(crate) fn enqueue_microtask(&self, task: impl FnOnce() + 'static) {
        self.inner.microtasks.borrow_mut().push_back(Box::new(task));
    }

    /// Drain the microtask queue, including microtasks queued while
    /// draining. Returns the number of microtasks run.
    ///
    /// Stops after `max_microtask_turns` microtasks and leaves the rest
    /// queued.
    pub fn run_microtasks(&self) -> usize {
        let limit = self.inner.config.max_microtask_turns;
        let mut turns = 0;
        loop {
            let next = self.inner.microtasks.borrow_mut().pop_front();
            let Some(task) = next else {
                break;
            };
            task();
            turns += 1;
            if turns >= limit {
                let remaining = self.inner.microtasks.borrow().len();
                if remaining > 0 {
                    tracing::warn!(turns, remaining, "microtask limit reached; deferring the rest");
                }
                break;
            }
        }
        turns
    }

    /// Number of queued microtasks.
    pub fn pending_microtasks(&self) -> usize {
        self.inner.microtasks.borrow().len()
    }

    /// A future that resolves after all pending work has been flushed.
    ///
    /// ```rust,ignore
    /// state.set("count", 1);
    /// rt.next_tick().await;
    /// // the component has re-rendered
    /// ```
    pub fn next_tick(&self) -> NextTick {
        NextTick { rt: self.clone() }
    }

    /// Run `f` after the currently pending work has been flushed.
    pub fn next_tick_then(&self, f: impl FnOnce() + 'static) {
        self.enqueue_microtask(f);
    }

    // ------------------------------------------------------------------
    // Current instance
    // ------------------------------------------------------------------

    /// Make `instance` current until the guard drops.
    pub(crate) fn enter_instance(&self, instance: Instance) -> InstanceGuard<'_> {
        self.inner.instances.borrow_mut().push(instance);
        InstanceGuard { rt: self }
    }

    pub(crate) fn current(&self) -> Option<Instance> {
        self.inner.instances.borrow().last().cloned()
    }

    /// Log a misuse warning when dev warnings are enabled.
    pub(crate) fn dev_warn(&self, api: &str, message: &str) {
        if self.inner.config.dev_warnings {
            tracing::warn!(api, "{message}");
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("tracked_targets", &self.tracked_targets())
            .field("effect_depth", &self.inner.stack.depth())
            .field("pending_jobs", &self.pending_jobs())
            .field("pending_microtasks", &self.pending_microtasks())
            .finish()
    }
}

/// Pops the current instance when dropped.
pub(crate) struct InstanceGuard<'a> {
    rt: &'a Runtime,
}

impl Drop for InstanceGuard<'_> {
    fn drop(&mut self) {
        self.rt.inner.instances.borrow_mut().pop();
    }
}

/// Future returned by [`Runtime::next_tick`].
///
/// Polling it drains the runtime's microtasks, which flushes the job queue,
/// and then resolves.
#[must_use = "futures do nothing unless awaited"]
pub struct NextTick {
    rt: Runtime,
}

impl Future for NextTick {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        self.rt.run_microtasks();
        Poll::Ready(())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::subscriber::TriggerAction;
    use crate::value::Target;
    use std::cell::Cell;

    fn counting_core(hits: &Rc<Cell<usize>>) -> Rc<EffectCore> {
        let core = Rc::new(EffectCore::new(None));
        let hits = hits.clone();
        core.set_action(TriggerAction::Schedule(Rc::new(move || {
            hits.set(hits.get() + 1)
        })));
        core
    }

    #[test]
    fn track_requires_running_effect() {
        let rt = Runtime::new();
        let target = Target::map().id();

        rt.track(target, Key::from("a"));
        assert_eq!(rt.tracked_targets(), 0);

        let hits = Rc::new(Cell::new(0));
        let core = counting_core(&hits);
        rt.run_effect(&core, &|| rt.track(target, Key::from("a")));
        assert_eq!(rt.tracked_keys(target), 1);

        rt.trigger(target, Key::from("a"));
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn trigger_many_notifies_each_effect_once() {
        let rt = Runtime::new();
        let target = Target::list().id();
        let hits = Rc::new(Cell::new(0));
        let core = counting_core(&hits);

        rt.run_effect(&core, &|| {
            rt.track(target, Key::Length);
            rt.track(target, Key::Iterate);
        });
        rt.trigger_many(target, &[Key::Length, Key::Iterate]);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn rerun_replaces_old_dependencies() {
        let rt = Runtime::new();
        let target = Target::map().id();
        let hits = Rc::new(Cell::new(0));
        let core = counting_core(&hits);

        rt.run_effect(&core, &|| rt.track(target, Key::from("old")));
        rt.run_effect(&core, &|| rt.track(target, Key::from("new")));

        rt.trigger(target, Key::from("old"));
        assert_eq!(hits.get(), 0);
        rt.trigger(target, Key::from("new"));
        assert_eq!(hits.get(), 1);
        assert_eq!(rt.tracked_keys(target), 1);
    }

    #[test]
    fn untracked_reads_do_not_subscribe() {
        let rt = Runtime::new();
        let target = Target::map().id();
        let hits = Rc::new(Cell::new(0));
        let core = counting_core(&hits);

        rt.run_effect(&core, &|| rt.untracked(|| rt.track(target, Key::from("a"))));
        assert_eq!(rt.tracked_targets(), 0);
    }

    #[test]
    fn stopped_effect_is_unsubscribed() {
        let rt = Runtime::new();
        let target = Target::map().id();
        let hits = Rc::new(Cell::new(0));
        let core = counting_core(&hits);

        rt.run_effect(&core, &|| rt.track(target, Key::from("a")));
        rt.stop_effect(&core);
        rt.trigger(target, Key::from("a"));

        assert_eq!(hits.get(), 0);
        assert_eq!(rt.tracked_targets(), 0);
    }

    #[test]
    fn jobs_flush_once_per_microtask() {
        let rt = Runtime::new();
        let runs = Rc::new(Cell::new(0));
        let r = runs.clone();
        let job = Job::new(move || r.set(r.get() + 1));

        rt.queue_job(job.clone());
        rt.queue_job(job.clone());
        assert_eq!(rt.pending_jobs(), 1);
        assert_eq!(rt.pending_microtasks(), 1);

        rt.run_microtasks();
        assert_eq!(runs.get(), 1);
        assert_eq!(rt.pending_jobs(), 0);
    }

    #[test]
    fn microtask_limit_defers_the_rest() {
        let rt = Runtime::with_config(RuntimeConfig::default().max_microtask_turns(2));
        for _ in 0..5 {
            rt.next_tick_then(|| {});
        }
        assert_eq!(rt.run_microtasks(), 2);
        assert_eq!(rt.pending_microtasks(), 3);
    }

    #[tokio::test]
    async fn next_tick_drains_queue() {
        let rt = Runtime::new();
        let done = Rc::new(Cell::new(false));
        let d = done.clone();
        rt.next_tick_then(move || d.set(true));

        rt.next_tick().await;
        assert!(done.get());
    }
}
