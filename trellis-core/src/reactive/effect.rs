//! Effect Implementation
//!
//! An effect is a computation that re-runs whenever something it read
//! changes. Computed values, watchers and component updates are all built
//! on [`ReactiveEffect`].
//!
//! # How Effects Work
//!
//! 1. Unless created lazily, the effect runs its function immediately to
//!    establish its initial dependencies.
//!
//! 2. Before each run, the effect clears its old dependencies. Whatever the
//!    function reads during the run becomes the new set.
//!
//! 3. When a dependency changes, the effect either re-runs synchronously or,
//!    if it has a scheduler, calls the scheduler instead and leaves the
//!    decision to it. Component updates use a scheduler that queues a job.
//!
//! 4. A stopped effect is removed from every dependency and never triggered
//!    again. Calling [`ReactiveEffect::run`] on it still executes the
//!    function, untracked.
//!
//! # Cycles
//!
//! An effect that is triggered by its own write is skipped, and an effect
//! already on the stack runs its function untracked instead of recursing
//! into dependency collection.

use std::fmt;
use std::rc::Rc;

use super::runtime::Runtime;
use super::subscriber::{EffectCore, EffectId, TriggerAction};

/// Options for [`Runtime::effect_with`].
#[derive(Default)]
pub struct EffectOptions {
    /// Do not run on creation.
    pub lazy: bool,
    /// Called instead of re-running when a dependency changes.
    pub scheduler: Option<Rc<dyn Fn()>>,
    /// Called once when the effect is stopped.
    pub on_stop: Option<Box<dyn FnOnce()>>,
}

impl EffectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Do not run on creation.
    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    /// Install a scheduler.
    pub fn scheduler(mut self, scheduler: impl Fn() + 'static) -> Self {
        self.scheduler = Some(Rc::new(scheduler));
        self
    }

    /// Install a stop callback.
    pub fn on_stop(mut self, on_stop: impl FnOnce() + 'static) -> Self {
        self.on_stop = Some(Box::new(on_stop));
        self
    }
}

impl fmt::Debug for EffectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectOptions")
            .field("lazy", &self.lazy)
            .field("scheduler", &self.scheduler.is_some())
            .field("on_stop", &self.on_stop.is_some())
            .finish()
    }
}

/// A computation with automatic dependency tracking.
///
/// # Example
///
/// ```rust,ignore
/// let count = rt.create_ref(0);
///
/// let runner = rt.effect({
///     let count = count.clone();
///     move || println!("count is {}", count.value())
/// });
///
/// count.set(5); // prints "count is 5"
/// runner.stop();
/// ```
pub struct ReactiveEffect<T> {
    core: Rc<EffectCore>,
    f: Rc<dyn Fn() -> T>,
    rt: Runtime,
}

impl<T: 'static> ReactiveEffect<T> {
    pub(crate) fn new(rt: &Runtime, f: Rc<dyn Fn() -> T>, options: EffectOptions) -> Self {
        let EffectOptions {
            scheduler, on_stop, ..
        } = options;
        let core = Rc::new(EffectCore::new(on_stop));

        let action = match scheduler {
            Some(scheduler) => TriggerAction::Schedule(scheduler),
            None => {
                // Weak handles: the action lives inside the core.
                let weak_core = Rc::downgrade(&core);
                let weak_rt = rt.downgrade();
                let f = Rc::clone(&f);
                TriggerAction::Rerun(Rc::new(move || {
                    if let (Some(core), Some(rt)) = (weak_core.upgrade(), weak_rt.upgrade()) {
                        rt.run_effect(&core, &*f);
                    }
                }))
            }
        };
        core.set_action(action);
        rt.adopt_effect(&core);

        Self {
            core,
            f,
            rt: rt.clone(),
        }
    }

    /// Run the function, collecting dependencies.
    pub fn run(&self) -> T {
        self.rt.run_effect(&self.core, &*self.f)
    }

    /// Stop the effect. Idempotent.
    pub fn stop(&self) {
        self.rt.stop_effect(&self.core);
    }

    pub fn id(&self) -> EffectId {
        self.core.id()
    }

    pub fn is_active(&self) -> bool {
        self.core.is_active()
    }

    /// Number of tracked runs so far.
    pub fn run_count(&self) -> usize {
        self.core.run_count()
    }

    /// Number of dependencies collected by the last run.
    pub fn dependency_count(&self) -> usize {
        self.core.dep_count()
    }

    pub fn has_scheduler(&self) -> bool {
        self.core.has_scheduler()
    }
}

impl<T> Clone for ReactiveEffect<T> {
    fn clone(&self) -> Self {
        Self {
            core: Rc::clone(&self.core),
            f: Rc::clone(&self.f),
            rt: self.rt.clone(),
        }
    }
}

impl<T> fmt::Debug for ReactiveEffect<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveEffect")
            .field("id", &self.core.id())
            .field("run_count", &self.core.run_count())
            .field("dependency_count", &self.core.dep_count())
            .field("active", &self.core.is_active())
            .finish()
    }
}

/// Handle returned by [`Runtime::effect`] and [`Runtime::watch`].
///
/// Calling [`run`](Runner::run) runs the effect again by hand.
pub struct Runner<T> {
    effect: ReactiveEffect<T>,
}

impl<T: 'static> Runner<T> {
    pub(crate) fn new(effect: ReactiveEffect<T>) -> Self {
        Self { effect }
    }

    /// Run the effect now.
    pub fn run(&self) -> T {
        self.effect.run()
    }

    /// The underlying effect.
    pub fn effect(&self) -> &ReactiveEffect<T> {
        &self.effect
    }

    /// Stop the effect.
    pub fn stop(&self) {
        self.effect.stop();
    }
}

impl<T> Clone for Runner<T> {
    fn clone(&self) -> Self {
        Self {
            effect: self.effect.clone(),
        }
    }
}

impl<T> fmt::Debug for Runner<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Runner").field(&self.effect).finish()
    }
}

impl Runtime {
    /// Create an effect and run it once.
    pub fn effect<T: 'static>(&self, f: impl Fn() -> T + 'static) -> Runner<T> {
        self.effect_with(f, EffectOptions::default())
    }

    /// Create an effect with options.
    pub fn effect_with<T: 'static>(
        &self,
        f: impl Fn() -> T + 'static,
        options: EffectOptions,
    ) -> Runner<T> {
        let lazy = options.lazy;
        let effect = ReactiveEffect::new(self, Rc::new(f), options);
        if !lazy {
            effect.run();
        }
        Runner::new(effect)
    }

    /// Run `f` now and again whenever what it read changes.
    pub fn watch_effect(&self, f: impl Fn() + 'static) -> Runner<()> {
        self.effect(f)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    #[test]
    fn effect_runs_on_creation() {
        let rt = Runtime::new();
        let runs = Rc::new(Cell::new(0));
        let r = runs.clone();

        let runner = rt.effect(move || r.set(r.get() + 1));

        assert_eq!(runs.get(), 1);
        assert_eq!(runner.effect().run_count(), 1);
    }

    #[test]
    fn lazy_effect_waits_for_run() {
        let rt = Runtime::new();
        let runs = Rc::new(Cell::new(0));
        let r = runs.clone();

        let runner = rt.effect_with(move || r.set(r.get() + 1), EffectOptions::new().lazy());
        assert_eq!(runs.get(), 0);

        runner.run();
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn effect_reruns_on_change() {
        let rt = Runtime::new();
        let count = rt.create_ref(1);
        let seen = Rc::new(RefCell::new(Vec::new()));

        let c = count.clone();
        let s = seen.clone();
        rt.effect(move || s.borrow_mut().push(c.value()));

        count.set(2);
        count.set(2); // unchanged, no run
        count.set(3);
        assert_eq!(*seen.borrow(), vec![1, 2, 3]);
    }

    #[test]
    fn scheduler_replaces_rerun() {
        let rt = Runtime::new();
        let count = rt.create_ref(0);
        let runs = Rc::new(Cell::new(0));
        let scheduled = Rc::new(Cell::new(0));

        let c = count.clone();
        let r = runs.clone();
        let s = scheduled.clone();
        let runner = rt.effect_with(
            move || {
                c.value();
                r.set(r.get() + 1);
            },
            EffectOptions::new().scheduler(move || s.set(s.get() + 1)),
        );

        count.set(1);
        assert_eq!(runs.get(), 1);
        assert_eq!(scheduled.get(), 1);
        assert!(runner.effect().has_scheduler());
    }

    #[test]
    fn stopped_effect_runs_untracked() {
        let rt = Runtime::new();
        let count = rt.create_ref(0);
        let runs = Rc::new(Cell::new(0));
        let stopped = Rc::new(Cell::new(false));

        let c = count.clone();
        let r = runs.clone();
        let s = stopped.clone();
        let runner = rt.effect_with(
            move || {
                c.value();
                r.set(r.get() + 1);
            },
            EffectOptions::new().on_stop(move || s.set(true)),
        );

        runner.stop();
        assert!(stopped.get());
        assert!(!runner.effect().is_active());

        count.set(1);
        assert_eq!(runs.get(), 1);

        // Direct run still executes but collects nothing.
        runner.run();
        assert_eq!(runs.get(), 2);
        assert_eq!(runner.effect().dependency_count(), 0);
        count.set(2);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn self_write_does_not_loop() {
        let rt = Runtime::new();
        let count = rt.create_ref(0);
        let runs = Rc::new(Cell::new(0));

        let c = count.clone();
        let r = runs.clone();
        rt.effect(move || {
            r.set(r.get() + 1);
            c.set(c.value() + 1);
        });

        assert_eq!(runs.get(), 1);
        assert_eq!(count.get_untracked(), 1);
    }

    #[test]
    fn nested_effect_tracks_separately() {
        let rt = Runtime::new();
        let outer_src = rt.create_ref(0);
        let inner_src = rt.create_ref(0);
        let outer_runs = Rc::new(Cell::new(0));
        let inner_runs = Rc::new(Cell::new(0));

        let rt2 = rt.clone();
        let (o, i) = (outer_src.clone(), inner_src.clone());
        let (or, ir) = (outer_runs.clone(), inner_runs.clone());
        rt.effect(move || {
            o.value();
            or.set(or.get() + 1);
            let i = i.clone();
            let ir = ir.clone();
            rt2.effect(move || {
                i.value();
                ir.set(ir.get() + 1);
            });
        });

        inner_src.set(1);
        assert_eq!(outer_runs.get(), 1);
        assert_eq!(inner_runs.get(), 2);
    }
}
