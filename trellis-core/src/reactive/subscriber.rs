//! Subscriber types for the reactive system.
//!
//! An [`EffectCore`] is the type-erased part of an effect that the
//! dependency graph stores. It knows its dependencies (for cleanup) and how
//! to react when one of them changes: either call a custom scheduler or
//! re-run itself.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;

use crate::graph::deps::Dep;

/// Unique identifier for an effect.
///
/// Every effect (including the ones behind computed values, watchers and
/// component updates) gets an ID when created. Dependency sets are keyed by
/// it, which is what makes subscription idempotent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EffectId(u64);

impl EffectId {
    /// Generate a new unique effect ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for EffectId {
    fn default() -> Self {
        Self::new()
    }
}

/// What happens when a dependency of an effect changes.
#[derive(Clone)]
pub(crate) enum TriggerAction {
    /// Hand control to a user scheduler instead of running.
    Schedule(Rc<dyn Fn()>),
    /// Re-run the effect immediately.
    Rerun(Rc<dyn Fn()>),
}

/// The part of an effect that lives in dependency sets.
pub(crate) struct EffectCore {
    id: EffectId,
    deps: RefCell<SmallVec<[Dep; 4]>>,
    active: Cell<bool>,
    action: RefCell<Option<TriggerAction>>,
    on_stop: RefCell<Option<Box<dyn FnOnce()>>>,
    runs: Cell<usize>,
}

impl EffectCore {
    pub fn new(on_stop: Option<Box<dyn FnOnce()>>) -> Self {
        Self {
            id: EffectId::new(),
            deps: RefCell::new(SmallVec::new()),
            active: Cell::new(true),
            action: RefCell::new(None),
            on_stop: RefCell::new(on_stop),
            runs: Cell::new(0),
        }
    }

    /// A core with no trigger action, for graph tests.
    #[cfg(test)]
    pub fn detached() -> Self {
        Self::new(None)
    }

    pub fn id(&self) -> EffectId {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.active.get()
    }

    pub fn set_action(&self, action: TriggerAction) {
        *self.action.borrow_mut() = Some(action);
    }

    pub fn has_scheduler(&self) -> bool {
        matches!(&*self.action.borrow(), Some(TriggerAction::Schedule(_)))
    }

    /// React to a dependency change.
    pub fn notify(&self) {
        // Clone out of the cell: the action may re-enter this core.
        let action = self.action.borrow().clone();
        match action {
            Some(TriggerAction::Schedule(f)) | Some(TriggerAction::Rerun(f)) => f(),
            None => {}
        }
    }

    /// Record a dependency so it can be cleaned up before the next run.
    pub fn push_dep(&self, dep: Dep) {
        self.deps.borrow_mut().push(dep);
    }

    /// Take every recorded dependency.
    pub fn take_deps(&self) -> SmallVec<[Dep; 4]> {
        std::mem::take(&mut *self.deps.borrow_mut())
    }

    pub fn dep_count(&self) -> usize {
        self.deps.borrow().len()
    }

    pub fn record_run(&self) {
        self.runs.set(self.runs.get() + 1);
    }

    pub fn run_count(&self) -> usize {
        self.runs.get()
    }

    /// Deactivate the core and return its stop callback.
    ///
    /// The trigger action is dropped as well, which breaks the reference
    /// cycles schedulers create by capturing their own effect.
    pub fn deactivate(&self) -> Option<Box<dyn FnOnce()>> {
        self.active.set(false);
        self.action.borrow_mut().take();
        self.on_stop.borrow_mut().take()
    }
}

impl fmt::Debug for EffectCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectCore")
            .field("id", &self.id)
            .field("active", &self.active.get())
            .field("deps", &self.dep_count())
            .field("runs", &self.runs.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effect_ids_are_unique() {
        let id1 = EffectId::new();
        let id2 = EffectId::new();
        let id3 = EffectId::new();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn notify_prefers_installed_action() {
        let hits = Rc::new(Cell::new(0));
        let core = EffectCore::new(None);

        // No action installed yet: nothing happens.
        core.notify();
        assert_eq!(hits.get(), 0);

        let h = hits.clone();
        core.set_action(TriggerAction::Schedule(Rc::new(move || h.set(h.get() + 1))));
        core.notify();
        assert_eq!(hits.get(), 1);
        assert!(core.has_scheduler());
    }

    #[test]
    fn deactivate_returns_stop_callback_once() {
        let stopped = Rc::new(Cell::new(false));
        let s = stopped.clone();
        let core = EffectCore::new(Some(Box::new(move || s.set(true))));

        if let Some(on_stop) = core.deactivate() {
            on_stop();
        }
        assert!(stopped.get());
        assert!(!core.is_active());
        assert!(core.deactivate().is_none());
    }
}
