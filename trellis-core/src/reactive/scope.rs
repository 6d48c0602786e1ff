//! Effect Scopes
//!
//! A scope collects every effect created while it is running, so that a
//! group of effects can be stopped in one call. Each component instance runs
//! its setup inside a scope; unmounting the instance stops the scope, which
//! is how watchers and computed values created in setup go away with their
//! component.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use super::runtime::{Runtime, WeakRuntime};
use super::subscriber::EffectCore;

/// A group of effects stopped together.
///
/// # Example
///
/// ```rust,ignore
/// let scope = rt.effect_scope();
///
/// scope.run(|| {
///     rt.watch_effect(move || println!("{}", count.value()));
/// });
///
/// scope.stop(); // the watcher above no longer runs
/// ```
#[derive(Clone)]
pub struct EffectScope {
    inner: Rc<ScopeInner>,
}

struct ScopeInner {
    rt: WeakRuntime,
    effects: RefCell<Vec<Rc<EffectCore>>>,
    active: Cell<bool>,
}

impl EffectScope {
    pub(crate) fn new(rt: &Runtime) -> Self {
        Self {
            inner: Rc::new(ScopeInner {
                rt: rt.downgrade(),
                effects: RefCell::new(Vec::new()),
                active: Cell::new(true),
            }),
        }
    }

    /// Run `f`, collecting the effects it creates.
    ///
    /// A stopped scope still runs `f` but collects nothing.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> R {
        let Some(rt) = self.inner.rt.upgrade() else {
            return f();
        };
        if !self.is_active() {
            return f();
        }
        rt.push_scope(self.clone());
        let _pop = PopScope { rt: &rt };
        f()
    }

    pub(crate) fn adopt(&self, core: &Rc<EffectCore>) {
        if self.is_active() {
            self.inner.effects.borrow_mut().push(Rc::clone(core));
        }
    }

    /// Stop every collected effect. Idempotent.
    pub fn stop(&self) {
        if !self.inner.active.replace(false) {
            return;
        }
        let effects = std::mem::take(&mut *self.inner.effects.borrow_mut());
        if let Some(rt) = self.inner.rt.upgrade() {
            for core in &effects {
                rt.stop_effect(core);
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.get()
    }

    /// Number of collected effects.
    pub fn len(&self) -> usize {
        self.inner.effects.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for EffectScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectScope")
            .field("effects", &self.len())
            .field("active", &self.is_active())
            .finish()
    }
}

struct PopScope<'a> {
    rt: &'a Runtime,
}

impl Drop for PopScope<'_> {
    fn drop(&mut self) {
        self.rt.pop_scope();
    }
}

#[cfg(test)]
mod tests {
    use crate::Runtime;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn stop_halts_collected_effects() {
        let rt = Runtime::new();
        let count = rt.create_ref(0);
        let runs = Rc::new(Cell::new(0));

        let scope = rt.effect_scope();
        scope.run(|| {
            let count = count.clone();
            let runs = runs.clone();
            rt.watch_effect(move || {
                count.value();
                runs.set(runs.get() + 1);
            });
        });
        assert_eq!(scope.len(), 1);

        count.set(1);
        assert_eq!(runs.get(), 2);

        scope.stop();
        count.set(2);
        assert_eq!(runs.get(), 2);
        assert!(!scope.is_active());
    }

    #[test]
    fn effects_outside_run_are_not_collected() {
        let rt = Runtime::new();
        let scope = rt.effect_scope();

        rt.watch_effect(|| {});
        scope.run(|| {});
        assert!(scope.is_empty());
    }
}
