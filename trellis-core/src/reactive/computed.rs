//! Computed Implementation
//!
//! A [`Computed`] is a cached derived value that re-evaluates only when
//! something it read has changed, and only when somebody asks for it.
//!
//! # How Computed Values Work
//!
//! 1. The getter runs inside a lazy effect. Nothing is computed until the
//!    first [`Computed::value`] call.
//!
//! 2. The result is cached. Later reads return the cache and only subscribe
//!    the reader to the computed value's own dependency set.
//!
//! 3. When a dependency changes, the effect's scheduler drops the cache and
//!    notifies the computed value's readers. The getter does not run yet.
//!
//! 4. The next read recomputes.
//!
//! A computed value that is invalidated several times before being read
//! recomputes once.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use super::effect::{EffectOptions, ReactiveEffect};
use super::runtime::Runtime;
use crate::graph::deps::Dep;

/// A lazily evaluated, cached derived value.
///
/// # Example
///
/// ```rust,ignore
/// let count = rt.create_ref(2);
/// let doubled = rt.computed({
///     let count = count.clone();
///     move || count.value() * 2
/// });
///
/// assert_eq!(doubled.value(), 4);
/// count.set(5);
/// assert_eq!(doubled.value(), 10);
/// ```
pub struct Computed<T> {
    inner: Rc<ComputedInner<T>>,
}

struct ComputedInner<T> {
    rt: Runtime,
    effect: ReactiveEffect<T>,
    /// `None` while dirty.
    cache: RefCell<Option<T>>,
    dep: Dep,
}

impl<T: Clone + 'static> Computed<T> {
    pub(crate) fn new(rt: &Runtime, getter: impl Fn() -> T + 'static) -> Self {
        let inner = Rc::new_cyclic(|weak: &Weak<ComputedInner<T>>| {
            let weak = weak.clone();
            let options = EffectOptions::new().lazy().scheduler(move || {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                // Already dirty means readers were told already.
                let was_clean = inner.cache.borrow_mut().take().is_some();
                if was_clean {
                    inner.rt.trigger_dep(&inner.dep);
                }
            });

            ComputedInner {
                rt: rt.clone(),
                effect: ReactiveEffect::new(rt, Rc::new(getter), options),
                cache: RefCell::new(None),
                dep: Dep::standalone(),
            }
        });
        Self { inner }
    }

    /// Get the value, recomputing it first if it is dirty. Tracked.
    pub fn value(&self) -> T {
        let cached = self.inner.cache.borrow().clone();
        let value = match cached {
            Some(value) => value,
            None => {
                let value = self.inner.effect.run();
                *self.inner.cache.borrow_mut() = Some(value.clone());
                value
            }
        };
        self.inner.rt.track_dep(&self.inner.dep);
        value
    }

    /// Whether the next read will recompute.
    pub fn is_dirty(&self) -> bool {
        self.inner.cache.borrow().is_none()
    }

    /// The effect behind this value.
    pub fn effect(&self) -> &ReactiveEffect<T> {
        &self.inner.effect
    }

    /// Number of times the getter has run.
    pub fn compute_count(&self) -> usize {
        self.inner.effect.run_count()
    }

    /// Stop tracking. The cached value stays readable but never refreshes
    /// from its dependencies again.
    pub fn stop(&self) {
        self.inner.effect.stop();
    }
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("cache", &*self.inner.cache.borrow())
            .field("readers", &self.inner.dep.len())
            .finish()
    }
}

impl Runtime {
    /// Create a computed value from a getter.
    pub fn computed<T: Clone + 'static>(&self, getter: impl Fn() -> T + 'static) -> Computed<T> {
        Computed::new(self, getter)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn computed_is_lazy() {
        let rt = Runtime::new();
        let calls = Rc::new(Cell::new(0));
        let c = calls.clone();

        let value = rt.computed(move || {
            c.set(c.get() + 1);
            42
        });

        assert_eq!(calls.get(), 0);
        assert!(value.is_dirty());

        assert_eq!(value.value(), 42);
        assert_eq!(value.value(), 42);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn invalidations_collapse_until_read() {
        let rt = Runtime::new();
        let count = rt.create_ref(1);
        let c = count.clone();
        let doubled = rt.computed(move || c.value() * 2);

        assert_eq!(doubled.value(), 2);
        count.set(2);
        count.set(3);
        count.set(4);
        assert!(doubled.is_dirty());
        assert_eq!(doubled.compute_count(), 1);

        assert_eq!(doubled.value(), 8);
        assert_eq!(doubled.compute_count(), 2);
    }

    #[test]
    fn chained_computed_values() {
        let rt = Runtime::new();
        let base = rt.create_ref(1);

        let b = base.clone();
        let doubled = rt.computed(move || b.value() * 2);
        let d = doubled.clone();
        let quadrupled = rt.computed(move || d.value() * 2);

        assert_eq!(quadrupled.value(), 4);
        base.set(5);
        assert_eq!(quadrupled.value(), 20);
    }

    #[test]
    fn effect_rereads_invalidated_computed() {
        let rt = Runtime::new();
        let count = rt.create_ref(0);
        let c = count.clone();
        let doubled = rt.computed(move || c.value() * 2);
        let seen = Rc::new(RefCell::new(Vec::new()));

        let d = doubled.clone();
        let s = seen.clone();
        rt.effect(move || s.borrow_mut().push(d.value()));

        count.set(5);
        assert_eq!(*seen.borrow(), vec![0, 10]);
    }
}
