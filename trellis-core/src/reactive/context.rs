//! Reactive Context
//!
//! The reactive context tracks which effect is currently running, so that a
//! read can register that effect as a dependent.
//!
//! # Implementation
//!
//! Each [`Runtime`](crate::Runtime) owns an [`EffectStack`]. Running an
//! effect pushes it; the returned guard pops it again, even if the effect
//! panics. Nested effects (an effect reading a computed value, a parent
//! render expanding a child) simply stack.
//!
//! Tracking can also be paused. Component setup and [`untracked`] reads run
//! with tracking off so they never subscribe the surrounding effect.
//!
//! [`untracked`]: crate::Runtime::untracked

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::subscriber::{EffectCore, EffectId};

/// The stack of running effects plus the "should track" switch.
#[derive(Debug)]
pub(crate) struct EffectStack {
    entries: RefCell<Vec<Rc<EffectCore>>>,
    tracking: Cell<bool>,
}

impl EffectStack {
    pub fn new() -> Self {
        Self {
            entries: RefCell::new(Vec::new()),
            tracking: Cell::new(true),
        }
    }

    /// Push an effect. Tracking is switched on for its duration.
    pub fn enter(&self, core: Rc<EffectCore>) -> ContextGuard<'_> {
        let id = core.id();
        self.entries.borrow_mut().push(core);
        let prev_tracking = self.tracking.replace(true);
        ContextGuard {
            stack: self,
            id,
            prev_tracking,
        }
    }

    /// Switch tracking off until the guard drops.
    pub fn pause(&self) -> PauseGuard<'_> {
        let prev_tracking = self.tracking.replace(false);
        PauseGuard {
            stack: self,
            prev_tracking,
        }
    }

    /// The innermost running effect.
    pub fn active(&self) -> Option<Rc<EffectCore>> {
        self.entries.borrow().last().cloned()
    }

    pub fn active_id(&self) -> Option<EffectId> {
        self.entries.borrow().last().map(|core| core.id())
    }

    /// Whether the effect is anywhere on the stack.
    pub fn contains(&self, id: EffectId) -> bool {
        self.entries.borrow().iter().any(|core| core.id() == id)
    }

    /// Whether a read right now should subscribe the active effect.
    pub fn is_tracking(&self) -> bool {
        self.tracking.get() && !self.entries.borrow().is_empty()
    }

    pub fn depth(&self) -> usize {
        self.entries.borrow().len()
    }
}

/// Guard that pops the effect when dropped.
pub(crate) struct ContextGuard<'a> {
    stack: &'a EffectStack,
    id: EffectId,
    prev_tracking: bool,
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        let popped = self.stack.entries.borrow_mut().pop();

        if let Some(core) = popped {
            debug_assert_eq!(
                core.id(),
                self.id,
                "effect stack mismatch: expected {:?}, got {:?}",
                self.id,
                core.id()
            );
        }
        self.stack.tracking.set(self.prev_tracking);
    }
}

/// Guard that restores the tracking switch when dropped.
pub(crate) struct PauseGuard<'a> {
    stack: &'a EffectStack,
    prev_tracking: bool,
}

impl Drop for PauseGuard<'_> {
    fn drop(&mut self) {
        self.stack.tracking.set(self.prev_tracking);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn core() -> Rc<EffectCore> {
        Rc::new(EffectCore::new(None))
    }

    #[test]
    fn stack_tracks_active_effect() {
        let stack = EffectStack::new();
        let effect = core();

        assert!(!stack.is_tracking());
        assert!(stack.active_id().is_none());

        {
            let _guard = stack.enter(effect.clone());
            assert!(stack.is_tracking());
            assert_eq!(stack.active_id(), Some(effect.id()));
        }

        // Popped after drop
        assert!(!stack.is_tracking());
        assert_eq!(stack.depth(), 0);
    }

    #[test]
    fn nested_entries() {
        let stack = EffectStack::new();
        let outer = core();
        let inner = core();

        let _outer = stack.enter(outer.clone());
        {
            let _inner = stack.enter(inner.clone());
            assert_eq!(stack.active_id(), Some(inner.id()));
            assert!(stack.contains(outer.id()));
        }
        assert_eq!(stack.active_id(), Some(outer.id()));
        assert!(!stack.contains(inner.id()));
    }

    #[test]
    fn pause_restores_previous_state() {
        let stack = EffectStack::new();
        let _guard = stack.enter(core());

        {
            let _paused = stack.pause();
            assert!(!stack.is_tracking());

            // An effect entered while paused tracks for its own duration.
            {
                let _nested = stack.enter(core());
                assert!(stack.is_tracking());
            }
            assert!(!stack.is_tracking());
        }
        assert!(stack.is_tracking());
    }
}
