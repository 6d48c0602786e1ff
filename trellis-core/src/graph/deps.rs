//! Dependency Sets
//!
//! This module defines the storage behind `track`/`trigger`: a two-level map
//! from a reactive target to its keys, and from each key to the set of
//! effects that read it.
//!
//! ```text
//! TargetId ──► Key ──► Dep { effect, effect, ... }
//! ```
//!
//! Refs and computed values own a standalone [`Dep`] that does not live in
//! the map.
//!
//! # Invariants
//!
//! - A `(target, key)` entry exists only while at least one effect is
//!   subscribed to it. Cleaning up an effect prunes entries it leaves empty.
//! - The map is keyed by [`TargetId`], never by a handle to the target, so
//!   tracking a target never keeps it alive.
//! - Subscribers are kept in insertion order, which is the order `trigger`
//!   notifies them in.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::reactive::subscriber::{EffectCore, EffectId};
use crate::value::TargetId;

/// A property key on a reactive target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    /// A named property of a map.
    Prop(String),
    /// A list slot.
    Index(usize),
    /// The length of a list.
    Length,
    /// Synthetic key notified on structural changes (keys added or removed,
    /// list reshaped). Enumeration and index reads subscribe to it.
    Iterate,
}

impl From<&str> for Key {
    fn from(key: &str) -> Self {
        Key::Prop(key.to_string())
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Key::Index(index)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Prop(name) => f.write_str(name),
            Key::Index(i) => write!(f, "{i}"),
            Key::Length => f.write_str("length"),
            Key::Iterate => f.write_str("<iterate>"),
        }
    }
}

/// Where a [`Dep`] is registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DepOwner {
    /// An entry in the target map.
    Target { target: TargetId, key: Key },
    /// Owned directly by a ref or computed value.
    Standalone,
}

/// A set of subscribed effects.
#[derive(Clone)]
pub(crate) struct Dep {
    inner: Rc<DepInner>,
}

struct DepInner {
    owner: DepOwner,
    subscribers: RefCell<IndexMap<EffectId, Rc<EffectCore>>>,
}

impl Dep {
    fn new(owner: DepOwner) -> Self {
        Self {
            inner: Rc::new(DepInner {
                owner,
                subscribers: RefCell::new(IndexMap::new()),
            }),
        }
    }

    /// Create a dep owned by a ref or computed value.
    pub fn standalone() -> Self {
        Self::new(DepOwner::Standalone)
    }

    pub fn owner(&self) -> &DepOwner {
        &self.inner.owner
    }

    /// Subscribe an effect. Returns `false` if it was already subscribed.
    pub fn add(&self, effect: &Rc<EffectCore>) -> bool {
        let mut subscribers = self.inner.subscribers.borrow_mut();
        if subscribers.contains_key(&effect.id()) {
            return false;
        }
        subscribers.insert(effect.id(), Rc::clone(effect));
        true
    }

    /// Unsubscribe an effect.
    pub fn remove(&self, id: EffectId) {
        self.inner.subscribers.borrow_mut().shift_remove(&id);
    }

    /// Snapshot of the current subscribers, in subscription order.
    pub fn subscribers(&self) -> Vec<Rc<EffectCore>> {
        self.inner.subscribers.borrow().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.subscribers.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: EffectId) -> bool {
        self.inner.subscribers.borrow().contains_key(&id)
    }
}

impl fmt::Debug for Dep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dep")
            .field("owner", &self.inner.owner)
            .field("subscribers", &self.len())
            .finish()
    }
}

/// The target map.
#[derive(Debug, Default)]
pub(crate) struct DepGraph {
    targets: HashMap<TargetId, HashMap<Key, Dep>>,
}

impl DepGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the dep for `(target, key)`, creating the entry if needed.
    pub fn dep_for(&mut self, target: TargetId, key: &Key) -> Dep {
        self.targets
            .entry(target)
            .or_default()
            .entry(key.clone())
            .or_insert_with(|| {
                Dep::new(DepOwner::Target {
                    target,
                    key: key.clone(),
                })
            })
            .clone()
    }

    /// Look up an existing dep without creating one.
    pub fn get(&self, target: TargetId, key: &Key) -> Option<Dep> {
        self.targets.get(&target)?.get(key).cloned()
    }

    /// Remove the `(target, key)` entry if nobody is subscribed to it any
    /// more, dropping the target's entry when its last key goes.
    pub fn prune(&mut self, target: TargetId, key: &Key) {
        let Some(keys) = self.targets.get_mut(&target) else {
            return;
        };
        if keys.get(key).is_some_and(Dep::is_empty) {
            keys.remove(key);
        }
        if keys.is_empty() {
            self.targets.remove(&target);
        }
    }

    /// Number of targets with at least one live entry.
    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    /// Number of tracked keys on a target.
    pub fn key_count(&self, target: TargetId) -> usize {
        self.targets.get(&target).map_or(0, HashMap::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Target;

    #[test]
    fn dep_for_reuses_entries() {
        let mut graph = DepGraph::new();
        let target = Target::map().id();

        let a = graph.dep_for(target, &Key::from("count"));
        let b = graph.dep_for(target, &Key::from("count"));
        assert!(Rc::ptr_eq(&a.inner, &b.inner));
        assert_eq!(graph.key_count(target), 1);
        assert_eq!(
            a.owner(),
            &DepOwner::Target {
                target,
                key: Key::from("count")
            }
        );
    }

    #[test]
    fn prune_drops_empty_entries_only() {
        let mut graph = DepGraph::new();
        let target = Target::map().id();
        let effect = Rc::new(EffectCore::detached());

        let kept = graph.dep_for(target, &Key::Length);
        kept.add(&effect);
        graph.dep_for(target, &Key::Iterate);

        graph.prune(target, &Key::Iterate);
        graph.prune(target, &Key::Length);
        assert_eq!(graph.key_count(target), 1);

        kept.remove(effect.id());
        graph.prune(target, &Key::Length);
        assert_eq!(graph.target_count(), 0);
    }

    #[test]
    fn dep_add_is_idempotent() {
        let dep = Dep::standalone();
        let effect = Rc::new(EffectCore::detached());

        assert!(dep.add(&effect));
        assert!(!dep.add(&effect));
        assert_eq!(dep.len(), 1);
        assert!(dep.contains(effect.id()));
    }
}
