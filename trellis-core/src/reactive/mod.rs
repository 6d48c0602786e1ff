//! Reactive Primitives
//!
//! This module implements the reactive system: refs, reactive objects,
//! computed values, effects and watchers. Components are built on top of
//! it.
//!
//! # Concepts
//!
//! ## Refs
//!
//! A [`Ref`] holds one value. Reading it inside an effect registers the
//! effect as a dependent; writing a different value notifies dependents.
//!
//! ## Reactive Objects
//!
//! A [`Reactive`] is a tracked view over a map or list. Dependencies are
//! recorded per key, so an effect that reads `state.a` is not disturbed by a
//! write to `state.b`. Nested objects are reactive too.
//!
//! ## Computed Values
//!
//! A [`Computed`] is a derived value that caches its result. It is lazy: a
//! change to its inputs only marks it dirty, and the getter runs again on the
//! next read.
//!
//! ## Effects
//!
//! A [`ReactiveEffect`] re-runs (or calls its scheduler) whenever one of its
//! dependencies changes. Component updates are effects whose scheduler
//! queues a job, which is how several writes collapse into one re-render.
//!
//! ## Watchers
//!
//! [`Runtime::watch`] calls a callback with new and old values when a
//! source changes, optionally deep and optionally right away.
//!
//! # Implementation Notes
//!
//! Dependency tracking is automatic: each [`Runtime`] keeps a stack of
//! running effects, and every tracked read subscribes the top of that stack.
//! Everything is single-threaded and `Rc`-based.

mod computed;
pub(crate) mod context;
mod effect;
mod object;
mod refs;
mod runtime;
mod scope;
pub(crate) mod subscriber;
mod watch;

pub use computed::Computed;
pub use effect::{EffectOptions, ReactiveEffect, Runner};
pub use object::Reactive;
pub use refs::Ref;
pub use runtime::{NextTick, Runtime};
pub(crate) use runtime::WeakRuntime;
pub use scope::EffectScope;
pub use subscriber::EffectId;
pub use watch::{Traverse, WatchOptions, WatchSource};
