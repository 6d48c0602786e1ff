//! Components
//!
//! Components are built on the reactive primitives. A [`Component`]
//! describes state and a render function; an [`App`] mounts one as the root
//! of a tree; every live use of a component is an instance driven by its own
//! update effect.
//!
//! # Overview
//!
//! - [`definition`]: component definitions, both setup-style and
//!   options-style, and the tag registry used to find child components.
//! - [`node`]: the declarative tree returned by render functions.
//! - [`instance`]: the lifecycle of a live component.
//! - [`expand`]: turning render output into child instances and elements.
//! - [`app`]: mounting, render passes and painting.
//! - [`context`]: what user callbacks receive.
//! - [`hooks`]: lifecycle and provide/inject helpers used during setup.
//!
//! # Update Flow
//!
//! ```text
//! state.set(..) ──► update effect scheduler ──► job queue
//!                                                  │ (microtask)
//!                                                  ▼
//!             render ──► expand ──► children receive props ──► paint
//!                                                               │
//!                                            refs + updated hooks ◄┘
//! ```

mod app;
mod context;
mod definition;
mod expand;
mod hooks;
pub(crate) mod instance;
mod node;

pub use app::App;
pub use context::{ComponentContext, SetupContext};
pub use definition::{
    normalize_tag, Binding, Component, ComponentBuilder, ComponentId, ComponentRegistry, DataFn,
    Getter, Hook, Method, RenderFn, SetupFn, SetupHook, SetupResult, WatchHandler,
};
pub use instance::{InstanceId, LifecycleState};
pub use node::{
    h, handler_name, render_list, ComponentNode, ListSource, Listener, Node, Props, SlotFn, Slots,
    TagNode,
};
