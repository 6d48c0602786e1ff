//! Trellis Core
//!
//! This crate provides the core runtime for the Trellis reactive component
//! framework. It implements:
//!
//! - Reactive primitives (refs, reactive objects, computed values, effects,
//!   watchers)
//! - A batched update scheduler driven by microtasks
//! - Component instances with a setup/options API, lifecycle hooks,
//!   provide/inject, slots and refs
//! - Expansion of component trees into plain element trees for a pluggable
//!   render service
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: the runtime, dependency tracking and the reactive primitives
//! - `graph`: dependency bookkeeping and the job queue
//! - `component`: component definitions, instances, expansion and apps
//! - `render`: the expanded element tree and the render service interface
//! - `value`: the dynamic values reactive objects are made of
//!
//! # Example
//!
//! ```rust,ignore
//! use trellis_core::{h, Component, HeadlessRenderer, Runtime, SetupResult, Value};
//!
//! let rt = Runtime::new();
//!
//! let counter = Component::setup("Counter", |rt, _props, _cx| {
//!     let count = rt.create_ref(Value::from(0));
//!     let double = {
//!         let count = count.clone();
//!         rt.computed(move || Value::from(count.value().as_f64().unwrap_or(0.0) * 2.0))
//!     };
//!     SetupResult::render(move |_ctx| {
//!         h("p").text(format!("{} x 2 = {}", count.value(), double.value())).into()
//!     })
//! })
//! .build();
//!
//! let renderer = HeadlessRenderer::new().with_container("#app");
//! let mut app = rt.create_app(&counter, renderer.clone());
//! app.mount("#app")?;
//! assert_eq!(renderer.html("#app").as_deref(), Some("<p>0 x 2 = 0</p>"));
//! ```

pub mod component;
pub mod config;
pub mod error;
pub mod graph;
pub mod reactive;
pub mod render;
pub mod value;

pub use component::{
    h, render_list, App, Binding, Component, ComponentContext, LifecycleState, Node, Props,
    SetupContext, SetupResult, Slots,
};
pub use config::RuntimeConfig;
pub use error::{ComponentError, Error, Result};
pub use reactive::{
    Computed, EffectOptions, EffectScope, Reactive, Ref, Runner, Runtime, WatchOptions,
};
pub use render::{Element, HeadlessRenderer, NodeHandle, RenderService, TagElement};
pub use value::Value;
