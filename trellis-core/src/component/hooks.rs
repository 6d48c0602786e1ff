//! Setup-time Hooks
//!
//! Lifecycle registration and provide/inject for setup-style components.
//! They act on the instance whose setup is currently running:
//!
//! ```rust,ignore
//! Component::setup("Clock", |rt, _props, _cx| {
//!     let theme = rt.inject_or("theme", "light");
//!     rt.on_mounted(|| tracing::info!("clock mounted"));
//!     rt.provide("tick", rt.create_ref(Value::from(0)));
//!     SetupResult::Empty
//! })
//! ```
//!
//! Called outside a setup they do nothing and, with
//! [`RuntimeConfig::dev_warnings`](crate::RuntimeConfig::dev_warnings) on,
//! log a warning.

use std::rc::Rc;

use super::context::ComponentContext;
use super::definition::Binding;
use super::instance::HookKind;
use crate::reactive::Runtime;

impl Runtime {
    /// Make `value` available to descendants under `key`.
    pub fn provide(&self, key: impl Into<String>, value: impl Into<Binding>) {
        match self.current() {
            Some(instance) => instance.provide(key.into(), value.into()),
            None => self.dev_warn("provide", "provide() called outside of setup; ignoring it"),
        }
    }

    /// Look up the nearest value provided under `key`, starting with the
    /// current instance itself.
    pub fn inject(&self, key: &str) -> Option<Binding> {
        let Some(instance) = self.current() else {
            self.dev_warn("inject", "inject() called outside of setup");
            return None;
        };
        let found = instance.inject_binding(key);
        if found.is_none() {
            tracing::debug!(component = instance.name(), key, "nothing provided");
        }
        found
    }

    /// [`inject`](Self::inject) with a fallback.
    pub fn inject_or(&self, key: &str, default: impl Into<Binding>) -> Binding {
        self.inject(key).unwrap_or_else(|| default.into())
    }

    pub fn on_before_mount(&self, f: impl Fn() + 'static) {
        self.register_hook("on_before_mount", HookKind::BeforeMount, f);
    }

    pub fn on_mounted(&self, f: impl Fn() + 'static) {
        self.register_hook("on_mounted", HookKind::Mounted, f);
    }

    pub fn on_updated(&self, f: impl Fn() + 'static) {
        self.register_hook("on_updated", HookKind::Updated, f);
    }

    pub fn on_unmounted(&self, f: impl Fn() + 'static) {
        self.register_hook("on_unmounted", HookKind::Unmounted, f);
    }

    /// Context of the instance whose setup is running.
    pub fn current_instance(&self) -> Option<ComponentContext> {
        self.current().map(|instance| instance.context())
    }

    fn register_hook(&self, api: &str, kind: HookKind, f: impl Fn() + 'static) {
        match self.current() {
            Some(instance) => instance.add_hook(kind, Rc::new(move |_| f())),
            None => self.dev_warn(api, "lifecycle hook registered outside of setup; ignoring it"),
        }
    }
}
