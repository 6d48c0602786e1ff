//! Error Types
//!
//! Errors surface in three places in the runtime:
//!
//! - **Setup**: a component's `setup` function (or one of its option hooks)
//!   reported a failure. These are never swallowed; a failing root setup is
//!   returned from [`App::mount`](crate::component::App::mount).
//!
//! - **Render**: a render function failed. During an update this is logged
//!   and the previous tree stays on screen. During the initial mount of the
//!   root it is returned to the caller.
//!
//! - **Expansion**: a nested component could not be instantiated or
//!   rendered. The failing node expands to nothing and its siblings are
//!   unaffected.
//!
//! User-supplied closures report failures with [`ComponentError`]; the
//! runtime attaches the component name when converting it into an [`Error`].

use thiserror::Error;

/// A failure reported by user code (setup, render or option hooks).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ComponentError {
    message: String,
}

impl ComponentError {
    /// Create a new error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The message supplied by user code.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<&str> for ComponentError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for ComponentError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

/// Errors produced by the runtime.
#[derive(Debug, Error)]
pub enum Error {
    /// A component's setup failed.
    #[error("setup of component `{component}` failed: {source}")]
    Setup {
        component: String,
        #[source]
        source: ComponentError,
    },

    /// A component's render function failed.
    #[error("render of component `{component}` failed: {source}")]
    Render {
        component: String,
        #[source]
        source: ComponentError,
    },

    /// A nested component node could not be expanded.
    #[error("could not expand component `{component}`")]
    Expansion {
        component: String,
        #[source]
        source: Box<Error>,
    },

    /// The render service rejected a mount or patch.
    #[error("render service failed: {0}")]
    Service(String),

    /// The render service does not know the requested container.
    #[error("container `{0}` not found")]
    ContainerNotFound(String),

    /// [`App::mount`](crate::component::App::mount) was called on an app
    /// that is already mounted.
    #[error("app is already mounted on `{0}`")]
    AlreadyMounted(String),

    /// The runtime configuration could not be parsed.
    #[error("invalid runtime configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn setup(component: &str, source: ComponentError) -> Self {
        Self::Setup {
            component: component.to_string(),
            source,
        }
    }

    pub(crate) fn render(component: &str, source: ComponentError) -> Self {
        Self::Render {
            component: component.to_string(),
            source,
        }
    }

    pub(crate) fn expansion(component: &str, source: Error) -> Self {
        Self::Expansion {
            component: component.to_string(),
            source: Box::new(source),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn expansion_error_keeps_source_chain() {
        let inner = Error::setup("Child", ComponentError::new("boom"));
        let err = Error::expansion("Child", inner);

        assert_eq!(err.to_string(), "could not expand component `Child`");
        let source = err.source().expect("expansion error has a source");
        assert_eq!(source.to_string(), "setup of component `Child` failed: boom");
    }

    #[test]
    fn component_error_from_str() {
        let err: ComponentError = "bad state".into();
        assert_eq!(err.message(), "bad state");
    }
}
