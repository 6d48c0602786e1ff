//! Dependency Graph
//!
//! This module holds the bookkeeping the reactive runtime is built on.
//!
//! # Overview
//!
//! - [`deps`] stores who depends on what: a map from each reactive target
//!   to its tracked keys, and from each key to the effects that read it.
//! - [`scheduler`] stores what has to run next: the deduplicated queue of
//!   component update jobs, flushed once per microtask.
//!
//! # Design Decisions
//!
//! 1. The graph is keyed by target ID, not by target handle. Tracking a
//!    target never keeps it alive, and entries disappear as soon as the last
//!    subscribed effect is cleaned up.
//!
//! 2. Effects remember the deps they joined, so cleanup before a re-run is
//!    proportional to what the effect read rather than to the graph size.
//!
//! 3. Jobs are keyed by ID in an insertion-ordered map, which gives both
//!    deduplication and a stable flush order.

pub(crate) mod deps;
pub(crate) mod scheduler;

pub use deps::Key;
pub use scheduler::{Job, JobId};
