//! Tidepool - single-value reactive store.
//!
//! A [`Store`] holds one current value and notifies listeners of every change.
//! The main features include:
//!
//! - Callback listeners with cancellation handles
//! - Pull-based [`Subscription`] streams backed by an [`IterationBuffer`]
//! - Coalesced re-entrant updates and per-listener failure isolation
//! - Wake/sleep lifecycle hooks for lazily started upstream sources
//! - Pluggable merge strategies, including shallow JSON field merging
//!
//! # Quick Start
//!
//! ```rust
//! use futures::{StreamExt, executor::block_on};
//! use serde_json::json;
//! use tidepool::JsonStore;
//!
//! let store = JsonStore::from_json(json!({ "count": 0 })).unwrap();
//! let mut values = store.subscribe();
//!
//! store.update(json!({ "count": 1 })).unwrap();
//!
//! // The subscription's first value is whatever is current when it is first polled.
//! let first = block_on(values.next()).unwrap();
//! assert_eq!(first["count"], 1);
//! ```

/// Push-to-pull adapter behind subscriptions.
pub mod buffer;

/// Error types and result alias.
pub mod error;

/// Scripted sessions against a JSON store.
pub mod replay;

/// Per-store deferred work queue.
mod schedule;

/// The reactive store.
pub mod store;

/// Logging initialisation for the command-line tool.
pub mod tracing_config;

pub use buffer::IterationBuffer;
pub use error::{Result, StoreError};
pub use store::{
    FieldMerge, JsonStore, Lifecycle, ListenerId, Listening, Merge, NoHooks, Replace, Store,
    Subscription, WeakStore,
};
