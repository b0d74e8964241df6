use thiserror::Error;

use crate::store::ListenerId;

/// Error types for store operations.
///
/// Only `InvalidArgument` is ever returned from a call. The listener variants
/// are produced during fan-out and surfaced on the following turn through
/// [`Lifecycle::listener_failed`](crate::store::Lifecycle::listener_failed).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A value or patch of the wrong shape was handed to the store.
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// Why the argument was rejected
        reason: String,
    },

    /// A listener panicked while a value was being delivered to it.
    #[error("listener {listener} failed: {message}")]
    ListenerFailure {
        /// The listener that panicked
        listener: ListenerId,
        /// Panic payload, when it was a string
        message: String,
    },

    /// A value was pushed into a listener that was still handling an earlier one.
    #[error("listener {listener} is already running")]
    ReentrantDelivery {
        /// The listener that refused the delivery
        listener: ListenerId,
    },
}

/// A specialized `Result` type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    /// Creates an `InvalidArgument` error.
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        StoreError::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Whether this error originated inside a listener rather than a store call.
    pub fn is_listener_error(&self) -> bool {
        matches!(
            self,
            StoreError::ListenerFailure { .. } | StoreError::ReentrantDelivery { .. }
        )
    }
}
