//! Error types for filter invocation, chain construction and transports.
//!
//! Per-message failures are terminal for the connection: the dispatcher
//! logs them and closes, never surfacing them to the remote peer.

use std::{any::Any, fmt};

use thiserror::Error;

/// Classification of a failed filter continuation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FilterErrorKind {
    /// The filter reported a failure.
    Failed,
    /// The filter panicked while being invoked.
    Panicked,
    /// The deadline fired before the continuation resolved.
    Timeout,
    /// The connection closed before the continuation resolved.
    Closed,
    /// The operation is not allowed where it was attempted.
    Unsupported,
}

impl FilterErrorKind {
    /// Lower-case label used in logs and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Failed => "failed",
            Self::Panicked => "panicked",
            Self::Timeout => "timeout",
            Self::Closed => "closed",
            Self::Unsupported => "unsupported",
        }
    }
}

impl fmt::Display for FilterErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Failure outcome of a filter continuation or out-of-band request.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct FilterError {
    kind: FilterErrorKind,
    message: String,
}

impl FilterError {
    /// Report a filter-internal failure.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            kind: FilterErrorKind::Failed,
            message: message.into(),
        }
    }

    pub(crate) fn timeout(after: std::time::Duration) -> Self {
        Self {
            kind: FilterErrorKind::Timeout,
            message: format!("no result within {}ms", after.as_millis()),
        }
    }

    pub(crate) fn closed() -> Self {
        Self {
            kind: FilterErrorKind::Closed,
            message: "connection closed".to_owned(),
        }
    }

    pub(crate) fn unsupported(message: impl Into<String>) -> Self {
        Self {
            kind: FilterErrorKind::Unsupported,
            message: message.into(),
        }
    }

    /// Convert a caught panic payload, extracting its message when possible.
    pub(crate) fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_owned()
        } else {
            format!("{payload:?}")
        };
        Self {
            kind: FilterErrorKind::Panicked,
            message,
        }
    }

    /// Failure classification.
    #[must_use]
    pub fn kind(&self) -> FilterErrorKind { self.kind }

    /// Returns `true` when the failure was caused by a deadline.
    #[must_use]
    pub fn is_timeout(&self) -> bool { self.kind == FilterErrorKind::Timeout }

    /// Human-readable description.
    #[must_use]
    pub fn message(&self) -> &str { &self.message }
}

/// Errors raised while building a filter chain.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ChainError {
    /// No factory is registered for the requested filter type.
    #[error("unknown filter type `{filter_type}` for filter `{name}`")]
    UnknownFilterType {
        /// Configured filter name.
        name: String,
        /// Requested filter type.
        filter_type: String,
    },
    /// Two filters in the same chain share a name.
    #[error("filter name `{0}` is used more than once")]
    DuplicateName(String),
    /// A factory for this filter type was already registered.
    #[error("filter type `{0}` was already registered")]
    DuplicateFilterType(String),
    /// The factory rejected the filter's configuration.
    #[error("invalid configuration for filter `{name}`: {reason}")]
    InvalidConfig {
        /// Configured filter name.
        name: String,
        /// Description supplied by the factory.
        reason: String,
    },
}

/// Returned by a [`crate::transport::Transport`] that can no longer accept
/// frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("transport closed")]
pub struct TransportClosed;

/// Errors returned to callers submitting work to a dispatcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The connection has already closed.
    #[error("connection closed")]
    Closed,
}
