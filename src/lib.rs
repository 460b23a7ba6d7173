#![doc(html_root_url = "https://docs.rs/filterframe/latest")]
//! Public API for the `filterframe` library.
//!
//! This crate provides the per-connection filter dispatch engine of an
//! intercepting protocol proxy: an ordered chain of filters observing,
//! mutating, dropping or answering messages in both directions, driven by a
//! single connection worker that preserves per-direction arrival order even
//! when filters resolve asynchronously from other threads.

pub mod chain;
pub mod config;
mod correlation;
mod deadline;
pub mod dispatcher;
pub mod error;
pub mod filter;
pub mod frame;
pub mod metrics;
mod ordering;
pub mod transport;

pub use chain::{ChainBuilder, FilterChain, FilterDefinition, FilterFactory, FilterRegistry};
pub use config::DispatcherConfig;
pub use dispatcher::{DispatcherHandle, FilterDispatcher};
pub use error::{ChainError, DispatchError, FilterError, FilterErrorKind, TransportClosed};
pub use filter::{Filter, FilterCompletion, FilterContext, FilterResult, Invocation};
pub use frame::{ApiKey, Body, Direction, Frame, Header};
pub use metrics::active_dispatcher_count;
pub use transport::{ChannelTransport, Transport};
