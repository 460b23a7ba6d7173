//! Utilities for driving a [`FilterDispatcher`](filterframe::FilterDispatcher)
//! over in-memory transports during tests.
//!
//! ```rust
//! use filterframe::{ApiKey, FilterChain};
//! use filterframe_testing::{Harness, request};
//!
//! # async fn example() {
//! let mut harness = Harness::with_chain(FilterChain::empty());
//! harness.request(request(ApiKey::API_VERSIONS, 1, b"v")).await;
//! assert_eq!(harness.backend_frames().len(), 1);
//! # }
//! ```

pub mod filters;
pub mod harness;
mod logging;

pub use filters::{Deferrals, Deferred, TAG_EXTENSION, dropping, passthrough, rejecting, tagging, tags};
pub use harness::{Harness, correlation_ids, payloads, produce, request, response};
pub use logging::{LoggerHandle, logger};
