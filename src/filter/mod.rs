//! The filter capability contract.
//!
//! A [`Filter`] declares, once, which api keys and versions it wants to see in
//! each direction via [`Capabilities`]. For every claimed message it receives
//! an [`Invocation`] and a [`FilterContext`], and returns a
//! [`FilterCompletion`] carrying a [`FilterResult`].

mod capabilities;
mod context;
mod promise;
mod result;
mod send;

pub use capabilities::{ApiSelector, Capabilities, VersionRange};
pub(crate) use context::{ContextParts, RequestIssuer};
pub use context::FilterContext;
pub(crate) use promise::Continuation;
pub use promise::{Promise, PromiseState};
pub(crate) use result::{CompletionKind, FilterOutcome};
pub use result::{ContinuationId, FilterAction, FilterCompletion, FilterResult};
pub(crate) use send::on_worker;
pub use send::{SendHandle, SendOutcome};

use crate::frame::{Body, Direction, Header};

/// Message handed to a filter, tagged by direction.
#[derive(Debug)]
pub enum Invocation {
    /// A request travelling towards the backend.
    Request {
        /// Request header.
        header: Header,
        /// Decoded request body.
        body: Body,
    },
    /// A response travelling towards the client.
    Response {
        /// Response header.
        header: Header,
        /// Decoded response body.
        body: Body,
    },
}

impl Invocation {
    pub(crate) fn new(direction: Direction, header: Header, body: Body) -> Self {
        match direction {
            Direction::Request => Self::Request { header, body },
            Direction::Response => Self::Response { header, body },
        }
    }

    /// Direction of the message.
    #[must_use]
    pub fn direction(&self) -> Direction {
        match self {
            Self::Request { .. } => Direction::Request,
            Self::Response { .. } => Direction::Response,
        }
    }

    /// Header of the message.
    #[must_use]
    pub fn header(&self) -> &Header {
        match self {
            Self::Request { header, .. } | Self::Response { header, .. } => header,
        }
    }

    /// Schema version of the message.
    #[must_use]
    pub fn api_version(&self) -> i16 { self.header().api_version }

    /// Take ownership of the header and body.
    #[must_use]
    pub fn into_parts(self) -> (Header, Body) {
        match self {
            Self::Request { header, body } | Self::Response { header, body } => (header, body),
        }
    }
}

/// A pluggable unit observing, mutating or short-circuiting messages.
///
/// Filters are shared read-only by every invocation on a connection and are
/// always invoked from that connection's worker.
pub trait Filter: Send + Sync + 'static {
    /// Declare the messages this filter handles.
    ///
    /// Called once while the chain is built.
    fn capabilities(&self) -> Capabilities;

    /// Handle one claimed message.
    fn on_message(&self, invocation: Invocation, ctx: &mut FilterContext<'_>) -> FilterCompletion;
}

/// Filter built from a closure.
pub struct FnFilter<F> {
    capabilities: Capabilities,
    handler: F,
}

impl<F> Filter for FnFilter<F>
where
    F: Fn(Invocation, &mut FilterContext<'_>) -> FilterCompletion + Send + Sync + 'static,
{
    fn capabilities(&self) -> Capabilities { self.capabilities.clone() }

    fn on_message(&self, invocation: Invocation, ctx: &mut FilterContext<'_>) -> FilterCompletion {
        (self.handler)(invocation, ctx)
    }
}

/// Create a filter from `capabilities` and a handler closure.
///
/// ```
/// use filterframe::{
///     filter::{self, ApiSelector, Capabilities},
///     frame::ApiKey,
/// };
///
/// let passthrough = filter::from_fn(
///     Capabilities::requests(ApiSelector::key(ApiKey::API_VERSIONS)),
///     |invocation, ctx| {
///         let (header, body) = invocation.into_parts();
///         ctx.forward(header, body).completed()
///     },
/// );
/// # let _ = passthrough;
/// ```
pub fn from_fn<F>(capabilities: Capabilities, handler: F) -> FnFilter<F>
where
    F: Fn(Invocation, &mut FilterContext<'_>) -> FilterCompletion + Send + Sync + 'static,
{
    FnFilter {
        capabilities,
        handler,
    }
}
