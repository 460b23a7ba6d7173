//! Context handed to a filter for the duration of one invocation.

use tokio::sync::mpsc;

use super::{
    promise::{Continuation, Promise},
    result::{FilterCompletion, FilterResult},
    send::SendHandle,
};
use crate::{
    dispatcher::WorkerEvent,
    frame::{ApiKey, Body, Direction, FilterId, Header, Origin},
};

/// Backend-side facility used by [`FilterContext::send_request`].
pub(crate) trait RequestIssuer {
    /// Write an out-of-band request for `issuer` and return its handle.
    fn issue(&mut self, issuer: &FilterId, header: Header, body: Body) -> SendHandle;
}

/// Capabilities available to a filter while it is being invoked.
///
/// The context borrows connection state, so it is only usable during the
/// invocation. Deferred work keeps a [`Promise`] instead.
pub struct FilterContext<'a> {
    filter: &'a FilterId,
    direction: Direction,
    origin: &'a Origin,
    continuation: &'a Continuation,
    events: &'a mpsc::UnboundedSender<WorkerEvent>,
    issuer: &'a mut dyn RequestIssuer,
}

pub(crate) struct ContextParts<'a> {
    pub(crate) filter: &'a FilterId,
    pub(crate) direction: Direction,
    pub(crate) origin: &'a Origin,
    pub(crate) continuation: &'a Continuation,
    pub(crate) events: &'a mpsc::UnboundedSender<WorkerEvent>,
    pub(crate) issuer: &'a mut dyn RequestIssuer,
}

impl<'a> FilterContext<'a> {
    pub(crate) fn new(parts: ContextParts<'a>) -> Self {
        let ContextParts {
            filter,
            direction,
            origin,
            continuation,
            events,
            issuer,
        } = parts;
        Self {
            filter,
            direction,
            origin,
            continuation,
            events,
            issuer,
        }
    }

    /// Identity of the filter being invoked.
    #[must_use]
    pub fn filter(&self) -> &FilterId { self.filter }

    /// Direction of the message being filtered.
    #[must_use]
    pub fn direction(&self) -> Direction { self.direction }

    /// Producer of the message being filtered.
    #[must_use]
    pub fn origin(&self) -> &Origin { self.origin }

    /// Build a forward result.
    pub fn forward(&self, header: Header, body: Body) -> FilterResult {
        FilterResult::forward(header, body)
    }

    /// Build a drop result.
    pub fn drop(&self) -> FilterResult { FilterResult::drop() }

    /// Defer the decision for this invocation.
    ///
    /// Return the completion from the filter and resolve the promise later,
    /// from any thread. The dispatcher stops advancing this direction until
    /// the promise resolves or its deadline fires.
    pub fn defer(&mut self) -> (FilterCompletion, Promise) {
        let promise = Promise::new(self.continuation.clone(), self.events.clone());
        (FilterCompletion::deferred(self.continuation.id), promise)
    }

    /// Issue a request to the backend on behalf of this filter.
    ///
    /// The request first passes the request filters between this filter and
    /// the backend, in issue order, ahead of any frame still waiting on this
    /// filter. Its response passes the response filters between the backend
    /// and this filter, then resolves the returned handle instead of reaching
    /// the client. Requests that receive no response resolve at once with
    /// `Ok(None)`.
    pub fn send_request(&mut self, api_key: ApiKey, api_version: i16, body: Body) -> SendHandle {
        let header = Header::request(api_key, api_version, 0);
        self.issuer.issue(self.filter, header, body)
    }
}

impl std::fmt::Debug for FilterContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterContext")
            .field("filter", self.filter)
            .field("direction", &self.direction)
            .field("origin", self.origin)
            .finish_non_exhaustive()
    }
}
