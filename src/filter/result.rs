//! Filter decisions and the completion handles carrying them.

use std::future::Future;

use futures::future::BoxFuture;

use crate::{
    error::FilterError,
    frame::{Body, Header},
};

/// What happens to the message a filter was handed.
#[derive(Debug)]
pub enum FilterAction {
    /// Pass the (possibly replaced) message to the next filter or transport.
    Forward {
        /// Header to pass on.
        header: Header,
        /// Body to pass on.
        body: Body,
    },
    /// Terminate processing; nothing is forwarded.
    Drop,
    /// Answer the client directly instead of contacting the backend.
    ///
    /// Only valid for requests.
    ShortCircuit {
        /// Header of the synthesized response.
        header: Header,
        /// Body of the synthesized response.
        body: Body,
    },
}

/// Decision returned by a filter.
///
/// ```
/// use filterframe::{
///     filter::FilterResult,
///     frame::{ApiKey, Body, Header},
/// };
///
/// let header = Header::request(ApiKey::API_VERSIONS, 3, 1);
/// let result = FilterResult::forward(header, Body::default()).with_close_connection();
/// assert!(result.closes_connection());
/// ```
#[derive(Debug)]
#[must_use]
pub struct FilterResult {
    action: FilterAction,
    close_connection: bool,
}

impl FilterResult {
    /// Forward `header` and `body` to the next stage.
    pub fn forward(header: Header, body: Body) -> Self {
        Self {
            action: FilterAction::Forward { header, body },
            close_connection: false,
        }
    }

    /// Drop the message.
    pub fn drop() -> Self {
        Self {
            action: FilterAction::Drop,
            close_connection: false,
        }
    }

    /// Respond to the client without forwarding the request.
    pub fn short_circuit(header: Header, body: Body) -> Self {
        Self {
            action: FilterAction::ShortCircuit { header, body },
            close_connection: false,
        }
    }

    /// Drop the message and close the connection.
    pub fn close() -> Self { Self::drop().with_close_connection() }

    /// Close the connection once the action has been performed.
    pub fn with_close_connection(mut self) -> Self {
        self.close_connection = true;
        self
    }

    /// Returns `true` if the connection closes after this result.
    #[must_use]
    pub fn closes_connection(&self) -> bool { self.close_connection }

    /// Inspect the action.
    #[must_use]
    pub fn action(&self) -> &FilterAction { &self.action }

    /// Split into the action and the close flag.
    #[must_use]
    pub fn into_parts(self) -> (FilterAction, bool) { (self.action, self.close_connection) }

    /// Wrap in an already-completed [`FilterCompletion`].
    pub fn completed(self) -> FilterCompletion { FilterCompletion::ready(self) }
}

/// Identifies one filter invocation on a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContinuationId(pub(crate) u64);

pub(crate) type FilterOutcome = Result<FilterResult, FilterError>;

pub(crate) enum CompletionKind {
    Ready(FilterOutcome),
    Deferred(ContinuationId),
    Future(BoxFuture<'static, FilterOutcome>),
}

/// Handle returned by a filter invocation.
///
/// A completion is either immediate, deferred to a [`crate::filter::Promise`]
/// obtained from [`crate::filter::FilterContext::defer`], or backed by a
/// future that the connection worker polls itself.
#[must_use]
pub struct FilterCompletion(pub(crate) CompletionKind);

impl FilterCompletion {
    /// Complete immediately with `result`.
    pub fn ready(result: FilterResult) -> Self { Self(CompletionKind::Ready(Ok(result))) }

    /// Complete immediately with a failure.
    pub fn failed(error: FilterError) -> Self { Self(CompletionKind::Ready(Err(error))) }

    /// Complete once `future` resolves.
    ///
    /// The future is polled on the connection worker, so code after an
    /// `.await` runs in the same logical thread as the invocation itself.
    pub fn from_future<F>(future: F) -> Self
    where
        F: Future<Output = Result<FilterResult, FilterError>> + Send + 'static,
    {
        Self(CompletionKind::Future(Box::pin(future)))
    }

    pub(crate) fn deferred(id: ContinuationId) -> Self { Self(CompletionKind::Deferred(id)) }

    pub(crate) fn into_kind(self) -> CompletionKind { self.0 }
}

impl std::fmt::Debug for FilterCompletion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            CompletionKind::Ready(outcome) => f.debug_tuple("Ready").field(outcome).finish(),
            CompletionKind::Deferred(id) => f.debug_tuple("Deferred").field(id).finish(),
            CompletionKind::Future(_) => f.write_str("Future(..)"),
        }
    }
}

impl From<FilterResult> for FilterCompletion {
    fn from(result: FilterResult) -> Self { Self::ready(result) }
}
