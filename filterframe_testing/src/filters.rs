//! Ready-made filters for exercising a dispatcher.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, PoisonError},
};

use bytes::Bytes;
use filterframe::{
    ApiKey,
    Body,
    Filter,
    FilterResult,
    Header,
    filter::{self, ApiSelector, Capabilities, Promise},
};

/// Extension key used by [`tagging`] filters.
pub const TAG_EXTENSION: u32 = 500;

/// Forward every claimed message after appending `tag` under
/// [`TAG_EXTENSION`].
pub fn tagging(capabilities: Capabilities, tag: &'static str) -> impl Filter {
    filter::from_fn(capabilities, move |invocation, ctx| {
        let (header, mut body) = invocation.into_parts();
        body.extensions_mut()
            .push(TAG_EXTENSION, Bytes::from_static(tag.as_bytes()));
        ctx.forward(header, body).completed()
    })
}

/// Forward every claimed message unchanged.
pub fn passthrough(capabilities: Capabilities) -> impl Filter {
    filter::from_fn(capabilities, |invocation, ctx| {
        let (header, body) = invocation.into_parts();
        ctx.forward(header, body).completed()
    })
}

/// Drop requests of `api_key`, optionally closing the connection.
pub fn dropping(api_key: ApiKey, close: bool) -> impl Filter {
    filter::from_fn(
        Capabilities::requests(ApiSelector::key(api_key)),
        move |_invocation, _ctx| {
            let result = FilterResult::drop();
            if close {
                result.with_close_connection().completed()
            } else {
                result.completed()
            }
        },
    )
}

/// Answer requests of `api_key` directly with a `rejected` body.
pub fn rejecting(api_key: ApiKey) -> impl Filter {
    filter::from_fn(
        Capabilities::requests(ApiSelector::key(api_key)),
        |invocation, _ctx| {
            let correlation_id = invocation.header().correlation_id;
            FilterResult::short_circuit(
                Header::response(correlation_id),
                Body::new(Bytes::from_static(b"rejected")),
            )
            .completed()
        },
    )
}

/// Tags extension values found on `body`, in order.
pub fn tags(body: &Body) -> Vec<String> {
    body.extensions()
        .get_all(TAG_EXTENSION)
        .map(|value| String::from_utf8_lossy(value).into_owned())
        .collect()
}

/// A message whose filter decision was deferred.
pub struct Deferred {
    /// Header handed to the filter.
    pub header: Header,
    /// Body handed to the filter.
    pub body: Body,
    /// Resolver for the decision.
    pub promise: Promise,
}

impl Deferred {
    /// Resolve by forwarding the message unchanged.
    pub fn forward(self) -> bool {
        self.promise
            .resolve(FilterResult::forward(self.header, self.body))
    }
}

/// Shared queue of deferred invocations.
///
/// Filters created by [`Deferrals::filter`] defer every claimed message and
/// park it here so tests decide when and from which thread it resolves.
#[derive(Clone, Default)]
pub struct Deferrals(Arc<Mutex<VecDeque<Deferred>>>);

impl Deferrals {
    /// Create an empty queue.
    pub fn new() -> Self { Self::default() }

    /// A filter deferring every message `capabilities` claims.
    pub fn filter(&self, capabilities: Capabilities) -> impl Filter {
        let queue = self.clone();
        filter::from_fn(capabilities, move |invocation, ctx| {
            let (header, body) = invocation.into_parts();
            let (completion, promise) = ctx.defer();
            queue.lock().push_back(Deferred {
                header,
                body,
                promise,
            });
            completion
        })
    }

    /// Oldest deferred message not yet taken.
    pub fn take(&self) -> Option<Deferred> { self.lock().pop_front() }

    /// Number of deferred messages not yet taken.
    pub fn len(&self) -> usize { self.lock().len() }

    /// Returns `true` if nothing is waiting.
    pub fn is_empty(&self) -> bool { self.lock().is_empty() }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Deferred>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
