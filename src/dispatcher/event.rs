//! Event types for the dispatcher select loop.

use tokio::sync::oneshot;

use super::state::LaneId;
use crate::{
    filter::{ContinuationId, FilterOutcome},
    frame::Frame,
};

/// What an expired deadline refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum DeadlineTarget {
    /// The pending continuation of a lane.
    Continuation { lane: LaneId, id: ContinuationId },
    /// An out-of-band request awaiting its response.
    OutOfBand(i32),
}

/// Work posted to a connection worker from outside its task.
#[derive(Debug)]
pub(crate) enum WorkerEvent {
    /// A decoded or opaque request from the client.
    ClientRequest(Frame),
    /// A response from the backend.
    BackendResponse(Frame),
    /// A deferred continuation settled through its promise.
    Resolved {
        id: ContinuationId,
        outcome: FilterOutcome,
    },
    /// Acknowledge once every earlier event has been processed.
    Flush(oneshot::Sender<()>),
}

/// Events returned by [`FilterDispatcher::next_event`][super::FilterDispatcher::next_event].
#[derive(Debug)]
pub(super) enum Event {
    Shutdown,
    Deadline(DeadlineTarget),
    /// A filter-provided future completed on the worker.
    Polled(ContinuationId, FilterOutcome),
    Worker(WorkerEvent),
}
