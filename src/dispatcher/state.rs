//! Per-direction lane state.

use std::collections::VecDeque;

use tokio::sync::oneshot;

use crate::{
    chain::Cursor,
    deadline::DeadlineKey,
    filter::{Continuation, ContinuationId, SendOutcome},
    frame::{Body, Direction, FilterId, Frame, Header, Origin, Payload},
};

/// One of the worker's FIFO lanes.
///
/// Frames a filter injected travel on lanes of their own, so an issuer
/// waiting on its own request never blocks the frames that answer it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum LaneId {
    /// Requests from the client.
    Requests,
    /// Backend responses owed to the client.
    Responses,
    /// Requests issued by filters, in injection order.
    IssuedRequests,
    /// Backend responses to requests issued by filters.
    IssuedResponses,
}

impl LaneId {
    pub(super) const ALL: [Self; 4] = [
        Self::Requests,
        Self::Responses,
        Self::IssuedRequests,
        Self::IssuedResponses,
    ];

    pub(super) fn index(self) -> usize {
        match self {
            Self::Requests => 0,
            Self::Responses => 1,
            Self::IssuedRequests => 2,
            Self::IssuedResponses => 3,
        }
    }

    pub(super) fn direction(self) -> Direction {
        match self {
            Self::Requests | Self::IssuedRequests => Direction::Request,
            Self::Responses | Self::IssuedResponses => Direction::Response,
        }
    }
}

/// Where a frame goes once the chain is exhausted.
pub(super) enum Target {
    /// Request bound for the backend.
    Backend,
    /// Response bound for the client.
    Client,
    /// Response to an out-of-band request, resolving the issuer's handle.
    Filter {
        issuer: FilterId,
        reply: oneshot::Sender<SendOutcome>,
    },
}

impl std::fmt::Debug for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Backend => f.write_str("Backend"),
            Self::Client => f.write_str("Client"),
            Self::Filter { issuer, .. } => f.debug_tuple("Filter").field(issuer).finish(),
        }
    }
}

/// A frame travelling through the chain.
#[derive(Debug)]
pub(super) struct InFlight {
    pub(super) origin: Origin,
    pub(super) header: Header,
    pub(super) payload: Payload,
    pub(super) cursor: Cursor,
    pub(super) target: Target,
}

impl InFlight {
    /// Move the decoded body out, leaving an empty opaque payload behind.
    pub(super) fn take_body(&mut self) -> Body {
        match std::mem::replace(&mut self.payload, Payload::Opaque(bytes::Bytes::new())) {
            Payload::Decoded(body) => body,
            Payload::Opaque(bytes) => Body::new(bytes),
        }
    }

    pub(super) fn into_frame(self, direction: Direction) -> Frame {
        Frame {
            direction,
            origin: self.origin,
            header: self.header,
            payload: self.payload,
        }
    }
}

/// The frame a lane is waiting on.
#[derive(Debug)]
pub(super) struct Active {
    pub(super) continuation: Continuation,
    pub(super) filter: FilterId,
    pub(super) deadline: DeadlineKey,
    /// Header as handed to the filter. The body is owned by the filter.
    pub(super) flight: InFlight,
}

#[derive(Debug)]
pub(super) enum LaneState {
    Idle,
    AwaitingFilter(Box<Active>),
    Closed,
}

/// Processing state of one direction.
#[derive(Debug)]
pub(super) struct Lane {
    state: LaneState,
    queue: VecDeque<Frame>,
    /// Set while a frame of this lane is passing through the chain.
    driving: bool,
}

impl Default for Lane {
    fn default() -> Self {
        Self {
            state: LaneState::Idle,
            queue: VecDeque::new(),
            driving: false,
        }
    }
}

impl Lane {
    pub(super) fn is_idle(&self) -> bool { matches!(self.state, LaneState::Idle) }

    pub(super) fn is_closed(&self) -> bool { matches!(self.state, LaneState::Closed) }

    /// Id of the continuation this lane waits on.
    pub(super) fn awaiting(&self) -> Option<&Continuation> {
        match &self.state {
            LaneState::AwaitingFilter(active) => Some(&active.continuation),
            LaneState::Idle | LaneState::Closed => None,
        }
    }

    pub(super) fn is_awaiting(&self, id: ContinuationId) -> bool {
        self.awaiting().is_some_and(|continuation| continuation.id == id)
    }

    /// Queue a frame behind the one in flight.
    pub(super) fn enqueue(&mut self, frame: Frame) {
        if !self.is_closed() {
            self.queue.push_back(frame);
        }
    }

    /// Next queued frame, if the lane is free to process it.
    pub(super) fn next_ready(&mut self) -> Option<Frame> {
        if self.is_idle() && !self.driving {
            self.queue.pop_front()
        } else {
            None
        }
    }

    /// Mark a frame as travelling the chain, holding back queued frames.
    pub(super) fn set_driving(&mut self, driving: bool) { self.driving = driving; }

    pub(super) fn park(&mut self, active: Active) { self.state = LaneState::AwaitingFilter(Box::new(active)); }

    /// Return to idle, yielding the frame that was waited on.
    pub(super) fn take_active(&mut self) -> Option<Active> {
        match std::mem::replace(&mut self.state, LaneState::Idle) {
            LaneState::AwaitingFilter(active) => Some(*active),
            other => {
                self.state = other;
                None
            }
        }
    }

    /// Enter the closed state, returning what was in flight and queued.
    pub(super) fn close(&mut self) -> (Option<Active>, usize) {
        let active = self.take_active();
        let discarded = self.queue.len();
        self.queue.clear();
        self.state = LaneState::Closed;
        (active, discarded)
    }

    #[cfg(test)]
    pub(super) fn queued(&self) -> usize { self.queue.len() }
}
