//! Event dispatching and chain traversal for the connection worker.

use std::panic::{AssertUnwindSafe, catch_unwind};

use futures::FutureExt;
use log::{debug, warn};

use super::{
    CloseReason,
    FilterDispatcher,
    event::{DeadlineTarget, Event, WorkerEvent},
    state::{Active, InFlight, LaneId, Target},
};
use crate::{
    chain::Cursor,
    correlation::Recipient,
    error::{FilterError, FilterErrorKind},
    filter::{
        CompletionKind,
        ContextParts,
        Continuation,
        ContinuationId,
        FilterAction,
        FilterContext,
        FilterOutcome,
        Invocation,
        on_worker,
    },
    frame::{Direction, FilterId, Frame, Origin, Payload},
};

/// Whether a traversal finished or is waiting on a continuation.
enum Step {
    Done,
    Parked,
}

/// Result of applying a filter's decision to the frame it was handed.
enum Applied {
    /// Carry on with the next filter.
    Continue(InFlight),
    /// Nothing more to do for this frame.
    Done,
}

impl FilterDispatcher {
    /// Dispatch the given event to the appropriate handler.
    pub(super) fn dispatch_event(&mut self, event: Event) {
        match event {
            Event::Shutdown => self.close(CloseReason::Shutdown),
            Event::Deadline(target) => self.process_deadline(target),
            Event::Polled(id, outcome) => self.process_polled(id, outcome),
            Event::Worker(WorkerEvent::ClientRequest(frame)) => self.admit_request(frame),
            Event::Worker(WorkerEvent::BackendResponse(frame)) => {
                let lane = if self.upstream.awaits_filter(frame.correlation_id()) {
                    LaneId::IssuedResponses
                } else {
                    LaneId::Responses
                };
                self.lane(lane).enqueue(frame);
                self.pump(lane);
            }
            Event::Worker(WorkerEvent::Resolved { id, outcome }) => self.resume(id, outcome),
            Event::Worker(WorkerEvent::Flush(ack)) => {
                let _ = ack.send(());
            }
        }
        if !self.is_closed() && (self.upstream.backend.is_closed() || self.client.is_closed()) {
            self.close(CloseReason::TransportClosed);
        }
    }

    /// Reserve the response slot for a client request and queue it.
    fn admit_request(&mut self, frame: Frame) {
        if self.is_closed() {
            return;
        }
        if frame.expects_response() {
            let correlation_id = frame.correlation_id();
            if self.upstream.registry.contains(correlation_id) || !self.orderer.expect(correlation_id)
            {
                self.close(CloseReason::DuplicateCorrelation(correlation_id));
                return;
            }
        }
        self.lane(LaneId::Requests).enqueue(frame);
        self.pump(LaneId::Requests);
    }

    /// Process queued frames until the lane waits on a filter or runs dry.
    ///
    /// Returns at once while the lane is already driving a frame; that caller
    /// picks the queued frames up when it is done.
    fn pump(&mut self, lane: LaneId) {
        while !self.is_closed() {
            let Some(frame) = self.lane(lane).next_ready() else {
                break;
            };
            let Some(flight) = self.begin(lane.direction(), frame) else {
                continue;
            };
            if let Step::Parked = self.drive(lane, flight) {
                break;
            }
        }
    }

    /// Work out where a frame is headed and which filters it visits.
    fn begin(&mut self, direction: Direction, frame: Frame) -> Option<InFlight> {
        let Frame {
            origin,
            mut header,
            payload,
            ..
        } = frame;
        if direction == Direction::Request {
            let cursor = match &origin {
                Origin::Client => Cursor::full(Direction::Request, &self.chain),
                Origin::Filter(issuer) => Cursor::past(issuer, Direction::Request, &self.chain),
            };
            return Some(InFlight {
                origin,
                header,
                payload,
                cursor,
                target: Target::Backend,
            });
        }

        let Some(pending) = self.upstream.registry.take(header.correlation_id) else {
            warn!(
                "unmatched response discarded: id={:?}, correlation_id={}",
                self.connection_id, header.correlation_id
            );
            return None;
        };
        header.api_key = pending.api_key;
        header.api_version = pending.api_version;
        let flight = match pending.recipient {
            Recipient::Client => InFlight {
                origin,
                header,
                payload,
                cursor: Cursor::full(Direction::Response, &self.chain),
                target: Target::Client,
            },
            Recipient::Filter {
                issuer,
                reply,
                deadline,
            } => {
                self.upstream.deadlines.cancel(&deadline);
                InFlight {
                    origin: Origin::Filter(issuer.clone()),
                    header,
                    payload,
                    cursor: Cursor::past(&issuer, Direction::Response, &self.chain),
                    target: Target::Filter { issuer, reply },
                }
            }
        };
        Some(flight)
    }

    /// Run `flight` through the remaining claiming filters.
    fn drive(&mut self, lane: LaneId, flight: InFlight) -> Step {
        self.lane(lane).set_driving(true);
        let step = self.traverse(lane, flight);
        self.lane(lane).set_driving(false);
        step
    }

    fn traverse(&mut self, lane: LaneId, mut flight: InFlight) -> Step {
        let direction = lane.direction();
        let chain = self.chain.clone();
        loop {
            if self.is_closed() {
                return Step::Done;
            }
            let claimant = match &flight.payload {
                Payload::Decoded(_) => chain.next_claimant(&mut flight.cursor, &flight.header),
                Payload::Opaque(_) => None,
            };
            let Some(entry) = claimant.and_then(|index| chain.entry(index)) else {
                self.deliver(direction, flight);
                return Step::Done;
            };

            let continuation = Continuation::new(self.next_continuation_id());
            let body = flight.take_body();
            let invocation = Invocation::new(direction, flight.header.clone(), body);
            let invoked = {
                let mut ctx = FilterContext::new(ContextParts {
                    filter: &entry.id,
                    direction,
                    origin: &flight.origin,
                    continuation: &continuation,
                    events: &self.events_tx,
                    issuer: &mut self.upstream,
                });
                catch_unwind(AssertUnwindSafe(|| entry.filter.on_message(invocation, &mut ctx)))
            };
            let kind = match invoked {
                Ok(completion) => completion.into_kind(),
                Err(panic) => CompletionKind::Ready(Err(FilterError::from_panic(panic.as_ref()))),
            };
            self.inject_issued();
            if self.is_closed() {
                continuation.cell.settle(Err(FilterErrorKind::Closed));
                return Step::Done;
            }

            let filter = entry.id.clone();
            match kind {
                CompletionKind::Ready(outcome) => {
                    match self.apply(lane, &filter, flight, outcome) {
                        Applied::Continue(next) => flight = next,
                        Applied::Done => return Step::Done,
                    }
                }
                CompletionKind::Deferred(id) if id == continuation.id => {
                    self.park(lane, filter, continuation, flight);
                    return Step::Parked;
                }
                CompletionKind::Deferred(_) => {
                    let error = FilterError::failed("completion belongs to another invocation");
                    self.fail(direction, &filter, &error);
                    return Step::Done;
                }
                CompletionKind::Future(future) => {
                    let id = continuation.id;
                    self.polled.push(Box::pin(async move {
                        let outcome = on_worker(AssertUnwindSafe(future).catch_unwind())
                            .await
                            .unwrap_or_else(|panic| Err(FilterError::from_panic(panic.as_ref())));
                        (id, outcome)
                    }));
                    self.park(lane, filter, continuation, flight);
                    return Step::Parked;
                }
            }
        }
    }

    /// Move requests issued during the last invocation onto their lane.
    ///
    /// They enter the chain straight away, ahead of the frame whose filter
    /// issued them.
    fn inject_issued(&mut self) {
        let issued = self.upstream.take_issued();
        if issued.is_empty() {
            return;
        }
        for frame in issued {
            self.lane(LaneId::IssuedRequests).enqueue(frame);
        }
        self.pump(LaneId::IssuedRequests);
    }

    /// Wait on `continuation`, arming its deadline.
    fn park(&mut self, lane: LaneId, filter: FilterId, continuation: Continuation, flight: InFlight) {
        let direction = lane.direction();
        let deadline = self.upstream.deadlines.arm(
            DeadlineTarget::Continuation {
                lane,
                id: continuation.id,
            },
            self.timeout(direction),
        );
        tracing::debug!(
            connection_id = ?self.connection_id,
            %filter,
            %direction,
            correlation_id = flight.header.correlation_id,
            "awaiting filter"
        );
        self.lane(lane).park(Active {
            continuation,
            filter,
            deadline,
            flight,
        });
    }

    /// Apply a filter's decision to the frame it was handed.
    fn apply(
        &mut self,
        lane: LaneId,
        filter: &FilterId,
        mut flight: InFlight,
        outcome: FilterOutcome,
    ) -> Applied {
        let direction = lane.direction();
        let result = match outcome {
            Ok(result) => result,
            Err(error) => {
                self.fail(direction, filter, &error);
                return Applied::Done;
            }
        };
        let (action, close) = result.into_parts();
        match action {
            FilterAction::Forward { mut header, body } => {
                header.correlation_id = flight.header.correlation_id;
                flight.header = header;
                flight.payload = Payload::Decoded(body);
                if !close {
                    return Applied::Continue(flight);
                }
                flight.cursor.exhaust();
                self.deliver(direction, flight);
            }
            FilterAction::Drop => self.discard(direction, filter, flight),
            FilterAction::ShortCircuit { header, body } => {
                if direction == Direction::Response {
                    let error = FilterError::failed("short-circuit is only valid for requests");
                    self.fail(direction, filter, &error);
                    return Applied::Done;
                }
                self.short_circuit(&flight, header, body);
            }
        }
        if close {
            let held = self.orderer.flush();
            self.release_to_client(held);
            self.close(CloseReason::Requested(filter.clone()));
        }
        Applied::Done
    }

    /// Apply the outcome of a pending continuation and move the lane on.
    fn resume(&mut self, id: ContinuationId, outcome: FilterOutcome) {
        if self.is_closed() {
            debug!(
                "late resolution ignored: id={:?}, continuation={id:?}",
                self.connection_id
            );
            return;
        }
        let Some(lane) = LaneId::ALL
            .into_iter()
            .find(|lane| self.lanes[lane.index()].is_awaiting(id))
        else {
            debug!(
                "stale resolution ignored: id={:?}, continuation={id:?}",
                self.connection_id
            );
            return;
        };
        let Some(active) = self.lane(lane).take_active() else {
            return;
        };
        self.upstream.deadlines.cancel(&active.deadline);
        if let Applied::Continue(flight) = self.apply(lane, &active.filter, active.flight, outcome)
            && let Step::Parked = self.drive(lane, flight)
        {
            return;
        }
        self.pump(lane);
    }

    /// Settle and apply the outcome of a filter future.
    fn process_polled(&mut self, id: ContinuationId, outcome: FilterOutcome) {
        let marker = outcome.as_ref().map(|_| ()).map_err(FilterError::kind);
        let settled = self
            .lanes
            .iter()
            .filter_map(|lane| lane.awaiting())
            .find(|continuation| continuation.id == id)
            .is_some_and(|continuation| continuation.cell.settle(marker));
        if settled {
            self.resume(id, outcome);
        }
    }

    fn process_deadline(&mut self, target: DeadlineTarget) {
        match target {
            DeadlineTarget::Continuation { lane, id } => {
                let Some(continuation) = self.lane(lane).awaiting() else {
                    return;
                };
                // A promise that settled first still has its outcome queued.
                if continuation.id != id || !continuation.cell.settle(Err(FilterErrorKind::Timeout)) {
                    return;
                }
                let Some(active) = self.lane(lane).take_active() else {
                    return;
                };
                let direction = lane.direction();
                let error = FilterError::timeout(self.timeout(direction));
                self.fail(direction, &active.filter, &error);
            }
            DeadlineTarget::OutOfBand(correlation_id) => {
                let Some(pending) = self.upstream.registry.take(correlation_id) else {
                    return;
                };
                if let Recipient::Filter { issuer, reply, .. } = pending.recipient {
                    let error = FilterError::timeout(self.upstream.request_timeout);
                    let _ = reply.send(Err(error.clone()));
                    self.fail(Direction::Request, &issuer, &error);
                }
            }
        }
    }
}
