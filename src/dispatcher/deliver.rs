//! Handing frames to transports and filters once the chain is done.

use log::debug;

use super::{
    CloseReason,
    FilterDispatcher,
    state::{InFlight, Target},
};
use crate::{
    correlation::{PendingResponse, Recipient},
    error::FilterError,
    filter::SendOutcome,
    frame::{Body, Direction, FilterId, Frame, Header, Origin, Payload},
    metrics,
};

impl FilterDispatcher {
    /// Deliver a frame that has passed every claiming filter.
    pub(super) fn deliver(&mut self, direction: Direction, flight: InFlight) {
        match flight.target {
            Target::Backend => self.send_to_backend(flight.into_frame(direction)),
            Target::Client => self.send_to_client(flight.into_frame(direction)),
            Target::Filter { issuer, reply } => {
                let body = match flight.payload {
                    Payload::Decoded(body) => body,
                    Payload::Opaque(bytes) => Body::new(bytes),
                };
                if reply.send(Ok(Some(body))).is_err() {
                    debug!(
                        "out-of-band response unclaimed: id={:?}, filter={issuer}, \
                         correlation_id={}",
                        self.connection_id, flight.header.correlation_id
                    );
                }
            }
        }
    }

    /// Release a frame a filter dropped.
    pub(super) fn discard(&mut self, direction: Direction, filter: &FilterId, flight: InFlight) {
        metrics::inc_dropped(direction);
        tracing::debug!(
            connection_id = ?self.connection_id,
            %filter,
            %direction,
            correlation_id = flight.header.correlation_id,
            "frame dropped"
        );
        let correlation_id = flight.header.correlation_id;
        match (flight.target, flight.origin) {
            (Target::Backend, Origin::Filter(_)) => {
                let error = FilterError::failed(format!("request dropped by {filter}"));
                self.answer_issuer(correlation_id, Err(error));
            }
            (Target::Backend | Target::Client, _) => {
                let released = self.orderer.cancel(correlation_id);
                self.release_to_client(released);
            }
            (Target::Filter { reply, .. }, _) => {
                let error = FilterError::failed(format!("response dropped by {filter}"));
                let _ = reply.send(Err(error));
            }
        }
    }

    /// Answer a request without contacting the backend.
    ///
    /// Client requests are answered to the client; requests a filter issued
    /// resolve the issuer's handle.
    pub(super) fn short_circuit(&mut self, request: &InFlight, mut header: Header, body: Body) {
        if let Origin::Filter(_) = request.origin {
            self.answer_issuer(request.header.correlation_id, Ok(Some(body)));
            return;
        }
        header.correlation_id = request.header.correlation_id;
        header.api_key = request.header.api_key;
        header.api_version = request.header.api_version;
        self.send_to_client(Frame {
            direction: Direction::Response,
            origin: Origin::Client,
            header,
            payload: Payload::Decoded(body),
        });
    }

    /// Settle an issued request that never reaches the backend.
    fn answer_issuer(&mut self, correlation_id: i32, outcome: SendOutcome) {
        let Some(pending) = self.upstream.registry.take(correlation_id) else {
            return;
        };
        if let Recipient::Filter {
            reply, deadline, ..
        } = pending.recipient
        {
            self.upstream.deadlines.cancel(&deadline);
            let _ = reply.send(outcome);
        }
    }

    fn send_to_backend(&mut self, frame: Frame) {
        let correlation_id = frame.correlation_id();
        match (&frame.origin, frame.expects_response()) {
            // Registered when the filter issued it.
            (Origin::Filter(_), _) => {}
            (Origin::Client, true) => {
                let pending = PendingResponse {
                    api_key: frame.header.api_key,
                    api_version: frame.header.api_version,
                    recipient: Recipient::Client,
                };
                if self.upstream.registry.register(correlation_id, pending).is_err() {
                    self.close(CloseReason::DuplicateCorrelation(correlation_id));
                    return;
                }
            }
            (Origin::Client, false) => {
                let released = self.orderer.cancel(correlation_id);
                self.release_to_client(released);
            }
        }
        if self.upstream.backend.accept(frame).is_err() {
            self.close(CloseReason::TransportClosed);
            return;
        }
        metrics::inc_forwarded(Direction::Request);
    }

    /// Deliver a client-bound response once every earlier one has gone.
    fn send_to_client(&mut self, frame: Frame) {
        match self.orderer.complete(frame) {
            Ok(released) => self.release_to_client(released),
            Err(unordered) => self.release_to_client([unordered]),
        }
    }

    pub(super) fn release_to_client(&mut self, frames: impl IntoIterator<Item = Frame>) {
        for frame in frames {
            if self.is_closed() {
                return;
            }
            if self.client.accept(frame).is_err() {
                self.close(CloseReason::TransportClosed);
                return;
            }
            metrics::inc_forwarded(Direction::Response);
        }
    }
}
