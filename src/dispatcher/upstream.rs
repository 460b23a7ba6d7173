//! Backend side of a connection and the out-of-band request path.

use std::{collections::VecDeque, time::Duration};

use tokio::sync::oneshot;

use super::event::DeadlineTarget;
use crate::{
    correlation::{CorrelationRegistry, PendingResponse, Recipient},
    deadline::DeadlineScheduler,
    filter::{RequestIssuer, SendHandle},
    frame::{Body, Direction, FilterId, Frame, Header, Origin, Payload},
    metrics,
    transport::Transport,
};

/// State shared by the request path and filters issuing their own requests.
pub(super) struct Upstream {
    pub(super) backend: Box<dyn Transport>,
    pub(super) registry: CorrelationRegistry,
    pub(super) deadlines: DeadlineScheduler<DeadlineTarget>,
    pub(super) request_timeout: Duration,
    /// Requests issued during the current invocation, not yet on a lane.
    issued: VecDeque<Frame>,
}

impl Upstream {
    pub(super) fn new(backend: Box<dyn Transport>, request_timeout: Duration) -> Self {
        Self {
            backend,
            registry: CorrelationRegistry::default(),
            deadlines: DeadlineScheduler::default(),
            request_timeout,
            issued: VecDeque::new(),
        }
    }

    /// Hand over the requests issued since the last call, in issue order.
    pub(super) fn take_issued(&mut self) -> VecDeque<Frame> { std::mem::take(&mut self.issued) }

    /// Returns `true` if `correlation_id` answers a request a filter issued.
    pub(super) fn awaits_filter(&self, correlation_id: i32) -> bool {
        self.registry.is_for_filter(correlation_id)
    }
}

impl RequestIssuer for Upstream {
    fn issue(&mut self, issuer: &FilterId, mut header: Header, body: Body) -> SendHandle {
        let correlation_id = self.registry.allocate_internal();
        header.correlation_id = correlation_id;
        let expects_response = body.expects_response(header.api_key);
        let (api_key, api_version) = (header.api_key, header.api_version);
        self.issued.push_back(Frame {
            direction: Direction::Request,
            origin: Origin::Filter(issuer.clone()),
            header,
            payload: Payload::Decoded(body),
        });
        metrics::inc_out_of_band();
        tracing::debug!(filter = %issuer, correlation_id, %api_key, "out-of-band request issued");
        if !expects_response {
            return SendHandle::ready(Ok(None));
        }

        let (reply, rx) = oneshot::channel();
        let deadline = self
            .deadlines
            .arm(DeadlineTarget::OutOfBand(correlation_id), self.request_timeout);
        let pending = PendingResponse {
            api_key,
            api_version,
            recipient: Recipient::Filter {
                issuer: issuer.clone(),
                reply,
                deadline,
            },
        };
        // allocate_internal never yields an id that is still registered.
        let registered = self.registry.register(correlation_id, pending).is_ok();
        debug_assert!(registered, "internal correlation id {correlation_id} in use");
        SendHandle::waiting(rx)
    }
}
