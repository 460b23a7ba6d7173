//! Failure handling and connection teardown.

use std::fmt;

use log::{error, info, warn};

use super::{FilterDispatcher, state::LaneId};
use crate::{
    correlation::Recipient,
    error::{FilterError, FilterErrorKind},
    frame::{Direction, FilterId},
    metrics,
};

/// Why a connection closed.
#[derive(Debug)]
pub(super) enum CloseReason {
    /// A filter result carried the close flag.
    Requested(FilterId),
    /// A continuation failed, panicked or timed out.
    FilterFailed {
        filter: FilterId,
        kind: FilterErrorKind,
    },
    /// A client reused a correlation id still in flight.
    DuplicateCorrelation(i32),
    /// A transport reported closed.
    TransportClosed,
    /// The shutdown token was cancelled.
    Shutdown,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested(filter) => write!(f, "requested by {filter}"),
            Self::FilterFailed { filter, kind } => write!(f, "filter {filter} {kind}"),
            Self::DuplicateCorrelation(id) => write!(f, "duplicate correlation id {id}"),
            Self::TransportClosed => f.write_str("transport closed"),
            Self::Shutdown => f.write_str("shutdown"),
        }
    }
}

impl FilterDispatcher {
    /// Log a failed continuation and close the connection.
    pub(super) fn fail(&mut self, direction: Direction, filter: &FilterId, err: &FilterError) {
        match err.kind() {
            FilterErrorKind::Timeout => warn!(
                "filter timed out: id={:?}, filter={filter}, direction={direction}, kind={}, \
                 error={}",
                self.connection_id,
                err.kind(),
                err.message()
            ),
            kind => error!(
                "filter failed: id={:?}, filter={filter}, direction={direction}, kind={kind}, \
                 error={}",
                self.connection_id,
                err.message()
            ),
        }
        metrics::inc_failures(err.kind());
        self.close(CloseReason::FilterFailed {
            filter: filter.clone(),
            kind: err.kind(),
        });
    }

    /// Close the connection. Subsequent calls have no effect.
    ///
    /// Pending continuations are cancelled so late resolutions are ignored,
    /// queued frames of every lane are released without reaching any
    /// filter, out-of-band handles fail with a closed error and every deadline
    /// is disarmed.
    pub(super) fn close(&mut self, reason: CloseReason) {
        if self.is_closed() {
            return;
        }
        let mut discarded = 0;
        for lane in LaneId::ALL {
            let (active, queued) = self.lane(lane).close();
            discarded += queued;
            if let Some(active) = active {
                active.continuation.cell.settle(Err(FilterErrorKind::Closed));
                discarded += 1;
            }
        }
        for (_, pending) in self.upstream.registry.drain() {
            if let Recipient::Filter { reply, .. } = pending.recipient {
                let _ = reply.send(Err(FilterError::closed()));
            }
        }
        self.upstream.deadlines.clear();
        self.polled.clear();
        self.orderer.clear();
        self.upstream.backend.close();
        self.client.close();
        self.shutdown.cancel();
        let _ = self.live.take();
        info!(
            "connection closed: id={:?}, reason={reason}, discarded={discarded}",
            self.connection_id
        );
    }
}
