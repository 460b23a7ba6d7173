//! Per-connection filter dispatch.
//!
//! A [`FilterDispatcher`] is the connection worker: a single task owning the
//! request and response lanes, the correlation registry and the deadline
//! scheduler. Frames arrive through a [`DispatcherHandle`]; promises resolved
//! on other threads post their outcome back onto the worker's event queue, so
//! every state transition and every filter invocation happens on the worker.
//!
//! Each lane processes one frame at a time. While a filter's continuation is
//! pending the lane queues later arrivals and forwards them strictly in
//! arrival order once the continuation resolves. Requests filters issue
//! themselves, and the responses to them, travel on separate lanes.

mod close;
mod deliver;
mod dispatch;
mod event;
mod handle;
mod state;
mod upstream;

use close::CloseReason;
use event::Event;
pub(crate) use event::WorkerEvent;
use futures::{StreamExt, future::BoxFuture, stream::FuturesUnordered};
pub use handle::DispatcherHandle;
use log::info;
use state::{Lane, LaneId};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use upstream::Upstream;

use crate::{
    chain::FilterChain,
    config::DispatcherConfig,
    filter::{ContinuationId, FilterOutcome},
    frame::Direction,
    metrics::{LiveDispatcher, active_dispatcher_count},
    ordering::ResponseOrderer,
    transport::Transport,
};

type PolledCompletion = BoxFuture<'static, (ContinuationId, FilterOutcome)>;

/// Connection worker running the filter chain over both directions.
///
/// # Examples
///
/// ```
/// use filterframe::{
///     chain::FilterChain,
///     config::DispatcherConfig,
///     dispatcher::FilterDispatcher,
///     frame::{ApiKey, Body, Frame, Header},
///     transport::ChannelTransport,
/// };
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let (backend, mut to_backend) = ChannelTransport::pair();
/// let (client, _to_client) = ChannelTransport::pair();
/// let (dispatcher, handle) =
///     FilterDispatcher::new(FilterChain::empty(), DispatcherConfig::default(), backend, client);
/// let worker = tokio::spawn(dispatcher.run());
///
/// let request = Frame::request(Header::request(ApiKey::API_VERSIONS, 3, 1), Body::default());
/// handle.client_request(request.clone()).expect("connection open");
/// assert_eq!(to_backend.recv().await, Some(request));
///
/// handle.close();
/// worker.await.expect("worker panicked");
/// # }
/// ```
pub struct FilterDispatcher {
    chain: FilterChain,
    config: DispatcherConfig,
    lanes: [Lane; 4],
    upstream: Upstream,
    client: Box<dyn Transport>,
    orderer: ResponseOrderer,
    polled: FuturesUnordered<PolledCompletion>,
    events_tx: mpsc::UnboundedSender<WorkerEvent>,
    events_rx: mpsc::UnboundedReceiver<WorkerEvent>,
    shutdown: CancellationToken,
    live: Option<LiveDispatcher>,
    connection_id: Option<u64>,
    next_continuation: u64,
}

impl FilterDispatcher {
    /// Create a dispatcher forwarding requests to `backend` and responses to
    /// `client`, together with the handle used to feed it.
    #[must_use]
    pub fn new(
        chain: FilterChain,
        config: DispatcherConfig,
        backend: impl Transport,
        client: impl Transport,
    ) -> (Self, DispatcherHandle) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let handle = DispatcherHandle::new(events_tx.clone(), shutdown.clone());
        let dispatcher = Self {
            upstream: Upstream::new(Box::new(backend), config.request_timeout_duration()),
            chain,
            config,
            lanes: Default::default(),
            client: Box::new(client),
            orderer: ResponseOrderer::default(),
            polled: FuturesUnordered::new(),
            events_tx,
            events_rx,
            shutdown,
            live: Some(LiveDispatcher::register()),
            connection_id: None,
            next_continuation: 0,
        };
        (dispatcher, handle)
    }

    /// Tag log lines with a connection identifier.
    #[must_use]
    pub fn with_connection_id(mut self, id: u64) -> Self {
        self.connection_id = Some(id);
        self
    }

    /// Token cancelled when the connection closes. Cancelling it closes the
    /// connection.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken { self.shutdown.clone() }

    /// Drive the connection until it closes.
    pub async fn run(mut self) {
        if self.shutdown.is_cancelled() {
            info!("connection aborted before start: id={:?}", self.connection_id);
            self.close(CloseReason::Shutdown);
            return;
        }
        info!(
            "connection opened: filterframe_active_dispatchers={}, id={:?}, filters={:?}",
            active_dispatcher_count(),
            self.connection_id,
            self.chain
        );
        while !self.is_closed() {
            let event = self.next_event().await;
            self.dispatch_event(event);
        }
    }

    /// Await the next ready event using biased priority ordering.
    ///
    /// Shutdown is observed first, then expired deadlines, then filter futures
    /// polled on the worker, and finally posted events.
    async fn next_event(&mut self) -> Event {
        let deadlines_armed = !self.upstream.deadlines.is_empty();
        let polling = !self.polled.is_empty();

        tokio::select! {
            biased;

            () = self.shutdown.cancelled() => Event::Shutdown,
            target = self.upstream.deadlines.next_expired(), if deadlines_armed => Event::Deadline(target),
            Some((id, outcome)) = self.polled.next(), if polling => Event::Polled(id, outcome),
            Some(event) = self.events_rx.recv() => Event::Worker(event),
        }
    }

    fn lane(&mut self, id: LaneId) -> &mut Lane { &mut self.lanes[id.index()] }

    fn timeout(&self, direction: Direction) -> std::time::Duration {
        match direction {
            Direction::Request => self.config.request_timeout_duration(),
            Direction::Response => self.config.response_timeout_duration(),
        }
    }

    fn next_continuation_id(&mut self) -> ContinuationId {
        self.next_continuation += 1;
        ContinuationId(self.next_continuation)
    }

    fn is_closed(&self) -> bool { self.lanes[LaneId::Requests.index()].is_closed() }
}

impl std::fmt::Debug for FilterDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterDispatcher")
            .field("connection_id", &self.connection_id)
            .field("chain", &self.chain)
            .field("closed", &self.is_closed())
            .field("in_flight", &self.upstream.registry.len())
            .field("deadlines", &self.upstream.deadlines.len())
            .field("owed_responses", &self.orderer.pending())
            .finish_non_exhaustive()
    }
}
